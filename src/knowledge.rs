//! Built-in compatibility knowledge for the supported frameworks.
//!
//! Static tables: which companion libraries pair with which framework major,
//! known peer requirements, breaking changes between majors, and latest
//! stable versions for the Vue ecosystem. Lookups return borrowed data;
//! callers format it into answers.

/// Companion libraries pinned per framework major, as `name@major`.
const COMPATIBILITY_MATRIX: &[(&str, &str, &[&str])] = &[
    (
        "react",
        "18",
        &["react-dom@18", "react-router-dom@6", "@types/react@18"],
    ),
    (
        "react",
        "17",
        &["react-dom@17", "react-router-dom@5", "@types/react@17"],
    ),
    (
        "vue",
        "3",
        &[
            "vue-router@4",
            "vuex@4",
            "pinia@2",
            "@vue/cli@5",
            "vite@4",
            "@vue/test-utils@2",
            "vue-tsc@1",
            "@vitejs/plugin-vue@4",
            "axios@1",
            "typescript@5",
            "@types/node@20",
        ],
    ),
    (
        "vue",
        "2",
        &[
            "vue-router@3",
            "vuex@3",
            "@vue/cli@4",
            "vue-template-compiler@2",
            "@vue/test-utils@1",
            "axios@0",
            "typescript@4",
            "@types/node@16",
        ],
    ),
    (
        "dotnet",
        "8",
        &["Microsoft.AspNetCore.App@8", "Microsoft.EntityFrameworkCore@8"],
    ),
    (
        "dotnet",
        "6",
        &["Microsoft.AspNetCore.App@6", "Microsoft.EntityFrameworkCore@6"],
    ),
];

/// Peer requirements per library major, as `name@major`.
const PEER_REQUIREMENTS: &[(&str, &str, &[&str])] = &[
    ("react-router-dom", "6", &["react@18"]),
    ("react-router-dom", "5", &["react@17"]),
];

/// Known breaking changes when moving a library between majors.
const BREAKING_CHANGES: &[(&str, &str, &str, &[&str])] = &[
    (
        "vue",
        "2",
        "3",
        &[
            "Global API changed to app-specific API",
            "v-model usage changes",
            "Filters removed",
            "Event API changes ($on, $off, $once removed)",
            "Functional components syntax change",
        ],
    ),
    (
        "vue-router",
        "3",
        "4",
        &[
            "History mode API changed",
            "Router constructor changes",
            "Navigation guards signature updated",
            "Route meta fields typing changes",
        ],
    ),
    (
        "vuex",
        "3",
        "4",
        &[
            "Installation method changed",
            "TypeScript support improved",
            "Module registration syntax updated",
        ],
    ),
    (
        "react-router-dom",
        "5",
        "6",
        &[
            "Switch component replaced with Routes",
            "useHistory hook replaced with useNavigate",
            "Exact prop removed from Route",
        ],
    ),
];

/// Curated migration steps for upgrades with known playbooks.
const MIGRATION_STEPS: &[(&str, &str, &str, &[&str])] = &[
    (
        "vue",
        "2",
        "3",
        &[
            "Update package.json dependencies",
            "Replace new Vue() with Vue.createApp()",
            "Update v-model usage patterns",
            "Remove or replace filter usage",
            "Update functional component syntax",
            "Test all components thoroughly",
        ],
    ),
    (
        "vue-router",
        "3",
        "4",
        &[
            "Update package.json dependencies",
            "Update router initialization syntax",
            "Update navigation guard function signatures",
            "Test all routes and navigation",
        ],
    ),
];

/// Latest stable versions tracked for the Vue ecosystem.
const VUE_LATEST_VERSIONS: &[(&str, &str)] = &[
    ("vue", "3.3.8"),
    ("vue-router", "4.2.5"),
    ("vuex", "4.0.2"),
    ("pinia", "2.1.7"),
    ("vite", "4.5.0"),
    ("@vue/cli", "5.0.8"),
    ("@vue/cli-service", "5.0.8"),
    ("@vitejs/plugin-vue", "4.4.0"),
    ("vue-tsc", "1.8.22"),
    ("@vue/test-utils", "2.4.1"),
    ("vitest", "0.34.6"),
    ("axios", "1.6.0"),
    ("typescript", "5.2.2"),
    ("@types/node", "20.8.7"),
    ("eslint-plugin-vue", "9.17.0"),
    ("@vue/eslint-config-typescript", "12.0.0"),
];

/// Companion set for a framework major, or `None` when the combination is
/// not covered.
pub fn compatible_set(framework: &str, major: &str) -> Option<&'static [&'static str]> {
    COMPATIBILITY_MATRIX
        .iter()
        .find(|(fw, ver, _)| *fw == framework && *ver == major)
        .map(|(_, _, libs)| *libs)
}

/// Whether any major of this framework is covered by the matrix.
pub fn knows_framework(framework: &str) -> bool {
    COMPATIBILITY_MATRIX.iter().any(|(fw, _, _)| *fw == framework)
}

/// Required peers for a library at a given major (empty when unknown).
pub fn peer_requirements(library: &str, major: &str) -> &'static [&'static str] {
    PEER_REQUIREMENTS
        .iter()
        .find(|(lib, ver, _)| *lib == library && *ver == major)
        .map(|(_, _, peers)| *peers)
        .unwrap_or(&[])
}

/// Known breaking changes for `library` moving `from` -> `to` (majors).
pub fn breaking_changes(library: &str, from: &str, to: &str) -> &'static [&'static str] {
    BREAKING_CHANGES
        .iter()
        .find(|(lib, f, t, _)| *lib == library && *f == from && *t == to)
        .map(|(_, _, _, changes)| *changes)
        .unwrap_or(&[])
}

/// Curated migration steps, or `None` when only the generic playbook applies.
pub fn migration_steps(library: &str, from: &str, to: &str) -> Option<&'static [&'static str]> {
    MIGRATION_STEPS
        .iter()
        .find(|(lib, f, t, _)| *lib == library && *f == from && *t == to)
        .map(|(_, _, _, steps)| *steps)
}

/// Latest tracked stable version for a Vue-ecosystem library.
pub fn latest_stable(library: &str) -> Option<&'static str> {
    VUE_LATEST_VERSIONS
        .iter()
        .find(|(lib, _)| *lib == library)
        .map(|(_, ver)| *ver)
}
