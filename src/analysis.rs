//! The built-in analysis functions and the version/import helpers behind
//! them.
//!
//! Four functions ship by default: `find_library_references` (regex scan of
//! stored file texts), `check_compatibility` (declared-dependency conflicts,
//! peer requirements, and a best-effort registry consult),
//! `list_incompatible_libraries`, and `suggest_library_upgrades` (both
//! driven by the [`crate::knowledge`] tables).

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AdvisorError, Result};
use crate::functions::{AnalysisFunction, FunctionContext};
use crate::knowledge;
use crate::models::{Framework, ScannedFile};
use crate::registry_client::Ecosystem;

// ============ Version helpers ============

/// Strip range operators and pre-release/build suffixes: `^4.2.0` -> `4.2.0`,
/// `~1.2.3-beta+build` -> `1.2.3`.
pub fn clean_version(version: &str) -> &str {
    let stripped = version.trim_start_matches(['^', '~', '>', '=', '<', ' ']);
    let end = stripped.find(['-', '+']).unwrap_or(stripped.len());
    &stripped[..end]
}

/// Major component of a (possibly range-prefixed) version string.
pub fn major_of(version: &str) -> &str {
    let cleaned = clean_version(version);
    cleaned.split('.').next().unwrap_or(cleaned)
}

/// Numeric segment-wise comparison. Non-numeric segments make the
/// comparison undecidable, which counts as "not older".
pub fn is_version_older(current: &str, latest: &str) -> bool {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.split('.').map(|part| part.parse::<u64>().ok()).collect()
    };
    let (Some(mut a), Some(mut b)) = (parse(current), parse(latest)) else {
        return false;
    };
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    a < b
}

/// Split `name@version` (last `@`, so scoped npm names survive) or
/// `name==version` into name and optional version.
pub fn split_spec(spec: &str) -> (&str, Option<&str>) {
    if let Some((name, version)) = spec.split_once("==") {
        return (name, Some(version).filter(|v| !v.is_empty()));
    }
    match spec.rfind('@') {
        Some(idx) if idx > 0 => {
            let version = &spec[idx + 1..];
            (&spec[..idx], Some(version).filter(|v| !v.is_empty()))
        }
        _ => (spec, None),
    }
}

// ============ Import scanning ============

/// One matched reference to a library inside a stored file.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryReference {
    pub library: String,
    pub file_path: String,
    pub line_number: usize,
    pub context: String,
    pub reference_type: &'static str,
}

struct ImportPattern {
    regex: Regex,
    kind: &'static str,
}

/// Compiled import/using patterns per language family.
pub struct ImportScanner {
    javascript: Vec<ImportPattern>,
    csharp: Vec<ImportPattern>,
    python: Vec<ImportPattern>,
}

impl ImportScanner {
    /// Compiles the built-in patterns.
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern fails to compile, which a test guards.
    pub fn new() -> Self {
        let compile = |defs: &[(&str, &'static str)]| -> Vec<ImportPattern> {
            defs.iter()
                .map(|(pattern, kind)| ImportPattern {
                    regex: Regex::new(pattern).unwrap(),
                    kind,
                })
                .collect()
        };

        Self {
            javascript: compile(&[
                (r#"(?i)import\s+.*?\s+from\s+['"]([^'"]+)['"]"#, "import"),
                (r#"(?i)require\(['"]([^'"]+)['"]\)"#, "require"),
                (r#"(?i)import\(['"]([^'"]+)['"]\)"#, "import"),
            ]),
            csharp: compile(&[
                (r"(?i)using\s+([^;]+);", "using"),
                (r#"(?i)<PackageReference\s+Include="([^"]+)""#, "package_reference"),
            ]),
            python: compile(&[
                (r"(?i)from\s+(\S+)\s+import", "import"),
                (r"(?i)import\s+(\S+)", "import"),
            ]),
        }
    }

    fn patterns_for(&self, relative_path: &str) -> &[ImportPattern] {
        let ext = Path::new(relative_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "js" | "jsx" | "ts" | "tsx" | "vue" => &self.javascript,
            "cs" | "csproj" => &self.csharp,
            "py" => &self.python,
            _ => &[],
        }
    }

    /// All references to `library` across the given files, in file order.
    pub fn scan(&self, files: &[ScannedFile], library: &str) -> Vec<LibraryReference> {
        let mut references = Vec::new();
        for file in files {
            let patterns = self.patterns_for(&file.relative_path);
            if patterns.is_empty() {
                continue;
            }
            for (line_idx, line) in file.text.lines().enumerate() {
                for pattern in patterns {
                    for caps in pattern.regex.captures_iter(line) {
                        let Some(imported) = caps.get(1) else { continue };
                        let imported = imported.as_str().trim();
                        if is_library_match(imported, library) {
                            references.push(LibraryReference {
                                library: imported.to_string(),
                                file_path: file.relative_path.clone(),
                                line_number: line_idx + 1,
                                context: line.trim().to_string(),
                                reference_type: pattern.kind,
                            });
                        }
                    }
                }
            }
        }
        references
    }
}

impl Default for ImportScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Fuzzy match: exact names, submodule paths, and scoped variants all
/// reduce to a substring test.
fn is_library_match(imported: &str, library: &str) -> bool {
    imported.contains(library)
}

// ============ find_library_references ============

pub struct FindLibraryReferences {
    scanner: ImportScanner,
}

impl FindLibraryReferences {
    pub fn new() -> Self {
        Self {
            scanner: ImportScanner::new(),
        }
    }
}

impl Default for FindLibraryReferences {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisFunction for FindLibraryReferences {
    fn name(&self) -> &str {
        "find_library_references"
    }

    fn description(&self) -> &str {
        "Find every import or using reference to a library across the project's files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "library_name": {
                    "type": "string",
                    "description": "Library to look for, e.g. 'redux' or 'Newtonsoft.Json'"
                }
            },
            "required": ["library_name"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &FunctionContext<'_>) -> Result<Value> {
        let library = args["library_name"].as_str().unwrap_or("").trim();
        if library.is_empty() {
            return Err(AdvisorError::invalid_argument(
                self.name(),
                "'library_name' must not be empty",
            ));
        }

        let references = self.scanner.scan(ctx.files, library);
        Ok(json!({
            "library_name": library,
            "total": references.len(),
            "references": references,
        }))
    }
}

// ============ check_compatibility ============

pub struct CheckCompatibility;

#[async_trait]
impl AnalysisFunction for CheckCompatibility {
    fn name(&self) -> &str {
        "check_compatibility"
    }

    fn description(&self) -> &str {
        "Check whether a new library conflicts with the project's declared dependencies"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "new_library": {
                    "type": "string",
                    "description": "Library to evaluate, as 'name' or 'name@version'"
                }
            },
            "required": ["new_library"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &FunctionContext<'_>) -> Result<Value> {
        let spec = args["new_library"].as_str().unwrap_or("").trim();
        if spec.is_empty() {
            return Err(AdvisorError::invalid_argument(
                self.name(),
                "'new_library' must not be empty",
            ));
        }

        let (name, version) = split_spec(spec);
        let declared: HashMap<&str, &str> = ctx
            .profile
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.declared_version.as_str()))
            .collect();

        let mut conflicts = Vec::new();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        if let (Some(existing), Some(wanted)) = (declared.get(name), version) {
            if clean_version(existing) != clean_version(wanted) {
                conflicts.push(format!(
                    "Version conflict: {} {} vs {}",
                    name, existing, wanted
                ));
            }
        }

        if let Some(wanted) = version {
            for peer in knowledge::peer_requirements(name, major_of(wanted)) {
                let (peer_name, peer_major) = split_spec(peer);
                if let (Some(existing), Some(peer_major)) = (declared.get(peer_name), peer_major) {
                    if major_of(existing) != peer_major {
                        conflicts.push(format!(
                            "Peer dependency conflict: {} requires {}@{}, found {}",
                            name, peer_name, peer_major, existing
                        ));
                    }
                }
            }
        }

        if let Some(react_version) = declared.get("react") {
            if name.starts_with("@material-ui") && major_of(react_version) == "18" {
                warnings.push(
                    "@material-ui may have issues with React 18, consider @mui/material instead"
                        .to_string(),
                );
            }
        }

        // Best-effort registry consult; any failure downgrades to a warning.
        let ecosystem = match ctx.profile.detected_framework {
            Framework::Dotnet => Ecosystem::NuGet,
            _ => Ecosystem::Npm,
        };
        let registry_info = match ctx.registry.lookup(ecosystem, name).await {
            Ok(Some(info)) => {
                let newer_available = match version {
                    Some(wanted) => is_version_older(clean_version(wanted), &info.latest_version),
                    None => true,
                };
                if newer_available {
                    recommendations.push(format!(
                        "Latest published version is {}",
                        info.latest_version
                    ));
                }
                Some(info)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(package = name, error = %err, "registry consult failed");
                warnings.push(format!("Registry lookup unavailable: {}", err));
                None
            }
        };

        if !conflicts.is_empty() {
            recommendations.push("Review version conflicts before installing".to_string());
        }
        if conflicts.is_empty() && warnings.is_empty() {
            recommendations.push("Library appears compatible with current setup".to_string());
        }

        Ok(json!({
            "library": spec,
            "is_compatible": conflicts.is_empty(),
            "conflicts": conflicts,
            "warnings": warnings,
            "recommendations": recommendations,
            "registry": registry_info,
        }))
    }
}

// ============ list_incompatible_libraries ============

pub struct ListIncompatibleLibraries;

#[async_trait]
impl AnalysisFunction for ListIncompatibleLibraries {
    fn name(&self) -> &str {
        "list_incompatible_libraries"
    }

    fn description(&self) -> &str {
        "List project dependencies known to be incompatible with a target framework version"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_framework_version": {
                    "type": "string",
                    "description": "Target as framework@major, e.g. 'react@18' or 'vue@3'"
                }
            },
            "required": ["target_framework_version"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &FunctionContext<'_>) -> Result<Value> {
        let target = args["target_framework_version"].as_str().unwrap_or("").trim();
        let (framework, major) = split_spec(target);
        let Some(major) = major else {
            return Err(AdvisorError::invalid_argument(
                self.name(),
                "'target_framework_version' must be framework@major, e.g. 'react@18'",
            ));
        };

        let covered = knowledge::compatible_set(framework, major);
        let mut incompatible = Vec::new();
        if let Some(set) = covered {
            for dep in &ctx.profile.dependencies {
                let required_major = if dep.name == framework {
                    Some(major)
                } else {
                    pinned_major(set, &dep.name)
                };
                if let Some(required) = required_major {
                    if major_of(&dep.declared_version) != required {
                        incompatible.push(format!("{}@{}", dep.name, dep.declared_version));
                    }
                }
            }
        }

        Ok(json!({
            "target": target,
            "covered": covered.is_some(),
            "total": incompatible.len(),
            "incompatible": incompatible,
        }))
    }
}

// ============ suggest_library_upgrades ============

pub struct SuggestLibraryUpgrades;

/// One suggested dependency change.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeRecommendation {
    pub library: String,
    pub current_version: String,
    pub recommended_version: String,
    pub reason: String,
    pub breaking_changes: Vec<String>,
    pub migration_steps: Vec<String>,
}

#[async_trait]
impl AnalysisFunction for SuggestLibraryUpgrades {
    fn name(&self) -> &str {
        "suggest_library_upgrades"
    }

    fn description(&self) -> &str {
        "Suggest dependency upgrades, either toward a target framework version or to latest stable"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_framework_version": {
                    "type": "string",
                    "description": "Optional target as framework@major; omit for latest-stable suggestions"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: &Value, ctx: &FunctionContext<'_>) -> Result<Value> {
        let target = args
            .get("target_framework_version")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let (covered, recommendations) = match target {
            Some(target) => self.targeted(target, ctx)?,
            None => (true, general_recommendations(ctx)),
        };

        Ok(json!({
            "target": target,
            "covered": covered,
            "total": recommendations.len(),
            "recommendations": recommendations,
        }))
    }
}

impl SuggestLibraryUpgrades {
    fn targeted(
        &self,
        target: &str,
        ctx: &FunctionContext<'_>,
    ) -> Result<(bool, Vec<UpgradeRecommendation>)> {
        let (framework, major) = split_spec(target);
        let Some(major) = major else {
            return Err(AdvisorError::invalid_argument(
                self.name(),
                "'target_framework_version' must be framework@major, e.g. 'react@18'",
            ));
        };

        let Some(set) = knowledge::compatible_set(framework, major) else {
            return Ok((false, Vec::new()));
        };

        let mut recommendations = Vec::new();
        for dep in &ctx.profile.dependencies {
            let recommended = if dep.name == framework {
                Some(major)
            } else {
                pinned_major(set, &dep.name)
            };
            let Some(recommended) = recommended else { continue };

            let current_major = major_of(&dep.declared_version);
            if current_major == recommended {
                continue;
            }

            recommendations.push(UpgradeRecommendation {
                library: dep.name.clone(),
                current_version: dep.declared_version.clone(),
                recommended_version: recommended.to_string(),
                reason: format!("Compatibility with {}", target),
                breaking_changes: owned(knowledge::breaking_changes(
                    &dep.name,
                    current_major,
                    recommended,
                )),
                migration_steps: knowledge::migration_steps(&dep.name, current_major, recommended)
                    .map(owned)
                    .unwrap_or_else(|| {
                        generic_migration_steps(&dep.name, &dep.declared_version, recommended)
                    }),
            });
        }
        Ok((true, recommendations))
    }
}

/// Latest-stable suggestions. Only the Vue ecosystem has tracked latest
/// versions; other frameworks yield no general recommendations.
fn general_recommendations(ctx: &FunctionContext<'_>) -> Vec<UpgradeRecommendation> {
    if ctx.profile.detected_framework != Framework::Vue {
        return Vec::new();
    }

    let mut recommendations = Vec::new();
    for dep in &ctx.profile.dependencies {
        let Some(latest) = knowledge::latest_stable(&dep.name) else {
            continue;
        };
        let current = clean_version(&dep.declared_version);
        if current == latest || !is_version_older(current, latest) {
            continue;
        }

        let from_major = major_of(current);
        let to_major = major_of(latest);
        recommendations.push(UpgradeRecommendation {
            library: dep.name.clone(),
            current_version: dep.declared_version.clone(),
            recommended_version: latest.to_string(),
            reason: "Update to latest stable version for better performance and security"
                .to_string(),
            breaking_changes: owned(knowledge::breaking_changes(&dep.name, from_major, to_major)),
            migration_steps: knowledge::migration_steps(&dep.name, from_major, to_major)
                .map(owned)
                .unwrap_or_else(|| generic_migration_steps(&dep.name, current, latest)),
        });
    }
    recommendations
}

/// Major pinned for `name` in a compatibility set of `name@major` entries.
fn pinned_major<'a>(set: &[&'a str], name: &str) -> Option<&'a str> {
    set.iter().find_map(|entry| {
        let (entry_name, entry_major) = split_spec(entry);
        (entry_name == name).then_some(entry_major).flatten()
    })
}

fn generic_migration_steps(library: &str, from: &str, to: &str) -> Vec<String> {
    vec![
        format!("Update {} from {} to {}", library, from, to),
        "Review breaking changes documentation".to_string(),
        "Update import statements if needed".to_string(),
        "Test application thoroughly".to_string(),
    ]
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::models::{Dependency, FileKind, ProjectProfile};
    use crate::registry_client::{DisabledRegistry, PackageInfo, PackageRegistry};
    use chrono::Utc;

    fn profile(framework: Framework, deps: &[(&str, &str)]) -> ProjectProfile {
        ProjectProfile {
            project_id: "p1".to_string(),
            root_path: "/work/shop".to_string(),
            detected_framework: framework,
            dependencies: deps
                .iter()
                .map(|(name, version)| Dependency {
                    name: name.to_string(),
                    declared_version: version.to_string(),
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn source(path: &str, text: &str) -> ScannedFile {
        ScannedFile {
            relative_path: path.to_string(),
            kind: FileKind::Source,
            text: text.to_string(),
        }
    }

    struct StubRegistry {
        latest: &'static str,
    }

    #[async_trait]
    impl PackageRegistry for StubRegistry {
        async fn lookup(&self, ecosystem: Ecosystem, name: &str) -> Result<Option<PackageInfo>> {
            Ok(Some(PackageInfo {
                name: name.to_string(),
                ecosystem: ecosystem.as_str(),
                latest_version: self.latest.to_string(),
                versions_count: 40,
                description: None,
                license: Some("MIT".to_string()),
                weekly_downloads: Some(1_000_000),
            }))
        }
    }

    struct FailingRegistry;

    #[async_trait]
    impl PackageRegistry for FailingRegistry {
        async fn lookup(&self, _ecosystem: Ecosystem, _name: &str) -> Result<Option<PackageInfo>> {
            Err(AdvisorError::Registry("connection refused".to_string()))
        }
    }

    #[test]
    fn test_clean_version() {
        assert_eq!(clean_version("^4.2.0"), "4.2.0");
        assert_eq!(clean_version("~1.2.3-beta+build"), "1.2.3");
        assert_eq!(clean_version(">=2.0"), "2.0");
        assert_eq!(clean_version("18"), "18");
    }

    #[test]
    fn test_major_of() {
        assert_eq!(major_of("^18.2.0"), "18");
        assert_eq!(major_of("4"), "4");
        assert_eq!(major_of("~3.5.1"), "3");
    }

    #[test]
    fn test_is_version_older() {
        assert!(is_version_older("4.1.2", "4.2.0"));
        assert!(is_version_older("2.6", "2.6.1"));
        assert!(!is_version_older("5.0.0", "4.9.9"));
        assert!(!is_version_older("4.2.0", "4.2.0"));
        assert!(!is_version_older("2.6.x", "3.0"));
    }

    #[test]
    fn test_split_spec() {
        assert_eq!(split_spec("redux@4.2.0"), ("redux", Some("4.2.0")));
        assert_eq!(split_spec("@types/react@18"), ("@types/react", Some("18")));
        assert_eq!(split_spec("Django==4.2"), ("Django", Some("4.2")));
        assert_eq!(split_spec("react"), ("react", None));
        assert_eq!(split_spec("@vue/cli"), ("@vue/cli", None));
        assert_eq!(split_spec("react@"), ("react", None));
    }

    #[test]
    fn test_import_scanner_finds_fuzzy_matches() {
        let scanner = ImportScanner::new();
        let files = vec![
            source("src/store.js", "import { createStore } from 'redux';\nconsole.log('x');"),
            source("src/app.jsx", "const { connect } = require('react-redux');"),
            source("src/view.vue", "import { mapState } from 'vuex';"),
            source("README.md", "redux is mentioned here but never scanned"),
        ];

        let refs = scanner.scan(&files, "redux");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].file_path, "src/store.js");
        assert_eq!(refs[0].line_number, 1);
        assert_eq!(refs[0].reference_type, "import");
        assert_eq!(refs[1].library, "react-redux");
        assert_eq!(refs[1].reference_type, "require");

        let vuex = scanner.scan(&files, "vuex");
        assert_eq!(vuex.len(), 1);
        assert_eq!(vuex[0].file_path, "src/view.vue");
    }

    #[test]
    fn test_import_scanner_csharp_and_python() {
        let scanner = ImportScanner::new();
        let files = vec![
            source("Program.cs", "using Newtonsoft.Json;\nusing System;"),
            source(
                "Web.csproj",
                r#"<PackageReference Include="Newtonsoft.Json" Version="13.0.1" />"#,
            ),
            source("app.py", "from flask import Flask"),
        ];

        let json_refs = scanner.scan(&files, "Newtonsoft.Json");
        assert_eq!(json_refs.len(), 2);
        assert_eq!(json_refs[0].reference_type, "using");
        assert_eq!(json_refs[1].reference_type, "package_reference");

        let flask = scanner.scan(&files, "flask");
        assert_eq!(flask.len(), 1);
        assert_eq!(flask[0].line_number, 1);
    }

    #[tokio::test]
    async fn test_find_library_references_end_to_end() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(Framework::React, &[("redux", "^4.2.0")]);
        let files = vec![
            source("src/store.js", "import { createStore } from 'redux';"),
            source("src/index.js", "import App from './App';"),
        ];
        let ctx = FunctionContext {
            profile: &profile,
            files: &files,
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke(
                "find_library_references",
                json!({"library_name": "redux"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result_payload["total"], 1);
        assert_eq!(
            result.result_payload["references"][0]["file_path"],
            "src/store.js"
        );
    }

    #[tokio::test]
    async fn test_check_compatibility_flags_version_conflict() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(Framework::React, &[("redux", "^4.2.0")]);
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "redux@3.1.0"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result_payload["is_compatible"], false);
        let conflicts = result.result_payload["conflicts"].as_array().unwrap();
        assert!(conflicts[0].as_str().unwrap().contains("Version conflict"));
    }

    #[tokio::test]
    async fn test_check_compatibility_peer_requirements() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(
            Framework::React,
            &[("react", "^18.2.0"), ("redux", "^4.2.0")],
        );
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        // react-router-dom@5 needs react@17; the project has react 18.
        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "react-router-dom@5"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result_payload["is_compatible"], false);
        let conflicts = result.result_payload["conflicts"].as_array().unwrap();
        assert!(conflicts[0]
            .as_str()
            .unwrap()
            .contains("Peer dependency conflict"));

        // Matching pin raises no conflict.
        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "react-router-dom@6"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result_payload["is_compatible"], true);
    }

    #[tokio::test]
    async fn test_check_compatibility_material_ui_warning() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(Framework::React, &[("react", "^18.2.0")]);
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "@material-ui/core"}),
                &ctx,
            )
            .await
            .unwrap();
        // A warning, not a conflict.
        assert_eq!(result.result_payload["is_compatible"], true);
        let warnings = result.result_payload["warnings"].as_array().unwrap();
        assert!(warnings[0].as_str().unwrap().contains("@mui/material"));
    }

    #[tokio::test]
    async fn test_check_compatibility_consults_registry() {
        let mut registry = FunctionRegistry::new();
        registry.register(Box::new(CheckCompatibility));
        let profile = profile(Framework::React, &[("redux", "^4.2.0")]);
        let stub = StubRegistry { latest: "5.0.0" };
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &stub,
        };

        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "redux@4.2.0"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result_payload["is_compatible"], true);
        assert_eq!(result.result_payload["registry"]["latest_version"], "5.0.0");
        let recommendations = result.result_payload["recommendations"].as_array().unwrap();
        assert!(recommendations
            .iter()
            .any(|r| r.as_str().unwrap().contains("5.0.0")));
    }

    #[tokio::test]
    async fn test_check_compatibility_survives_registry_outage() {
        let mut registry = FunctionRegistry::new();
        registry.register(Box::new(CheckCompatibility));
        let profile = profile(Framework::React, &[("redux", "^4.2.0")]);
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &FailingRegistry,
        };

        let result = registry
            .invoke(
                "check_compatibility",
                json!({"new_library": "axios@1.6.0"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result_payload["is_compatible"], true);
        let warnings = result.result_payload["warnings"].as_array().unwrap();
        assert!(warnings[0].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_list_incompatible_libraries() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(
            Framework::React,
            &[
                ("react", "^17.0.2"),
                ("react-router-dom", "^5.2.0"),
                ("redux", "^4.2.0"),
            ],
        );
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke(
                "list_incompatible_libraries",
                json!({"target_framework_version": "react@18"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result_payload["covered"], true);
        let incompatible = result.result_payload["incompatible"].as_array().unwrap();
        assert_eq!(incompatible.len(), 2);
        assert_eq!(incompatible[0], "react@^17.0.2");
        assert_eq!(incompatible[1], "react-router-dom@^5.2.0");

        // Unknown framework: covered=false, nothing reported.
        let result = registry
            .invoke(
                "list_incompatible_libraries",
                json!({"target_framework_version": "svelte@4"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(result.result_payload["covered"], false);
        assert_eq!(result.result_payload["total"], 0);

        // A bare framework name is not a valid target.
        let err = registry
            .invoke(
                "list_incompatible_libraries",
                json!({"target_framework_version": "react"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_suggest_upgrades_toward_target() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(
            Framework::React,
            &[
                ("react", "^17.0.2"),
                ("react-router-dom", "^5.2.0"),
                ("@types/react", "^17.0.0"),
                ("redux", "^4.2.0"),
            ],
        );
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke(
                "suggest_library_upgrades",
                json!({"target_framework_version": "react@18"}),
                &ctx,
            )
            .await
            .unwrap();
        let recs = result.result_payload["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 3);

        let router = recs
            .iter()
            .find(|r| r["library"] == "react-router-dom")
            .unwrap();
        assert_eq!(router["recommended_version"], "6");
        assert_eq!(router["reason"], "Compatibility with react@18");
        assert_eq!(router["breaking_changes"].as_array().unwrap().len(), 3);

        // redux is unknown to the matrix, so it is never recommended.
        assert!(recs.iter().all(|r| r["library"] != "redux"));
    }

    #[tokio::test]
    async fn test_suggest_upgrades_general_vue() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(
            Framework::Vue,
            &[
                ("vue", "^2.6.14"),
                ("vue-router", "^3.5.1"),
                ("pinia", "^2.1.7"),
            ],
        );
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke("suggest_library_upgrades", json!({}), &ctx)
            .await
            .unwrap();
        let recs = result.result_payload["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 2);

        let vue = recs.iter().find(|r| r["library"] == "vue").unwrap();
        assert_eq!(vue["recommended_version"], "3.3.8");
        assert_eq!(vue["breaking_changes"].as_array().unwrap().len(), 5);
        assert!(vue["migration_steps"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str().unwrap().contains("createApp")));

        // pinia already matches latest stable.
        assert!(recs.iter().all(|r| r["library"] != "pinia"));
    }

    #[tokio::test]
    async fn test_suggest_upgrades_general_non_vue_is_empty() {
        let registry = FunctionRegistry::with_builtins();
        let profile = profile(Framework::React, &[("react", "^17.0.2")]);
        let ctx = FunctionContext {
            profile: &profile,
            files: &[],
            registry: &DisabledRegistry,
        };

        let result = registry
            .invoke("suggest_library_upgrades", json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.result_payload["total"], 0);
    }
}
