//! Project scanning: walks a project tree, classifies files, and extracts
//! declared dependencies from manifests.
//!
//! A scan is read-only. It returns the normalized [`ProjectProfile`] plus the
//! text of every classified file; ingestion into the index is a separate
//! step. Malformed manifests degrade to warnings, never scan failures — the
//! only hard failure is a missing or unreadable root path.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{AdvisorError, Result};
use crate::models::{Dependency, FileKind, Framework, ProjectProfile, ScannedFile};

/// Everything a scan produces: the profile, the classified file texts, and
/// any warnings recorded along the way.
#[derive(Debug)]
pub struct ScanOutcome {
    pub profile: ProjectProfile,
    pub files: Vec<ScannedFile>,
    pub warnings: Vec<String>,
}

pub fn scan_project(config: &Config, root_path: &Path) -> Result<ScanOutcome> {
    let root = root_path
        .canonicalize()
        .map_err(|e| AdvisorError::scan(root_path, e.to_string()))?;
    if !root.is_dir() {
        return Err(AdvisorError::scan(root_path, "not a directory"));
    }

    let exclude_set = build_globset(&config.scanner.exclude_globs)
        .map_err(|e| AdvisorError::scan(root_path, format!("bad exclude glob: {}", e)))?;
    let ignore_dirs: HashSet<&str> = config
        .scanner
        .ignore_dirs
        .iter()
        .map(|s| s.as_str())
        .collect();

    let mut files = Vec::new();
    let mut warnings = Vec::new();

    let walker = WalkDir::new(&root)
        .follow_links(config.scanner.follow_symlinks)
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && ignore_dirs.contains(e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(format!("skipped unreadable entry: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let kind = classify(path);
        if kind == FileKind::Unknown {
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > config.scanner.max_file_bytes => {
                warnings.push(format!(
                    "skipped {} ({} bytes exceeds scanner.max_file_bytes)",
                    rel_str,
                    meta.len()
                ));
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warnings.push(format!("skipped {}: {}", rel_str, e));
                continue;
            }
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warnings.push(format!("skipped {}: {}", rel_str, e));
                continue;
            }
        };

        files.push(ScannedFile {
            relative_path: rel_str,
            kind,
            text,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let dependencies = extract_dependencies(&files, &mut warnings);
    let detected_framework = detect_framework(&dependencies, &files);

    for warning in &warnings {
        tracing::warn!(root = %root.display(), "{}", warning);
    }
    tracing::info!(
        root = %root.display(),
        files = files.len(),
        dependencies = dependencies.len(),
        framework = detected_framework.as_str(),
        "scanned project"
    );

    let profile = ProjectProfile {
        project_id: project_id_for(&root),
        root_path: root.to_string_lossy().to_string(),
        detected_framework,
        dependencies,
        created_at: Utc::now(),
    };

    Ok(ScanOutcome {
        profile,
        files,
        warnings,
    })
}

/// Derives the stable project id from the canonical root path.
pub fn project_id_for(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

fn classify(path: &Path) -> FileKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name == "package.json" || name == "requirements.txt" || name.ends_with(".csproj") {
        return FileKind::Manifest;
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "js" | "jsx" | "ts" | "tsx" | "vue" | "cs" | "py" => FileKind::Source,
        "json" | "yml" | "yaml" | "toml" | "xml" | "config" | "props" | "targets" => {
            FileKind::Config
        }
        "md" | "txt" | "rst" | "html" => FileKind::Doc,
        _ => FileKind::Unknown,
    }
}

/// Parses every manifest in path order and merges the results. A name seen
/// again keeps its first position but takes the later declared version.
fn extract_dependencies(files: &[ScannedFile], warnings: &mut Vec<String>) -> Vec<Dependency> {
    let mut merged: Vec<Dependency> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for file in files.iter().filter(|f| f.kind == FileKind::Manifest) {
        let name = file
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&file.relative_path)
            .to_lowercase();
        let parsed = if name == "package.json" {
            parse_package_json(&file.relative_path, &file.text, warnings)
        } else if name == "requirements.txt" {
            parse_requirements(&file.text)
        } else {
            parse_csproj(&file.relative_path, &file.text, warnings)
        };

        for dep in parsed {
            match positions.get(&dep.name) {
                Some(&at) => merged[at].declared_version = dep.declared_version,
                None => {
                    positions.insert(dep.name.clone(), merged.len());
                    merged.push(dep);
                }
            }
        }
    }

    merged
}

/// Union of the dependencies, devDependencies, and peerDependencies objects.
/// Within each object, entries come out in name order.
fn parse_package_json(
    path: &str,
    text: &str,
    warnings: &mut Vec<String>,
) -> Vec<Dependency> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warnings.push(format!("unparsable manifest {}: {}", path, e));
            return Vec::new();
        }
    };

    let mut deps = Vec::new();
    for section in ["dependencies", "devDependencies", "peerDependencies"] {
        let Some(object) = value.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, version) in object {
            match version.as_str() {
                Some(version) => deps.push(Dependency {
                    name: name.clone(),
                    declared_version: version.to_string(),
                }),
                None => warnings.push(format!(
                    "unparsable entry '{}' in {}: version is not a string",
                    name, path
                )),
            }
        }
    }
    deps
}

/// `<PackageReference Include="..." Version="..."/>` elements in document
/// order. A parse error keeps whatever was read before it.
fn parse_csproj(path: &str, text: &str, warnings: &mut Vec<String>) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"PackageReference" =>
            {
                let mut name = None;
                let mut version = String::new();
                for attr in e.attributes().flatten() {
                    let value = match attr.unescape_value() {
                        Ok(value) => value.into_owned(),
                        Err(_) => continue,
                    };
                    match attr.key.local_name().as_ref() {
                        b"Include" => name = Some(value),
                        b"Version" => version = value,
                        _ => {}
                    }
                }
                if let Some(name) = name {
                    deps.push(Dependency {
                        name,
                        declared_version: version,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warnings.push(format!("unparsable manifest {}: {}", path, e));
                break;
            }
        }
        buf.clear();
    }

    deps
}

/// `name==version` lines; anything after another comparison operator is
/// dropped so the bare name survives.
fn parse_requirements(text: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((name, version)) = line.split_once("==") {
            deps.push(Dependency {
                name: name.trim().to_string(),
                declared_version: version.trim().to_string(),
            });
        } else {
            let name: String = line
                .chars()
                .take_while(|c| !matches!(c, '>' | '<' | '=' | '~' | '!' | ' '))
                .collect();
            if !name.is_empty() {
                deps.push(Dependency {
                    name,
                    declared_version: String::new(),
                });
            }
        }
    }
    deps
}

/// Dependency indicators win over file extensions; extensions are the
/// fallback for projects scanned without a manifest.
fn detect_framework(dependencies: &[Dependency], files: &[ScannedFile]) -> Framework {
    let has_dep = |name: &str| dependencies.iter().any(|d| d.name == name);

    if has_dep("react") || has_dep("react-dom") {
        return Framework::React;
    }
    if has_dep("vue") || dependencies.iter().any(|d| d.name.starts_with("@vue/")) {
        return Framework::Vue;
    }
    if files
        .iter()
        .any(|f| f.relative_path.to_lowercase().ends_with(".csproj"))
        || dependencies.iter().any(|d| d.name.starts_with("Microsoft."))
    {
        return Framework::Dotnet;
    }

    let has_ext = |ext: &str| {
        files
            .iter()
            .any(|f| f.relative_path.to_lowercase().ends_with(ext))
    };
    if has_ext(".jsx") || has_ext(".tsx") {
        return Framework::React;
    }
    if has_ext(".vue") {
        return Framework::Vue;
    }
    if has_ext(".cs") {
        return Framework::Dotnet;
    }

    Framework::Unknown
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
