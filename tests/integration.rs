use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn depad_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("depad");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    // Create config
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create a small React project to ingest
    let app_dir = root.join("app");
    fs::create_dir_all(app_dir.join("src")).unwrap();
    fs::write(
        app_dir.join("package.json"),
        r#"{
  "name": "storefront",
  "dependencies": {
    "react": "^18.2.0",
    "redux": "^4.2.0",
    "react-router-dom": "^5.2.0"
  }
}
"#,
    )
    .unwrap();
    fs::write(
        app_dir.join("src").join("store.js"),
        "import { createStore } from 'redux';\n\nexport const store = createStore(() => ({}));\n",
    )
    .unwrap();
    fs::write(
        app_dir.join("src").join("app.jsx"),
        "import React from 'react';\n\nexport function App() {\n  return null;\n}\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[storage]
path = "{}/data/depad.db"

[chunking]
max_chunk_size = 1000
overlap = 200

[embedding]
provider = "disabled"

[completion]
provider = "disabled"

[retrieval]
top_k = 5
keyword_fallback = true

[registry]
enabled = false

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("depad.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_depad(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = depad_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run depad binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Ingest the fixture project and return its printed project id.
fn ingest_fixture(tmp: &TempDir, config_path: &Path) -> String {
    let app = tmp.path().join("app");
    let (stdout, stderr, success) = run_depad(config_path, &["ingest", app.to_str().unwrap()]);
    assert!(
        success,
        "ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Ingested project "))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| panic!("no project id in ingest output: {}", stdout))
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_depad(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("depad.db").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_depad(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_depad(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_init_writes_default_config() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config").join("depad.toml");

    let binary = depad_binary();
    let output = Command::new(&binary)
        .current_dir(tmp.path())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("init")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Wrote default config"));
    assert!(config_path.exists());

    let written = fs::read_to_string(&config_path).unwrap();
    assert!(written.contains("[storage]"));
    assert!(written.contains("provider = \"disabled\""));
}

#[test]
fn test_ingest_project() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let app = tmp.path().join("app");
    let (stdout, stderr, success) = run_depad(&config_path, &["ingest", app.to_str().unwrap()]);
    assert!(
        success,
        "ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("Ingested project "));
    assert!(stdout.contains("framework: react"));
    assert!(stdout.contains("files:     3"));
    assert!(stdout.contains("no (keyword-only)"));
}

#[test]
fn test_ingest_missing_path_fails() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let missing = tmp.path().join("no-such-dir");
    let (_, stderr, success) = run_depad(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success, "ingest of a missing path should fail");
    assert!(
        stderr.contains("Scan failed"),
        "Should report a scan failure, got: {}",
        stderr
    );
}

#[test]
fn test_reingest_no_duplicates() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let first = ingest_fixture(&tmp, &config_path);
    let second = ingest_fixture(&tmp, &config_path);
    assert_eq!(first, second, "same root must map to the same project id");

    let (stdout, _, success) = run_depad(&config_path, &["projects"]);
    assert!(success);
    assert_eq!(
        stdout.matches(&first).count(),
        1,
        "project should be listed exactly once, got: {}",
        stdout
    );
}

#[test]
fn test_ask_remove_redux() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout, stderr, success) = run_depad(
        &config_path,
        &["ask", &project, "remove redux, what should I check?"],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    // The reference finder ran and the answer names the importing file.
    assert!(
        stdout.contains("find_library_references"),
        "expected the reference finder to run, got: {}",
        stdout
    );
    assert!(
        stdout.contains("src/store.js"),
        "answer should name the importing file, got: {}",
        stdout
    );
    // With embeddings disabled, retrieval came from the keyword side.
    assert!(stdout.contains("keyword retrieval"));
}

#[test]
fn test_ask_unknown_project_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let (_, stderr, success) = run_depad(&config_path, &["ask", "feedbeef0000", "anything"]);
    assert!(!success, "ask about an unknown project should fail");
    assert!(
        stderr.contains("unknown project"),
        "Should report the unknown project, got: {}",
        stderr
    );
}

#[test]
fn test_search_keyword() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout, _, success) = run_depad(
        &config_path,
        &["search", &project, "createStore redux", "--keyword"],
    );
    assert!(success, "keyword search failed");
    assert!(
        stdout.contains("src/store.js"),
        "Expected src/store.js in results, got: {}",
        stdout
    );
}

#[test]
fn test_search_deterministic() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout1, _, _) = run_depad(&config_path, &["search", &project, "react", "--keyword"]);
    let (stdout2, _, _) = run_depad(&config_path, &["search", &project, "react", "--keyword"]);
    assert_eq!(
        stdout1, stdout2,
        "Search results should be deterministic across runs"
    );
}

#[test]
fn test_search_semantic_errors_when_disabled() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (_, stderr, success) = run_depad(&config_path, &["search", &project, "redux"]);
    assert!(
        !success,
        "Semantic search should fail when the provider is disabled"
    );
    assert!(
        stderr.contains("disabled"),
        "Should mention the disabled provider, got: {}",
        stderr
    );
}

#[test]
fn test_projects_lists_ingested() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout, _, success) = run_depad(&config_path, &["projects"]);
    assert!(success);
    assert!(stdout.contains(&project));
    assert!(stdout.contains("react"));
}

#[test]
fn test_stats_overview_and_filter() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout, _, success) = run_depad(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Projects:    1"));
    assert!(stdout.contains(&project));

    let (stdout, _, success) = run_depad(&config_path, &["stats", &project]);
    assert!(success);
    assert!(stdout.contains(&project));
    // One package.json plus two source files.
    assert!(stdout.contains("Files by kind:"));
    assert!(stdout.contains("manifest"));
    assert!(stdout.contains("source"));

    let (_, stderr, success) = run_depad(&config_path, &["stats", "feedbeef0000"]);
    assert!(!success, "stats for an unknown project should fail");
    assert!(stderr.contains("Project not found"));
}

#[test]
fn test_delete_project() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let (stdout, _, success) = run_depad(&config_path, &["delete", &project]);
    assert!(success);
    assert!(stdout.contains("Deleted project"));

    let (stdout, _, _) = run_depad(&config_path, &["projects"]);
    assert!(stdout.contains("No projects"));

    let (_, stderr, success) = run_depad(&config_path, &["delete", &project]);
    assert!(!success, "Deleting twice should fail the second time");
    assert!(stderr.contains("Project not found"));
}

#[test]
fn test_reembed_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let (_, stderr, success) = run_depad(&config_path, &["reembed"]);
    assert!(!success, "reembed should fail when provider disabled");
    assert!(
        stderr.contains("disabled"),
        "Should mention disabled, got: {}",
        stderr
    );
}

#[test]
fn test_chat_piped_session() {
    let (tmp, config_path) = setup_test_env();

    run_depad(&config_path, &["init"]);
    let project = ingest_fixture(&tmp, &config_path);

    let binary = depad_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("chat")
        .arg(&project)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"remove redux, what should I check?\nexit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("find_library_references"),
        "chat answer should show the reference finder ran, got: {}",
        stdout
    );
    assert!(stdout.contains("src/store.js"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, config_path) = setup_test_env();

    // overlap >= max_chunk_size must be rejected at load
    let bad = format!(
        r#"[storage]
path = "{}/data/depad.db"

[chunking]
max_chunk_size = 100
overlap = 100
"#,
        tmp.path().display()
    );
    fs::write(&config_path, bad).unwrap();

    let (_, stderr, success) = run_depad(&config_path, &["projects"]);
    assert!(!success, "Invalid chunking config should be rejected");
    assert!(
        stderr.contains("overlap"),
        "Should mention the overlap constraint, got: {}",
        stderr
    );
}

#[test]
fn test_unknown_provider_rejected() {
    let (tmp, config_path) = setup_test_env();

    let bad = format!(
        r#"[storage]
path = "{}/data/depad.db"

[embedding]
provider = "quantum"
model = "q1"
dims = 8
"#,
        tmp.path().display()
    );
    fs::write(&config_path, bad).unwrap();

    let (_, stderr, success) = run_depad(&config_path, &["projects"]);
    assert!(!success);
    assert!(
        stderr.contains("Unknown embedding provider"),
        "Should name the bad provider, got: {}",
        stderr
    );
}
