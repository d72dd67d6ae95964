use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn senti_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("senti");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/senti.sqlite"

[server]
bind = "127.0.0.1:7431"
"#,
        root.display()
    );

    let config_path = config_dir.join("senti.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_senti(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = senti_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run senti binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Parse the scope id from `senti scope add` output (`scope <id>` on the first line).
fn add_scope(config_path: &Path, name: &str, owner: &str) -> String {
    let (stdout, stderr, success) = run_senti(
        config_path,
        &["scope", "add", "--name", name, "--owner", owner],
    );
    assert!(success, "scope add failed: stdout={}, stderr={}", stdout, stderr);
    stdout
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("scope "))
        .unwrap_or_else(|| panic!("Unexpected scope add output: {}", stdout))
        .trim()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_senti(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/senti.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_senti(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_senti(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_scope_add_and_list() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let id = add_scope(&config_path, "reviews", "alice");

    let (stdout, _, success) = run_senti(&config_path, &["scope", "list"]);
    assert!(success, "scope list failed");
    assert!(stdout.contains(&id), "Expected scope id in list, got: {}", stdout);
    assert!(stdout.contains("reviews"));
    assert!(stdout.contains("alice"));
}

#[test]
fn test_cache_stats_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let (stdout, _, success) = run_senti(&config_path, &["cache", "stats"]);
    assert!(success, "cache stats failed");
    assert!(stdout.contains("items:    0"), "got: {}", stdout);
    assert!(stdout.contains("analyses: 0"), "got: {}", stdout);
}

#[test]
fn test_analyze_unknown_scope_denied() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let (_, stderr, success) = run_senti(
        &config_path,
        &["analyze", "--scope", "no-such-scope", "--principal", "alice", "Great product"],
    );
    assert!(!success, "analyze under an unregistered scope must fail");
    assert!(stderr.contains("access denied"), "got: {}", stderr);
}

#[test]
fn test_analyze_miss_with_disabled_provider_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let id = add_scope(&config_path, "reviews", "alice");

    // The default provider is disabled, so the batch's cache miss cannot be
    // analyzed; the request must fail rather than return partial results.
    let (_, stderr, success) = run_senti(
        &config_path,
        &["analyze", "--scope", &id, "--principal", "alice", "Great product"],
    );
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_analyze_requires_texts() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let id = add_scope(&config_path, "reviews", "alice");

    let (_, stderr, success) = run_senti(
        &config_path,
        &["analyze", "--scope", &id, "--principal", "alice"],
    );
    assert!(!success);
    assert!(stderr.contains("No texts"), "got: {}", stderr);
}

#[test]
fn test_scope_clear_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_senti(&config_path, &["init"]);
    let id = add_scope(&config_path, "reviews", "alice");

    let (stdout, _, success) = run_senti(&config_path, &["scope", "clear", &id]);
    assert!(success, "scope clear failed");
    assert!(stdout.contains("analyses deleted: 0"), "got: {}", stdout);
    assert!(stdout.contains("items deleted:    0"), "got: {}", stdout);
}
