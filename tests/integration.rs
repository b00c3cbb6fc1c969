use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("rules.md"),
        "# School Rules\n\nStudents arrive by 8:30. The grading scale runs from 1 to 10.",
    )
    .unwrap();

    let config_content = format!(
        r#"topics = ["school_info"]

[db]
path = "{}/data/kb.sqlite"

[chunking]
chunk_size = 200
chunk_overlap = 40
"#,
        root.display()
    );

    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Run the binary with OPENAI_API_KEY scrubbed so tests are hermetic.
fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kb.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_commands_require_init() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_kb(&config_path, &["documents"]);
    assert!(!success);
    assert!(
        stderr.contains("kb init"),
        "expected a hint to run `kb init`, got: {}",
        stderr
    );
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    // Overlap equal to chunk size can never make progress.
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/data/kb.sqlite\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_kb(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_documents_empty_listing() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, _, success) = run_kb(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains("No documents"));
}

#[test]
fn test_ingest_requires_api_key() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let file = tmp.path().join("files/rules.md");
    let (_, stderr, success) = run_kb(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_ask_requires_api_key() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["ask", "What is the grading scale?"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_delete_doc_unknown_topic_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(
        &config_path,
        &["delete-doc", "no-such-doc", "--topic", "grades"],
    );
    assert!(!success);
    assert!(stderr.contains("unknown topic"), "stderr: {}", stderr);
}

#[test]
fn test_delete_doc_unknown_id_is_noop() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kb(&config_path, &["delete-doc", "no-such-doc"]);
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("Deleted 0 vectors"));
}

#[test]
fn test_errors_empty_listing() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (stdout, _, success) = run_kb(&config_path, &["errors"]);
    assert!(success);
    assert!(stdout.contains("No errors"));
}

#[test]
fn test_dimension_mismatch_is_fatal() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    // Same database, different embedding dimension.
    let changed = tmp.path().join("config/changed.toml");
    fs::write(
        &changed,
        format!(
            "topics = [\"school_info\"]\n[db]\npath = \"{}/data/kb.sqlite\"\n[embedding]\ndims = 768\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_kb(&changed, &["documents"]);
    assert!(!success);
    assert!(
        stderr.contains("initialized with"),
        "expected dimension mismatch, stderr: {}",
        stderr
    );
}
