use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sdoc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sdoc");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sdoc.sqlite"

[storage]
root = "{root}/data/recordings"
base_url = "/recordings"

[genai]
allowed_models = ["models/gemini-2.5-flash", "models/gemini-2.5-pro"]

[stt]
model_id = "scribe_v1"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sdoc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sdoc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sdoc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // Tests must behave the same regardless of the invoking shell's
        // credentials.
        .env_remove("GEMINI_API_KEY")
        .env_remove("ELEVENLABS_API_KEY")
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sdoc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Pull the trailing UUID out of a "Created document <id>" style line.
fn extract_id(stdout: &str, prefix: &str) -> String {
    stdout
        .lines()
        .find(|l| l.starts_with(prefix))
        .and_then(|l| l.rsplit(' ').next())
        .unwrap_or_else(|| panic!("no '{}' line in output: {}", prefix, stdout))
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sdoc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sdoc.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sdoc(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sdoc(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_doc_lifecycle() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, stderr, success) = run_sdoc(
        &config_path,
        &["doc", "new", "Meeting notes", "--content", "<p>hello</p>"],
    );
    assert!(success, "doc new failed: {}", stderr);
    let id = extract_id(&stdout, "Created document ");

    let (stdout, _, success) = run_sdoc(&config_path, &["doc", "list"]);
    assert!(success);
    assert!(stdout.contains("Meeting notes"));
    assert!(stdout.contains(&id));

    let (stdout, _, success) = run_sdoc(&config_path, &["doc", "show", &id]);
    assert!(success);
    assert!(stdout.contains("<p>hello</p>"));

    let (_, _, success) = run_sdoc(&config_path, &["doc", "rm", &id]);
    assert!(success, "doc rm failed");

    let (_, stderr, success) = run_sdoc(&config_path, &["doc", "show", &id]);
    assert!(!success, "show after rm should fail");
    assert!(stderr.contains("not found"), "got: {}", stderr);

    let (stdout, _, _) = run_sdoc(&config_path, &["doc", "list"]);
    assert!(!stdout.contains(&id), "deleted doc still listed: {}", stdout);
}

#[test]
fn test_doc_new_rejects_empty_title() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (_, stderr, success) = run_sdoc(&config_path, &["doc", "new", "  "]);
    assert!(!success, "empty title should fail");
    assert!(stderr.contains("validation failed"), "got: {}", stderr);
}

#[test]
fn test_chat_without_backend_writes_fallback_notice() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, _) = run_sdoc(&config_path, &["doc", "new", "Notes"]);
    let id = extract_id(&stdout, "Created document ");

    // No GEMINI_API_KEY: the edit degrades but still succeeds and lands in
    // history.
    let (stdout, stderr, success) = run_sdoc(&config_path, &["chat", &id, "add a summary table"]);
    assert!(success, "chat should degrade, not fail: {}", stderr);
    assert!(stdout.contains("Action: error"));
    assert!(stdout.contains("not configured"));

    let (stdout, _, _) = run_sdoc(&config_path, &["doc", "show", &id, "--turns"]);
    assert!(stdout.contains("Conversation (1 turns)"));
    assert!(stdout.contains("add a summary table"));
}

#[test]
fn test_chat_missing_document() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (_, stderr, success) = run_sdoc(&config_path, &["chat", "no-such-id", "hello"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_subject_lifecycle_with_comment() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, success) = run_sdoc(
        &config_path,
        &["subject", "new", "Q3 planning", "--description", "weekly sync"],
    );
    assert!(success);
    let id = extract_id(&stdout, "Created subject ");

    let (_, _, success) = run_sdoc(
        &config_path,
        &["comment", &id, "ship it", "--author", "ana"],
    );
    assert!(success, "comment failed");

    let (stdout, _, success) = run_sdoc(&config_path, &["subject", "show", &id]);
    assert!(success);
    assert!(stdout.contains("Q3 planning"));
    assert!(stdout.contains("weekly sync"));
    assert!(stdout.contains("Comments (1):"));
    assert!(stdout.contains("ana: ship it"));

    let (_, _, success) = run_sdoc(&config_path, &["subject", "rm", &id]);
    assert!(success);

    let (_, stderr, success) = run_sdoc(&config_path, &["comment", &id, "late"]);
    assert!(!success, "comment on deleted subject should fail");
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_upload_stores_recording_locally() {
    let (tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, _) = run_sdoc(&config_path, &["subject", "new", "Calls"]);
    let subject_id = extract_id(&stdout, "Created subject ");

    let audio_path = tmp.path().join("standup.webm");
    fs::write(&audio_path, b"not really audio but good enough").unwrap();

    let (stdout, stderr, success) = run_sdoc(
        &config_path,
        &["upload", &subject_id, audio_path.to_str().unwrap()],
    );
    assert!(success, "upload failed: {}", stderr);
    assert!(stdout.contains("local backend"), "got: {}", stdout);
    assert!(stdout.contains("URL: /recordings/"), "got: {}", stdout);

    // Bytes landed under the configured storage root.
    let stored: Vec<_> = fs::read_dir(tmp.path().join("data").join("recordings"))
        .unwrap()
        .collect();
    assert_eq!(stored.len(), 1);

    let (stdout, _, _) = run_sdoc(&config_path, &["subject", "show", &subject_id]);
    assert!(stdout.contains("Recordings (1):"));
    assert!(stdout.contains("standup.webm"));
    assert!(stdout.contains("not transcribed"));
}

#[test]
fn test_upload_missing_subject() {
    let (tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let audio_path = tmp.path().join("a.webm");
    fs::write(&audio_path, b"x").unwrap();

    let (_, stderr, success) = run_sdoc(
        &config_path,
        &["upload", "no-such-subject", audio_path.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_transcribe_without_key_fails_cleanly() {
    let (tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, _) = run_sdoc(&config_path, &["subject", "new", "Calls"]);
    let subject_id = extract_id(&stdout, "Created subject ");

    let audio_path = tmp.path().join("call.webm");
    fs::write(&audio_path, b"bytes").unwrap();
    let (stdout, _, _) = run_sdoc(
        &config_path,
        &["upload", &subject_id, audio_path.to_str().unwrap()],
    );
    // Line shape: "Stored recording <id> (<backend> backend)".
    let recording_id = stdout
        .lines()
        .find(|l| l.starts_with("Stored recording "))
        .and_then(|l| l.split_whitespace().nth(2))
        .unwrap_or_else(|| panic!("no recording id in output: {}", stdout))
        .to_string();

    let (_, stderr, success) = run_sdoc(&config_path, &["transcribe", &recording_id]);
    assert!(!success, "transcribe without key should fail");
    assert!(
        stderr.contains("ELEVENLABS_API_KEY"),
        "should name the missing variable, got: {}",
        stderr
    );
}

#[test]
fn test_summarize_without_key_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, _) = run_sdoc(&config_path, &["subject", "new", "NoKey"]);
    let subject_id = extract_id(&stdout, "Created subject ");

    let (_, stderr, success) = run_sdoc(&config_path, &["summarize", &subject_id]);
    assert!(!success, "summarize without key should fail");
    assert!(
        stderr.contains("GEMINI_API_KEY"),
        "should name the missing variable, got: {}",
        stderr
    );

    // Nothing got committed.
    let (stdout, _, success) = run_sdoc(&config_path, &["summaries", &subject_id]);
    assert!(success);
    assert!(stdout.contains("No summary versions yet."));
}

#[test]
fn test_summaries_current_when_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_sdoc(&config_path, &["init"]);

    let (stdout, _, _) = run_sdoc(&config_path, &["subject", "new", "Fresh"]);
    let subject_id = extract_id(&stdout, "Created subject ");

    let (stdout, _, success) = run_sdoc(&config_path, &["summaries", &subject_id, "--current"]);
    assert!(success);
    assert!(stdout.contains("No summary versions yet."));
}

#[test]
fn test_missing_config_errors() {
    let (tmp, _) = setup_test_env();
    let bogus = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_sdoc(&bogus, &["init"]);
    assert!(!success, "missing config should fail");
    assert!(
        stderr.contains("Failed to read config file"),
        "got: {}",
        stderr
    );
}
