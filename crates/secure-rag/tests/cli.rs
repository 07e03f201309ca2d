//! End-to-end tests of the `secure-rag` binary against a temporary
//! database and a mock embeddings endpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

struct TestEnv {
    _tmp: TempDir,
    root: PathBuf,
    config_path: PathBuf,
    _embeddings: mockito::ServerGuard,
}

fn setup_test_env() -> TestEnv {
    let mut embeddings = mockito::Server::new();
    embeddings
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":[{"index":0,"embedding":[1.0,0.0]}]}"#)
        .create();

    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/secure-rag.sqlite"
collection = "test_docs"
dims = 2

[embedding]
provider = "openai"
model = "test-embedder"
base_url = "{url}"
max_retries = 0

[logging]
level = "warn"
"#,
        root = root.display(),
        url = embeddings.url()
    );
    let config_path = config_dir.join("secure-rag.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        root,
        config_path,
        _embeddings: embeddings,
    }
}

fn run_cli(config_path: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_secure-rag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .envs(env.iter().copied())
        .output()
        .expect("failed to run secure-rag binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let env = setup_test_env();
    let (stdout, stderr, success) = run_cli(&env.config_path, &["init"], &[]);

    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(env.root.join("data").join("secure-rag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env();
    let (_, _, first) = run_cli(&env.config_path, &["init"], &[]);
    let (_, stderr, second) = run_cli(&env.config_path, &["init"], &[]);
    assert!(first);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_init_rejects_dimension_change() {
    let env = setup_test_env();
    let (_, _, first) = run_cli(&env.config_path, &["init"], &[]);
    assert!(first);

    let (_, stderr, success) = run_cli(&env.config_path, &["init"], &[("RAG_STORE__DIMS", "3")]);
    assert!(!success);
    assert!(stderr.contains("dimensions"), "{}", stderr);
}

#[test]
fn test_ingest_and_search() {
    let env = setup_test_env();
    let doc = env.root.join("remote-work.md");
    fs::write(&doc, "Remote staff must connect through the VPN.").unwrap();

    let (stdout, stderr, success) =
        run_cli(&env.config_path, &["ingest", doc.to_str().unwrap()], &[]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("remote-work.md: 1 chunks"), "{}", stdout);
    assert!(stdout.contains("Collection 'test_docs' holds 1 chunks"), "{}", stdout);

    let (stdout, stderr, success) = run_cli(&env.config_path, &["search", "vpn"], &[]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("1. ["), "{}", stdout);
    assert!(stdout.contains("remote-work.md #0"), "{}", stdout);
}

#[test]
fn test_ingest_unsupported_file_fails() {
    let env = setup_test_env();
    let bin = env.root.join("tool.exe");
    fs::write(&bin, b"MZ").unwrap();

    let (_, stderr, success) = run_cli(&env.config_path, &["ingest", bin.to_str().unwrap()], &[]);
    assert!(!success);
    assert!(stderr.contains("Only PDF, TXT, MD files supported"), "{}", stderr);
}

#[test]
fn test_search_empty_collection() {
    let env = setup_test_env();
    let (stdout, stderr, success) = run_cli(&env.config_path, &["search", "anything"], &[]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_config_is_reported() {
    let env = setup_test_env();
    let (_, stderr, success) = run_cli(
        &env.config_path,
        &["init"],
        &[("RAG_CHUNKING__CHUNK_OVERLAP", "9999")],
    );
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "{}", stderr);
}
