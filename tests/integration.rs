//! End-to-end tests driving the compiled `docshelf` binary.
//!
//! Every test gets its own temp directory with a config using the offline
//! hash embedder, so nothing touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docshelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docshelf");
    path
}

fn setup_test_env_with(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\n## Tooling\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.png"), [0u8, 159, 146, 150]).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/docshelf.sqlite"

[chunking]
parent_chars = 200
child_chars = 60

[embedding]
provider = "hash"

{}
"#,
        root.display(),
        extra_config
    );

    let config_path = config_dir.join("docshelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_test_env_with("[fallback]\nenabled = false\n")
}

fn run_docshelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docshelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docshelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

fn ingest_all(config_path: &Path) -> String {
    let dir = files_dir(config_path);
    let (stdout, stderr, success) = run_docshelf(config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: {}", stderr);
    stdout
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docshelf(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/docshelf.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, first) = run_docshelf(&config_path, &["init"]);
    let (_, _, second) = run_docshelf(&config_path, &["init"]);
    assert!(first && second);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docshelf(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ingest_directory_then_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    let first = ingest_all(&config_path);
    assert!(first.contains("files: 3"), "{}", first);
    assert!(first.contains("ingested: 3"));
    assert!(first.contains("ok"));

    let second = ingest_all(&config_path);
    assert!(second.contains("duplicates: 3"), "{}", second);
    assert!(second.contains("ingested: 0"));

    let (stats, _, success) = run_docshelf(&config_path, &["stats"]);
    assert!(success);
    assert!(stats.contains("Documents:     3"), "{}", stats);
}

#[test]
fn test_ingest_force_replaces() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let alpha = files_dir(&config_path).join("alpha.md");
    let (stdout, stderr, success) =
        run_docshelf(&config_path, &["ingest", alpha.to_str().unwrap(), "--force"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("replaced: 1"), "{}", stdout);

    let (list, _, _) = run_docshelf(&config_path, &["list"]);
    assert!(list.contains("3 document(s)"), "{}", list);
}

#[test]
fn test_changed_file_replaces_same_path() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let gamma = files_dir(&config_path).join("gamma.txt");
    fs::write(&gamma, "Gamma rewritten with entirely new notes about observability.").unwrap();
    let (stdout, _, success) = run_docshelf(&config_path, &["ingest", gamma.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("replaced: 1"), "{}", stdout);

    let (source, _, _) = run_docshelf(&config_path, &["get-source", "gamma.txt"]);
    assert!(source.contains("observability"));
    assert!(!source.contains("Kubernetes"));
}

#[test]
fn test_ingest_missing_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docshelf(&config_path, &["ingest", "/definitely/not/here.md"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_search_ranks_relevant_document_first() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, stderr, success) = run_docshelf(
        &config_path,
        &["search", "Rust programming with cargo and crates", "--top-k", "2"],
    );
    assert!(success, "{}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "{}", stdout);
    assert!(first.contains("alpha.md"), "{}", stdout);
    assert!(!stdout.contains("3. ["));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (a, _, _) = run_docshelf(&config_path, &["search", "document"]);
    let (b, _, _) = run_docshelf(&config_path, &["search", "document"]);
    assert_eq!(a, b);
}

#[test]
fn test_search_empty_library() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_docshelf(&config_path, &["search", "anything"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_zero_top_k_fails() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (_, stderr, success) = run_docshelf(&config_path, &["search", "rust", "--top-k", "0"]);
    assert!(!success);
    assert!(stderr.contains("invalid argument"), "{}", stderr);
}

#[test]
fn test_search_json_structure() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (stdout, _, success) = run_docshelf(
        &config_path,
        &["search", "kubernetes deployment", "--json", "--top-k", "2"],
    );
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["complete"], serde_json::json!(true));
    assert_eq!(value["trace"], serde_json::json!(["local_only", "done"]));
    let hits = value["hits"].as_array().unwrap();
    assert!(!hits.is_empty() && hits.len() <= 2);
    assert_eq!(hits[0]["kind"], "local");

    let scores: Vec<f64> = hits.iter().map(|h| h["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_fallback_without_providers_flags_incomplete() {
    let (_tmp, config_path) =
        setup_test_env_with("[fallback]\nenabled = true\nmin_score = 0.99\nproviders = []\n");
    ingest_all(&config_path);

    let (stdout, _, success) = run_docshelf(&config_path, &["search", "quantum chromodynamics"]);
    assert!(success);
    assert!(stdout.contains("results may be incomplete"), "{}", stdout);

    let (json, _, _) = run_docshelf(&config_path, &["search", "quantum chromodynamics", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["complete"], serde_json::json!(false));
    assert_eq!(value["grade"], "insufficient");
    assert_eq!(
        value["trace"],
        serde_json::json!(["local_only", "grading", "insufficient", "done"])
    );

    let (local, _, _) = run_docshelf(&config_path, &["search", "quantum chromodynamics", "--local-only"]);
    assert!(!local.contains("incomplete"));
}

#[test]
fn test_disabled_embedder_is_index_unavailable() {
    let (_tmp, config_path) =
        setup_test_env_with("[fallback]\nenabled = false\n");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("provider = \"hash\"", "provider = \"disabled\"");
    fs::write(&config_path, content).unwrap();

    let alpha = files_dir(&config_path).join("alpha.md");
    let (_, stderr, success) = run_docshelf(&config_path, &["ingest", alpha.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("index unavailable"), "{}", stderr);

    let (stats, _, _) = run_docshelf(&config_path, &["stats"]);
    assert!(stats.contains("Documents:     0"));
}

#[test]
fn test_delete_removes_document_from_search() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, stderr, success) = run_docshelf(&config_path, &["delete", "alpha.md", "--force"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("deleted"));

    let (search, _, _) = run_docshelf(&config_path, &["search", "Rust programming cargo", "--top-k", "5"]);
    assert!(!search.contains("alpha.md"));

    let (stats, _, _) = run_docshelf(&config_path, &["stats"]);
    assert!(stats.contains("Documents:     2"));

    let (_, stderr, success) = run_docshelf(&config_path, &["get-source", "alpha.md"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_delete_without_force_needs_terminal() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (_, stderr, success) = run_docshelf(&config_path, &["delete", "beta.md"]);
    assert!(!success);
    assert!(stderr.contains("--force"));
    let (list, _, _) = run_docshelf(&config_path, &["list"]);
    assert!(list.contains("beta.md"));
}

#[test]
fn test_list_detailed() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (stdout, _, success) = run_docshelf(&config_path, &["list", "--detailed"]);
    assert!(success);
    assert!(stdout.contains("Alpha Document"));
    assert!(stdout.contains("parents,"));
    assert!(stdout.contains("hash:"));
}

#[test]
fn test_check_duplicates_by_name() {
    let (_tmp, config_path) = setup_test_env();
    let dir = files_dir(&config_path);
    fs::create_dir_all(dir.join("archive")).unwrap();
    fs::write(dir.join("archive/alpha.md"), "An older alpha with different words.").unwrap();
    ingest_all(&config_path);

    let (plain, _, success) = run_docshelf(&config_path, &["check-duplicates"]);
    assert!(success);
    assert!(plain.contains("No duplicates found."));

    let (by_name, _, _) = run_docshelf(&config_path, &["check-duplicates", "--by-name"]);
    assert!(by_name.contains("file name alpha.md (2 documents)"), "{}", by_name);
}

#[test]
fn test_get_source_dump_and_json() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, _, success) = run_docshelf(&config_path, &["get-source", "beta.md"]);
    assert!(success);
    assert!(stdout.contains("--- Document ---"));
    assert!(stdout.contains("[parent 0]"));
    assert!(stdout.contains("[child 0.0]"));

    let (json, _, _) = run_docshelf(&config_path, &["get-source", "Beta Document", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let parents = value["parents"].as_array().unwrap();
    let text: String = parents.iter().map(|p| p["text"].as_str().unwrap()).collect();
    assert!(text.starts_with("# Beta Document"));
    assert!(!value["children"].as_array().unwrap().is_empty());
}

#[test]
fn test_toc_show_and_refresh() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);

    let (stdout, _, success) = run_docshelf(&config_path, &["toc", "alpha.md"]);
    assert!(success);
    assert!(stdout.contains("Alpha Document"));
    assert!(stdout.contains("  Tooling"));

    let (refreshed, _, _) = run_docshelf(&config_path, &["toc", "alpha.md", "--refresh"]);
    assert!(refreshed.contains("tier: headings"), "{}", refreshed);

    let (none, _, _) = run_docshelf(&config_path, &["toc", "gamma.txt"]);
    assert!(none.contains("(no table of contents)"));
}

#[test]
fn test_reindex() {
    let (_tmp, config_path) = setup_test_env();
    ingest_all(&config_path);
    let (stdout, stderr, success) = run_docshelf(&config_path, &["reindex"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("with hash-256"), "{}", stdout);
}
