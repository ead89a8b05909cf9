use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn topicdb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("topicdb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    // Worked example: 2 topics over a 4-term vocabulary.
    fs::write(
        files_dir.join("model_a.json"),
        r#"{"vocabulary": ["a", "b", "c", "d"],
            "weights": [[0.1, 0.4, 0.2, 0.3], [0.25, 0.25, 0.25, 0.25]]}"#,
    )
    .unwrap();

    // Single-topic model sharing the term "the" with model_owner.json.
    fs::write(
        files_dir.join("model_shared.json"),
        r#"{"vocabulary": ["the", "cat"], "weights": [[0.7, 0.3]]}"#,
    )
    .unwrap();

    // Sole owner of "xylophone".
    fs::write(
        files_dir.join("model_owner.json"),
        r#"{"vocabulary": ["xylophone", "the"], "weights": [[0.6, 0.4]]}"#,
    )
    .unwrap();

    fs::write(
        files_dir.join("corpus.jsonl"),
        concat!(
            r#"{"id": "art-1", "abstract": "Neural networks for topic modeling.", "title": "Neural Topics", "year": 2019, "authors": ["Doe, J."], "language": "en"}"#,
            "\n",
            r#"{"id": "art-2", "abstract": "Sparse coding of text corpora.", "title": "Sparse Text", "year": 2018}"#,
            "\n",
            r#"{"id": "art-3", "abstract": "A study of gradient descent.", "title": "Gradients"}"#,
            "\n",
        ),
    )
    .unwrap();

    // One duplicate of art-2 plus one new article.
    fs::write(
        files_dir.join("corpus_overlap.jsonl"),
        concat!(
            r#"{"id": "art-2", "abstract": "Sparse coding of text corpora.", "title": "Sparse Text"}"#,
            "\n",
            r#"{"id": "art-4", "abstract": "Topic drift in citation networks.", "title": "Drift"}"#,
            "\n",
        ),
    )
    .unwrap();

    fs::write(
        files_dir.join("assignments.jsonl"),
        concat!(
            r#"{"identifier": "art-1", "topics": [{"topic": 1, "value": 0.22}, {"topic": 0, "value": 0.61}]}"#,
            "\n",
        ),
    )
    .unwrap();

    fs::write(
        files_dir.join("failures.jsonl"),
        concat!(
            r#"{"identifier": "art-2", "error": "preprocessing failed: empty token stream"}"#,
            "\n",
        ),
    )
    .unwrap();

    fs::write(
        files_dir.join("matrix_2x1.json"),
        r#"{"values": [[0.9], [0.4]]}"#,
    )
    .unwrap();

    fs::write(
        files_dir.join("matrix_3x1.json"),
        r#"{"values": [[0.9], [0.4], [0.1]]}"#,
    )
    .unwrap();

    fs::write(
        files_dir.join("keyphrases.json"),
        r#"[{"topic": 0, "keyphrase": "optimization"}]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/topicdb.sqlite"

[ingest]
batch_size = 100
top_n = 50
progress_margin = 1.0

[search]
final_limit = 12
title_weight = 4.0
abstract_weight = 1.0
"#,
        root.display()
    );

    let config_path = config_dir.join("topicdb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_topicdb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = topicdb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run topicdb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_path(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_topicdb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_topicdb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_topicdb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_model_create_stores_top_terms_in_order() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let (stdout, stderr, success) =
        run_topicdb(&config_path, &["model", "create", "m-a", &artifact, "-N", "2"]);
    assert!(success, "create failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("topics: 2"));
    assert!(stdout.contains("terms created: 3"));
    assert!(stdout.contains("ok"));

    let (topics, _, success) = run_topicdb(&config_path, &["model", "topics", "m-a"]);
    assert!(success);
    // Topic 0: b (0.4) before d (0.3); topic 1 tie resolved to a, b.
    let pos_b = topics.find("0.40000  b").expect("missing term b");
    let pos_d = topics.find("0.30000  d").expect("missing term d");
    assert!(pos_b < pos_d);
    let topic1 = &topics[topics.find("topic 1").unwrap()..];
    let pos_a = topic1.find("0.25000  a").expect("missing term a");
    let pos_b2 = topic1.find("0.25000  b").expect("missing tied term b");
    assert!(pos_a < pos_b2);
    assert!(!topic1.contains("0.25000  c"), "tie-break must prefer lower indices");
}

#[test]
fn test_model_create_duplicate_name_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let other = files_path(&config_path, "model_shared.json");
    let (_, _, success) = run_topicdb(&config_path, &["model", "create", "m-a", &artifact]);
    assert!(success);

    let (_, stderr, success) = run_topicdb(&config_path, &["model", "create", "m-a", &other]);
    assert!(!success, "duplicate name must fail");
    assert!(stderr.contains("already in use"), "stderr was: {}", stderr);
}

#[test]
fn test_model_create_duplicate_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let (_, _, success) = run_topicdb(&config_path, &["model", "create", "m-a", &artifact]);
    assert!(success);

    let (_, stderr, success) = run_topicdb(&config_path, &["model", "create", "m-b", &artifact]);
    assert!(!success, "duplicate path must fail");
    assert!(stderr.contains("already in use"), "stderr was: {}", stderr);
}

#[test]
fn test_model_create_missing_artifact_leaves_no_row() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let (_, stderr, success) =
        run_topicdb(&config_path, &["model", "create", "ghost", "/nonexistent/model.json"]);
    assert!(!success);
    assert!(stderr.contains("failed to load artifact"), "stderr was: {}", stderr);

    let (stdout, _, _) = run_topicdb(&config_path, &["model", "list"]);
    assert!(!stdout.contains("ghost"));
}

#[test]
fn test_model_name_is_slugified() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let (stdout, _, success) =
        run_topicdb(&config_path, &["model", "create", "My Model v2!", &artifact]);
    assert!(success);
    assert!(stdout.contains("model create my-model-v2"));

    let (list, _, _) = run_topicdb(&config_path, &["model", "list"]);
    assert!(list.contains("my-model-v2"));
}

#[test]
fn test_set_main_demotes_previous_main() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let first = files_path(&config_path, "model_a.json");
    let second = files_path(&config_path, "model_shared.json");
    run_topicdb(&config_path, &["model", "create", "m1", &first, "--main"]);
    run_topicdb(&config_path, &["model", "create", "m2", &second]);

    let (stdout, _, _) = run_topicdb(&config_path, &["model", "list", "--detailed"]);
    assert!(stdout.contains("m1 - MAIN MODEL"));

    let (_, _, success) = run_topicdb(&config_path, &["model", "update", "m2", "--main"]);
    assert!(success);

    let (stdout, _, _) = run_topicdb(&config_path, &["model", "list", "--detailed"]);
    assert!(!stdout.contains("m1 - MAIN MODEL"));
    assert!(stdout.contains("m2 - MAIN MODEL"));
}

#[test]
fn test_update_unknown_model_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let (_, stderr, success) = run_topicdb(&config_path, &["model", "update", "nope", "--main"]);
    assert!(!success);
    assert!(stderr.contains("was not found"), "stderr was: {}", stderr);
}

#[test]
fn test_delete_model_removes_sole_owner_terms() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let owner = files_path(&config_path, "model_owner.json");
    let shared = files_path(&config_path, "model_shared.json");
    run_topicdb(&config_path, &["model", "create", "m1", &owner]);
    run_topicdb(&config_path, &["model", "create", "m2", &shared]);

    // xylophone + the + cat
    let (stats, _, _) = run_topicdb(&config_path, &["stats"]);
    assert!(stats.contains("terms:            3"), "stats was: {}", stats);

    let (stdout, _, success) = run_topicdb(&config_path, &["model", "delete", "m1"]);
    assert!(success);
    assert!(stdout.contains("orphaned terms removed: 1"), "stdout was: {}", stdout);

    // "the" is shared with m2 and must survive; "xylophone" must not.
    let (stats, _, _) = run_topicdb(&config_path, &["stats"]);
    assert!(stats.contains("terms:            2"), "stats was: {}", stats);
    let (topics, _, _) = run_topicdb(&config_path, &["model", "topics", "m2"]);
    assert!(topics.contains("the"));
}

#[test]
fn test_corpus_load_counts_articles() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let corpus = files_path(&config_path, "corpus.jsonl");
    let (stdout, stderr, success) =
        run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);
    assert!(success, "load failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("articles written: 3"));
    assert!(stdout.contains("duplicates skipped: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_corpus_load_skips_duplicate_identifiers() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let corpus = files_path(&config_path, "corpus.jsonl");
    let overlap = files_path(&config_path, "corpus_overlap.jsonl");
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);

    let (stdout, _, success) =
        run_topicdb(&config_path, &["corpus", "load", "extra", "Overlap sample", &overlap]);
    assert!(success, "duplicate identifiers must not fail the load");
    assert!(stdout.contains("articles written: 1"), "stdout was: {}", stdout);
    assert!(stdout.contains("duplicates skipped: 1"), "stdout was: {}", stdout);
}

#[test]
fn test_corpus_duplicate_name_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let corpus = files_path(&config_path, "corpus.jsonl");
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);

    let overlap = files_path(&config_path, "corpus_overlap.jsonl");
    let (_, stderr, success) =
        run_topicdb(&config_path, &["corpus", "load", "dblp", "Same name", &overlap]);
    assert!(!success);
    assert!(stderr.contains("already in use"), "stderr was: {}", stderr);
}

#[test]
fn test_search_finds_articles() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let corpus = files_path(&config_path, "corpus.jsonl");
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);

    let (stdout, _, success) = run_topicdb(&config_path, &["search", "gradient"]);
    assert!(success);
    assert!(stdout.contains("art-3"), "stdout was: {}", stdout);

    let (stdout, _, success) = run_topicdb(&config_path, &["search", "wombats"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_assign_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let corpus = files_path(&config_path, "corpus.jsonl");
    let dump = files_path(&config_path, "assignments.jsonl");
    run_topicdb(&config_path, &["model", "create", "m-a", &artifact, "--main"]);
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);

    let (stdout, stderr, success) = run_topicdb(&config_path, &["assign", "-i", &dump]);
    assert!(success, "assign failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("articles assigned: 1"), "stdout was: {}", stdout);
    assert!(stdout.contains("rows written: 2"), "stdout was: {}", stdout);

    // Second run: the article already carries assignments.
    let (stdout, _, success) = run_topicdb(&config_path, &["assign", "-i", &dump]);
    assert!(success);
    assert!(stdout.contains("rows written: 0"), "stdout was: {}", stdout);
    assert!(stdout.contains("skipped: 1"), "stdout was: {}", stdout);
}

#[test]
fn test_assign_ranks_by_descending_value() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let corpus = files_path(&config_path, "corpus.jsonl");
    let dump = files_path(&config_path, "assignments.jsonl");
    run_topicdb(&config_path, &["model", "create", "m-a", &artifact, "--main"]);
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);
    run_topicdb(&config_path, &["assign", "-i", &dump]);

    // The dump lists topic 1 first but topic 0 has the higher value.
    let (stdout, _, success) = run_topicdb(&config_path, &["article", "art-1"]);
    assert!(success);
    let pos_first = stdout.find("1. [0.61000] topic 0").expect("missing rank 1");
    let pos_second = stdout.find("2. [0.22000] topic 1").expect("missing rank 2");
    assert!(pos_first < pos_second);
}

#[test]
fn test_assign_records_errors_exclusively() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let corpus = files_path(&config_path, "corpus.jsonl");
    let dump = files_path(&config_path, "assignments.jsonl");
    let failures = files_path(&config_path, "failures.jsonl");
    run_topicdb(&config_path, &["model", "create", "m-a", &artifact, "--main"]);
    run_topicdb(&config_path, &["corpus", "load", "dblp", "DBLP sample", &corpus]);

    let (stdout, _, success) =
        run_topicdb(&config_path, &["assign", "-i", &dump, "-e", &failures]);
    assert!(success);
    assert!(stdout.contains("errors recorded: 1"), "stdout was: {}", stdout);

    let (stdout, _, _) = run_topicdb(&config_path, &["article", "art-2"]);
    assert!(stdout.contains("Analysis error"));
    assert!(stdout.contains("empty token stream"));

    // An article with a recorded error never receives assignments.
    let root = config_path.parent().unwrap().parent().unwrap();
    let late = root.join("files").join("late.jsonl");
    fs::write(
        &late,
        r#"{"identifier": "art-2", "topics": [{"topic": 0, "value": 0.5}]}"#,
    )
    .unwrap();
    let (stdout, _, success) =
        run_topicdb(&config_path, &["assign", "-i", late.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("rows written: 0"), "stdout was: {}", stdout);
}

#[test]
fn test_assign_without_main_model_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let dump = files_path(&config_path, "assignments.jsonl");
    let (_, stderr, success) = run_topicdb(&config_path, &["assign", "-i", &dump]);
    assert!(!success);
    assert!(stderr.contains("main model"), "stderr was: {}", stderr);
}

#[test]
fn test_compare_add_stores_dense_cross_product() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let first = files_path(&config_path, "model_a.json");
    let second = files_path(&config_path, "model_shared.json");
    let matrix = files_path(&config_path, "matrix_2x1.json");
    run_topicdb(&config_path, &["model", "create", "m-a", &first]);
    run_topicdb(&config_path, &["model", "create", "m-b", &second]);

    let (stdout, stderr, success) = run_topicdb(
        &config_path,
        &["compare", "add", &matrix, "a-vs-b", "score", "m-a", "m-b"],
    );
    assert!(success, "compare add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("topic pairs: 2"), "stdout was: {}", stdout);

    let (list, _, _) = run_topicdb(&config_path, &["compare", "list", "--detailed"]);
    assert!(list.contains("a-vs-b: comparing models m-a, m-b"));
    assert!(list.contains("kind: score"));
}

#[test]
fn test_compare_shape_mismatch_creates_nothing() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let first = files_path(&config_path, "model_a.json");
    let second = files_path(&config_path, "model_shared.json");
    let bad_matrix = files_path(&config_path, "matrix_3x1.json");
    run_topicdb(&config_path, &["model", "create", "m-a", &first]);
    run_topicdb(&config_path, &["model", "create", "m-b", &second]);

    let (_, stderr, success) = run_topicdb(
        &config_path,
        &["compare", "add", &bad_matrix, "bad", "score", "m-a", "m-b"],
    );
    assert!(!success, "shape mismatch must fail");
    assert!(stderr.contains("topics"), "stderr was: {}", stderr);

    let (list, _, _) = run_topicdb(&config_path, &["compare", "list"]);
    assert!(!list.contains("bad"));
    let (stats, _, _) = run_topicdb(&config_path, &["stats"]);
    assert!(stats.contains("comparison edges: 0"), "stats was: {}", stats);
}

#[test]
fn test_compare_same_model_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let first = files_path(&config_path, "model_a.json");
    let matrix = files_path(&config_path, "matrix_2x1.json");
    run_topicdb(&config_path, &["model", "create", "m-a", &first]);

    let (_, stderr, success) = run_topicdb(
        &config_path,
        &["compare", "add", &matrix, "self", "score", "m-a", "m-a"],
    );
    assert!(!success);
    assert!(stderr.contains("distinct"), "stderr was: {}", stderr);
}

#[test]
fn test_keyphrases_apply_and_reset() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let artifact = files_path(&config_path, "model_a.json");
    let keyphrases = files_path(&config_path, "keyphrases.json");
    run_topicdb(&config_path, &["model", "create", "m-a", &artifact]);

    let (stdout, _, success) = run_topicdb(
        &config_path,
        &["model", "set-keyphrases", "m-a", "-k", &keyphrases],
    );
    assert!(success);
    assert!(stdout.contains("topics updated: 1"));

    let (topics, _, _) = run_topicdb(&config_path, &["model", "topics", "m-a"]);
    assert!(topics.contains("topic 0 (optimization)"), "topics was: {}", topics);

    // Without a file every keyphrase resets to empty.
    let (_, _, success) = run_topicdb(&config_path, &["model", "set-keyphrases", "m-a"]);
    assert!(success);
    let (topics, _, _) = run_topicdb(&config_path, &["model", "topics", "m-a"]);
    assert!(!topics.contains("optimization"));
}

#[test]
fn test_model_delete_cascades_comparisons() {
    let (_tmp, config_path) = setup_test_env();
    run_topicdb(&config_path, &["init"]);

    let first = files_path(&config_path, "model_a.json");
    let second = files_path(&config_path, "model_shared.json");
    let matrix = files_path(&config_path, "matrix_2x1.json");
    run_topicdb(&config_path, &["model", "create", "m-a", &first]);
    run_topicdb(&config_path, &["model", "create", "m-b", &second]);
    run_topicdb(
        &config_path,
        &["compare", "add", &matrix, "a-vs-b", "score", "m-a", "m-b"],
    );

    let (_, _, success) = run_topicdb(&config_path, &["model", "delete", "m-a"]);
    assert!(success);

    let (list, _, _) = run_topicdb(&config_path, &["compare", "list"]);
    assert!(!list.contains("a-vs-b"));
    let (stats, _, _) = run_topicdb(&config_path, &["stats"]);
    assert!(stats.contains("comparison edges: 0"), "stats was: {}", stats);
}
