//! Persistence, config, and error-surface smoke tests.

use std::path::PathBuf;

use serde_json::json;

use gale::config::Config;
use gale::error::GaleError;
use gale::jsonl;
use gale::request::Row;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gale-smoke-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ---------------------------------------------------------------------------
// JSONL persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn jsonl_round_trip_skips_blank_lines() {
    let dir = scratch_dir("jsonl-blank");
    let path = dir.join("rows.jsonl");

    std::fs::write(
        &path,
        "{\"user_prompt\": \"a\"}\n\n   \n{\"user_prompt\": \"b\"}\n",
    )
    .unwrap();

    let rows = jsonl::read_rows(&path).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["user_prompt"], "a");
    assert_eq!(rows[1]["user_prompt"], "b");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn jsonl_error_names_file_and_line() {
    let dir = scratch_dir("jsonl-badline");
    let path = dir.join("rows.jsonl");

    std::fs::write(&path, "{\"ok\": true}\n{broken\n").unwrap();

    let err = jsonl::read_rows(&path).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("rows.jsonl"), "{msg}");
    assert!(msg.contains(":2"), "line number should be reported: {msg}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn jsonl_rejects_non_object_lines() {
    let dir = scratch_dir("jsonl-nonobject");
    let path = dir.join("rows.jsonl");

    std::fs::write(&path, "[1, 2, 3]\n").unwrap();

    let err = jsonl::read_rows(&path).await.unwrap_err();
    assert!(
        matches!(err, GaleError::NotAnObject { line: 1, .. }),
        "{err:?}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn jsonl_write_is_atomic_and_readable_back() {
    let dir = scratch_dir("jsonl-atomic");
    let path = dir.join("out.jsonl");

    let rows: Vec<Row> = vec![
        json!({"user_prompt": "x", "n": 1})
            .as_object()
            .unwrap()
            .clone(),
        json!({"user_prompt": "y", "n": 2})
            .as_object()
            .unwrap()
            .clone(),
    ];
    jsonl::write_lines(&path, &rows).await.unwrap();

    assert!(
        !path.with_extension("tmp").exists(),
        "temp file must be renamed away"
    );
    let read_back = jsonl::read_rows(&path).await.unwrap();
    assert_eq!(read_back, rows);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn jsonl_missing_file_error_names_path() {
    let err = jsonl::read_rows(std::path::Path::new("/nonexistent/gale/input.jsonl"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("input.jsonl"), "{err}");
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

#[test]
fn config_loads_explicit_file_and_env_overrides() {
    let dir = scratch_dir("config");
    let path = dir.join("gale.toml");
    std::fs::write(
        &path,
        "llm_url = \"http://10.0.0.9:7373/v1/chat/completions\"\nconcurrency = 12\n",
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.llm_url, "http://10.0.0.9:7373/v1/chat/completions");
    assert_eq!(config.concurrency, 12);

    // Environment wins over the file. set_var is unsafe in edition 2024;
    // this is the only test touching these variables.
    unsafe {
        std::env::set_var("GALE_MODEL", "qwen3-4b");
    }
    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.model, "qwen3-4b");
    unsafe {
        std::env::remove_var("GALE_MODEL");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn config_missing_explicit_file_is_an_error() {
    let err = Config::load(Some(std::path::Path::new("/nonexistent/gale.toml"))).unwrap_err();
    assert!(err.to_string().contains("gale.toml"), "{err}");
}

// ---------------------------------------------------------------------------
// Error surface
// ---------------------------------------------------------------------------

#[test]
fn missing_field_error_is_descriptive() {
    let err = GaleError::MissingField {
        index: 41,
        field: "user_prompt",
    };
    let msg = err.to_string();
    assert!(msg.contains("row 41"), "{msg}");
    assert!(msg.contains("user_prompt"), "{msg}");
}
