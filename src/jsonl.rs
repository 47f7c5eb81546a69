use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::GaleError;

use crate::request::Row;

/// Read a newline-delimited JSON file of objects. Blank lines are skipped;
/// any other malformed line is a hard error naming the file and line.
pub async fn read_rows(path: &Path) -> Result<Vec<Row>, GaleError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GaleError::io(path, e))?;

    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| GaleError::JsonLine {
            path: path.to_path_buf(),
            line: i + 1,
            source: e,
        })?;
        match value {
            Value::Object(map) => rows.push(map),
            other => {
                return Err(GaleError::NotAnObject {
                    path: path.to_path_buf(),
                    line: i + 1,
                    found: json_type_name(&other),
                });
            }
        }
    }
    Ok(rows)
}

/// Write one JSON value per line. Atomic: the content lands in a temp file
/// first and is renamed into place, so readers never observe a partial file.
pub async fn write_lines<T: Serialize>(path: &Path, items: &[T]) -> Result<(), GaleError> {
    let mut out = String::new();
    for item in items {
        let line = serde_json::to_string(item).map_err(|e| {
            GaleError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        out.push_str(&line);
        out.push('\n');
    }

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, out.as_bytes())
        .await
        .map_err(|e| GaleError::io(&tmp_path, e))?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(GaleError::io(path, e));
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
