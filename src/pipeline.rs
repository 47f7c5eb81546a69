use std::path::{Path, PathBuf};
use std::time::Instant;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::GaleError;
use crate::jsonl;
use crate::merge::merge_rows;
use crate::prompts::PromptRegistry;
use crate::request::{ChatRequest, Row, RequestBuilder};

/// Sentinel recorded when a completion that should be structured JSON
/// is not parseable. Post-processing never aborts on one bad row.
pub const JSON_ERROR_SENTINEL: &str = "json error";

/// The structured answer contract requested from the backend via guided
/// decoding and parsed back out by `collect`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SolveOutput {
    pub analysis: String,
    pub final_answer: String,
}

/// JSON schema attached to prepared rows as the `schema` field.
pub fn solve_output_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(SolveOutput))
        .expect("derived schema is always serializable")
}

/// Which template `prepare` renders into `user_prompt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Solve the problem directly, answering as a JSON dict.
    Base,
    /// Solve via provided sub-questions (requires `sub_questions` rows).
    Plan,
    /// Generate a solution-strategy analysis instead of an answer.
    Analysis,
}

/// Render prompts onto problem rows and replicate each row `expand_count`
/// times for multi-sample rollout.
pub async fn prepare(
    registry: &PromptRegistry,
    input: &Path,
    output: &Path,
    mode: Mode,
    expand_count: usize,
) -> Result<(), GaleError> {
    let rows = jsonl::read_rows(input).await?;
    tracing::info!(rows = rows.len(), ?mode, "preparing rollout rows");

    let schema = solve_output_schema();
    let mut prepared: Vec<Row> = Vec::with_capacity(rows.len() * expand_count);

    for (i, mut row) in rows.into_iter().enumerate() {
        let question = require_str(&row, i, "question")?.to_string();

        match mode {
            Mode::Base => {
                let prompt = registry.solve_prompt("solve_json", &question)?;
                row.insert("user_prompt".to_string(), Value::String(prompt));
                row.insert("schema".to_string(), schema.clone());
            }
            Mode::Plan => {
                let sub_questions = sub_questions_text(&row, i)?;
                let prompt = registry.verify_prompt(&question, &sub_questions)?;
                row.insert("user_prompt".to_string(), Value::String(prompt));
                row.insert("schema".to_string(), schema.clone());
            }
            Mode::Analysis => {
                row.insert("user_prompt".to_string(), Value::String(question));
                row.insert(
                    "system_prompt".to_string(),
                    Value::String(registry.analysis_persona()?.to_string()),
                );
            }
        }

        for _ in 0..expand_count {
            prepared.push(row.clone());
        }
    }

    jsonl::write_lines(output, &prepared).await?;
    tracing::info!(rows = prepared.len(), output = %output.display(), "prepared rows written");
    Ok(())
}

/// Shard a JSONL file into `batch_count` files of equal size. Matches the
/// upstream sharding exactly: batch length is `len / batch_count`, so up
/// to `batch_count - 1` trailing rows are dropped.
pub async fn split(
    input: &Path,
    output_dir: &Path,
    batch_count: usize,
) -> Result<Vec<PathBuf>, GaleError> {
    if batch_count == 0 {
        return Err(GaleError::Config(
            "batch_count must be at least 1".to_string(),
        ));
    }

    let rows = jsonl::read_rows(input).await?;
    let batch_len = rows.len() / batch_count;
    let dropped = rows.len() - batch_len * batch_count;
    if dropped > 0 {
        tracing::warn!(dropped, "row count not divisible by batch_count; trailing rows dropped");
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| GaleError::io(output_dir, e))?;

    let mut paths = Vec::with_capacity(batch_count);
    for i in 0..batch_count {
        let path = output_dir.join(format!("batch_{i}.jsonl"));
        let start = i * batch_len;
        jsonl::write_lines(&path, &rows[start..start + batch_len]).await?;
        paths.push(path);
    }
    tracing::info!(batches = batch_count, batch_len, "input sharded");
    Ok(paths)
}

/// Build, dispatch, and merge one batch file: the fan-out/fan-in run.
/// With `batch_size`, the file is processed in sequential chunks so a very
/// large batch does not hold every response in flight at once.
pub async fn run(
    config: &Config,
    input: &Path,
    output: &Path,
    batch_size: Option<usize>,
) -> Result<(), GaleError> {
    if batch_size == Some(0) {
        return Err(GaleError::Config(
            "batch_size must be at least 1".to_string(),
        ));
    }

    let rows = jsonl::read_rows(input).await?;
    // Contract violations (rows without a prompt) surface here, before
    // any request is issued.
    let requests = RequestBuilder::build_all(&rows)?;
    let dispatcher = Dispatcher::new(config)?;

    let chunk = batch_size.unwrap_or(requests.len()).max(1);
    let mut completions = Vec::with_capacity(requests.len());
    for (i, slice) in requests.chunks(chunk).enumerate() {
        let start = Instant::now();
        completions.extend(dispatcher.dispatch(slice).await);
        tracing::info!(
            batch = i,
            requests = slice.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch dispatched"
        );
    }

    let merged = merge_rows(rows, completions);
    let failed = merged
        .iter()
        .filter(|row| row.get("error_info").and_then(Value::as_str) != Some(""))
        .count();
    if failed > 0 {
        tracing::warn!(failed, total = merged.len(), "some requests failed; see error_info");
    }

    jsonl::write_lines(output, &merged).await?;
    tracing::info!(rows = merged.len(), output = %output.display(), "results written");
    Ok(())
}

/// Parse each row's structured `llm_output` and reduce to judgeable
/// `{question, answer, final_answer}` records. The reference answer is
/// wrapped in `$...$` to match the LaTeX form the judge expects.
pub async fn collect(input: &Path, output: &Path) -> Result<(), GaleError> {
    let rows = jsonl::read_rows(input).await?;

    let mut out_rows: Vec<Row> = Vec::with_capacity(rows.len());
    let mut unparseable = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let question = require_str(row, i, "question")?;
        let answer = require_str(row, i, "answer")?;
        let llm_output = require_str(row, i, "llm_output")?;

        let final_answer = parse_final_answer(llm_output);
        if final_answer == JSON_ERROR_SENTINEL {
            unparseable += 1;
        }

        let mut out = Row::new();
        out.insert("question".to_string(), Value::String(question.to_string()));
        out.insert("answer".to_string(), Value::String(format!("${answer}$")));
        out.insert("final_answer".to_string(), Value::String(final_answer));
        out_rows.push(out);
    }

    if unparseable > 0 {
        tracing::warn!(unparseable, total = out_rows.len(), "rows recorded with json-error sentinel");
    }
    jsonl::write_lines(output, &out_rows).await
}

/// Extract `final_answer` from a completion that should be structured
/// JSON. Anything unparseable becomes the sentinel, never an error.
pub fn parse_final_answer(llm_output: &str) -> String {
    serde_json::from_str::<Value>(llm_output)
        .ok()
        .as_ref()
        .and_then(|v| v.get("final_answer"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| JSON_ERROR_SENTINEL.to_string())
}

/// Score `{answer, final_answer}` pairs with the equivalence judge:
/// sample the judge `samples` times per pair, reduce the verdicts, and
/// write avg@k accuracies (one JSON number per line).
pub async fn judge(
    config: &Config,
    registry: &PromptRegistry,
    input: &Path,
    output: &Path,
    k: usize,
    samples: usize,
) -> Result<(), GaleError> {
    if samples == 0 {
        return Err(GaleError::Config("samples must be at least 1".to_string()));
    }
    if k == 0 {
        return Err(GaleError::Config("k must be at least 1".to_string()));
    }

    let rows = jsonl::read_rows(input).await?;
    let mut requests = Vec::with_capacity(rows.len() * samples);
    for (i, row) in rows.iter().enumerate() {
        let reference = require_str(row, i, "answer")?;
        let candidate = require_str(row, i, "final_answer")?;
        let prompt = registry.judge_prompt(reference, candidate)?;
        for _ in 0..samples {
            requests.push(ChatRequest::new(prompt.clone()));
        }
    }

    let dispatcher = Dispatcher::new(config)?;
    tracing::info!(pairs = rows.len(), samples, "dispatching judge requests");
    let completions = dispatcher.dispatch(&requests).await;

    let verdicts: Vec<bool> = completions
        .chunks(samples)
        .map(|group| {
            let texts: Vec<String> = group
                .iter()
                .map(|c| {
                    if c.is_success() {
                        c.content.trim().to_lowercase()
                    } else {
                        "error".to_string()
                    }
                })
                .collect();
            reduce_verdicts(&texts)
        })
        .collect();

    let accuracies = avg_at_k(&verdicts, k);
    jsonl::write_lines(output, &accuracies).await?;
    tracing::info!(groups = accuracies.len(), k, output = %output.display(), "accuracies written");
    Ok(())
}

/// Reduce one pair's judge samples to a verdict: any explicit `false`
/// sample fails the pair, a pair whose samples all errored fails, and
/// anything else passes.
pub fn reduce_verdicts<S: AsRef<str>>(samples: &[S]) -> bool {
    if samples.iter().any(|s| s.as_ref() == "false") {
        return false;
    }
    if samples.iter().all(|s| s.as_ref() == "error") {
        return false;
    }
    true
}

/// Average consecutive groups of `k` verdicts — one accuracy per problem
/// when each problem was rolled out `k` times. The trailing group may be
/// shorter and is averaged over its own length.
pub fn avg_at_k(verdicts: &[bool], k: usize) -> Vec<f64> {
    assert!(k > 0, "k must be at least 1");
    verdicts
        .chunks(k)
        .map(|group| {
            let passed = group.iter().filter(|v| **v).count();
            passed as f64 / group.len() as f64
        })
        .collect()
}

fn require_str<'a>(row: &'a Row, index: usize, field: &'static str) -> Result<&'a str, GaleError> {
    row.get(field)
        .and_then(Value::as_str)
        .ok_or(GaleError::MissingField { index, field })
}

fn sub_questions_text(row: &Row, index: usize) -> Result<String, GaleError> {
    match row.get("sub_questions") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n")),
        _ => Err(GaleError::MissingField {
            index,
            field: "sub_questions",
        }),
    }
}
