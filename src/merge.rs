use serde_json::Value;

use crate::dispatch::Completion;
use crate::request::Row;

/// Zip rows with their completions, attaching `llm_output` and
/// `error_info` to each row. Pure transformation — no I/O.
///
/// Panics if the lengths differ; the dispatcher guarantees one completion
/// per request, so a mismatch is a caller bug, not a runtime condition.
pub fn merge_rows(rows: Vec<Row>, completions: Vec<Completion>) -> Vec<Row> {
    assert_eq!(
        rows.len(),
        completions.len(),
        "dispatcher must return one completion per input row"
    );

    rows.into_iter()
        .zip(completions)
        .map(|(mut row, completion)| {
            row.insert(
                "error_info".to_string(),
                Value::String(completion.error_info()),
            );
            row.insert("llm_output".to_string(), Value::String(completion.content));
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn merge_preserves_original_fields() {
        let input = rows(json!([
            {"question": "2+2?", "answer": "4", "user_prompt": "solve 2+2"}
        ]));
        let completions = vec![Completion {
            content: "{\"final_answer\": \"4\"}".to_string(),
            error: None,
        }];

        let merged = merge_rows(input, completions);
        assert_eq!(merged[0]["question"], "2+2?");
        assert_eq!(merged[0]["answer"], "4");
        assert_eq!(merged[0]["llm_output"], "{\"final_answer\": \"4\"}");
        assert_eq!(merged[0]["error_info"], "");
    }

    #[test]
    #[should_panic(expected = "one completion per input row")]
    fn merge_length_mismatch_panics() {
        let input = rows(json!([{"user_prompt": "a"}, {"user_prompt": "b"}]));
        merge_rows(input, vec![]);
    }
}
