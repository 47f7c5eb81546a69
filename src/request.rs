use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SamplingSettings;
use crate::error::GaleError;

/// One input record: an arbitrary JSON object carrying at least
/// `user_prompt`, optionally `system_prompt` and `schema`. Pipeline stages
/// add their own fields (`question`, `answer`, `llm_output`, ...) which
/// pass through untouched.
pub type Row = Map<String, Value>;

/// A normalized request, immutable once built.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    /// JSON schema for guided decoding. `None` means the outgoing payload
    /// carries no structured-output directive at all.
    pub schema: Option<Value>,
}

impl ChatRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: String::new(),
            schema: None,
        }
    }

    /// Serialize the wire payload for an OpenAI-compatible chat endpoint.
    /// `response_format` is omitted entirely (not null) when no schema was
    /// supplied; backends treat the field's presence as a request for
    /// schema-guided decoding.
    pub fn payload(&self, model: &str, sampling: &SamplingSettings) -> Value {
        let body = ChatPayload {
            model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &self.user_prompt,
                },
            ],
            response_format: self.schema.as_ref().map(|schema| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaDirective {
                    name: "output",
                    schema,
                },
            }),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
            stream: false,
            n: sampling.n,
        };
        serde_json::to_value(body).expect("chat payload is always serializable")
    }
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
    n: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaDirective<'a>,
}

#[derive(Serialize)]
struct JsonSchemaDirective<'a> {
    name: &'static str,
    schema: &'a Value,
}

/// Builds normalized requests from raw rows. No validation beyond key
/// presence: a row without `user_prompt` is a caller error and is surfaced
/// before dispatch starts, never swallowed.
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn build(index: usize, row: &Row) -> Result<ChatRequest, GaleError> {
        let user_prompt = row
            .get("user_prompt")
            .and_then(Value::as_str)
            .ok_or(GaleError::MissingField {
                index,
                field: "user_prompt",
            })?
            .to_string();

        let system_prompt = row
            .get("system_prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let schema = row.get("schema").filter(|v| !schema_is_empty(v)).cloned();

        Ok(ChatRequest {
            user_prompt,
            system_prompt,
            schema,
        })
    }

    /// Build the whole batch, failing fast on the first malformed row.
    pub fn build_all(rows: &[Row]) -> Result<Vec<ChatRequest>, GaleError> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| Self::build(i, row))
            .collect()
    }
}

/// An absent, null, `""`, or `{}` schema all mean "no guided decoding".
fn schema_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}
