use std::fmt;

use futures_util::future;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::config::{Config, SamplingSettings};
use crate::error::GaleError;
use crate::request::ChatRequest;

/// Where in the pipeline a request failed. Callers branch on the kind
/// programmatically; `detail` is free-form diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed input row — surfaced before dispatch starts.
    Build,
    /// Connection, DNS, or timeout failure; the backend was never heard from.
    Transport,
    /// Non-200 status or a 200 body that is not JSON.
    Protocol,
    /// A parsed envelope lacking `choices[0].message.content` — the backend
    /// was reachable but answered unexpectedly.
    Shape,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Shape => "shape",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    fn transport(e: &reqwest::Error) -> Self {
        Self {
            kind: FailureKind::Transport,
            detail: error_chain(e),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Outcome of one dispatched request. Exactly one of `content`/`error`
/// is meaningful: success carries non-empty content and no error, failure
/// carries empty content and the failure.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub error: Option<Failure>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The `error_info` string written onto merged rows: empty on success.
    pub fn error_info(&self) -> String {
        match &self.error {
            None => String::new(),
            Some(f) => f.to_string(),
        }
    }

    fn ok(content: String) -> Self {
        Self {
            content,
            error: None,
        }
    }

    fn failed(failure: Failure) -> Self {
        Self {
            content: String::new(),
            error: Some(failure),
        }
    }
}

/// Fan-out/fan-in request batcher with a concurrency cap.
///
/// One shared client carries the uniform timeout policy; a counting
/// semaphore bounds in-flight requests. All units run concurrently and
/// the call returns only once every unit has finished — an individual
/// failure is captured on its own completion and never cancels siblings.
pub struct Dispatcher {
    client: Client,
    semaphore: Semaphore,
    url: String,
    model: String,
    sampling: SamplingSettings,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self, GaleError> {
        let client = Client::builder()
            .timeout(config.timeout.total())
            .connect_timeout(config.timeout.connect())
            .read_timeout(config.timeout.read())
            .build()
            .map_err(GaleError::ClientBuild)?;

        Ok(Self {
            client,
            semaphore: Semaphore::new(config.concurrency),
            url: config.llm_url.clone(),
            model: config.model.clone(),
            sampling: config.sampling.clone(),
        })
    }

    /// Issue every request concurrently, capped at the configured limit,
    /// and return one completion per input in input order.
    ///
    /// Completion order between in-flight calls is unordered — they race
    /// freely once past the permit gate — but results are collected
    /// positionally, so `out[i]` always answers `requests[i]`.
    pub async fn dispatch(&self, requests: &[ChatRequest]) -> Vec<Completion> {
        let units = requests.iter().map(|req| self.run_one(req));
        future::join_all(units).await
    }

    async fn run_one(&self, req: &ChatRequest) -> Completion {
        // Permit is held for the unit's whole lifetime and released on
        // drop, on every exit path.
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Completion::failed(Failure {
                    kind: FailureKind::Transport,
                    detail: "permit pool closed".to_string(),
                });
            }
        };

        match self.call(req).await {
            Ok(content) => Completion::ok(content),
            Err(failure) => {
                tracing::debug!(kind = %failure.kind, "request failed: {}", failure.detail);
                Completion::failed(failure)
            }
        }
    }

    async fn call(&self, req: &ChatRequest) -> Result<String, Failure> {
        let payload = req.payload(&self.model, &self.sampling);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Failure::transport(&e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::transport(&e))?;
        let text = String::from_utf8_lossy(&body);

        if status != StatusCode::OK {
            return Err(Failure {
                kind: FailureKind::Protocol,
                detail: format!("status {}: {text}", status.as_u16()),
            });
        }

        let envelope: Value = serde_json::from_slice(&body).map_err(|e| Failure {
            kind: FailureKind::Protocol,
            detail: format!("response body is not JSON: {e}; body: {text}"),
        })?;

        extract_content(&envelope).ok_or_else(|| Failure {
            kind: FailureKind::Shape,
            detail: format!("no choices[0].message.content in envelope: {envelope}"),
        })
    }
}

/// Pull the assistant text out of a chat-completion envelope.
fn extract_content(envelope: &Value) -> Option<String> {
    envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Flatten an error and its source chain into one diagnostic line.
/// reqwest's Display gives only the top frame; the cause (connection
/// refused, timeout, DNS) lives further down the chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_content_happy_path() {
        let envelope = json!({"choices": [{"message": {"content": "X"}}]});
        assert_eq!(extract_content(&envelope).as_deref(), Some("X"));
    }

    #[test]
    fn extract_content_rejects_malformed_envelopes() {
        for bad in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{"message": {}}]}),
            json!({"choices": [{"message": {"content": null}}]}),
            json!({"choices": [{"message": {"content": 7}}]}),
        ] {
            assert!(extract_content(&bad).is_none(), "should reject {bad}");
        }
    }

    #[test]
    fn error_info_renders_kind_and_detail() {
        let completion = Completion::failed(Failure {
            kind: FailureKind::Protocol,
            detail: "status 500: oops".to_string(),
        });
        assert_eq!(completion.error_info(), "protocol: status 500: oops");
        assert!(completion.content.is_empty());
    }

    #[test]
    fn success_has_empty_error_info() {
        let completion = Completion::ok("fine".to_string());
        assert!(completion.is_success());
        assert_eq!(completion.error_info(), "");
    }
}
