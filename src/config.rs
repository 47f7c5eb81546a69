use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::GaleError;

/// Endpoint, concurrency, timeout, and sampling settings.
///
/// Resolution order, lowest to highest precedence: built-in defaults,
/// `gale.toml` (or the file passed via `--config`), then `GALE_*`
/// environment variables. CLI flags override all three at the call site.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Chat-completions endpoint of the locally hosted backend.
    pub llm_url: String,
    /// Model name sent in the request body. Single-model servers accept
    /// an empty string.
    pub model: String,
    /// Maximum in-flight requests during dispatch.
    pub concurrency: usize,
    pub timeout: TimeoutSettings,
    pub sampling: SamplingSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: "http://127.0.0.1:8000/v1/chat/completions".to_string(),
            model: String::new(),
            concurrency: 500,
            timeout: TimeoutSettings::default(),
            sampling: SamplingSettings::default(),
        }
    }
}

/// Phase timeouts in seconds. Independently configurable; all three
/// default to the same 10-minute ceiling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub total_secs: u64,
    pub connect_secs: u64,
    pub read_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            total_secs: 600,
            connect_secs: 600,
            read_secs: 600,
        }
    }
}

impl TimeoutSettings {
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

/// Fixed sampling parameters sent with every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    /// Completions requested per call. The judge stage samples by issuing
    /// the prompt multiple times instead, so this stays 1.
    pub n: u32,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.7,
            max_tokens: 4096,
            n: 1,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `GALE_*`
    /// environment overrides.
    ///
    /// With `path = None`, `gale.toml` in the working directory is used
    /// when present; a missing default file is not an error, but a missing
    /// explicit `--config` path is.
    pub fn load(path: Option<&Path>) -> Result<Self, GaleError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new("gale.toml");
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(url) = std::env::var("GALE_LLM_URL") {
            config.llm_url = url;
        }
        if let Ok(model) = std::env::var("GALE_MODEL") {
            config.model = model;
        }
        if let Ok(concurrency) = std::env::var("GALE_CONCURRENCY") {
            config.concurrency = concurrency.parse().map_err(|_| {
                GaleError::Config(format!("GALE_CONCURRENCY is not a number: {concurrency}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, GaleError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| GaleError::io(path, e))?;
        toml::from_str(&text)
            .map_err(|e| GaleError::Config(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<(), GaleError> {
        if self.concurrency == 0 {
            return Err(GaleError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.llm_url.is_empty() {
            return Err(GaleError::Config("llm_url must not be empty".to_string()));
        }
        Ok(())
    }
}
