//! Generative backends — `claude` CLI subprocess and OpenAI-compatible HTTP.
//!
//! Both return raw untyped text; parsing and validation belong to the
//! synthesizer. A backend performs exactly one attempt per call — the
//! retry-with-stricter-prompt policy lives one level up.

use std::time::Duration;

use crate::config::{LlmProvider, SynthesisConfig};
use crate::{AnalysisError, AnalysisResult};

/// Boundary contract for the generative-model backend.
pub trait LlmBackend: Send + Sync {
    /// Send one bounded prompt, return the raw completion text.
    /// Fails with `LlmUnavailable` when the backend is unreachable.
    fn generate(&self, prompt: &str) -> AnalysisResult<String>;
}

impl<B: LlmBackend + ?Sized> LlmBackend for std::sync::Arc<B> {
    fn generate(&self, prompt: &str) -> AnalysisResult<String> {
        self.as_ref().generate(prompt)
    }
}

/// Build the backend selected by configuration.
pub fn backend_from_config(cfg: &SynthesisConfig) -> Box<dyn LlmBackend> {
    match cfg.provider {
        LlmProvider::Cli => Box::new(CliBackend::new(&cfg.model)),
        LlmProvider::Http => Box::new(HttpBackend::new(
            cfg.endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:8080/v1/chat/completions".to_string()),
            &cfg.model,
            Duration::from_secs(cfg.timeout_secs),
        )),
    }
}

/// Spawns the `claude` CLI for each generation call.
pub struct CliBackend {
    model: String,
}

impl CliBackend {
    pub fn new(model: &str) -> Self {
        Self { model: model.to_string() }
    }

    /// Check if the claude CLI is available on PATH.
    pub fn is_available() -> bool {
        std::process::Command::new("claude")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl LlmBackend for CliBackend {
    fn generate(&self, prompt: &str) -> AnalysisResult<String> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "CLI generation call");

        let child = std::process::Command::new("claude")
            .args(["--model", &self.model, "-p", prompt])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                AnalysisError::LlmUnavailable(format!(
                    "Failed to spawn claude subprocess: {}. Is `claude` CLI installed?",
                    e
                ))
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| AnalysisError::LlmUnavailable(format!("Subprocess wait failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::LlmUnavailable(format!(
                "claude subprocess failed (exit {}): {}",
                output.status, stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Posts to an OpenAI-compatible chat-completions endpoint.
pub struct HttpBackend {
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(endpoint: String, model: &str, timeout: Duration) -> Self {
        Self {
            endpoint,
            model: model.to_string(),
            timeout,
        }
    }
}

impl LlmBackend for HttpBackend {
    fn generate(&self, prompt: &str) -> AnalysisResult<String> {
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, prompt_len = prompt.len(), "HTTP generation call");

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.7,
        });

        let mut response = ureq::post(&self.endpoint)
            .header("content-type", "application/json")
            .config()
            .timeout_global(Some(self.timeout))
            .build()
            .send(serde_json::to_vec(&body)?.as_slice())
            .map_err(|e| AnalysisError::LlmUnavailable(format!("{}: {}", self.endpoint, e)))?;

        let raw = response
            .body_mut()
            .read_to_string()
            .map_err(|e| AnalysisError::LlmUnavailable(format!("Response read failed: {}", e)))?;

        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        let text = parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if text.trim().is_empty() {
            // Reachable backend with empty payload is malformed output, not
            // an availability failure; the synthesizer handles it.
            tracing::warn!(endpoint = %self.endpoint, "HTTP backend returned empty completion");
        }

        Ok(text)
    }
}
