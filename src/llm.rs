//! Language-model backends
//!
//! The recorder only asks for short strings (step names, CSS selectors) and
//! treats every failure as "no answer", so [`LanguageModel::complete`]
//! returns an `Option`. Backends report details through the log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Best-effort completion; `None` when the model is off or failed
    async fn complete(&self, prompt: &str) -> Option<String>;
}

/// Backend selected in the settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmBackend {
    #[default]
    Ollama,
    ClaudeCli,
}

/// Never answers
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl LanguageModel for Disabled {
    async fn complete(&self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Strip whitespace and every quote character from a model answer
pub fn clean_answer(answer: &str) -> String {
    answer
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`'))
        .collect()
}

// ===== OLLAMA =====

/// Local Ollama server (`POST /api/generate`, non-streaming)
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({"model": self.model, "prompt": prompt, "stream": false}))
            .send()
            .await
            .context("Failed to reach Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama returned {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Ollama response as JSON")?;
        let text = body
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Ollama response missing 'response' field"))?;
        Ok(text.to_string())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Option<String> {
        match self.generate(prompt).await {
            Ok(text) => Some(clean_answer(&text)),
            Err(e) => {
                log::error!("LLM request failed: {:#}", e);
                None
            }
        }
    }
}

// ===== CLAUDE CLI =====

/// Claude CLI in non-interactive mode
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    claude_path: String,
    model: Option<String>,
}

impl ClaudeCli {
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
        }
    }

    pub fn with_claude_path(mut self, path: String) -> Self {
        self.claude_path = path;
        self
    }

    /// Model alias passed through `--model` (e.g. "sonnet")
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    async fn call_claude(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print").arg("--output-format").arg("json");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .context("Failed to spawn Claude CLI. Is 'claude' installed?")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to Claude")?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for Claude CLI")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Claude CLI failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_cli_output(&stdout)
    }
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ClaudeCli {
    async fn complete(&self, prompt: &str) -> Option<String> {
        match self.call_claude(prompt).await {
            Ok(text) => Some(clean_answer(&strip_code_fence(&text))),
            Err(e) => {
                log::error!("LLM request failed: {:#}", e);
                None
            }
        }
    }
}

/// Text of a `--output-format json` reply
fn parse_cli_output(stdout: &str) -> Result<String> {
    let response: Value =
        serde_json::from_str(stdout).context("Failed to parse Claude CLI output as JSON")?;
    response
        .get("result")
        .or_else(|| response.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Claude response missing 'result' field"))
}

/// Remove a surrounding markdown code fence
fn strip_code_fence(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // drop the language tag on the opening line
    let rest = match rest.split_once('\n') {
        Some((tag, body)) if !tag.contains(' ') => body,
        _ => rest,
    };
    rest.strip_suffix("```")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
