use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use eyre::{Result, eyre};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::utils::config::AnalyzerConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server.
    #[default]
    Ollama,
    Groq,
    Zai,
    /// Any OpenAI-compatible host; `endpoint` must be set.
    OpenAi,
}

impl BackendKind {
    fn default_endpoint(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "http://localhost:11434",
            BackendKind::Groq => "https://api.groq.com/openai/v1",
            BackendKind::Zai => "https://api.z.ai/v1",
            BackendKind::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "qwen2.5:7b",
            BackendKind::Groq => "llama3-8b-8192",
            BackendKind::Zai => "glm-4",
            BackendKind::OpenAi => "gpt-4o-mini",
        }
    }
}

/// A text-completion endpoint. Callers treat every error as "unavailable".
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Cheap reachability check.
    async fn probe(&self) -> bool;
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Builds the configured backend. Fails only when a required API key is
/// missing from the environment.
pub fn build(config: &AnalyzerConfig) -> Result<Box<dyn LlmBackend>> {
    let kind = config.backend;
    let endpoint = config
        .endpoint
        .clone()
        .unwrap_or_else(|| kind.default_endpoint().to_string());
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| kind.default_model().to_string());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let backend: Box<dyn LlmBackend> = match kind {
        BackendKind::Ollama => Box::new(OllamaBackend {
            client,
            endpoint,
            model,
            max_retries: config.max_retries,
        }),
        _ => {
            let var = config
                .api_key_env
                .as_deref()
                .ok_or_else(|| {
                    eyre!(
                        "analyzer.api_key_env must name the variable holding the {:?} key",
                        kind
                    )
                })?;
            let api_key = std::env::var(var)
                .map_err(|_| eyre!("environment variable {} is not set", var))?;
            Box::new(ChatCompletionsBackend {
                client,
                name: format!("{:?}", kind).to_lowercase(),
                endpoint,
                model,
                api_key,
                max_retries: config.max_retries,
            })
        }
    };

    Ok(backend)
}

fn retry_policy(max_retries: u32) -> ExponentialBuilder {
    ExponentialBuilder::default().with_max_times(max_retries as usize)
}

pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("ollama probe failed: {}", e);
                false
            }
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": max_tokens,
            }
        });

        let response = (|| async {
            let response = self.client.post(&url).json(&request_body).send().await?;

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(eyre!("ollama error ({}): {}", status, error_body));
            }

            Ok(response)
        })
        .retry(retry_policy(self.max_retries))
        .await?;

        let body: serde_json::Value = response.json().await?;
        body.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| eyre!("invalid ollama response"))
    }
}

/// OpenAI-style `/chat/completions` (Groq, Z.ai, OpenAI and friends).
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

#[async_trait]
impl LlmBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/models", self.endpoint.trim_end_matches('/'));
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("{} probe failed: {}", self.name, e);
                false
            }
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a careful recruiting assistant. Answer exactly in the requested format."
                },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.1,
            "max_tokens": max_tokens,
        });

        let response = (|| async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(eyre!("{} error ({}): {}", self.name, status, error_body));
            }

            Ok(response)
        })
        .retry(retry_policy(self.max_retries))
        .await?;

        let body: serde_json::Value = response.json().await?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| eyre!("invalid {} response", self.name))
    }
}

#[cfg(test)]
pub use scripted::ScriptedBackend;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_backends_need_a_key_variable() {
        let config = AnalyzerConfig {
            backend: BackendKind::Groq,
            ..Default::default()
        };
        assert!(build(&config).is_err());

        let config = AnalyzerConfig {
            backend: BackendKind::Zai,
            api_key_env: Some("AUTO_APPLY_TEST_UNSET_KEY".to_string()),
            ..Default::default()
        };
        let err = build(&config).err().unwrap().to_string();
        assert!(err.contains("AUTO_APPLY_TEST_UNSET_KEY"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let backend = build(&AnalyzerConfig::default()).unwrap();
        assert_eq!(backend.name(), "ollama");
    }

    #[tokio::test]
    async fn unreachable_ollama_fails_probe_and_complete() {
        let backend = build(&AnalyzerConfig {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            max_retries: 0,
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(!backend.probe().await);
        assert!(backend.complete("hi", 8).await.is_err());
    }
}
