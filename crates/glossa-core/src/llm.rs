//! External LLM boundary for lexical value generation.
//!
//! The model provider is an external collaborator behind [`LlmClient`].
//! [`HttpLlmClient`] talks to a JSON completion endpoint; transport and
//! server failures map to [`Error::Transient`] so the retry helper can back
//! off, while protocol-level failures (client errors, unparsable replies)
//! map to [`Error::LlmUpstream`] and surface to the caller.
//!
//! Replies are free text that should contain one JSON object with the
//! lexical fields; [`parse_reply`] tolerates code fences and surrounding
//! prose.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::LlmConfig;
use crate::{Error, Result};

/// LLM completion boundary.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// The structured portion of a lexical generation reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LexicalReply {
    /// Short translation gloss.
    pub translation: String,
    /// One-sentence description.
    pub short_description: String,
    /// Extended description.
    pub long_description: String,
    /// Related lemmas.
    #[serde(default)]
    pub related_terms: Vec<String>,
    /// Citation strings the analysis drew on.
    #[serde(default)]
    pub citations_used: Vec<String>,
}

/// Extract and parse the JSON object embedded in a completion.
///
/// # Errors
///
/// Returns [`Error::LlmUpstream`] when the reply holds no JSON object or
/// the object does not match the expected fields.
pub fn parse_reply(raw: &str) -> Result<LexicalReply> {
    let json = extract_json_object(raw)
        .ok_or_else(|| Error::LlmUpstream("no JSON object in reply".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| Error::LlmUpstream(format!("malformed reply object: {e}")))
}

/// Find the first balanced `{ … }` region, skipping braces inside strings.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            },
            _ => {},
        }
    }
    None
}

/// Retry an operation on recoverable failures with exponential backoff.
///
/// Backoff doubles from `base` up to `attempts` total tries. The final
/// error passes through unchanged.
pub async fn with_retries<T, F, Fut>(
    attempts: u32,
    base: Duration,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = base;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt + 1 < attempts.max(1) => {
                attempt += 1;
                warn!(label, attempt, error = %e, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                delay *= 2;
            },
            Err(e) => return Err(e),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    completion: String,
}

/// HTTP client for a JSON completion endpoint.
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl HttpLlmClient {
    /// Build a client from configuration.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("glossa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompletionRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Error::Transient(format!("llm request failed: {e}"))
                } else {
                    Error::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::Transient(format!("llm returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmUpstream(format!(
                "llm returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::LlmUpstream(format!("malformed completion envelope: {e}")))?;
        Ok(reply.completion)
    }
}
