//! Ollama API client (http://127.0.0.1:11434 by default).
//! Health probe, model listing and pull, and streaming chat (NDJSON) with abort.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable, Aborted};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::llm::ndjson::LineDecoder;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Liveness probes must answer quickly; a hung server is "not running".
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
/// Model pulls download gigabytes.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);
/// Covers the whole generation, from request to last streamed byte.
const CHAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for the Ollama HTTP API.
///
/// The abort slot is shared across clones: at most one chat call is expected
/// to be in flight at a time, and `abort` cancels whichever one currently is.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    abort_slot: Arc<Mutex<Option<AbortHandle>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    /// Transport-level failure: the runtime is unreachable or the connection died.
    #[error("runtime unreachable: {0}")]
    Connect(reqwest::Error),
    /// The request exceeded its deadline.
    #[error("runtime request timed out")]
    Timeout,
    /// Non-2xx status, malformed response, or an explicit error field.
    #[error("runtime api error: {0}")]
    Api(String),
    /// The in-flight request was cancelled via `abort`. Callers treat this as
    /// a silent stop, not a failure.
    #[error("request aborted")]
    Cancelled,
}

impl OllamaError {
    fn transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OllamaError::Timeout
        } else {
            OllamaError::Connect(e)
        }
    }
}

/// A locally available model, as reported by `/api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Option<Vec<OllamaModel>>,
}

/// A single chat message (role is "system", "user", or "assistant").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatStreamEvent {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PullRequest {
    model: String,
    stream: bool,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
            abort_slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET the server root with a short timeout. Any 2xx means running;
    /// any other status or transport failure means not running. Never errs.
    pub async fn is_running(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(res) => res.status().is_success(),
            Err(e) => {
                log::debug!("health probe failed: {}", e);
                false
            }
        }
    }

    /// GET /api/tags — list locally available models.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, OllamaError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(OllamaError::transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("{} {}", status, body)));
        }
        let data: TagsResponse = res
            .json()
            .await
            .map_err(|e| OllamaError::Api(format!("invalid tags response: {}", e)))?;
        Ok(data.models.unwrap_or_default())
    }

    /// Whether `name` is available locally. A bare name matches any tag:
    /// "llama3.2" matches "llama3.2:1b" but not "llama3.2-vision:1b".
    /// Listing failures count as absent.
    pub async fn has_model(&self, name: &str) -> bool {
        let models = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                log::debug!("list_models failed: {}", e);
                return false;
            }
        };
        let tagged = format!("{}:", name);
        models
            .iter()
            .any(|m| m.name == name || m.name.starts_with(&tagged))
    }

    /// POST /api/pull — download a model (non-streaming variant).
    /// `on_progress` receives (status, completed, total); it fires at least
    /// once at the start and once on completion.
    pub async fn pull_model(
        &self,
        name: &str,
        on_progress: &mut (dyn FnMut(&str, u64, u64) + Send),
    ) -> Result<(), OllamaError> {
        on_progress("Starting pull...", 0, 0);
        let url = format!("{}/api/pull", self.base_url);
        let body = PullRequest {
            model: name.to_string(),
            stream: false,
        };
        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(OllamaError::transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("{} {}", status, body)));
        }
        let data: serde_json::Value = res
            .json()
            .await
            .map_err(|e| OllamaError::Api(format!("invalid pull response: {}", e)))?;
        if let Some(err) = data.get("error").and_then(|v| v.as_str()) {
            return Err(OllamaError::Api(err.to_string()));
        }
        on_progress("Done", 100, 100);
        Ok(())
    }

    /// POST /api/chat with stream: true. Each non-empty content delta is
    /// forwarded to `on_token` and accumulated into the returned reply.
    /// A record with an error field fails the call immediately; timeouts,
    /// transport failures, and aborts surface as their own error kinds.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, OllamaError> {
        let (handle, registration) = AbortHandle::new_pair();
        *self.lock_abort_slot() = Some(handle);
        let result = match Abortable::new(self.chat_inner(model, messages, on_token), registration)
            .await
        {
            Ok(res) => res,
            Err(Aborted) => Err(OllamaError::Cancelled),
        };
        let _ = self.lock_abort_slot().take();
        result
    }

    /// Cancel the in-flight chat call, if any exists; no-op otherwise.
    pub fn abort(&self) {
        if let Some(handle) = self.lock_abort_slot().take() {
            log::debug!("aborting in-flight chat request");
            handle.abort();
        }
    }

    fn lock_abort_slot(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.abort_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn chat_inner(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: true,
        };
        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await
            .map_err(OllamaError::transport)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(OllamaError::Api(format!("{} {}", status, body)));
        }

        let mut stream = res.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(OllamaError::transport)?;
            for line in decoder.push(&chunk) {
                apply_chat_line(&line, &mut reply, on_token)?;
            }
        }
        // The final record may arrive without a trailing newline.
        if let Some(rest) = decoder.finish() {
            apply_chat_line(&rest, &mut reply, on_token)?;
        }
        Ok(reply)
    }
}

/// Parse one NDJSON line and fold it into the reply. A line that does not
/// parse is an incomplete fragment and is skipped; the decoder delivers the
/// completed form on a later chunk.
fn apply_chat_line(
    line: &str,
    reply: &mut String,
    on_token: &mut (dyn FnMut(&str) + Send),
) -> Result<(), OllamaError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let event: ChatStreamEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(_) => return Ok(()),
    };
    if let Some(err) = event.error {
        return Err(OllamaError::Api(err));
    }
    if let Some(msg) = event.message {
        if !msg.content.is_empty() {
            reply.push_str(&msg.content);
            on_token(&msg.content);
        }
    }
    Ok(())
}
