//! LLM client — one interface over Gemini, Ollama and OpenAI-compatible backends.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, ModelRole};

/// Anything that can turn a prompt into text.
///
/// The session service is generic over this so tests can script the
/// generator without a network.
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for `request`.
    fn generate_text(
        &self,
        request: &LlmRequest,
    ) -> impl Future<Output = Result<LlmResponse, LlmError>> + Send;
}

impl<T: TextGenerator> TextGenerator for Arc<T> {
    fn generate_text(
        &self,
        request: &LlmRequest,
    ) -> impl Future<Output = Result<LlmResponse, LlmError>> + Send {
        (**self).generate_text(request)
    }
}

/// Provider backend for text generation.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Google Gemini `generateContent` API.
    Gemini { base_url: String, api_key: String },
    /// Ollama running locally.
    Ollama { base_url: String },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible { base_url: String, api_key: String },
    /// No generator available — every call fails and callers fall back.
    None,
}

impl LlmProvider {
    fn label(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Ollama { .. } => "ollama",
            Self::OpenAiCompatible { .. } => "openai",
            Self::None => "none",
        }
    }
}

/// The main client that routes requests to the configured backend.
#[derive(Debug)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    narrator_model: String,
    assistant_model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        narrator_model: impl Into<String>,
        assistant_model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            narrator_model: narrator_model.into(),
            assistant_model: assistant_model.into(),
            max_retries,
        }
    }

    /// Create a client with no backend (all calls fail → fallback content).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), String::new(), 0)
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Model name serving `role`.
    #[must_use]
    pub fn model_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Narrator => &self.narrator_model,
            ModelRole::Assistant => &self.assistant_model,
        }
    }

    /// Generate a completion.
    ///
    /// Returns `Err` if the backend is unavailable, every retry fails, or
    /// the answer carries no text. The caller substitutes fallback content.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.model_for(request.role).to_string();
        let (builder, extract): (RequestBuilder, fn(&Value) -> (Option<String>, u64)) =
            match &self.provider {
                LlmProvider::None => {
                    return Err(LlmError::Unavailable("No LLM provider configured".into()));
                }
                LlmProvider::Gemini { base_url, api_key } => {
                    let url = format!(
                        "{}/v1beta/models/{model}:generateContent",
                        base_url.trim_end_matches('/')
                    );
                    let builder = self
                        .http
                        .post(url)
                        .header("x-goog-api-key", api_key)
                        .json(&gemini_body(request));
                    (builder, gemini_text)
                }
                LlmProvider::Ollama { base_url } => {
                    let url = format!("{}/api/generate", base_url.trim_end_matches('/'));
                    let builder = self.http.post(url).json(&ollama_body(&model, request));
                    (builder, ollama_text)
                }
                LlmProvider::OpenAiCompatible { base_url, api_key } => {
                    let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
                    let builder = self
                        .http
                        .post(url)
                        .header("Authorization", format!("Bearer {api_key}"))
                        .json(&openai_body(&model, request));
                    (builder, openai_text)
                }
            };

        let (envelope, latency_ms) = self.send_with_retries(builder, request.timeout_ms).await?;
        let (text, tokens) = extract(&envelope);
        let text = text.filter(|t| !t.trim().is_empty()).ok_or(LlmError::EmptyCompletion)?;
        debug!(
            provider = self.provider.label(),
            model = %model,
            latency_ms,
            tokens,
            "Generator call completed"
        );

        Ok(LlmResponse {
            text,
            tokens_generated: u32::try_from(tokens).unwrap_or(u32::MAX),
            latency_ms,
            model,
        })
    }

    /// Send `builder` up to `max_retries + 1` times and return the first
    /// successful JSON envelope with its latency.
    async fn send_with_retries(
        &self,
        builder: RequestBuilder,
        timeout_ms: u64,
    ) -> Result<(Value, u64), LlmError> {
        let provider = self.provider.label();
        let mut last_error = LlmError::Unavailable("no attempt made".into());
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(provider, "Retrying LLM call (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }
            let Some(request) = builder.try_clone() else {
                return Err(LlmError::ConfigError("request body cannot be retried".into()));
            };

            let start = Instant::now();
            let result = request.timeout(Duration::from_millis(timeout_ms)).send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            last_error = match result {
                Ok(resp) if resp.status().is_success() => {
                    let envelope: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    return Ok((envelope, latency_ms));
                }
                Ok(resp) => LlmError::RequestFailed(format!(
                    "HTTP {}: {}",
                    resp.status(),
                    resp.text().await.unwrap_or_default()
                )),
                Err(e) => LlmError::transport(&e, timeout_ms),
            };
            warn!(provider, attempt = attempt + 1, error = %last_error, "LLM attempt failed");
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error: last_error.to_string(),
        })
    }
}

impl TextGenerator for LlmClient {
    fn generate_text(
        &self,
        request: &LlmRequest,
    ) -> impl Future<Output = Result<LlmResponse, LlmError>> + Send {
        self.generate(request)
    }
}

fn gemini_body(request: &LlmRequest) -> Value {
    let mut generation = json!({
        "temperature": request.temperature,
        "maxOutputTokens": request.max_tokens,
    });
    if request.json_mode {
        generation["responseMimeType"] = json!("application/json");
    }
    json!({
        "systemInstruction": { "parts": [{ "text": request.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": request.user }] }],
        "generationConfig": generation,
    })
}

fn ollama_body(model: &str, request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": model,
        "system": request.system,
        "prompt": request.user,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        }
    });
    if request.json_mode {
        body["format"] = json!("json");
    }
    body
}

fn openai_body(model: &str, request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user },
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

// Gemini splits long answers across parts; join them.
fn gemini_text(envelope: &Value) -> (Option<String>, u64) {
    let text = envelope["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        });
    let tokens = envelope["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0);
    (text, tokens)
}

fn ollama_text(envelope: &Value) -> (Option<String>, u64) {
    let text = envelope["response"].as_str().map(str::to_string);
    (text, envelope["eval_count"].as_u64().unwrap_or(0))
}

fn openai_text(envelope: &Value) -> (Option<String>, u64) {
    let text = envelope["choices"][0]["message"]["content"].as_str().map(str::to_string);
    (text, envelope["usage"]["completion_tokens"].as_u64().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::narration("sys", "user"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_exhausts_retries() {
        let client = LlmClient::new(
            LlmProvider::Ollama { base_url: "http://127.0.0.1:9".into() },
            "narrator",
            "assistant",
            1,
        );
        let err = client
            .generate(&LlmRequest::assist("sys", "user").with_timeout(500))
            .await
            .expect_err("nothing listens on the discard port");
        match err {
            LlmError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("unavailable"), "got: {last_error}");
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    /// Accept connections on a local port and answer each with `reply`
    /// (or hold them open silently when `reply` is `None`).
    async fn local_backend(reply: Option<&'static str>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                if let Some(reply) = reply {
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                } else {
                    held.push(socket);
                }
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn silent_backend_reports_the_request_timeout() {
        let base_url = local_backend(None).await;
        let client = LlmClient::new(LlmProvider::Ollama { base_url }, "narrator", "assistant", 0);
        let err = client
            .generate(&LlmRequest::assist("sys", "user").with_timeout(150))
            .await
            .expect_err("backend never answers");
        match err {
            LlmError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("timed out after 150ms"), "got: {last_error}");
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_is_a_failed_request() {
        let base_url = local_backend(Some(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\nbusy",
        ))
        .await;
        let client = LlmClient::new(LlmProvider::Ollama { base_url }, "narrator", "assistant", 0);
        let err = client
            .generate(&LlmRequest::assist("sys", "user").with_timeout(2_000))
            .await
            .expect_err("backend is busy");
        match err {
            LlmError::RetriesExhausted { last_error, .. } => {
                assert!(last_error.starts_with("LLM request failed: HTTP 503"), "got: {last_error}");
                assert!(last_error.ends_with("busy"), "got: {last_error}");
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }

    #[test]
    fn roles_pick_models() {
        let client = LlmClient::new(
            LlmProvider::Gemini { base_url: "http://x".into(), api_key: "k".into() },
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            0,
        );
        assert!(client.is_available());
        assert_eq!(client.model_for(ModelRole::Narrator), "gemini-2.5-pro");
        assert_eq!(client.model_for(ModelRole::Assistant), "gemini-2.5-flash");
    }

    #[test]
    fn gemini_body_carries_system_instruction_and_json_mime() {
        let body = gemini_body(&LlmRequest::narration("be a DM", "go north"));
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be a DM");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "go north");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");

        let hint = gemini_body(&LlmRequest::assist("help", "state"));
        assert!(hint["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn json_mode_maps_per_backend() {
        let req = LlmRequest::narration("s", "u");
        assert_eq!(ollama_body("m", &req)["format"], "json");
        assert_eq!(openai_body("m", &req)["response_format"]["type"], "json_object");
    }

    #[test]
    fn gemini_text_joins_parts() {
        let envelope = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }],
            "usageMetadata": { "candidatesTokenCount": 7 }
        });
        assert_eq!(gemini_text(&envelope), (Some("{\"a\":1}".to_string()), 7));
        assert_eq!(gemini_text(&json!({ "candidates": [] })), (None, 0));
    }

    #[test]
    fn openai_and_ollama_extraction() {
        let openai = json!({
            "choices": [{ "message": { "content": "hi" } }],
            "usage": { "completion_tokens": 2 }
        });
        assert_eq!(openai_text(&openai), (Some("hi".to_string()), 2));
        let ollama = json!({ "response": "hey", "eval_count": 3 });
        assert_eq!(ollama_text(&ollama), (Some("hey".to_string()), 3));
    }
}
