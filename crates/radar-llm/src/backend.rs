//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   OllamaBackend            local Ollama (OpenAI-compatible endpoint)
//!   OpenAiCompatibleBackend  OpenAI or any OpenAI-compatible endpoint
//!                            (LMStudio, Groq, OpenRouter, vLLM, …)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use radar_common::error::RadarError;
use radar_common::sandbox::SandboxClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const USER_AGENT: &str = "AcademicRadar/1.0";

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Network policy blocked this request: {0}")]
    PolicyBlocked(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

impl From<LlmError> for RadarError {
    fn from(e: LlmError) -> Self {
        RadarError::Llm(e.to_string())
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── Helper: parse OpenAI-style response ──────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

fn api_error(status: u16, body: &serde_json::Value) -> LlmError {
    let message = body["error"]["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .or_else(|| body["message"].as_str())
        .unwrap_or("unknown API error")
        .to_string();
    LlmError::ApiError { status, message }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        return Err(api_error(status, &body));
    }
    Ok(body)
}

fn chat_body(req: &LlmRequest, default_model: &str) -> serde_json::Value {
    serde_json::json!({
        "model":       req.model.as_deref().unwrap_or(default_model),
        "messages":    req.messages,
        "max_tokens":  req.max_tokens.unwrap_or(1024),
        "temperature": req.temperature.unwrap_or(0.5),
    })
}

fn sandboxed(base_url: &str, timeout: Duration) -> Result<SandboxClient, RadarError> {
    let mut client = SandboxClient::new(timeout, USER_AGENT)?;
    client.allow_url_host(base_url)?;
    Ok(client)
}

fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

// ── 1. Ollama (local) ─────────────────────────────────────────────────────────

pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    client: SandboxClient,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RadarError> {
        let base_url = base_url.into();
        let client = sandboxed(&base_url, timeout)?;
        Ok(Self { base_url, model: model.into(), client })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = completions_url(&self.base_url);
        let resp = self
            .client
            .post(&url)
            .map_err(|e| LlmError::PolicyBlocked(e.to_string()))?
            .json(&chat_body(&req, &self.model))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Unavailable(format!("Ollama not reachable at {}", self.base_url))
                } else {
                    LlmError::Http(e)
                }
            })?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { true }
}

// ── 2. OpenAI-compatible ──────────────────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, RadarError> {
        let base_url = base_url.into();
        let client = sandboxed(&base_url, timeout)?;
        Ok(Self { base_url, model: model.into(), api_key, client })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k.expose_secret()),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = completions_url(&self.base_url);
        let builder = self
            .client
            .post(&url)
            .map_err(|e| LlmError::PolicyBlocked(e.to_string()))?;
        let resp = self
            .auth(builder)
            .json(&chat_body(&req, &self.model))
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Ollama,
    #[serde(alias = "openai")]
    OpenaiCompatible,
}

pub fn build_backend(
    kind: BackendKind,
    base_url: &str,
    model: &str,
    api_key: Option<SecretString>,
    timeout: Duration,
) -> Result<Arc<dyn LlmBackend>, RadarError> {
    let backend: Arc<dyn LlmBackend> = match kind {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(base_url, model, timeout)?),
        BackendKind::OpenaiCompatible => {
            if api_key.is_none() && !base_url.contains("localhost") {
                tracing::warn!(base_url, "No API key configured for remote LLM endpoint");
            }
            Arc::new(OpenAiCompatibleBackend::new(base_url, model, api_key, timeout)?)
        }
    };
    Ok(backend)
}
