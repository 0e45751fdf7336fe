pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod proxy;

use async_trait::async_trait;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, RequestBuilder };
use serde_json::Value as JsonValue;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::anthropic::AnthropicChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use self::proxy::ProxyChatClient;
use crate::error::{ describe_status, CompletionError };
use crate::models::chat::ChatTurn;

const ERROR_DETAILS_MAX_CHARS: usize = 200;

/// Produces the next assistant reply for an ordered conversation history.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError>;

    fn get_model(&self) -> String;

    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn CompletionService>, CompletionError> {
    let client: Arc<dyn CompletionService> = match config.llm_type {
        LlmType::Proxy => Arc::new(ProxyChatClient::from_config(config)?),
        LlmType::Anthropic => Arc::new(AnthropicChatClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaClient::from_config(config)?),
    };
    Ok(client)
}

/// No client-side timeout: the controller bounds each request and reports expiry.
pub(crate) fn build_http_client(
    headers: reqwest::header::HeaderMap
) -> Result<HttpClient, CompletionError> {
    HttpClient::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| CompletionError::Config(e.to_string()))
}

/// Sends the request and returns the body of a successful response.
pub(crate) async fn send_for_body(req: RequestBuilder) -> Result<String, CompletionError> {
    let resp = req.send().await.map_err(|e| CompletionError::Network(e.to_string()))?;
    let status = resp.status();
    let body = resp.text().await?;
    debug!("Completion endpoint answered {} with {} bytes", status, body.len());

    if !status.is_success() {
        let details = error_details(&body);
        warn!("Completion endpoint returned {}: {}", status, details);
        return Err(CompletionError::Status {
            status: status.as_u16(),
            reason: describe_status(status.as_u16()),
            details,
        });
    }
    Ok(body)
}

/// Pulls a readable message out of an error body, whichever provider sent it.
pub(crate) fn error_details(body: &str) -> String {
    let from_json = serde_json::from_str::<JsonValue>(body).ok().and_then(|json| {
        let error = match json.get("error") {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(obj) => obj.get("message").and_then(|m| m.as_str()).map(str::to_string),
            None => None,
        };
        let details = json.get("details").and_then(|d| d.as_str());
        match (error, details) {
            (Some(e), Some(d)) => Some(format!("{}: {}", e, d)),
            (Some(e), None) => Some(e),
            (None, Some(d)) => Some(d.to_string()),
            (None, None) => None,
        }
    });
    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    text.chars().take(ERROR_DETAILS_MAX_CHARS).collect()
}

pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, CompletionError> {
    serde_json::from_str(body).map_err(|e| CompletionError::MalformedResponse(e.to_string()))
}
