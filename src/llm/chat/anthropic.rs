use async_trait::async_trait;
use log::debug;
use reqwest::header::{ HeaderMap, HeaderValue, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ build_http_client, parse_body, send_for_body, CompletionService };
use crate::error::CompletionError;
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;

const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_MAX_TOKENS: u32 = 1500;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: u32,
    system: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl AnthropicChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompletionError::Config("Anthropic API key is required".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).map_err(|e|
                CompletionError::Config(format!("Invalid API key format: {}", e))
            )?
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        Ok(Self {
            http: build_http_client(headers)?,
            model: config.completion_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: config.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        })
    }

    fn request<'a>(&'a self, history: &'a [ChatTurn]) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: history,
            system: self.system.as_deref(),
        }
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let resp: MessagesResponse = parse_body(body)?;
    if let Some(usage) = &resp.usage {
        debug!(
            "Anthropic usage: input={:?} output={:?}",
            usage.input_tokens,
            usage.output_tokens
        );
    }
    resp.content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no text content".into()))
}

#[async_trait]
impl CompletionService for AnthropicChatClient {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let req = self.http.post(&self.base_url).json(&self.request(history));
        let body = send_for_body(req).await?;
        parse_reply(&body)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn config() -> LlmConfig {
        LlmConfig {
            llm_type: crate::llm::LlmType::Anthropic,
            api_key: Some("sk-test".into()),
            system_prompt: Some("Be brief.".into()),
            ..Default::default()
        }
    }

    #[test]
    fn first_text_block_is_the_reply() {
        let body = r#"{"content":[{"type":"text","text":"Hi there"}],"usage":{"input_tokens":5,"output_tokens":2}}"#;
        assert_eq!(parse_reply(body).unwrap(), "Hi there");
    }

    #[test]
    fn empty_content_is_malformed() {
        assert!(matches!(parse_reply(r#"{"content":[]}"#), Err(CompletionError::MalformedResponse(_))));
        assert!(matches!(parse_reply(r#"{"id":"msg_1"}"#), Err(CompletionError::MalformedResponse(_))));
    }

    #[test]
    fn request_includes_defaults_and_system_prompt() {
        let client = AnthropicChatClient::from_config(&config()).unwrap();
        let turns = vec![ChatTurn { role: Role::User, content: "hi".into() }];
        let json = serde_json::to_value(client.request(&turns)).unwrap();
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(json["system"], "Be brief.");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn blank_system_prompt_is_omitted() {
        let mut cfg = config();
        cfg.system_prompt = Some("   ".into());
        let client = AnthropicChatClient::from_config(&cfg).unwrap();
        let json = serde_json::to_value(client.request(&[])).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut cfg = config();
        cfg.api_key = Some(String::new());
        assert!(matches!(AnthropicChatClient::from_config(&cfg), Err(CompletionError::Config(_))));
    }
}
