use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::header::HeaderMap;
use serde::{ Deserialize, Serialize };

use super::{ build_http_client, parse_body, send_for_body, CompletionService };
use crate::error::CompletionError;
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
    system: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

impl OllamaClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        if config.llm_type != crate::llm::LlmType::Ollama {
            return Err(CompletionError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self {
            http: build_http_client(HeaderMap::new())?,
            base_url: config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".into()),
            completion_model: config.completion_model.clone().unwrap_or_else(|| "llama3".to_string()),
            system: config.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        })
    }

    fn request<'a>(&'a self, history: &'a [ChatTurn]) -> ChatRequest<'a> {
        let system = self.system
            .as_deref()
            .map(|content| OllamaMessage { role: "system", content });
        let messages = system
            .into_iter()
            .chain(
                history.iter().map(|turn| OllamaMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
            )
            .collect();
        ChatRequest {
            model: &self.completion_model,
            messages,
            stream: false,
        }
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let resp: ChatResponse = parse_body(body)?;
    resp.message
        .map(|m| m.content)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no message".into()))
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = self.http.post(&url).json(&self.request(history));
        let body = send_for_body(req).await?;
        parse_reply(&body)
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmType;
    use crate::models::chat::Role;

    #[test]
    fn non_streaming_chat_request() {
        let config = LlmConfig { llm_type: LlmType::Ollama, ..Default::default() };
        let client = OllamaClient::from_config(&config).unwrap();
        let turns = vec![ChatTurn { role: Role::User, content: "hey".into() }];
        let json = serde_json::to_value(client.request(&turns)).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"].as_array().map(|m| m.len()), Some(1));
    }

    #[test]
    fn reply_is_message_content() {
        let body = r#"{"model":"llama3","message":{"role":"assistant","content":"yo"},"done":true}"#;
        assert_eq!(parse_reply(body).unwrap(), "yo");
        assert!(parse_reply(r#"{"done":true}"#).is_err());
    }

    #[test]
    fn wrong_config_type_is_rejected() {
        let config = LlmConfig { llm_type: LlmType::Proxy, ..Default::default() };
        assert!(OllamaClient::from_config(&config).is_err());
    }
}
