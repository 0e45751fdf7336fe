use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ build_http_client, parse_body, send_for_body, CompletionService };
use crate::error::CompletionError;
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    system: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIReplyMessage,
}

#[derive(Deserialize)]
struct OpenAIReplyMessage {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompletionError::Config("OpenAI API key is required".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                CompletionError::Config(format!("Invalid API key format: {}", e))
            )?
        );

        Ok(Self {
            http: build_http_client(headers)?,
            model: config.completion_model.clone().unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: config.base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            max_tokens: config.max_tokens,
            system: config.system_prompt.clone().filter(|s| !s.trim().is_empty()),
        })
    }

    fn request(&self, history: &[ChatTurn]) -> OpenAIChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = &self.system {
            messages.push(OpenAIMessage { role: "system".to_string(), content: system.clone() });
        }
        messages.extend(
            history.iter().map(|turn| OpenAIMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
        );
        OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            temperature: 0.7,
            max_tokens: self.max_tokens,
        }
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let resp: OpenAIResponse = parse_body(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("response has no choices".into()))
}

#[async_trait]
impl CompletionService for OpenAIChatClient {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let url = self.base_url.trim_end_matches('/');
        let req = self.http.post(url).json(&self.request(history));
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

    #[test]
    fn system_prompt_leads_the_messages() {
        let config = LlmConfig {
            llm_type: crate::llm::LlmType::OpenAI,
            api_key: Some("sk-test".into()),
            system_prompt: Some("You are terse.".into()),
            ..Default::default()
        };
        let client = OpenAIChatClient::from_config(&config).unwrap();
        let turns = vec![
            ChatTurn { role: Role::User, content: "q".into() },
            ChatTurn { role: Role::Assistant, content: "a".into() }
        ];
        let req = client.request(&turns);
        let roles: Vec<&str> = req.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[test]
    fn reply_is_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"42"}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "42");
        assert!(parse_reply(r#"{"choices":[]}"#).is_err());
    }
}
