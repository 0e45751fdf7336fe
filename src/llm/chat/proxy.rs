use async_trait::async_trait;
use reqwest::header::{ HeaderMap, HeaderValue, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use url::Url;

use super::{ build_http_client, parse_body, send_for_body, CompletionService };
use crate::error::CompletionError;
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;

pub const DEFAULT_PROXY_URL: &str = "http://localhost:3000/api/chat";

/// Relay endpoint that owns the provider key, model and system prompt. It takes
/// the bare history and answers with `{ "content": "..." }`.
pub struct ProxyChatClient {
    http: HttpClient,
    url: String,
}

#[derive(Serialize)]
struct ProxyRequest<'a> {
    messages: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct ProxyResponse {
    content: Option<String>,
}

impl ProxyChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, CompletionError> {
        let url = config.base_url.clone().unwrap_or_else(|| DEFAULT_PROXY_URL.to_string());
        Url::parse(&url).map_err(|e| CompletionError::Config(format!("Invalid proxy URL '{}': {}", url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = build_http_client(headers)?;
        Ok(Self { http, url })
    }
}

pub(crate) fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let resp: ProxyResponse = parse_body(body)?;
    resp.content.ok_or_else(|| CompletionError::MalformedResponse("missing 'content' field".into()))
}

#[async_trait]
impl CompletionService for ProxyChatClient {
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, CompletionError> {
        let req = self.http.post(&self.url).json(&(ProxyRequest { messages: history }));
        let body = send_for_body(req).await?;
        parse_reply(&body)
    }

    fn get_model(&self) -> String {
        "proxy default".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn reply_is_the_content_field() {
        let body = r#"{"content":"Recursion is...","usage":{"input_tokens":3}}"#;
        assert_eq!(parse_reply(body).unwrap(), "Recursion is...");
    }

    #[test]
    fn body_without_content_is_malformed() {
        assert!(matches!(parse_reply(r#"{"usage":null}"#), Err(CompletionError::MalformedResponse(_))));
        assert!(matches!(parse_reply("<html>"), Err(CompletionError::MalformedResponse(_))));
    }

    #[test]
    fn request_carries_role_and_content_only() {
        let turns = vec![ChatTurn { role: Role::User, content: "hi".into() }];
        let json = serde_json::to_string(&(ProxyRequest { messages: &turns })).unwrap();
        assert_eq!(json, r#"{"messages":[{"role":"user","content":"hi"}]}"#);
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let config = LlmConfig { base_url: Some("not a url".into()), ..Default::default() };
        assert!(matches!(ProxyChatClient::from_config(&config), Err(CompletionError::Config(_))));
    }
}
