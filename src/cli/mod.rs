use clap::Parser;
use std::time::Duration;
use crate::llm::{ LlmConfig, LlmType, ParseLlmTypeError };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Terminal chat client with locally persisted conversations", long_about = None)]
pub struct Args {
    // --- History Store Args ---
    /// Conversation store type (file, memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "file")]
    pub history_type: String,

    /// Directory holding the conversation file when HISTORY_TYPE=file
    #[arg(long, env = "HISTORY_DIR", default_value = ".chatline")]
    pub history_dir: String,

    /// Redis endpoint when HISTORY_TYPE=redis (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Key the whole conversation list is stored under.
    #[arg(long, env = "HISTORY_KEY", default_value = "claude-chats")]
    pub history_key: String,

    /// Prefix for Redis keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "chatline:")]
    pub history_redis_prefix: String,

    // --- Chat LLM Provider Args ---
    /// Completion backend (proxy, anthropic, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "proxy")]
    pub chat_llm_type: String,

    /// Endpoint URL for the completion backend (e.g., http://localhost:3000/api/chat for the proxy)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for hosted providers (anthropic, openai). Unused by the proxy.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name (e.g., claude-3-sonnet-20240229, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Upper bound on reply length in tokens.
    #[arg(long, env = "CHAT_MAX_TOKENS")]
    pub chat_max_tokens: Option<u32>,

    // --- General App Args ---
    /// Path to a JSON file of the form { "system": "..." }. Missing file means no system prompt.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    /// Seconds to wait for a reply before giving up. 0 waits indefinitely.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub request_timeout_secs: u64,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn llm_config(&self, system_prompt: Option<String>) -> Result<LlmConfig, ParseLlmTypeError> {
        let llm_type: LlmType = self.chat_llm_type.parse()?;
        Ok(LlmConfig {
            llm_type,
            api_key: Some(self.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: self.chat_model.clone(),
            base_url: self.chat_base_url.clone(),
            max_tokens: self.chat_max_tokens,
            system_prompt,
        })
    }
}
