use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::info;

#[derive(Debug)]
pub enum PromptError {
    EmptySystemPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptySystemPrompt(path) => write!(f, "System prompt in '{}' is empty", path),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Instructions sent alongside every completion request.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub system: String,
}

impl PromptConfig {
    fn validate(&self, path: &Path) -> Result<(), PromptError> {
        if self.system.trim().is_empty() {
            return Err(PromptError::EmptySystemPrompt(path.display().to_string()));
        }
        Ok(())
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let path = path.as_ref();
    let file_content = fs::read_to_string(path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    config.validate(path)?;
    Ok(config)
}

/// A missing file means "no system prompt"; any other problem is an error.
pub fn load_system_prompt(path: Option<&str>) -> Result<Option<String>, PromptError> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };
    if !Path::new(path).exists() {
        info!("No prompts file at '{}', sending requests without a system prompt", path);
        return Ok(None);
    }
    let config = load_prompts(path)?;
    info!("Loaded system prompt from '{}' ({} chars)", path, config.system.chars().count());
    Ok(Some(config.system.trim().to_string()))
}
