pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod repl;

use cli::Args;
use config::prompt::load_system_prompt;
use controller::ConversationController;
use history::initialize_history_store;
use llm::chat::new_client as new_chat_client;
use log::info;
use repl::Repl;
use std::error::Error;
use tokio::io::BufReader;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("History Store Type: {}", args.history_type);
    info!("History Key: {}", args.history_key);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Prompts Path: {}", args.prompts_path);
    info!("Request Timeout: {:?}", args.request_timeout());
    info!("-------------------------");

    let system_prompt = load_system_prompt(Some(&args.prompts_path))?;
    let llm_config = args.llm_config(system_prompt)?;
    let completion = new_chat_client(&llm_config)?;
    info!(
        "Chat client configured: Type={}, Model={}, BaseURL={}",
        llm_config.llm_type,
        completion.get_model(),
        completion.get_base_url().as_deref().unwrap_or("none")
    );

    let store = initialize_history_store(&args)?;
    let controller = ConversationController::new(store, completion).await.with_request_timeout(
        args.request_timeout()
    );

    let mut repl = Repl::new(controller, std::io::stdout());
    repl.run(BufReader::new(tokio::io::stdin())).await?;
    info!("Bye.");
    Ok(())
}
