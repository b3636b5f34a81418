use std::path::Path;
use std::sync::Arc;

use tonus_coach::coach::Coach;
use tonus_coach::service::memory::MemoryStore;
use tonus_coach::service::store::HealthStore;
use tonus_core::config::Config;
use tonus_llm::anthropic::AnthropicLlm;
use tonus_telegram::bot::TelegramBot;

#[tokio::main]
async fn main() {
    let config_path =
        std::env::var("TONUS_CONFIG").unwrap_or_else(|_| "tonus.toml".to_string());

    let config = Config::load(Path::new(&config_path)).unwrap_or_else(|e| {
        eprintln!("fatal: failed to load config: {e}");
        std::process::exit(1);
    });

    if config.telegram.token.is_empty() {
        eprintln!("fatal: TONUS_TELEGRAM_TOKEN is not set");
        std::process::exit(1);
    }
    if config.llm.api_key.is_empty() {
        eprintln!("fatal: TONUS_LLM_API_KEY is not set");
        std::process::exit(1);
    }

    eprintln!("tonus: starting...");

    let remote = !config.database.turso_url.is_empty();

    let store = if remote {
        HealthStore::new_remote(&config.database.turso_url, &config.database.turso_token).await
    } else {
        HealthStore::new(&config.database.path).await
    }
    .unwrap_or_else(|e| {
        eprintln!("fatal: failed to open database: {e}");
        std::process::exit(1);
    });

    // Conversation history and memories keep their own handle so long chat
    // writes never contend with the health tables.
    let memory = if remote {
        MemoryStore::new_remote(&config.database.turso_url, &config.database.turso_token).await
    } else {
        MemoryStore::new(&config.database.path).await
    }
    .unwrap_or_else(|e| {
        eprintln!("fatal: failed to open memory database: {e}");
        std::process::exit(1);
    });

    let bot = TelegramBot::new(config.telegram.token.clone());
    let llm = AnthropicLlm::new(config.llm.api_key.clone(), config.llm.model.clone());

    let coach = Arc::new(Coach::new(
        Arc::new(bot),
        Arc::new(store),
        Arc::new(memory),
        Arc::new(llm),
        config.coach.clone(),
    ));

    if let Err(e) = coach.run().await {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}
