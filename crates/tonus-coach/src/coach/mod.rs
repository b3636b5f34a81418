pub mod photo;
pub mod prompt;
pub mod router;
pub mod turn;

use std::sync::Arc;

use tonus_core::config::CoachConfig;
use tonus_llm::provider::LlmProvider;
use tonus_telegram::bot::TelegramBot;

use crate::album::AlbumCoalescer;
use crate::service::memory::MemoryStore;
use crate::service::store::HealthStore;
use crate::tool::ToolExecutor;

/// The bot itself: Telegram on one side, the model and the stores on the
/// other. One instance serves all users.
pub struct Coach<P> {
    pub(crate) bot: Arc<TelegramBot>,
    pub(crate) store: Arc<HealthStore>,
    pub(crate) memory: Arc<MemoryStore>,
    pub(crate) llm: Arc<P>,
    pub(crate) executor: ToolExecutor<P>,
    pub(crate) albums: AlbumCoalescer,
    pub(crate) config: CoachConfig,
}

impl<P: LlmProvider> Coach<P> {
    pub fn new(
        bot: Arc<TelegramBot>,
        store: Arc<HealthStore>,
        memory: Arc<MemoryStore>,
        llm: Arc<P>,
        config: CoachConfig,
    ) -> Self {
        let executor = ToolExecutor::new(
            Arc::clone(&store),
            Arc::clone(&memory),
            Arc::clone(&llm),
            config.clone(),
        );
        Self {
            bot,
            store,
            memory,
            llm,
            executor,
            albums: AlbumCoalescer::new(),
            config,
        }
    }
}
