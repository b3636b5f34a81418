use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tonus_core::config::CoachConfig;
use tonus_core::error::{Result, TonusError};
use tonus_core::types::{ChatRequest, ChatResponse, ToolCallRequest, ToolDefinition};
use tonus_llm::provider::LlmProvider;

use tonus_telegram::bot::TelegramBot;

use crate::coach::Coach;
use crate::service::memory::MemoryStore;
use crate::service::store::{temp_db_path, HealthStore};
use crate::tool::ToolExecutor;

/// Scripted LLM: pops pre-set responses in order and records every request
/// so tests can assert on what was sent.
pub struct MockLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
        }
    }

    pub fn with_tools(content: &str, tool_calls: Vec<ToolCallRequest>) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl LlmProvider for MockLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TonusError::Llm {
                provider: "mock".to_string(),
                message: "no scripted response left".to_string(),
            })
    }

    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.chat(request).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Executor over fresh temp databases and the given mock.
pub async fn test_executor(name: &str, llm: MockLlm) -> ToolExecutor<MockLlm> {
    let store = HealthStore::new(&temp_db_path(&format!("{name}-health")))
        .await
        .unwrap();
    let memory = MemoryStore::new(&temp_db_path(&format!("{name}-memory")))
        .await
        .unwrap();
    ToolExecutor::new(
        Arc::new(store),
        Arc::new(memory),
        Arc::new(llm),
        CoachConfig::default(),
    )
}

/// Full coach over fresh temp databases. The bot points at a bogus token and
/// is never called by the text paths under test.
pub async fn test_coach(name: &str, llm: MockLlm) -> Coach<MockLlm> {
    let store = HealthStore::new(&temp_db_path(&format!("{name}-health")))
        .await
        .unwrap();
    let memory = MemoryStore::new(&temp_db_path(&format!("{name}-memory")))
        .await
        .unwrap();
    Coach::new(
        Arc::new(TelegramBot::new("000:test".to_string())),
        Arc::new(store),
        Arc::new(memory),
        Arc::new(llm),
        CoachConfig::default(),
    )
}
