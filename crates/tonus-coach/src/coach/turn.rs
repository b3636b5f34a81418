use chrono::Utc;
use tonus_core::error::Result;
use tonus_core::types::{ChatMessage, ChatRequest, ConversationMessage, ToolCallRequest};
use tonus_llm::provider::LlmProvider;

use crate::coach::prompt::build_system_prompt;
use crate::coach::Coach;
use crate::service::context::build_user_context;
use crate::tool::{catalog, ToolOutcome};

const TURN_MAX_TOKENS: u32 = 2000;

/// A model turn that stopped to call tools, frozen until phase two. The
/// calls are executed exactly as issued and replayed back unchanged.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    narrative: String,
    calls: Vec<ToolCallRequest>,
}

impl PendingTurn {
    pub fn new(narrative: String, calls: Vec<ToolCallRequest>) -> Self {
        Self { narrative, calls }
    }

    pub fn calls(&self) -> &[ToolCallRequest] {
        &self.calls
    }

    /// The assistant message for phase two, carrying the original tool calls.
    pub fn as_assistant_message(&self) -> ChatMessage {
        ChatMessage::assistant_tool_calls(self.narrative.clone(), self.calls.clone())
    }
}

/// When the model has nothing to say after its tools ran, list what they did.
fn summarize_outcomes(outcomes: &[(String, ToolOutcome)]) -> String {
    let bullets: Vec<String> = outcomes
        .iter()
        .filter(|(_, o)| !o.message.is_empty())
        .map(|(_, o)| format!("• {}", o.message))
        .collect();
    if bullets.is_empty() {
        "✅ Готово!".to_string()
    } else {
        format!("✅ Готово!\n\n{}", bullets.join("\n"))
    }
}

impl<P: LlmProvider> Coach<P> {
    async fn turn_messages(
        &self,
        user_id: i64,
        history: &[ConversationMessage],
        memories: Option<&str>,
        text: &str,
    ) -> Result<Vec<ChatMessage>> {
        let ctx = build_user_context(&self.store, &self.config, user_id, Utc::now()).await?;
        let mut messages = vec![ChatMessage::text(
            "system",
            build_system_prompt(&ctx, memories),
        )];
        for m in history {
            messages.push(ChatMessage::text(m.role.clone(), m.content.clone()));
        }
        messages.push(ChatMessage::text("user", text));
        Ok(messages)
    }

    /// One full text turn: ask the model, run whatever tools it requested,
    /// then ask again with the results. Returns the reply to send.
    pub async fn respond(&self, user_id: i64, text: &str) -> Result<String> {
        let preview: String = text.chars().take(80).collect();
        log!(" [coach] user={user_id} | {preview}");

        let history = self
            .memory
            .get_recent_messages(user_id, self.config.context_window)
            .await?;
        let memories = self.memory.memories_as_text(user_id).await?;
        let tools = catalog();

        let messages = self
            .turn_messages(user_id, &history, memories.as_deref(), text)
            .await?;
        let first = self
            .llm
            .chat_with_tools(
                ChatRequest {
                    messages,
                    max_tokens: Some(TURN_MAX_TOKENS),
                    temperature: None,
                },
                &tools,
            )
            .await?;

        let mut reply = if first.tool_calls.is_empty() {
            first.content
        } else {
            let turn = PendingTurn::new(first.content, first.tool_calls);

            let mut results = Vec::with_capacity(turn.calls().len());
            for call in turn.calls() {
                let outcome = self.executor.execute(user_id, &call.name, &call.arguments).await;
                results.push((call.id.clone(), outcome));
            }

            // the tools changed today's state, so phase two gets a fresh prompt
            let mut messages = self
                .turn_messages(user_id, &history, memories.as_deref(), text)
                .await?;
            messages.push(turn.as_assistant_message());
            for (id, outcome) in &results {
                let content = serde_json::to_string(outcome)
                    .unwrap_or_else(|_| r#"{"success":false}"#.to_string());
                messages.push(ChatMessage::tool_result(id.clone(), content));
            }

            let second = self
                .llm
                .chat_with_tools(
                    ChatRequest {
                        messages,
                        max_tokens: Some(TURN_MAX_TOKENS),
                        temperature: None,
                    },
                    &tools,
                )
                .await?;

            if second.content.trim().is_empty() {
                summarize_outcomes(&results)
            } else {
                second.content
            }
        };

        if reply.trim().is_empty() {
            reply = "Готово! Чем ещё могу помочь?".to_string();
        }

        self.memory.save_message(user_id, "user", text).await?;
        self.memory.save_message(user_id, "assistant", &reply).await?;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::testutil::{test_coach, MockLlm};

    #[tokio::test]
    async fn test_plain_reply_without_tools() {
        let coach = test_coach("turn-plain", MockLlm::new(vec![MockLlm::text("Привет! Чем помочь?")]))
            .await;

        let reply = coach.respond(1, "привет").await.unwrap();
        assert_eq!(reply, "Привет! Чем помочь?");
        assert_eq!(coach.llm.request_count(), 1);

        let history = coach.memory.get_recent_messages(1, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "Привет! Чем помочь?");
    }

    #[tokio::test]
    async fn test_tool_turn_replays_calls_and_results() {
        let coach = test_coach(
            "turn-tools",
            MockLlm::new(vec![
                MockLlm::with_tools(
                    "Записываю...",
                    vec![MockLlm::call("t1", "log_water", json!({"amount_ml": 300}))],
                ),
                MockLlm::text("Записал 300 мл воды! 💧"),
            ]),
        )
        .await;

        let reply = coach.respond(1, "выпил стакан воды 300 мл").await.unwrap();
        assert_eq!(reply, "Записал 300 мл воды! 💧");
        assert_eq!(coach.llm.request_count(), 2);

        // the water actually landed
        let stats = coach.executor.execute(1, "get_today_stats", &json!({})).await;
        assert!(stats.message.contains("Вода: 300/2000 мл"));

        // phase two carries the original call and its serialized outcome
        let requests = coach.llm.requests.lock().unwrap();
        let second = &requests[1];
        let assistant = second
            .messages
            .iter()
            .find(|m| !m.tool_calls.is_empty())
            .expect("assistant tool-call message");
        assert_eq!(assistant.tool_calls[0].id, "t1");
        let result = second
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("t1"))
            .expect("tool result message");
        assert!(result.content.contains("+300 мл воды"));

        // second phase sees the water in the rebuilt system prompt
        let system = &second.messages[0];
        assert_eq!(system.role, "system");
        assert!(system.content.contains("- Выпито воды: 300 мл"));
    }

    #[tokio::test]
    async fn test_empty_phase_two_falls_back_to_outcomes() {
        let coach = test_coach(
            "turn-fallback",
            MockLlm::new(vec![
                MockLlm::with_tools(
                    "",
                    vec![
                        MockLlm::call("a", "log_water", json!({"amount_ml": 200})),
                        MockLlm::call(
                            "b",
                            "log_food",
                            json!({"description": "банан", "calories": 90}),
                        ),
                    ],
                ),
                MockLlm::text("   "),
            ]),
        )
        .await;

        let reply = coach.respond(1, "вода и банан").await.unwrap();
        assert_eq!(
            reply,
            "✅ Готово!\n\n• +200 мл воды. Всего: 200/2000 мл\n• Записано: банан (90 ккал)"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_saves_nothing() {
        let coach = test_coach("turn-error", MockLlm::new(vec![])).await;
        assert!(coach.respond(1, "привет").await.is_err());
        let history = coach.memory.get_recent_messages(1, 10).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_fully_empty_reply_gets_default() {
        let coach = test_coach("turn-empty", MockLlm::new(vec![MockLlm::text("")])).await;
        let reply = coach.respond(1, "...").await.unwrap();
        assert_eq!(reply, "Готово! Чем ещё могу помочь?");
    }
}
