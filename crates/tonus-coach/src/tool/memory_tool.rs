use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_llm::provider::LlmProvider;

use crate::tool::{ToolExecutor, ToolOutcome};

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn remember_fact(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let category = args["category"].as_str().unwrap_or("fact");
        let content = args["content"].as_str().unwrap_or("");

        self.memory.save_memory(user_id, category, content).await?;

        Ok(ToolOutcome::ok_with(
            format!("Запомнил: {content}"),
            json!({"category": category, "content": content}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{test_executor, MockLlm};
    use serde_json::json;

    #[tokio::test]
    async fn test_remember_fact() {
        let exec = test_executor("memory-fact", MockLlm::new(vec![])).await;

        let outcome = exec
            .execute(
                1,
                "remember_fact",
                &json!({"category": "restriction", "content": "не ест молочку"}),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Запомнил: не ест молочку");

        let text = exec.memory.memories_as_text(1).await.unwrap().unwrap();
        assert!(text.contains("Ограничения:"));
        assert!(text.contains("  - не ест молочку"));
    }

    #[tokio::test]
    async fn test_remember_fact_defaults() {
        let exec = test_executor("memory-defaults", MockLlm::new(vec![])).await;
        let outcome = exec
            .execute(1, "remember_fact", &json!({"content": "любит острое"}))
            .await;
        assert_eq!(outcome.data.unwrap()["category"], "fact");
    }
}
