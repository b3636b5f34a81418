use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_core::types::{now_unix, WaterEntry};
use tonus_llm::provider::LlmProvider;

use crate::clock::local_hhmm;
use crate::tool::{ToolExecutor, ToolOutcome};

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn log_water(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let amount = args["amount_ml"].as_i64().unwrap_or(250);

        self.store
            .insert_water(&WaterEntry { id: 0, user_id, amount_ml: amount, created_at: now_unix() })
            .await?;

        let (start, end) = self.today_window(user_id).await?;
        let total = self.store.sum_water(user_id, start, end).await?;
        let goal = match self.store.get_user(user_id).await? {
            Some(user) => user.water_goal,
            None => self.config.water_goal,
        };

        Ok(ToolOutcome::ok_with(
            format!("+{amount} мл воды. Всего: {total}/{goal} мл"),
            json!({"amount_ml": amount, "total_today": total, "goal": goal}),
        ))
    }

    pub(crate) async fn list_today_water(&self, user_id: i64) -> Result<ToolOutcome> {
        let tz = self.user_tz(user_id).await?;
        let (start, end) = self.today_window(user_id).await?;
        let entries = self.store.list_water(user_id, start, end).await?;

        let total: i64 = entries.iter().map(|e| e.amount_ml).sum();
        let listed: Vec<Value> = entries
            .iter()
            .map(|e| json!({"time": local_hhmm(tz, e.created_at), "amount": e.amount_ml}))
            .collect();

        Ok(ToolOutcome::ok_with(
            format!("Вода за сегодня: {total} мл ({} записей)", entries.len()),
            json!({"entries": listed, "total": total}),
        ))
    }

    pub(crate) async fn clear_today_water(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        if let Some(refused) = Self::check_confirm(args) {
            return Ok(refused);
        }

        let (start, end) = self.today_window(user_id).await?;
        let count = self.store.clear_water(user_id, start, end).await?;

        Ok(ToolOutcome::ok_with(
            format!("Удалено {count} записей воды за сегодня"),
            json!({"deleted_count": count}),
        ))
    }

    /// Replace today's water with a single entry. Zero just clears the day.
    pub(crate) async fn set_today_water(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let amount = args["amount_ml"].as_i64().unwrap_or(0);

        let (start, end) = self.today_window(user_id).await?;
        self.store.clear_water(user_id, start, end).await?;

        if amount > 0 {
            self.store
                .insert_water(&WaterEntry {
                    id: 0,
                    user_id,
                    amount_ml: amount,
                    created_at: now_unix(),
                })
                .await?;
        }

        Ok(ToolOutcome::ok_with(
            format!("Вода за сегодня: {amount} мл"),
            json!({"water": amount}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_executor, MockLlm};

    #[tokio::test]
    async fn test_log_water_accumulates() {
        let exec = test_executor("water-log", MockLlm::new(vec![])).await;

        let first = exec.execute(1, "log_water", &json!({"amount_ml": 300})).await;
        assert_eq!(first.message, "+300 мл воды. Всего: 300/2000 мл");

        let second = exec.execute(1, "log_water", &json!({"amount_ml": 250})).await;
        assert_eq!(second.message, "+250 мл воды. Всего: 550/2000 мл");

        // missing amount defaults to one glass
        let default = exec.execute(1, "log_water", &json!({})).await;
        assert_eq!(default.data.unwrap()["amount_ml"], 250);
    }

    #[tokio::test]
    async fn test_set_today_water_replaces() {
        let exec = test_executor("water-set", MockLlm::new(vec![])).await;
        exec.execute(1, "log_water", &json!({"amount_ml": 300})).await;
        exec.execute(1, "log_water", &json!({"amount_ml": 300})).await;

        let set = exec.execute(1, "set_today_water", &json!({"amount_ml": 1000})).await;
        assert_eq!(set.message, "Вода за сегодня: 1000 мл");

        let listed = exec.execute(1, "list_today_water", &json!({})).await;
        assert_eq!(listed.message, "Вода за сегодня: 1000 мл (1 записей)");
    }

    #[tokio::test]
    async fn test_set_today_water_zero_clears() {
        let exec = test_executor("water-zero", MockLlm::new(vec![])).await;
        exec.execute(1, "log_water", &json!({"amount_ml": 500})).await;

        let set = exec.execute(1, "set_today_water", &json!({"amount_ml": 0})).await;
        assert!(set.success);

        let listed = exec.execute(1, "list_today_water", &json!({})).await;
        assert_eq!(listed.message, "Вода за сегодня: 0 мл (0 записей)");
    }

    #[tokio::test]
    async fn test_clear_water_requires_confirm() {
        let exec = test_executor("water-clear", MockLlm::new(vec![])).await;
        exec.execute(1, "log_water", &json!({"amount_ml": 400})).await;

        let refused = exec.execute(1, "clear_today_water", &json!({"confirm": false})).await;
        assert!(!refused.success);

        let cleared = exec.execute(1, "clear_today_water", &json!({"confirm": true})).await;
        assert_eq!(cleared.message, "Удалено 1 записей воды за сегодня");
    }
}
