use chrono::Utc;
use serde_json::json;
use tonus_core::error::Result;
use tonus_llm::provider::LlmProvider;

use crate::service::context::build_user_context;
use crate::tool::{ToolExecutor, ToolOutcome};

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn get_today_stats(&self, user_id: i64) -> Result<ToolOutcome> {
        let ctx = build_user_context(&self.store, &self.config, user_id, Utc::now()).await?;

        Ok(ToolOutcome::ok_with(
            format!(
                "Калории: {}/{}, Вода: {}/{} мл",
                ctx.calories_today, ctx.calorie_goal, ctx.water_today, ctx.water_goal
            ),
            json!({
                "calories": ctx.calories_today,
                "calorie_goal": ctx.calorie_goal,
                "protein": ctx.protein_today,
                "carbs": ctx.carbs_today,
                "fat": ctx.fat_today,
                "water": ctx.water_today,
                "water_goal": ctx.water_goal,
                "meals": ctx.meals_today,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{test_executor, MockLlm};
    use serde_json::json;

    #[tokio::test]
    async fn test_today_stats_reflect_logs() {
        let exec = test_executor("stats-today", MockLlm::new(vec![])).await;
        exec.execute(1, "log_food", &json!({"description": "омлет", "calories": 400, "protein": 25.0}))
            .await;
        exec.execute(1, "log_water", &json!({"amount_ml": 500})).await;

        let stats = exec.execute(1, "get_today_stats", &json!({})).await;
        assert!(stats.success);
        assert_eq!(stats.message, "Калории: 400/2000, Вода: 500/2000 мл");
        let data = stats.data.unwrap();
        assert_eq!(data["protein"], 25.0);
        assert_eq!(data["meals"], json!(["омлет"]));
    }
}
