use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_core::types::{now_unix, ActivityEntry};
use tonus_llm::provider::LlmProvider;

use crate::service::vision::estimate_activity_calories;
use crate::tool::{ToolExecutor, ToolOutcome};

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn log_activity(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let activity_type = args["activity_type"].as_str().unwrap_or("тренировка").to_string();
        let duration = args["duration_minutes"].as_i64().unwrap_or(30);

        let calories_burned = match args["calories_burned"].as_i64() {
            Some(cal) => cal,
            None => {
                let weight = self
                    .store
                    .get_user(user_id)
                    .await?
                    .and_then(|u| u.current_weight_kg)
                    .unwrap_or(70.0);
                let estimate =
                    estimate_activity_calories(&*self.llm, &activity_type, duration, weight).await;
                estimate["calories_burned"].as_i64().unwrap_or(0)
            }
        };

        self.store
            .insert_activity(&ActivityEntry {
                id: 0,
                user_id,
                activity_type: activity_type.clone(),
                duration_min: duration,
                calories_burned,
                note: None,
                is_ambient: false,
                created_at: now_unix(),
            })
            .await?;

        Ok(ToolOutcome::ok_with(
            format!("Активность записана: {activity_type} {duration} мин (-{calories_burned} ккал)"),
            json!({
                "activity_type": activity_type,
                "duration_minutes": duration,
                "calories_burned": calories_burned,
            }),
        ))
    }

    pub(crate) async fn get_today_activities(&self, user_id: i64) -> Result<ToolOutcome> {
        let (start, end) = self.today_window(user_id).await?;
        let activities = self.store.list_activities(user_id, start, end).await?;

        let total_calories: i64 = activities.iter().map(|a| a.calories_burned).sum();
        let listed: Vec<String> = activities
            .iter()
            .map(|a| format!("{}: {} ккал", a.activity_type, a.calories_burned))
            .collect();

        Ok(ToolOutcome::ok_with(
            format!(
                "Сегодня записано {} активностей, всего сожжено {total_calories} ккал",
                activities.len()
            ),
            json!({
                "count": activities.len(),
                "total_calories": total_calories,
                "activities": listed,
            }),
        ))
    }

    /// Collapse today's activities into a single authoritative ambient row.
    /// Used when the user corrects a bad figure.
    pub(crate) async fn update_daily_activity(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let calories_burned = args["calories_burned"].as_i64().unwrap_or(0);
        let activity_type = args["activity_type"]
            .as_str()
            .unwrap_or("дневная активность")
            .to_string();
        let reason = args["reason"].as_str().unwrap_or("обновление по запросу");

        let (start, end) = self.today_window(user_id).await?;
        self.store.clear_activities(user_id, start, end).await?;
        self.store
            .insert_activity(&ActivityEntry {
                id: 0,
                user_id,
                activity_type: activity_type.clone(),
                duration_min: 0,
                calories_burned,
                note: Some(reason.to_string()),
                is_ambient: true,
                created_at: now_unix(),
            })
            .await?;

        log!(" [activity] user={user_id} set to {calories_burned} ккал | reason: {reason}");

        Ok(ToolOutcome::ok_with(
            format!("Активность обновлена: {activity_type} = {calories_burned} ккал"),
            json!({"calories_burned": calories_burned, "activity_type": activity_type}),
        ))
    }

    pub(crate) async fn clear_today_activities(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        if let Some(refused) = Self::check_confirm(args) {
            return Ok(refused);
        }

        let (start, end) = self.today_window(user_id).await?;
        let count = self.store.clear_activities(user_id, start, end).await?;

        Ok(ToolOutcome::ok_with(
            format!("Удалено {count} активностей за сегодня"),
            json!({"deleted_count": count}),
        ))
    }
}
