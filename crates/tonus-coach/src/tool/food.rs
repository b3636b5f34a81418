use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_core::types::{now_unix, FoodEntry};
use tonus_llm::provider::LlmProvider;

use crate::clock::local_hhmm;
use crate::tool::{ToolExecutor, ToolOutcome};

/// Pick an entry from today's list: a valid 1-based number wins, otherwise
/// the first case-insensitive description substring match.
fn resolve_entry<'a>(entries: &'a [FoodEntry], args: &Value) -> Option<&'a FoodEntry> {
    if let Some(n) = args["entry_number"].as_i64() {
        if n >= 1 && (n as usize) <= entries.len() {
            return Some(&entries[n as usize - 1]);
        }
    }

    let query = args["description_match"].as_str().unwrap_or("").to_lowercase();
    if query.is_empty() {
        return None;
    }
    entries
        .iter()
        .find(|e| e.description.to_lowercase().contains(&query))
}

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn log_food(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let description = args["description"].as_str().unwrap_or("Еда").to_string();
        let calories = args["calories"].as_i64().unwrap_or(0);
        let protein = args["protein"].as_f64().unwrap_or(0.0);
        let carbs = args["carbs"].as_f64().unwrap_or(0.0);
        let fat = args["fat"].as_f64().unwrap_or(0.0);
        let fiber = args["fiber"].as_f64().unwrap_or(0.0);

        self.store
            .insert_food(&FoodEntry {
                id: 0,
                user_id,
                description: description.clone(),
                meal_type: args["meal_type"].as_str().map(|s| s.to_string()),
                calories,
                protein,
                carbs,
                fat,
                fiber,
                photo_file_id: None,
                raw_analysis: None,
                created_at: now_unix(),
            })
            .await?;

        Ok(ToolOutcome::ok_with(
            format!("Записано: {description} ({calories} ккал)"),
            json!({
                "description": description,
                "calories": calories,
                "protein": protein,
                "carbs": carbs,
                "fat": fat,
            }),
        ))
    }

    pub(crate) async fn list_today_food(&self, user_id: i64) -> Result<ToolOutcome> {
        let tz = self.user_tz(user_id).await?;
        let (start, end) = self.today_window(user_id).await?;
        let entries = self.store.list_food(user_id, start, end).await?;

        if entries.is_empty() {
            return Ok(ToolOutcome::ok_with(
                "Записей еды за сегодня нет",
                json!({"entries": [], "total_calories": 0}),
            ));
        }

        let total_calories: i64 = entries.iter().map(|e| e.calories).sum();
        let listed: Vec<Value> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                json!({
                    "number": i + 1,
                    "id": e.id,
                    "description": e.description,
                    "calories": e.calories,
                    "protein": e.protein,
                    "carbs": e.carbs,
                    "fat": e.fat,
                    "time": local_hhmm(tz, e.created_at),
                })
            })
            .collect();

        Ok(ToolOutcome::ok_with(
            format!("Найдено {} записей, всего {total_calories} ккал", entries.len()),
            json!({"entries": listed, "total_calories": total_calories}),
        ))
    }

    pub(crate) async fn delete_food_entry(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let (start, end) = self.today_window(user_id).await?;
        let entries = self.store.list_food(user_id, start, end).await?;

        let Some(entry) = resolve_entry(&entries, args) else {
            return Ok(ToolOutcome::fail(format!(
                "Запись не найдена. Всего записей: {}",
                entries.len()
            )));
        };

        let description = entry.description.clone();
        let calories = entry.calories;
        self.store.delete_food(user_id, entry.id).await?;

        Ok(ToolOutcome::ok_with(
            format!("Удалено: {description} ({calories} ккал)"),
            json!({"deleted": description, "calories": calories}),
        ))
    }

    pub(crate) async fn update_food_entry(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let (start, end) = self.today_window(user_id).await?;
        let entries = self.store.list_food(user_id, start, end).await?;

        let Some(entry) = resolve_entry(&entries, args) else {
            return Ok(ToolOutcome::fail(format!(
                "Запись не найдена. Всего записей: {}",
                entries.len()
            )));
        };

        let old_description = entry.description.clone();
        let old_calories = entry.calories;

        let mut updated = entry.clone();
        if let Some(desc) = args["new_description"].as_str() {
            if !desc.is_empty() {
                updated.description = desc.to_string();
            }
        }
        if let Some(cal) = args["new_calories"].as_i64() {
            updated.calories = cal;
        }
        if let Some(p) = args["new_protein"].as_f64() {
            updated.protein = p;
        }
        if let Some(c) = args["new_carbs"].as_f64() {
            updated.carbs = c;
        }
        if let Some(f) = args["new_fat"].as_f64() {
            updated.fat = f;
        }
        self.store.update_food(&updated).await?;

        Ok(ToolOutcome::ok_with(
            format!("Обновлено: {} ({} ккал)", updated.description, updated.calories),
            json!({
                "old": {"description": old_description, "calories": old_calories},
                "new": {"description": updated.description, "calories": updated.calories},
            }),
        ))
    }

    pub(crate) async fn clear_today_food(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        if let Some(refused) = Self::check_confirm(args) {
            return Ok(refused);
        }

        let (start, end) = self.today_window(user_id).await?;
        let count = self.store.clear_food(user_id, start, end).await?;

        Ok(ToolOutcome::ok_with(
            format!("Удалено {count} записей еды за сегодня"),
            json!({"deleted_count": count}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_executor, MockLlm};

    #[tokio::test]
    async fn test_log_and_list_food() {
        let exec = test_executor("food-log", MockLlm::new(vec![])).await;

        let logged = exec
            .execute(1, "log_food", &json!({"description": "яичница", "calories": 350}))
            .await;
        assert!(logged.success);
        assert_eq!(logged.message, "Записано: яичница (350 ккал)");

        exec.execute(1, "log_food", &json!({"description": "салат", "calories": 150}))
            .await;

        let listed = exec.execute(1, "list_today_food", &json!({})).await;
        assert!(listed.success);
        assert_eq!(listed.message, "Найдено 2 записей, всего 500 ккал");
        let data = listed.data.unwrap();
        assert_eq!(data["entries"][0]["number"], 1);
        assert_eq!(data["entries"][0]["description"], "яичница");
        assert_eq!(data["entries"][1]["description"], "салат");
    }

    #[tokio::test]
    async fn test_list_empty() {
        let exec = test_executor("food-empty", MockLlm::new(vec![])).await;
        let listed = exec.execute(1, "list_today_food", &json!({})).await;
        assert_eq!(listed.message, "Записей еды за сегодня нет");
    }

    #[tokio::test]
    async fn test_delete_by_number_and_by_substring() {
        let exec = test_executor("food-delete", MockLlm::new(vec![])).await;
        for (desc, cal) in [("яичница", 350), ("борщ", 400), ("мороженое", 250)] {
            exec.execute(1, "log_food", &json!({"description": desc, "calories": cal}))
                .await;
        }

        let by_number = exec.execute(1, "delete_food_entry", &json!({"entry_number": 2})).await;
        assert!(by_number.success);
        assert_eq!(by_number.message, "Удалено: борщ (400 ккал)");

        let by_match = exec
            .execute(1, "delete_food_entry", &json!({"description_match": "МОРОЖ"}))
            .await;
        assert!(by_match.success);
        assert_eq!(by_match.message, "Удалено: мороженое (250 ккал)");

        let missing = exec
            .execute(1, "delete_food_entry", &json!({"description_match": "пицца"}))
            .await;
        assert!(!missing.success);
        assert_eq!(missing.message, "Запись не найдена. Всего записей: 1");
    }

    #[tokio::test]
    async fn test_out_of_range_number_falls_back_to_match() {
        let exec = test_executor("food-range", MockLlm::new(vec![])).await;
        exec.execute(1, "log_food", &json!({"description": "борщ", "calories": 400}))
            .await;

        let outcome = exec
            .execute(
                1,
                "delete_food_entry",
                &json!({"entry_number": 9, "description_match": "борщ"}),
            )
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_update_food_entry() {
        let exec = test_executor("food-update", MockLlm::new(vec![])).await;
        exec.execute(1, "log_food", &json!({"description": "паста", "calories": 700}))
            .await;

        let updated = exec
            .execute(
                1,
                "update_food_entry",
                &json!({"entry_number": 1, "new_calories": 550, "new_description": "паста (без сыра)"}),
            )
            .await;
        assert!(updated.success);
        assert_eq!(updated.message, "Обновлено: паста (без сыра) (550 ккал)");

        let data = updated.data.unwrap();
        assert_eq!(data["old"]["calories"], 700);
        assert_eq!(data["new"]["calories"], 550);
    }

    #[tokio::test]
    async fn test_clear_requires_confirm() {
        let exec = test_executor("food-clear", MockLlm::new(vec![])).await;
        exec.execute(1, "log_food", &json!({"description": "каша", "calories": 300}))
            .await;

        let refused = exec.execute(1, "clear_today_food", &json!({})).await;
        assert!(!refused.success);
        assert_eq!(refused.message, "Требуется подтверждение (confirm: true)");

        let cleared = exec.execute(1, "clear_today_food", &json!({"confirm": true})).await;
        assert!(cleared.success);
        assert_eq!(cleared.message, "Удалено 1 записей еды за сегодня");
    }
}
