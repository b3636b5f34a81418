use serde_json::{json, Value};
use tonus_core::error::Result;
use tonus_core::types::{now_unix, WeightEntry};
use tonus_llm::provider::LlmProvider;

use crate::clock::{local_ddmm, parse_timezone};
use crate::tool::{ToolExecutor, ToolOutcome};

impl<P: LlmProvider> ToolExecutor<P> {
    pub(crate) async fn update_profile(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let mut user = self.store.ensure_user(user_id, None, None, &self.config).await?;
        let mut updated_fields: Vec<&str> = Vec::new();

        if let Some(name) = args["first_name"].as_str() {
            user.first_name = Some(name.to_string());
            updated_fields.push("имя");
        }
        if let Some(age) = args["age"].as_i64() {
            user.age = Some(age);
            updated_fields.push("возраст");
        }
        if let Some(gender) = args["gender"].as_str() {
            user.gender = Some(gender.to_string());
            updated_fields.push("пол");
        }
        if let Some(height) = args["height_cm"].as_i64() {
            user.height_cm = Some(height);
            updated_fields.push("рост");
        }
        if let Some(weight) = args["current_weight_kg"].as_f64() {
            user.current_weight_kg = Some(weight);
            updated_fields.push("вес");
        }
        if let Some(target) = args["target_weight_kg"].as_f64() {
            user.target_weight_kg = Some(target);
            updated_fields.push("целевой вес");
        }
        if let Some(goal) = args["calorie_goal"].as_i64() {
            user.calorie_goal = goal;
            updated_fields.push("цель калорий");
        }
        if let Some(goal) = args["water_goal"].as_i64() {
            user.water_goal = goal;
            updated_fields.push("цель воды");
        }
        if let Some(goal) = args["goal"].as_str() {
            user.goal = Some(goal.to_string());
            updated_fields.push("цель");
        }
        if let Some(tz) = args["timezone"].as_str() {
            // validated here so day windows never see a garbage zone
            user.timezone = parse_timezone(tz)?.name().to_string();
            updated_fields.push("часовой пояс");
        }

        // Recalculate daily goals once height and weight are known, unless
        // the model set the calorie goal explicitly in the same call.
        if let (Some(height), Some(weight), None) =
            (user.height_cm, user.current_weight_kg, args.get("calorie_goal"))
        {
            // Mifflin-St Jeor
            let age = user.age.unwrap_or(30) as f64;
            let bmr = 10.0 * weight + 6.25 * height as f64 - 5.0 * age
                + if user.gender.as_deref() == Some("male") { 5.0 } else { -161.0 };
            let tdee = (bmr * 1.55) as i64;
            user.calorie_goal = match user.goal.as_deref() {
                Some("lose") => tdee - 500,
                Some("gain") => tdee + 300,
                _ => tdee,
            };
            user.water_goal = ((weight * 33.0 / 100.0).floor() * 100.0) as i64;
            user.protein_goal = (weight * 1.6) as i64;
        }

        self.store.save_user(&user).await?;

        let message = if updated_fields.is_empty() {
            "Профиль обновлён".to_string()
        } else {
            format!("Обновлено: {}", updated_fields.join(", "))
        };
        Ok(ToolOutcome::ok_with(message, args.clone()))
    }

    pub(crate) async fn check_profile_complete(&self, user_id: i64) -> Result<ToolOutcome> {
        let Some(user) = self.store.get_user(user_id).await? else {
            return Ok(ToolOutcome::ok_with(
                "Профиль не заполнен",
                json!({"complete": false, "missing": ["имя", "рост", "вес", "цель"]}),
            ));
        };

        let mut missing: Vec<&str> = Vec::new();
        if user.first_name.is_none() {
            missing.push("имя");
        }
        if user.height_cm.is_none() {
            missing.push("рост");
        }
        if user.current_weight_kg.is_none() {
            missing.push("вес");
        }
        if user.goal.is_none() {
            missing.push("цель");
        }

        let message = if missing.is_empty() {
            "Профиль заполнен".to_string()
        } else {
            format!("Не хватает: {}", missing.join(", "))
        };
        Ok(ToolOutcome::ok_with(
            message,
            json!({"complete": missing.is_empty(), "missing": missing}),
        ))
    }

    pub(crate) async fn log_weight(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let weight_kg = args["weight_kg"].as_f64().unwrap_or(0.0);

        self.store
            .insert_weight(&WeightEntry {
                id: 0,
                user_id,
                weight_kg,
                note: None,
                created_at: now_unix(),
            })
            .await?;

        let mut user = self.store.ensure_user(user_id, None, None, &self.config).await?;
        user.current_weight_kg = Some(weight_kg);
        self.store.save_user(&user).await?;

        Ok(ToolOutcome::ok_with(
            format!("Вес записан: {weight_kg} кг"),
            json!({"weight_kg": weight_kg}),
        ))
    }

    pub(crate) async fn get_weight_history(&self, user_id: i64, args: &Value) -> Result<ToolOutcome> {
        let days = args["days"].as_i64().unwrap_or(7);
        let tz = self.user_tz(user_id).await?;

        let cutoff = now_unix() - days * 86_400;
        let entries = self.store.list_weights_since(user_id, cutoff).await?;

        let history: Vec<Value> = entries
            .iter()
            .map(|e| json!({"date": local_ddmm(tz, e.created_at), "weight": e.weight_kg}))
            .collect();

        let (change, trend) = if entries.len() >= 2 {
            let change = entries[0].weight_kg - entries[entries.len() - 1].weight_kg;
            let trend = if change < 0.0 {
                "снизился"
            } else if change > 0.0 {
                "вырос"
            } else {
                "не изменился"
            };
            (change, trend)
        } else {
            (0.0, "недостаточно данных")
        };

        Ok(ToolOutcome::ok_with(
            format!("История за {days} дней: {} записей, вес {trend}", entries.len()),
            json!({"history": history, "change": change, "trend": trend}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_executor, MockLlm};

    #[tokio::test]
    async fn test_update_profile_recalculates_goals() {
        let exec = test_executor("profile-goals", MockLlm::new(vec![])).await;

        // male, 30, 180 cm, 80 kg, losing weight:
        // bmr = 800 + 1125 - 150 + 5 = 1780, tdee = 2759, lose -> 2259
        let outcome = exec
            .execute(
                1,
                "update_profile",
                &json!({
                    "gender": "male",
                    "age": 30,
                    "height_cm": 180,
                    "current_weight_kg": 80.0,
                    "goal": "lose"
                }),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Обновлено: возраст, пол, рост, вес, цель");

        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.calorie_goal, 2259);
        assert_eq!(user.water_goal, 2600);
        assert_eq!(user.protein_goal, 128);
    }

    #[tokio::test]
    async fn test_update_profile_female_defaults_age() {
        let exec = test_executor("profile-female", MockLlm::new(vec![])).await;

        // female, age unknown (defaults to 30), 165 cm, 60 kg, gaining:
        // bmr = 600 + 1031.25 - 150 - 161 = 1320.25, tdee = 2046, gain -> 2346
        exec.execute(
            1,
            "update_profile",
            &json!({
                "gender": "female",
                "height_cm": 165,
                "current_weight_kg": 60.0,
                "goal": "gain"
            }),
        )
        .await;

        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.calorie_goal, 2346);
        assert_eq!(user.water_goal, 1900);
        assert_eq!(user.protein_goal, 96);
    }

    #[tokio::test]
    async fn test_explicit_calorie_goal_wins() {
        let exec = test_executor("profile-explicit", MockLlm::new(vec![])).await;
        exec.execute(
            1,
            "update_profile",
            &json!({"height_cm": 175, "current_weight_kg": 70.0, "calorie_goal": 1800}),
        )
        .await;

        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.calorie_goal, 1800);
    }

    #[tokio::test]
    async fn test_update_profile_timezone_validated() {
        let exec = test_executor("profile-tz", MockLlm::new(vec![])).await;

        let ok = exec
            .execute(1, "update_profile", &json!({"timezone": "Asia/Novosibirsk"}))
            .await;
        assert!(ok.success);
        assert_eq!(ok.message, "Обновлено: часовой пояс");
        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.timezone, "Asia/Novosibirsk");

        // a bad zone fails the call and leaves the stored one alone
        let bad = exec
            .execute(1, "update_profile", &json!({"timezone": "Moscow time"}))
            .await;
        assert!(!bad.success);
        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.timezone, "Asia/Novosibirsk");
    }

    #[tokio::test]
    async fn test_check_profile_complete() {
        let exec = test_executor("profile-check", MockLlm::new(vec![])).await;

        let empty = exec.execute(1, "check_profile_complete", &json!({})).await;
        assert_eq!(empty.message, "Профиль не заполнен");
        assert_eq!(empty.data.unwrap()["complete"], false);

        exec.execute(1, "update_profile", &json!({"first_name": "Аня", "height_cm": 165}))
            .await;
        let partial = exec.execute(1, "check_profile_complete", &json!({})).await;
        assert_eq!(partial.message, "Не хватает: вес, цель");

        exec.execute(1, "update_profile", &json!({"current_weight_kg": 60.0, "goal": "maintain"}))
            .await;
        let full = exec.execute(1, "check_profile_complete", &json!({})).await;
        assert_eq!(full.message, "Профиль заполнен");
        assert_eq!(full.data.unwrap()["complete"], true);
    }

    #[tokio::test]
    async fn test_log_weight_updates_profile() {
        let exec = test_executor("profile-weight", MockLlm::new(vec![])).await;

        let outcome = exec.execute(1, "log_weight", &json!({"weight_kg": 72.5})).await;
        assert_eq!(outcome.message, "Вес записан: 72.5 кг");

        let user = exec.store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.current_weight_kg, Some(72.5));
    }

    #[tokio::test]
    async fn test_weight_history_trend() {
        let exec = test_executor("profile-history", MockLlm::new(vec![])).await;

        let single = exec.execute(1, "get_weight_history", &json!({})).await;
        assert_eq!(single.message, "История за 7 дней: 0 записей, вес недостаточно данных");

        let now = now_unix();
        for (weight_kg, created_at) in [(74.0, now - 86_400 * 3), (73.2, now - 60)] {
            exec.store
                .insert_weight(&WeightEntry { id: 0, user_id: 1, weight_kg, note: None, created_at })
                .await
                .unwrap();
        }

        // newest entry comes first, so the change is latest minus oldest
        let history = exec.execute(1, "get_weight_history", &json!({"days": 30})).await;
        assert_eq!(history.message, "История за 30 дней: 2 записей, вес снизился");
        let data = history.data.unwrap();
        assert!((data["change"].as_f64().unwrap() - (-0.8)).abs() < 1e-9);
    }
}
