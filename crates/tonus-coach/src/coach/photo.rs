use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde_json::Value;
use tonus_core::error::{Result, TonusError};
use tonus_core::types::{now_unix, ActivityEntry, FoodEntry, ImageData};
use tonus_llm::provider::LlmProvider;
use tonus_telegram::types::TelegramMessage;

use crate::album::PendingAlbum;
use crate::coach::Coach;
use crate::service::context::{build_user_context, UserContext};
use crate::service::vision::{
    ambient_activity_name, analyze_album, analyze_photo, correct_food_analysis,
    estimate_tracker_calories,
};

const ANALYSIS_FAILED: &str = "❌ Ошибка при анализе фото.\n\nПопробуй:\n• Отправить другое фото\n• Сделать фото ближе\n• Написать что съел текстом";

/// Print a JSON number the way it was analyzed: integers without a decimal
/// point, floats as-is.
fn num(value: &Value) -> String {
    if let Some(i) = value.as_i64() {
        i.to_string()
    } else if let Some(f) = value.as_f64() {
        f.to_string()
    } else {
        "0".to_string()
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Card shown for an analyzed meal: dish, macros, what's left of today's
/// goals, and the model's health notes.
pub fn format_food_analysis(ctx: &UserContext, food_data: &Value, saved: bool) -> String {
    let total = &food_data["total"];
    let description = food_data["description"].as_str().unwrap_or("Анализ еды");

    let mut response = if saved {
        "✅ **Записано!**\n\n".to_string()
    } else {
        "📸 **Анализ фото**\n\n".to_string()
    };
    response.push_str(&format!("🍽 **{description}**\n\n"));

    response.push_str("📊 **КБЖУ:**\n");
    response.push_str(&format!("├ 🔥 Калории: {} ккал\n", num(&total["calories"])));
    response.push_str(&format!("├ 🥩 Белки: {} г\n", num(&total["protein"])));
    response.push_str(&format!("├ 🍞 Углеводы: {} г\n", num(&total["carbs"])));
    response.push_str(&format!("└ 🧈 Жиры: {} г\n", num(&total["fat"])));

    if total["fiber"].as_f64().unwrap_or(0.0) > 0.0 {
        response.push_str(&format!("    🥬 Клетчатка: {} г\n", num(&total["fiber"])));
    }

    let micro = &food_data["micronutrients"];
    if micro.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
        response.push_str("\n🧪 **Микроэлементы:**\n");
        if !micro["sodium_mg"].is_null() {
            response.push_str(&format!("├ Натрий: ~{} мг\n", num(&micro["sodium_mg"])));
        }
        if !micro["iron_mg"].is_null() {
            response.push_str(&format!("├ Железо: ~{} мг\n", num(&micro["iron_mg"])));
        }
        if let Some(info) = micro["vitamin_info"].as_str() {
            response.push_str(&format!("└ {info}\n"));
        }
    }

    let calories_left = (ctx.calorie_goal - ctx.calories_today).max(0);
    let protein_left = (ctx.protein_goal as f64 - ctx.protein_today).max(0.0);
    let water_left = (ctx.water_goal - ctx.water_today).max(0);

    response.push_str("\n📈 **Осталось на сегодня:**\n");
    response.push_str(&format!("├ Калории: {calories_left} / {} ккал\n", ctx.calorie_goal));
    response.push_str(&format!("├ Белок: {protein_left} / {} г\n", ctx.protein_goal));
    response.push_str(&format!("└ Вода: {water_left} / {} мл\n", ctx.water_goal));

    if let Some(notes) = food_data["health_notes"].as_str() {
        if !notes.is_empty() {
            response.push_str(&format!("\n💬 **Анализ:**\n{notes}"));
        }
    }

    let health_score = food_data["health_score"].as_i64().unwrap_or(5);
    if let Some(alternatives) = food_data["healthy_alternatives"].as_array() {
        if !alternatives.is_empty() && health_score < 7 {
            response.push_str("\n\n🥗 **ЗОЖ-альтернативы:**\n");
            for alt in alternatives.iter().take(3) {
                if let Some(alt) = alt.as_str() {
                    response.push_str(&format!("• {alt}\n"));
                }
            }
        }
    }

    response
}

impl<P: LlmProvider> Coach<P> {
    async fn download_photo(&self, file_id: &str) -> Result<ImageData> {
        let file = self.bot.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| TonusError::Telegram("file has no download path".to_string()))?;
        let bytes = self.bot.download_file(&path).await?;
        Ok(ImageData {
            mime_type: "image/jpeg".to_string(),
            base64: BASE64.encode(&bytes),
        })
    }

    /// A single photo: food gets analyzed and logged, a fitness tracker
    /// screenshot updates today's ambient activity.
    pub(crate) async fn handle_photo(&self, msg: &TelegramMessage) -> Result<()> {
        let chat_id = msg.chat.id;
        let Some(from) = &msg.from else { return Ok(()) };
        let user_id = from.id;
        let Some(largest) = msg.photo.as_ref().and_then(|sizes| sizes.last()) else {
            return Ok(());
        };

        let notice_id = self.bot.send_message_with_id(chat_id, "🔍 Анализирую фото...").await?;

        let analysis = match self.download_photo(&largest.file_id).await {
            Ok(image) => analyze_photo(&*self.llm, image).await,
            Err(e) => Err(e),
        };
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(e) => {
                log!(" [photo] user={user_id} analysis failed: {e}");
                self.bot.edit_message(chat_id, notice_id, ANALYSIS_FAILED).await?;
                return Ok(());
            }
        };

        match analysis["type"].as_str().unwrap_or("") {
            "fitness" => {
                let text = self.handle_fitness_photo(user_id, &analysis).await?;
                self.bot.delete_message(chat_id, notice_id).await?;
                self.bot.send_message(chat_id, &text).await?;
            }
            "food" => {
                self.save_food_entry(user_id, &analysis, Some(largest.file_id.clone()))
                    .await?;
                let ctx =
                    build_user_context(&self.store, &self.config, user_id, Utc::now()).await?;
                let text = format_food_analysis(&ctx, &analysis, true);
                self.bot.edit_message_formatted(chat_id, notice_id, &text).await?;
            }
            _ => {
                let description = analysis["description"].as_str().unwrap_or("");
                self.bot
                    .edit_message(
                        chat_id,
                        notice_id,
                        &format!("🤔 Это не похоже на еду или фитнес-трекер.\n\n{description}"),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// A coalesced media album, analyzed as one meal.
    pub(crate) async fn handle_album(&self, album: PendingAlbum) -> Result<()> {
        let user_id = album.user_id;
        let chat_id = album.chat_id;
        log!(
            " [photo] user={user_id} album of {} photos, caption: {:?}",
            album.photos.len(),
            album.caption
        );

        let notice_id = self
            .bot
            .send_message_with_id(chat_id, &format!("📸 Анализирую фото ({})...", album.photos.len()))
            .await?;

        let analysis = match self
            .analyze_album_photos(&album.photos, album.caption.as_deref())
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                log!(" [photo] user={user_id} album analysis failed: {e}");
                self.bot.edit_message(chat_id, notice_id, ANALYSIS_FAILED).await?;
                return Ok(());
            }
        };

        self.save_food_entry(user_id, &analysis, album.photos.first().cloned())
            .await?;
        let ctx = build_user_context(&self.store, &self.config, user_id, Utc::now()).await?;
        let text = format_food_analysis(&ctx, &analysis, true);
        self.bot.edit_message_formatted(chat_id, notice_id, &text).await?;
        Ok(())
    }

    async fn analyze_album_photos(&self, photos: &[String], caption: Option<&str>) -> Result<Value> {
        let mut images = Vec::with_capacity(photos.len());
        for file_id in photos {
            images.push(self.download_photo(file_id).await?);
        }
        analyze_album(&*self.llm, images, caption).await
    }

    /// Free-text correction of an analyzed meal, triggered by replying to
    /// the photo message. Returns the reply text, or None when the replied
    /// photo is not one of today's meals.
    pub(crate) async fn correct_photo_entry(
        &self,
        user_id: i64,
        file_id: &str,
        correction: &str,
    ) -> Result<Option<String>> {
        let (start, end) = self.executor.today_window(user_id).await?;
        let entries = self.store.list_food(user_id, start, end).await?;
        let Some(mut entry) = entries
            .into_iter()
            .rev()
            .find(|e| e.photo_file_id.as_deref() == Some(file_id))
        else {
            return Ok(None);
        };

        let original = entry
            .raw_analysis
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .unwrap_or_else(|| {
                serde_json::json!({
                    "type": "food",
                    "description": entry.description.clone(),
                    "total": {
                        "calories": entry.calories,
                        "protein": entry.protein,
                        "carbs": entry.carbs,
                        "fat": entry.fat,
                        "fiber": entry.fiber,
                    },
                })
            });

        log!(" [photo] user={user_id} correcting {:?}", entry.description);
        let corrected = correct_food_analysis(&*self.llm, &original, correction).await;

        let total = &corrected["total"];
        if let Some(description) = corrected["description"].as_str() {
            entry.description = description.to_string();
        }
        entry.calories = total["calories"].as_i64().unwrap_or(entry.calories);
        entry.protein = total["protein"].as_f64().unwrap_or(entry.protein);
        entry.carbs = total["carbs"].as_f64().unwrap_or(entry.carbs);
        entry.fat = total["fat"].as_f64().unwrap_or(entry.fat);
        entry.fiber = total["fiber"].as_f64().unwrap_or(entry.fiber);
        entry.raw_analysis =
            Some(serde_json::to_string(&corrected).unwrap_or_else(|_| corrected.to_string()));
        self.store.update_food(&entry).await?;

        let ctx = build_user_context(&self.store, &self.config, user_id, Utc::now()).await?;
        Ok(Some(format_food_analysis(&ctx, &corrected, true)))
    }

    /// Store an analyzed meal with the full analysis JSON alongside it.
    pub(crate) async fn save_food_entry(
        &self,
        user_id: i64,
        food_data: &Value,
        photo_file_id: Option<String>,
    ) -> Result<()> {
        let total = &food_data["total"];
        let raw = serde_json::to_string(food_data).unwrap_or_else(|_| food_data.to_string());

        self.store
            .insert_food(&FoodEntry {
                id: 0,
                user_id,
                description: food_data["description"].as_str().unwrap_or("Еда").to_string(),
                meal_type: food_data["meal_type"].as_str().map(|s| s.to_string()),
                calories: total["calories"].as_i64().unwrap_or(0),
                protein: total["protein"].as_f64().unwrap_or(0.0),
                carbs: total["carbs"].as_f64().unwrap_or(0.0),
                fat: total["fat"].as_f64().unwrap_or(0.0),
                fiber: total["fiber"].as_f64().unwrap_or(0.0),
                photo_file_id,
                raw_analysis: Some(raw),
                created_at: now_unix(),
            })
            .await?;
        Ok(())
    }

    /// Tracker screenshot: show what was read off it, then fold the numbers
    /// into today's single ambient activity row.
    pub(crate) async fn handle_fitness_photo(
        &self,
        user_id: i64,
        fitness_data: &Value,
    ) -> Result<String> {
        let device = fitness_data["device"].as_str().unwrap_or("фитнес-трекер");
        let activity = &fitness_data["activity_data"];
        let summary = fitness_data["summary"].as_str().unwrap_or("");

        let steps = activity["steps"].as_i64().filter(|&v| v > 0);
        let mut calories_burned = activity["calories_burned"].as_i64().filter(|&v| v > 0);
        let active_minutes = activity["active_minutes"].as_i64().filter(|&v| v > 0);
        let distance_km = activity["distance_km"].as_f64().filter(|&v| v > 0.0);
        let heart_rate = activity["heart_rate"].as_i64().filter(|&v| v > 0);
        let floors = activity["floors"].as_i64().filter(|&v| v > 0);

        let mut response = format!("⌚ **Данные с {device}**\n\n");
        if let Some(steps) = steps {
            response.push_str(&format!("👣 Шаги: {}\n", group_thousands(steps)));
        }
        if let Some(calories) = calories_burned {
            response.push_str(&format!("🔥 Сожжено: {calories} ккал\n"));
        }
        if let Some(minutes) = active_minutes {
            response.push_str(&format!("⏱ Активность: {minutes} мин\n"));
        }
        if let Some(distance) = distance_km {
            response.push_str(&format!("📍 Дистанция: {distance} км\n"));
        }
        if let Some(rate) = heart_rate {
            response.push_str(&format!("❤️ Пульс: {rate} уд/мин\n"));
        }
        if let Some(floors) = floors {
            response.push_str(&format!("🏢 Этажи: {floors}\n"));
        }

        if calories_burned.is_none()
            && (steps.is_some() || distance_km.is_some() || floors.is_some())
        {
            let estimated = estimate_tracker_calories(steps, floors, distance_km);
            if estimated > 0 {
                calories_burned = Some(estimated);
                response.push_str(&format!("\n📊 *Расчёт: ~{estimated} ккал*\n"));
            }
        }

        let workout_type = activity["workout_type"].as_str().filter(|s| !s.is_empty());
        let duration = activity["workout_duration_min"]
            .as_i64()
            .or(active_minutes)
            .unwrap_or(0);

        match calories_burned {
            Some(calories) => {
                let name = ambient_activity_name(workout_type, steps);
                let (start, end) = self.executor.today_window(user_id).await?;

                if let Some(existing) = self.store.find_ambient_activity(user_id, start, end).await? {
                    let old = existing.calories_burned;
                    self.store
                        .update_activity(existing.id, &name, duration, calories)
                        .await?;
                    response.push_str(&format!("\n🔄 **Обновлено: {name}**"));
                    response.push_str(&format!("\n🔥 Было: {old} ккал → Стало: {calories} ккал"));
                    if let Some(steps) = steps {
                        response.push_str(&format!(" ({} шагов)", group_thousands(steps)));
                    }
                } else {
                    self.store
                        .insert_activity(&ActivityEntry {
                            id: 0,
                            user_id,
                            activity_type: name.clone(),
                            duration_min: duration,
                            calories_burned: calories,
                            note: None,
                            is_ambient: true,
                            created_at: now_unix(),
                        })
                        .await?;
                    response.push_str(&format!("\n✅ **Записано: {name}**"));
                    response.push_str(&format!("\n🔥 Сожжено: -{calories} ккал"));
                    if let Some(steps) = steps {
                        response.push_str(&format!(" ({} шагов)", group_thousands(steps)));
                    }
                }
            }
            None => {
                response.push_str("\n\n💡 Не удалось определить активность.");
                response.push_str("\nОтправь скриншот с кольцами активности или шагами.");
            }
        }

        if !summary.is_empty() {
            response.push_str(&format!("\n\n📝 {summary}"));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::testutil::{test_coach, MockLlm};

    fn ctx_after_meal() -> UserContext {
        UserContext {
            profile: None,
            profile_complete: false,
            timezone: chrono_tz::Tz::Europe__Moscow,
            calorie_goal: 2000,
            water_goal: 2000,
            protein_goal: 100,
            calories_today: 650,
            protein_today: 30.0,
            carbs_today: 70.0,
            fat_today: 20.0,
            meals_today: vec!["паста карбонара".to_string()],
            water_today: 500,
            calories_burned_today: 0,
            activities_today: vec![],
        }
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(950), "950");
        assert_eq!(group_thousands(6000), "6,000");
        assert_eq!(group_thousands(12345), "12,345");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_format_food_analysis_saved() {
        let food = json!({
            "type": "food",
            "description": "Паста карбонара",
            "total": {"calories": 650, "protein": 30, "carbs": 70, "fat": 20, "fiber": 3},
            "health_notes": "Сытно, но жирновато.",
            "health_score": 5,
            "healthy_alternatives": ["паста с курицей", "цельнозерновая паста", "овощная лазанья", "ризотто"]
        });

        let text = format_food_analysis(&ctx_after_meal(), &food, true);
        assert!(text.starts_with("✅ **Записано!**\n\n🍽 **Паста карбонара**"));
        assert!(text.contains("├ 🔥 Калории: 650 ккал"));
        assert!(text.contains("    🥬 Клетчатка: 3 г"));
        assert!(text.contains("├ Калории: 1350 / 2000 ккал"));
        assert!(text.contains("├ Белок: 70 / 100 г"));
        assert!(text.contains("└ Вода: 1500 / 2000 мл"));
        assert!(text.contains("💬 **Анализ:**\nСытно, но жирновато."));
        // low health score shows at most three alternatives
        assert!(text.contains("🥗 **ЗОЖ-альтернативы:**"));
        assert!(text.contains("• овощная лазанья"));
        assert!(!text.contains("• ризотто"));
    }

    #[test]
    fn test_format_food_analysis_healthy_skips_alternatives() {
        let food = json!({
            "type": "food",
            "description": "Салат",
            "total": {"calories": 150, "protein": 5, "carbs": 10, "fat": 8},
            "health_score": 9,
            "healthy_alternatives": ["другой салат"]
        });

        let text = format_food_analysis(&ctx_after_meal(), &food, false);
        assert!(text.starts_with("📸 **Анализ фото**"));
        assert!(!text.contains("ЗОЖ-альтернативы"));
        assert!(!text.contains("Клетчатка"));
    }

    #[tokio::test]
    async fn test_fitness_photo_creates_then_updates_ambient_activity() {
        let coach = test_coach("photo-fitness", MockLlm::new(vec![])).await;

        // no calories on the screenshot: estimated from steps (6000 * 0.04)
        let morning = coach
            .handle_fitness_photo(
                1,
                &json!({
                    "type": "fitness",
                    "device": "Apple Watch",
                    "activity_data": {"steps": 6000}
                }),
            )
            .await
            .unwrap();
        assert!(morning.contains("⌚ **Данные с Apple Watch**"));
        assert!(morning.contains("👣 Шаги: 6,000"));
        assert!(morning.contains("📊 *Расчёт: ~240 ккал*"));
        assert!(morning.contains("✅ **Записано: ходьба**"));
        assert!(morning.contains("🔥 Сожжено: -240 ккал (6,000 шагов)"));

        // evening screenshot folds into the same row instead of adding one
        let evening = coach
            .handle_fitness_photo(
                1,
                &json!({
                    "type": "fitness",
                    "activity_data": {"steps": 12000, "calories_burned": 520}
                }),
            )
            .await
            .unwrap();
        assert!(evening.contains("🔄 **Обновлено: активный день**"));
        assert!(evening.contains("🔥 Было: 240 ккал → Стало: 520 ккал (12,000 шагов)"));

        let listed = coach.executor.execute(1, "get_today_activities", &json!({})).await;
        assert_eq!(listed.message, "Сегодня записано 1 активностей, всего сожжено 520 ккал");
    }

    #[tokio::test]
    async fn test_fitness_photo_without_numbers() {
        let coach = test_coach("photo-nodata", MockLlm::new(vec![])).await;
        let text = coach
            .handle_fitness_photo(
                1,
                &json!({"type": "fitness", "activity_data": {"heart_rate": 72}}),
            )
            .await
            .unwrap();
        assert!(text.contains("❤️ Пульс: 72 уд/мин"));
        assert!(text.contains("💡 Не удалось определить активность."));
    }

    #[tokio::test]
    async fn test_correct_photo_entry_revises_saved_meal() {
        let coach = test_coach(
            "photo-correct",
            MockLlm::new(vec![MockLlm::text(
                r#"{"description": "Борщ без сметаны", "total": {"calories": 320, "protein": 14, "carbs": 30, "fat": 12, "fiber": 4}}"#,
            )]),
        )
        .await;

        coach
            .save_food_entry(
                1,
                &json!({
                    "type": "food",
                    "description": "Борщ со сметаной",
                    "total": {"calories": 420, "protein": 15, "carbs": 30, "fat": 22, "fiber": 4}
                }),
                Some("file123".to_string()),
            )
            .await
            .unwrap();

        // replying to some other photo is not a correction
        let miss = coach.correct_photo_entry(1, "unknown-file", "без сметаны").await.unwrap();
        assert!(miss.is_none());

        let reply = coach
            .correct_photo_entry(1, "file123", "без сметаны")
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("Борщ без сметаны"));
        assert!(reply.contains("├ 🔥 Калории: 320 ккал"));

        // the stored entry was revised in place, not duplicated
        let listed = coach.executor.execute(1, "list_today_food", &json!({})).await;
        assert_eq!(listed.message, "Найдено 1 записей, всего 320 ккал");
    }

    #[tokio::test]
    async fn test_save_food_entry_defaults() {
        let coach = test_coach("photo-save", MockLlm::new(vec![])).await;
        coach
            .save_food_entry(
                1,
                &json!({
                    "type": "food",
                    "description": "Борщ со сметаной",
                    "meal_type": "lunch",
                    "total": {"calories": 420, "protein": 15.5, "carbs": 30.0, "fat": 22.0, "fiber": 4.0}
                }),
                Some("file123".to_string()),
            )
            .await
            .unwrap();

        let listed = coach.executor.execute(1, "list_today_food", &json!({})).await;
        assert_eq!(listed.message, "Найдено 1 записей, всего 420 ккал");
        let data = listed.data.unwrap();
        assert_eq!(data["entries"][0]["description"], "Борщ со сметаной");
        assert_eq!(data["entries"][0]["protein"], 15.5);
    }
}
