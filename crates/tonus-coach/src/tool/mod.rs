pub mod activity;
pub mod food;
pub mod memory_tool;
pub mod profile;
pub mod stats;
pub mod water;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tonus_core::config::CoachConfig;
use tonus_core::error::Result;
use tonus_core::types::ToolDefinition;
use tonus_llm::provider::LlmProvider;

use crate::clock::{day_window, resolve_timezone};
use crate::service::memory::MemoryStore;
use crate::service::store::HealthStore;

/// Every tool the model may call. A closed set: anything outside it is
/// rejected as a failed call instead of being guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    LogFood,
    LogWater,
    LogWeight,
    LogActivity,
    GetTodayStats,
    GetWeightHistory,
    RememberFact,
    UpdateProfile,
    CheckProfileComplete,
    GetTodayActivities,
    UpdateDailyActivity,
    ClearTodayActivities,
    ListTodayFood,
    DeleteFoodEntry,
    UpdateFoodEntry,
    ClearTodayFood,
    ListTodayWater,
    ClearTodayWater,
    SetTodayWater,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "log_food" => Self::LogFood,
            "log_water" => Self::LogWater,
            "log_weight" => Self::LogWeight,
            "log_activity" => Self::LogActivity,
            "get_today_stats" => Self::GetTodayStats,
            "get_weight_history" => Self::GetWeightHistory,
            "remember_fact" => Self::RememberFact,
            "update_profile" => Self::UpdateProfile,
            "check_profile_complete" => Self::CheckProfileComplete,
            "get_today_activities" => Self::GetTodayActivities,
            "update_daily_activity" => Self::UpdateDailyActivity,
            "clear_today_activities" => Self::ClearTodayActivities,
            "list_today_food" => Self::ListTodayFood,
            "delete_food_entry" => Self::DeleteFoodEntry,
            "update_food_entry" => Self::UpdateFoodEntry,
            "clear_today_food" => Self::ClearTodayFood,
            "list_today_water" => Self::ListTodayWater,
            "clear_today_water" => Self::ClearTodayWater,
            "set_today_water" => Self::SetTodayWater,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LogFood => "log_food",
            Self::LogWater => "log_water",
            Self::LogWeight => "log_weight",
            Self::LogActivity => "log_activity",
            Self::GetTodayStats => "get_today_stats",
            Self::GetWeightHistory => "get_weight_history",
            Self::RememberFact => "remember_fact",
            Self::UpdateProfile => "update_profile",
            Self::CheckProfileComplete => "check_profile_complete",
            Self::GetTodayActivities => "get_today_activities",
            Self::UpdateDailyActivity => "update_daily_activity",
            Self::ClearTodayActivities => "clear_today_activities",
            Self::ListTodayFood => "list_today_food",
            Self::DeleteFoodEntry => "delete_food_entry",
            Self::UpdateFoodEntry => "update_food_entry",
            Self::ClearTodayFood => "clear_today_food",
            Self::ListTodayWater => "list_today_water",
            Self::ClearTodayWater => "clear_today_water",
            Self::SetTodayWater => "set_today_water",
        }
    }
}

/// Tool definitions sent to the model on every turn.
pub fn catalog() -> Vec<ToolDefinition> {
    fn def(name: &str, description: &str, parameters: Value) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    vec![
        def(
            "log_food",
            "Записать приём пищи. Используй когда пользователь говорит что съел.",
            json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string", "description": "Что съел (название блюда)"},
                    "calories": {"type": "integer", "description": "Калории"},
                    "protein": {"type": "number", "description": "Белки в граммах"},
                    "carbs": {"type": "number", "description": "Углеводы в граммах"},
                    "fat": {"type": "number", "description": "Жиры в граммах"},
                    "fiber": {"type": "number", "description": "Клетчатка в граммах"},
                    "meal_type": {
                        "type": "string",
                        "enum": ["breakfast", "lunch", "dinner", "snack"],
                        "description": "Тип приёма пищи"
                    }
                },
                "required": ["description", "calories"]
            }),
        ),
        def(
            "log_water",
            "Записать воду. Используй когда пользователь говорит что выпил воду/чай/кофе/напиток.",
            json!({
                "type": "object",
                "properties": {
                    "amount_ml": {"type": "integer", "description": "Количество в мл"}
                },
                "required": ["amount_ml"]
            }),
        ),
        def(
            "log_weight",
            "Записать вес пользователя.",
            json!({
                "type": "object",
                "properties": {
                    "weight_kg": {"type": "number", "description": "Вес в килограммах"}
                },
                "required": ["weight_kg"]
            }),
        ),
        def(
            "log_activity",
            "Записать активность/тренировку.",
            json!({
                "type": "object",
                "properties": {
                    "activity_type": {"type": "string", "description": "Тип активности (бег, ходьба, тренировка и т.д.)"},
                    "duration_minutes": {"type": "integer", "description": "Длительность в минутах"},
                    "calories_burned": {"type": "integer", "description": "Сожжённые калории (если известно)"}
                },
                "required": ["activity_type", "duration_minutes"]
            }),
        ),
        def(
            "get_today_stats",
            "Получить статистику за сегодня. Используй когда нужно узнать сколько съедено/выпито.",
            json!({"type": "object", "properties": {}}),
        ),
        def(
            "get_weight_history",
            "Получить историю веса за последние N дней.",
            json!({
                "type": "object",
                "properties": {
                    "days": {"type": "integer", "description": "Количество дней", "default": 7}
                }
            }),
        ),
        def(
            "remember_fact",
            "Запомнить важный факт о пользователе (привычка, предпочтение, ограничение в питании, цель).",
            json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": ["preference", "habit", "restriction", "goal", "fact"],
                        "description": "Категория: preference (предпочтение), habit (привычка), restriction (ограничение), goal (цель), fact (факт)"
                    },
                    "content": {"type": "string", "description": "Текст факта (например: 'не ест молочку', 'вегетарианец')"}
                },
                "required": ["category", "content"]
            }),
        ),
        def(
            "update_profile",
            "Обновить профиль пользователя (имя, возраст, рост, вес, цель и т.д.)",
            json!({
                "type": "object",
                "properties": {
                    "first_name": {"type": "string", "description": "Имя пользователя"},
                    "age": {"type": "integer", "description": "Возраст"},
                    "gender": {"type": "string", "enum": ["male", "female"], "description": "Пол"},
                    "height_cm": {"type": "integer", "description": "Рост в сантиметрах"},
                    "current_weight_kg": {"type": "number", "description": "Текущий вес"},
                    "target_weight_kg": {"type": "number", "description": "Целевой вес"},
                    "calorie_goal": {"type": "integer", "description": "Цель по калориям"},
                    "water_goal": {"type": "integer", "description": "Цель по воде в мл"},
                    "goal": {
                        "type": "string",
                        "enum": ["lose", "gain", "maintain", "health"],
                        "description": "Цель: lose (похудеть), gain (набрать), maintain (поддерживать), health (здоровье)"
                    },
                    "timezone": {"type": "string", "description": "Часовой пояс IANA (например Europe/Moscow или Asia/Novosibirsk)"}
                }
            }),
        ),
        def(
            "check_profile_complete",
            "Проверить, заполнен ли профиль пользователя (есть ли рост/вес для расчётов)",
            json!({"type": "object", "properties": {}}),
        ),
        def(
            "get_today_activities",
            "Получить список активностей за сегодня. Используй чтобы узнать что уже записано.",
            json!({"type": "object", "properties": {}}),
        ),
        def(
            "update_daily_activity",
            "Обновить или установить дневную активность (сожжённые калории). Используй когда пользователь хочет исправить калории активности или указывает что данные неверные.",
            json!({
                "type": "object",
                "properties": {
                    "calories_burned": {"type": "integer", "description": "Правильное количество сожжённых калорий"},
                    "activity_type": {"type": "string", "description": "Тип активности (ходьба, бег, тренировка)"},
                    "reason": {"type": "string", "description": "Почему меняем (например: 'пользователь указал на ошибку')"}
                },
                "required": ["calories_burned"]
            }),
        ),
        def(
            "clear_today_activities",
            "Удалить все активности за сегодня. Используй если пользователь говорит что данные неверные и нужно сбросить.",
            json!({
                "type": "object",
                "properties": {
                    "confirm": {"type": "boolean", "description": "Подтверждение удаления"}
                },
                "required": ["confirm"]
            }),
        ),
        def(
            "list_today_food",
            "Показать все записи еды за сегодня с номерами. Используй когда пользователь хочет посмотреть что записано или исправить.",
            json!({"type": "object", "properties": {}}),
        ),
        def(
            "delete_food_entry",
            "Удалить запись еды. Используй когда пользователь говорит удалить конкретную еду (по номеру или описанию).",
            json!({
                "type": "object",
                "properties": {
                    "entry_number": {"type": "integer", "description": "Номер записи из списка (1, 2, 3...)"},
                    "description_match": {"type": "string", "description": "Часть описания для поиска (например 'яичница' или 'мороженое')"}
                }
            }),
        ),
        def(
            "update_food_entry",
            "Изменить запись еды. Используй когда пользователь хочет исправить калории или описание конкретной еды.",
            json!({
                "type": "object",
                "properties": {
                    "entry_number": {"type": "integer", "description": "Номер записи из списка"},
                    "description_match": {"type": "string", "description": "Часть описания для поиска"},
                    "new_description": {"type": "string", "description": "Новое описание"},
                    "new_calories": {"type": "integer", "description": "Новые калории"},
                    "new_protein": {"type": "number", "description": "Новый белок"},
                    "new_carbs": {"type": "number", "description": "Новые углеводы"},
                    "new_fat": {"type": "number", "description": "Новые жиры"}
                }
            }),
        ),
        def(
            "clear_today_food",
            "Удалить ВСЕ записи еды за сегодня. Используй ТОЛЬКО если пользователь явно просит сбросить всё.",
            json!({
                "type": "object",
                "properties": {
                    "confirm": {"type": "boolean", "description": "Подтверждение удаления"}
                },
                "required": ["confirm"]
            }),
        ),
        def(
            "list_today_water",
            "Показать все записи воды за сегодня.",
            json!({"type": "object", "properties": {}}),
        ),
        def(
            "clear_today_water",
            "Удалить ВСЕ записи воды за сегодня. Используй если пользователь хочет сбросить воду.",
            json!({
                "type": "object",
                "properties": {
                    "confirm": {"type": "boolean", "description": "Подтверждение удаления"}
                },
                "required": ["confirm"]
            }),
        ),
        def(
            "set_today_water",
            "Установить конкретное количество воды за сегодня (сбросить и записать новое значение).",
            json!({
                "type": "object",
                "properties": {
                    "amount_ml": {"type": "integer", "description": "Количество воды в мл"}
                },
                "required": ["amount_ml"]
            }),
        ),
    ]
}

/// Result of a tool call, serialized as-is into the tool_result block.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, data: None, message: message.into() }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self { success: true, data: Some(data), message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, data: None, message: message.into() }
    }
}

/// Executes tool calls against the stores. One instance serves all users;
/// every call is scoped by user_id.
pub struct ToolExecutor<P> {
    pub(crate) store: Arc<HealthStore>,
    pub(crate) memory: Arc<MemoryStore>,
    pub(crate) llm: Arc<P>,
    pub(crate) config: CoachConfig,
}

impl<P: LlmProvider> ToolExecutor<P> {
    pub fn new(
        store: Arc<HealthStore>,
        memory: Arc<MemoryStore>,
        llm: Arc<P>,
        config: CoachConfig,
    ) -> Self {
        Self { store, memory, llm, config }
    }

    /// Execute one tool call. Never fails the turn: unknown tools and
    /// internal errors both become failure outcomes the model can read.
    pub async fn execute(&self, user_id: i64, name: &str, args: &Value) -> ToolOutcome {
        let Some(kind) = ToolKind::from_name(name) else {
            log!(" [tool] unknown tool {name:?} user={user_id}");
            return ToolOutcome::fail(format!("Неизвестный инструмент: {name}"));
        };

        match self.dispatch(user_id, kind, args).await {
            Ok(outcome) => {
                log!(" [tool] {} user={user_id} | {}", kind.name(), outcome.message);
                outcome
            }
            Err(e) => {
                log!(" [tool] {} user={user_id} failed: {e}", kind.name());
                ToolOutcome::fail(e.to_string())
            }
        }
    }

    async fn dispatch(&self, user_id: i64, kind: ToolKind, args: &Value) -> Result<ToolOutcome> {
        match kind {
            ToolKind::LogFood => self.log_food(user_id, args).await,
            ToolKind::LogWater => self.log_water(user_id, args).await,
            ToolKind::LogWeight => self.log_weight(user_id, args).await,
            ToolKind::LogActivity => self.log_activity(user_id, args).await,
            ToolKind::GetTodayStats => self.get_today_stats(user_id).await,
            ToolKind::GetWeightHistory => self.get_weight_history(user_id, args).await,
            ToolKind::RememberFact => self.remember_fact(user_id, args).await,
            ToolKind::UpdateProfile => self.update_profile(user_id, args).await,
            ToolKind::CheckProfileComplete => self.check_profile_complete(user_id).await,
            ToolKind::GetTodayActivities => self.get_today_activities(user_id).await,
            ToolKind::UpdateDailyActivity => self.update_daily_activity(user_id, args).await,
            ToolKind::ClearTodayActivities => self.clear_today_activities(user_id, args).await,
            ToolKind::ListTodayFood => self.list_today_food(user_id).await,
            ToolKind::DeleteFoodEntry => self.delete_food_entry(user_id, args).await,
            ToolKind::UpdateFoodEntry => self.update_food_entry(user_id, args).await,
            ToolKind::ClearTodayFood => self.clear_today_food(user_id, args).await,
            ToolKind::ListTodayWater => self.list_today_water(user_id).await,
            ToolKind::ClearTodayWater => self.clear_today_water(user_id, args).await,
            ToolKind::SetTodayWater => self.set_today_water(user_id, args).await,
        }
    }

    /// The user's effective timezone.
    pub(crate) async fn user_tz(&self, user_id: i64) -> Result<chrono_tz::Tz> {
        Ok(match self.store.get_user(user_id).await? {
            Some(user) => resolve_timezone(&user.timezone, &self.config.default_timezone),
            None => resolve_timezone(&self.config.default_timezone, "UTC"),
        })
    }

    /// Today's [start, end) UTC window in the user's timezone.
    pub(crate) async fn today_window(&self, user_id: i64) -> Result<(i64, i64)> {
        Ok(day_window(self.user_tz(user_id).await?, Utc::now(), 0))
    }

    /// Destructive bulk tools require an explicit confirm flag from the model.
    pub(crate) fn check_confirm(args: &Value) -> Option<ToolOutcome> {
        if args["confirm"].as_bool() == Some(true) {
            None
        } else {
            Some(ToolOutcome::fail("Требуется подтверждение (confirm: true)"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_executor, MockLlm};

    #[test]
    fn test_catalog_matches_tool_kinds() {
        let defs = catalog();
        assert_eq!(defs.len(), 19);
        for def in &defs {
            let kind = ToolKind::from_name(&def.name);
            assert!(kind.is_some(), "no ToolKind for {}", def.name);
            assert_eq!(kind.unwrap().name(), def.name);
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert!(ToolKind::from_name("drop_all_tables").is_none());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_fails_closed() {
        let exec = test_executor("unknown-tool", MockLlm::new(vec![])).await;
        let outcome = exec.execute(1, "launch_rocket", &serde_json::json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("Неизвестный инструмент"));
    }

    #[test]
    fn test_confirm_gate() {
        assert!(ToolExecutor::<MockLlm>::check_confirm(&serde_json::json!({})).is_some());
        assert!(
            ToolExecutor::<MockLlm>::check_confirm(&serde_json::json!({"confirm": false}))
                .is_some()
        );
        assert!(
            ToolExecutor::<MockLlm>::check_confirm(&serde_json::json!({"confirm": true})).is_none()
        );
    }
}
