use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tonus_core::config::CoachConfig;
use tonus_core::error::Result;
use tonus_core::types::UserProfile;

use crate::clock::{day_window, resolve_timezone};
use crate::service::store::HealthStore;

/// Everything the system prompt and the stats tools need about a user's day.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub profile: Option<UserProfile>,
    /// Height and current weight are known, so goals can be computed.
    pub profile_complete: bool,
    pub timezone: Tz,
    pub calorie_goal: i64,
    pub water_goal: i64,
    pub protein_goal: i64,
    pub calories_today: i64,
    pub protein_today: f64,
    pub carbs_today: f64,
    pub fat_today: f64,
    pub meals_today: Vec<String>,
    pub water_today: i64,
    pub calories_burned_today: i64,
    pub activities_today: Vec<String>,
}

/// Snapshot a user's profile plus today's food, water and activity totals.
/// "Today" is the user's local calendar day.
pub async fn build_user_context(
    store: &HealthStore,
    config: &CoachConfig,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<UserContext> {
    let profile = store.get_user(user_id).await?;

    let timezone = match &profile {
        Some(p) => resolve_timezone(&p.timezone, &config.default_timezone),
        None => resolve_timezone(&config.default_timezone, "UTC"),
    };

    let (calorie_goal, water_goal, protein_goal) = match &profile {
        Some(p) => (p.calorie_goal, p.water_goal, p.protein_goal),
        None => (config.calorie_goal, config.water_goal, config.protein_goal),
    };

    let profile_complete = profile
        .as_ref()
        .map(|p| p.height_cm.is_some() && p.current_weight_kg.is_some())
        .unwrap_or(false);

    let (start, end) = day_window(timezone, now, 0);

    let foods = store.list_food(user_id, start, end).await?;
    let calories_today: i64 = foods.iter().map(|f| f.calories).sum();
    let protein_today: f64 = foods.iter().map(|f| f.protein).sum();
    let carbs_today: f64 = foods.iter().map(|f| f.carbs).sum();
    let fat_today: f64 = foods.iter().map(|f| f.fat).sum();
    let meals_today: Vec<String> = foods
        .iter()
        .filter(|f| !f.description.is_empty())
        .map(|f| f.description.clone())
        .collect();

    let water_today = store.sum_water(user_id, start, end).await?;

    let activities = store.list_activities(user_id, start, end).await?;
    let calories_burned_today: i64 = activities.iter().map(|a| a.calories_burned).sum();
    let activities_today: Vec<String> = activities
        .iter()
        .map(|a| format!("{}: {} ккал", a.activity_type, a.calories_burned))
        .collect();

    Ok(UserContext {
        profile,
        profile_complete,
        timezone,
        calorie_goal,
        water_goal,
        protein_goal,
        calories_today,
        protein_today,
        carbs_today,
        fat_today,
        meals_today,
        water_today,
        calories_burned_today,
        activities_today,
    })
}
