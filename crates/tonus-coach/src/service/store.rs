use libsql::{Builder, Connection, Database};
use tonus_core::config::CoachConfig;
use tonus_core::error::{Result, TonusError};
use tonus_core::types::*;

/// All health-tracking tables: profiles, food, water, weight, activities,
/// plus a small key/value table for bot state (long-poll offset).
pub struct HealthStore {
    db: Database,
}

fn map_err(e: libsql::Error) -> TonusError {
    TonusError::Database(e.to_string())
}

const MAX_DB_RETRIES: u32 = 3;

fn is_transient_db_error(err: &TonusError) -> bool {
    match err {
        TonusError::Database(msg) => {
            msg.contains("Bad Gateway")
                || msg.contains("Service Unavailable")
                || msg.contains("Gateway Timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
                || msg.contains("STREAM_EXPIRED")
        }
        _ => false,
    }
}

/// Retry an async database operation with exponential backoff on transient errors.
pub(crate) async fn with_retry<F, Fut, T>(f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=MAX_DB_RETRIES {
        if attempt > 0 {
            let delay = std::time::Duration::from_secs(1 << (attempt - 1));
            log!(" [db] retry {attempt}/{MAX_DB_RETRIES} in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if is_transient_db_error(&e) && attempt < MAX_DB_RETRIES => {
                log!(" [db] transient error: {e}");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap())
}

fn user_from_row(row: &libsql::Row) -> Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get::<i64>(0).map_err(map_err)?,
        username: row.get::<Option<String>>(1).map_err(map_err)?,
        first_name: row.get::<Option<String>>(2).map_err(map_err)?,
        country: row.get::<Option<String>>(3).map_err(map_err)?,
        age: row.get::<Option<i64>>(4).map_err(map_err)?,
        gender: row.get::<Option<String>>(5).map_err(map_err)?,
        goal: row.get::<Option<String>>(6).map_err(map_err)?,
        height_cm: row.get::<Option<i64>>(7).map_err(map_err)?,
        current_weight_kg: row.get::<Option<f64>>(8).map_err(map_err)?,
        target_weight_kg: row.get::<Option<f64>>(9).map_err(map_err)?,
        calorie_goal: row.get::<i64>(10).map_err(map_err)?,
        water_goal: row.get::<i64>(11).map_err(map_err)?,
        protein_goal: row.get::<i64>(12).map_err(map_err)?,
        remind_water: row.get::<i64>(13).map_err(map_err)? != 0,
        remind_food: row.get::<i64>(14).map_err(map_err)? != 0,
        remind_weight: row.get::<i64>(15).map_err(map_err)? != 0,
        timezone: row.get::<String>(16).map_err(map_err)?,
        created_at: row.get::<i64>(17).map_err(map_err)?,
    })
}

const USER_COLUMNS: &str = "user_id, username, first_name, country, age, gender, goal, height_cm, current_weight_kg, target_weight_kg, calorie_goal, water_goal, protein_goal, remind_water, remind_food, remind_weight, timezone, created_at";

fn food_from_row(row: &libsql::Row) -> Result<FoodEntry> {
    Ok(FoodEntry {
        id: row.get::<i64>(0).map_err(map_err)?,
        user_id: row.get::<i64>(1).map_err(map_err)?,
        description: row.get::<String>(2).map_err(map_err)?,
        meal_type: row.get::<Option<String>>(3).map_err(map_err)?,
        calories: row.get::<i64>(4).map_err(map_err)?,
        protein: row.get::<f64>(5).map_err(map_err)?,
        carbs: row.get::<f64>(6).map_err(map_err)?,
        fat: row.get::<f64>(7).map_err(map_err)?,
        fiber: row.get::<f64>(8).map_err(map_err)?,
        photo_file_id: row.get::<Option<String>>(9).map_err(map_err)?,
        raw_analysis: row.get::<Option<String>>(10).map_err(map_err)?,
        created_at: row.get::<i64>(11).map_err(map_err)?,
    })
}

const FOOD_COLUMNS: &str = "id, user_id, description, meal_type, calories, protein, carbs, fat, fiber, photo_file_id, raw_analysis, created_at";

fn activity_from_row(row: &libsql::Row) -> Result<ActivityEntry> {
    Ok(ActivityEntry {
        id: row.get::<i64>(0).map_err(map_err)?,
        user_id: row.get::<i64>(1).map_err(map_err)?,
        activity_type: row.get::<String>(2).map_err(map_err)?,
        duration_min: row.get::<i64>(3).map_err(map_err)?,
        calories_burned: row.get::<i64>(4).map_err(map_err)?,
        note: row.get::<Option<String>>(5).map_err(map_err)?,
        is_ambient: row.get::<i64>(6).map_err(map_err)? != 0,
        created_at: row.get::<i64>(7).map_err(map_err)?,
    })
}

const ACTIVITY_COLUMNS: &str =
    "id, user_id, activity_type, duration_min, calories_burned, note, is_ambient, created_at";

impl HealthStore {
    /// Open a local libsql database at the given file path.
    pub async fn new(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Open a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    /// Get a fresh database connection. For remote databases this creates
    /// a new Hrana stream, avoiding STREAM_EXPIRED errors.
    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(map_err)
    }

    async fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                country TEXT,
                age INTEGER,
                gender TEXT,
                goal TEXT,
                height_cm INTEGER,
                current_weight_kg REAL,
                target_weight_kg REAL,
                calorie_goal INTEGER NOT NULL,
                water_goal INTEGER NOT NULL,
                protein_goal INTEGER NOT NULL,
                remind_water INTEGER NOT NULL DEFAULT 1,
                remind_food INTEGER NOT NULL DEFAULT 1,
                remind_weight INTEGER NOT NULL DEFAULT 1,
                timezone TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS food_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                meal_type TEXT,
                calories INTEGER NOT NULL DEFAULT 0,
                protein REAL NOT NULL DEFAULT 0,
                carbs REAL NOT NULL DEFAULT 0,
                fat REAL NOT NULL DEFAULT 0,
                fiber REAL NOT NULL DEFAULT 0,
                photo_file_id TEXT,
                raw_analysis TEXT,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS water_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount_ml INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS weight_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                weight_kg REAL NOT NULL,
                note TEXT,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS activity_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                activity_type TEXT NOT NULL,
                duration_min INTEGER NOT NULL DEFAULT 0,
                calories_burned INTEGER NOT NULL DEFAULT 0,
                note TEXT,
                is_ambient INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        Ok(())
    }

    // ─── Users ───────────────────────────────────────────────────────

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let mut rows = self
            .conn()?
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?"),
                libsql::params![user_id],
            )
            .await
            .map_err(map_err)?;

        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Get the user, creating a fresh profile with configured defaults on
    /// first contact.
    pub async fn ensure_user(
        &self,
        user_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        defaults: &CoachConfig,
    ) -> Result<UserProfile> {
        if let Some(user) = self.get_user(user_id).await? {
            return Ok(user);
        }

        let user = UserProfile {
            user_id,
            username: username.map(|s| s.to_string()),
            first_name: first_name.map(|s| s.to_string()),
            country: None,
            age: None,
            gender: None,
            goal: None,
            height_cm: None,
            current_weight_kg: None,
            target_weight_kg: None,
            calorie_goal: defaults.calorie_goal,
            water_goal: defaults.water_goal,
            protein_goal: defaults.protein_goal,
            remind_water: true,
            remind_food: true,
            remind_weight: true,
            timezone: defaults.default_timezone.clone(),
            created_at: now_unix(),
        };
        self.insert_user(&user).await?;
        log!(" [store] new user {user_id}");
        Ok(user)
    }

    async fn insert_user(&self, user: &UserProfile) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                    libsql::params![
                        user.user_id,
                        user.username.clone(),
                        user.first_name.clone(),
                        user.country.clone(),
                        user.age,
                        user.gender.clone(),
                        user.goal.clone(),
                        user.height_cm,
                        user.current_weight_kg,
                        user.target_weight_kg,
                        user.calorie_goal,
                        user.water_goal,
                        user.protein_goal,
                        user.remind_water as i64,
                        user.remind_food as i64,
                        user.remind_weight as i64,
                        user.timezone.clone(),
                        user.created_at,
                    ],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    /// Persist every mutable profile field.
    pub async fn save_user(&self, user: &UserProfile) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    "UPDATE users SET username = ?, first_name = ?, country = ?, age = ?, gender = ?, goal = ?, height_cm = ?, current_weight_kg = ?, target_weight_kg = ?, calorie_goal = ?, water_goal = ?, protein_goal = ?, remind_water = ?, remind_food = ?, remind_weight = ?, timezone = ? WHERE user_id = ?",
                    libsql::params![
                        user.username.clone(),
                        user.first_name.clone(),
                        user.country.clone(),
                        user.age,
                        user.gender.clone(),
                        user.goal.clone(),
                        user.height_cm,
                        user.current_weight_kg,
                        user.target_weight_kg,
                        user.calorie_goal,
                        user.water_goal,
                        user.protein_goal,
                        user.remind_water as i64,
                        user.remind_food as i64,
                        user.remind_weight as i64,
                        user.timezone.clone(),
                        user.user_id,
                    ],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    // ─── Food ────────────────────────────────────────────────────────

    /// Insert a food entry, returning its row id.
    pub async fn insert_food(&self, entry: &FoodEntry) -> Result<i64> {
        with_retry(|| async {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO food_entries (user_id, description, meal_type, calories, protein, carbs, fat, fiber, photo_file_id, raw_analysis, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    entry.user_id,
                    entry.description.clone(),
                    entry.meal_type.clone(),
                    entry.calories,
                    entry.protein,
                    entry.carbs,
                    entry.fat,
                    entry.fiber,
                    entry.photo_file_id.clone(),
                    entry.raw_analysis.clone(),
                    entry.created_at,
                ],
            )
            .await
            .map_err(map_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Food entries inside a UTC window, oldest first.
    pub async fn list_food(&self, user_id: i64, start: i64, end: i64) -> Result<Vec<FoodEntry>> {
        let mut rows = self
            .conn()?
            .query(
                &format!("SELECT {FOOD_COLUMNS} FROM food_entries WHERE user_id = ? AND created_at >= ? AND created_at < ? ORDER BY created_at ASC"),
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            entries.push(food_from_row(&row)?);
        }
        Ok(entries)
    }

    pub async fn update_food(&self, entry: &FoodEntry) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE food_entries SET description = ?, meal_type = ?, calories = ?, protein = ?, carbs = ?, fat = ?, fiber = ?, raw_analysis = ? WHERE id = ? AND user_id = ?",
                libsql::params![
                    entry.description.clone(),
                    entry.meal_type.clone(),
                    entry.calories,
                    entry.protein,
                    entry.carbs,
                    entry.fat,
                    entry.fiber,
                    entry.raw_analysis.clone(),
                    entry.id,
                    entry.user_id,
                ],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    pub async fn delete_food(&self, user_id: i64, id: i64) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM food_entries WHERE id = ? AND user_id = ?",
                libsql::params![id, user_id],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    /// Delete all food entries inside a window, returning how many were removed.
    pub async fn clear_food(&self, user_id: i64, start: i64, end: i64) -> Result<u64> {
        self.conn()?
            .execute(
                "DELETE FROM food_entries WHERE user_id = ? AND created_at >= ? AND created_at < ?",
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)
    }

    // ─── Water ───────────────────────────────────────────────────────

    pub async fn insert_water(&self, entry: &WaterEntry) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT INTO water_entries (user_id, amount_ml, created_at) VALUES (?, ?, ?)",
                    libsql::params![entry.user_id, entry.amount_ml, entry.created_at],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    pub async fn list_water(&self, user_id: i64, start: i64, end: i64) -> Result<Vec<WaterEntry>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, user_id, amount_ml, created_at FROM water_entries WHERE user_id = ? AND created_at >= ? AND created_at < ? ORDER BY created_at ASC",
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            entries.push(WaterEntry {
                id: row.get::<i64>(0).map_err(map_err)?,
                user_id: row.get::<i64>(1).map_err(map_err)?,
                amount_ml: row.get::<i64>(2).map_err(map_err)?,
                created_at: row.get::<i64>(3).map_err(map_err)?,
            });
        }
        Ok(entries)
    }

    pub async fn sum_water(&self, user_id: i64, start: i64, end: i64) -> Result<i64> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT COALESCE(SUM(amount_ml), 0) FROM water_entries WHERE user_id = ? AND created_at >= ? AND created_at < ?",
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)?;

        match rows.next().await.map_err(map_err)? {
            Some(row) => row.get::<i64>(0).map_err(map_err),
            None => Ok(0),
        }
    }

    pub async fn clear_water(&self, user_id: i64, start: i64, end: i64) -> Result<u64> {
        self.conn()?
            .execute(
                "DELETE FROM water_entries WHERE user_id = ? AND created_at >= ? AND created_at < ?",
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)
    }

    // ─── Weight ──────────────────────────────────────────────────────

    pub async fn insert_weight(&self, entry: &WeightEntry) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT INTO weight_entries (user_id, weight_kg, note, created_at) VALUES (?, ?, ?, ?)",
                    libsql::params![
                        entry.user_id,
                        entry.weight_kg,
                        entry.note.clone(),
                        entry.created_at,
                    ],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    /// Weight entries recorded at or after `cutoff`, newest first.
    pub async fn list_weights_since(&self, user_id: i64, cutoff: i64) -> Result<Vec<WeightEntry>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, user_id, weight_kg, note, created_at FROM weight_entries WHERE user_id = ? AND created_at >= ? ORDER BY created_at DESC",
                libsql::params![user_id, cutoff],
            )
            .await
            .map_err(map_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            entries.push(WeightEntry {
                id: row.get::<i64>(0).map_err(map_err)?,
                user_id: row.get::<i64>(1).map_err(map_err)?,
                weight_kg: row.get::<f64>(2).map_err(map_err)?,
                note: row.get::<Option<String>>(3).map_err(map_err)?,
                created_at: row.get::<i64>(4).map_err(map_err)?,
            });
        }
        Ok(entries)
    }

    // ─── Activities ──────────────────────────────────────────────────

    pub async fn insert_activity(&self, entry: &ActivityEntry) -> Result<i64> {
        with_retry(|| async {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO activity_entries (user_id, activity_type, duration_min, calories_burned, note, is_ambient, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    entry.user_id,
                    entry.activity_type.clone(),
                    entry.duration_min,
                    entry.calories_burned,
                    entry.note.clone(),
                    entry.is_ambient as i64,
                    entry.created_at,
                ],
            )
            .await
            .map_err(map_err)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn list_activities(
        &self,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ActivityEntry>> {
        let mut rows = self
            .conn()?
            .query(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activity_entries WHERE user_id = ? AND created_at >= ? AND created_at < ? ORDER BY created_at ASC"),
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            entries.push(activity_from_row(&row)?);
        }
        Ok(entries)
    }

    /// The ambient (whole-day) activity row inside a window, if one exists.
    /// Tracker screenshots converge onto this row instead of stacking up.
    pub async fn find_ambient_activity(
        &self,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Option<ActivityEntry>> {
        let mut rows = self
            .conn()?
            .query(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activity_entries WHERE user_id = ? AND created_at >= ? AND created_at < ? AND is_ambient = 1 ORDER BY created_at DESC LIMIT 1"),
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)?;

        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(activity_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_activity(
        &self,
        id: i64,
        activity_type: &str,
        duration_min: i64,
        calories_burned: i64,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE activity_entries SET activity_type = ?, duration_min = ?, calories_burned = ? WHERE id = ?",
                libsql::params![activity_type.to_string(), duration_min, calories_burned, id],
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    pub async fn clear_activities(&self, user_id: i64, start: i64, end: i64) -> Result<u64> {
        self.conn()?
            .execute(
                "DELETE FROM activity_entries WHERE user_id = ? AND created_at >= ? AND created_at < ?",
                libsql::params![user_id, start, end],
            )
            .await
            .map_err(map_err)
    }

    // ─── Bot state ───────────────────────────────────────────────────

    pub async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT OR REPLACE INTO bot_state (key, value) VALUES (?, ?)",
                    libsql::params![key.to_string(), value.to_string()],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT value FROM bot_state WHERE key = ?",
                libsql::params![key.to_string()],
            )
            .await
            .map_err(map_err)?;

        match rows.next().await.map_err(map_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(map_err)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_db_path(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("tonus-test-{name}-{}.db", new_id()))
        .to_string_lossy()
        .into_owned()
}
