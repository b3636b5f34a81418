use libsql::{Builder, Connection, Database};
use tonus_core::error::{Result, TonusError};
use tonus_core::types::{now_unix, ConversationMessage, MemoryEntry};

use crate::service::store::with_retry;

/// Conversation history and long-term facts about users.
/// Kept separate from the health tables: this data is disposable context,
/// not the user's records.
pub struct MemoryStore {
    db: Database,
}

fn map_err(e: libsql::Error) -> TonusError {
    TonusError::Database(e.to_string())
}

/// Prompt header for each memory category.
fn category_label(category: &str) -> &str {
    match category {
        "preference" => "Предпочтения",
        "habit" => "Привычки",
        "restriction" => "Ограничения",
        "goal" => "Цели",
        "fact" => "Факты",
        other => other,
    }
}

const CATEGORY_ORDER: [&str; 5] = ["preference", "habit", "restriction", "goal", "fact"];

impl MemoryStore {
    pub async fn new(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(map_err)?;
        let store = Self { db };
        store.init_tables().await?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(map_err)
    }

    async fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversation_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        Ok(())
    }

    /// Append a message to the conversation history. Empty or whitespace-only
    /// content is silently dropped so it never pollutes the replayed context.
    pub async fn save_message(&self, user_id: i64, role: &str, content: &str) -> Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let content = trimmed.to_string();

        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT INTO conversation_messages (user_id, role, content, created_at) VALUES (?, ?, ?, ?)",
                    libsql::params![user_id, role.to_string(), content.clone(), now_unix()],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    /// The last `limit` messages, returned oldest first for replay.
    pub async fn get_recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, user_id, role, content, created_at FROM conversation_messages WHERE user_id = ? AND TRIM(content) != '' ORDER BY created_at DESC, id DESC LIMIT ?",
                libsql::params![user_id, limit as i64],
            )
            .await
            .map_err(map_err)?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            messages.push(ConversationMessage {
                id: row.get::<i64>(0).map_err(map_err)?,
                user_id: row.get::<i64>(1).map_err(map_err)?,
                role: row.get::<String>(2).map_err(map_err)?,
                content: row.get::<String>(3).map_err(map_err)?,
                created_at: row.get::<i64>(4).map_err(map_err)?,
            });
        }
        messages.reverse();
        Ok(messages)
    }

    /// Drop history older than `days`. Long-term memories are unaffected.
    pub async fn clear_old_messages(&self, user_id: i64, days: i64) -> Result<u64> {
        let cutoff = now_unix() - days * 86400;
        self.conn()?
            .execute(
                "DELETE FROM conversation_messages WHERE user_id = ? AND created_at < ?",
                libsql::params![user_id, cutoff],
            )
            .await
            .map_err(map_err)
    }

    /// Store a long-term fact. Returns false when the exact same fact is
    /// already known (deduplicated on user + category + content).
    pub async fn save_memory(&self, user_id: i64, category: &str, content: &str) -> Result<bool> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id FROM user_memories WHERE user_id = ? AND category = ? AND content = ?",
                libsql::params![user_id, category.to_string(), content.to_string()],
            )
            .await
            .map_err(map_err)?;

        if rows.next().await.map_err(map_err)?.is_some() {
            return Ok(false);
        }

        self.conn()?
            .execute(
                "INSERT INTO user_memories (user_id, category, content, created_at) VALUES (?, ?, ?, ?)",
                libsql::params![user_id, category.to_string(), content.to_string(), now_unix()],
            )
            .await
            .map_err(map_err)?;
        Ok(true)
    }

    pub async fn get_memories(&self, user_id: i64) -> Result<Vec<MemoryEntry>> {
        let mut rows = self
            .conn()?
            .query(
                "SELECT id, user_id, category, content, created_at FROM user_memories WHERE user_id = ? ORDER BY created_at DESC",
                libsql::params![user_id],
            )
            .await
            .map_err(map_err)?;

        let mut memories = Vec::new();
        while let Some(row) = rows.next().await.map_err(map_err)? {
            memories.push(MemoryEntry {
                id: row.get::<i64>(0).map_err(map_err)?,
                user_id: row.get::<i64>(1).map_err(map_err)?,
                category: row.get::<String>(2).map_err(map_err)?,
                content: row.get::<String>(3).map_err(map_err)?,
                created_at: row.get::<i64>(4).map_err(map_err)?,
            });
        }
        Ok(memories)
    }

    /// All memories grouped by category, formatted for the system prompt.
    /// None when nothing is known yet.
    pub async fn memories_as_text(&self, user_id: i64) -> Result<Option<String>> {
        let memories = self.get_memories(user_id).await?;
        if memories.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::new();
        let mut ordered: Vec<&str> = CATEGORY_ORDER.to_vec();
        for m in &memories {
            if !ordered.contains(&m.category.as_str()) {
                ordered.push(&m.category);
            }
        }

        for cat in ordered {
            let items: Vec<&MemoryEntry> =
                memories.iter().filter(|m| m.category == cat).collect();
            if items.is_empty() {
                continue;
            }
            lines.push(format!("{}:", category_label(cat)));
            for item in items {
                lines.push(format!("  - {}", item.content));
            }
        }

        Ok(Some(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::store::temp_db_path;

    #[tokio::test]
    async fn test_empty_messages_are_dropped() {
        let store = MemoryStore::new(&temp_db_path("mem-empty")).await.unwrap();
        store.save_message(1, "user", "   ").await.unwrap();
        store.save_message(1, "user", "").await.unwrap();
        store.save_message(1, "user", "  привет  ").await.unwrap();

        let messages = store.get_recent_messages(1, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "привет");
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first() {
        let store = MemoryStore::new(&temp_db_path("mem-order")).await.unwrap();
        for text in ["раз", "два", "три", "четыре"] {
            store.save_message(1, "user", text).await.unwrap();
        }

        let messages = store.get_recent_messages(1, 3).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["два", "три", "четыре"]);
    }

    #[tokio::test]
    async fn test_memory_dedup() {
        let store = MemoryStore::new(&temp_db_path("mem-dedup")).await.unwrap();
        assert!(store.save_memory(1, "restriction", "не ест молочку").await.unwrap());
        assert!(!store.save_memory(1, "restriction", "не ест молочку").await.unwrap());
        // same content under another category is a different fact
        assert!(store.save_memory(1, "fact", "не ест молочку").await.unwrap());

        assert_eq!(store.get_memories(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memories_as_text_grouping() {
        let store = MemoryStore::new(&temp_db_path("mem-text")).await.unwrap();
        assert!(store.memories_as_text(1).await.unwrap().is_none());

        store.save_memory(1, "goal", "хочет 80 кг").await.unwrap();
        store.save_memory(1, "preference", "любит рыбу").await.unwrap();
        store.save_memory(1, "preference", "не любит брокколи").await.unwrap();

        let text = store.memories_as_text(1).await.unwrap().unwrap();
        assert!(text.contains("Предпочтения:"));
        assert!(text.contains("  - любит рыбу"));
        assert!(text.contains("Цели:"));
        // preference group comes before goal group
        assert!(text.find("Предпочтения:").unwrap() < text.find("Цели:").unwrap());
    }

    #[tokio::test]
    async fn test_clear_old_messages() {
        let store = MemoryStore::new(&temp_db_path("mem-clear")).await.unwrap();
        store.save_message(1, "user", "свежее").await.unwrap();
        // nothing is older than a week yet
        assert_eq!(store.clear_old_messages(1, 7).await.unwrap(), 0);
        assert_eq!(store.get_recent_messages(1, 10).await.unwrap().len(), 1);
    }
}
