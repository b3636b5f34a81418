use std::sync::Arc;
use std::time::Duration;

use tonus_core::error::Result;
use tonus_llm::provider::LlmProvider;
use tonus_telegram::types::TelegramMessage;

use crate::coach::Coach;

const POLL_TIMEOUT_SECS: u32 = 30;
const POLL_RETRY_SECS: u64 = 5;
/// bot_state key holding the next getUpdates offset.
const OFFSET_KEY: &str = "telegram_offset";

const GENERIC_ERROR: &str = "Что-то пошло не так, попробуй ещё раз.";

/// file_id of the largest photo of the message this one replies to.
fn replied_photo_id(msg: &TelegramMessage) -> Option<&str> {
    let replied = msg.reply_to_message.as_deref()?;
    let largest = replied.photo.as_ref()?.last()?;
    Some(&largest.file_id)
}

impl<P: LlmProvider + Send + Sync + 'static> Coach<P> {
    /// Long-poll loop. Each message is handled on its own task; the offset
    /// is persisted so a restart does not replay old updates.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let me = self.bot.get_me().await?;
        log!(" [router] polling as @{}", me.username.as_deref().unwrap_or("?"));

        let mut offset: i64 = self
            .store
            .get_state(OFFSET_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        loop {
            match self.bot.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => {
                    if updates.is_empty() {
                        continue;
                    }
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            let coach = Arc::clone(&self);
                            tokio::spawn(async move {
                                coach.handle_message(message).await;
                            });
                        }
                    }
                    self.store.set_state(OFFSET_KEY, &offset.to_string()).await?;
                }
                Err(e) => {
                    log!(" [router] poll failed: {e}");
                    tokio::time::sleep(Duration::from_secs(POLL_RETRY_SECS)).await;
                }
            }
        }
    }

    async fn handle_message(self: Arc<Self>, msg: TelegramMessage) {
        let chat_id = msg.chat.id;
        let Some(from) = msg.from.clone() else { return };
        let user_id = from.id;

        if let Err(e) = self
            .store
            .ensure_user(user_id, from.username.as_deref(), Some(&from.first_name), &self.config)
            .await
        {
            log!(" [router] ensure_user {user_id} failed: {e}");
        }

        let _ = self.bot.send_typing(chat_id).await;

        if let Err(e) = self.dispatch_message(&msg, user_id, chat_id).await {
            log!(" [router] user={user_id} failed: {e}");
            let _ = self.bot.send_message(chat_id, GENERIC_ERROR).await;
        }
    }

    async fn dispatch_message(
        self: &Arc<Self>,
        msg: &TelegramMessage,
        user_id: i64,
        chat_id: i64,
    ) -> Result<()> {
        // album photos are coalesced; the first one schedules the flush
        if let (Some(sizes), Some(group_id)) = (&msg.photo, &msg.media_group_id) {
            let Some(largest) = sizes.last() else { return Ok(()) };
            let is_first = self
                .albums
                .append(group_id, chat_id, user_id, msg.caption.clone(), largest.file_id.clone())
                .await;
            if is_first {
                let coach = Arc::clone(self);
                let group_id = group_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(coach.config.album_debounce_ms)).await;
                    let Some(album) = coach.albums.take(&group_id).await else { return };
                    let chat_id = album.chat_id;
                    if let Err(e) = coach.handle_album(album).await {
                        log!(" [router] album {group_id} failed: {e}");
                        let _ = coach.bot.send_message(chat_id, GENERIC_ERROR).await;
                    }
                });
            }
            return Ok(());
        }

        if msg.photo.is_some() {
            return self.handle_photo(msg).await;
        }

        if let Some(text) = &msg.text {
            // replying to a photo corrects that meal instead of opening a turn
            if let Some(photo_id) = replied_photo_id(msg) {
                if let Some(reply) = self.correct_photo_entry(user_id, photo_id, text).await? {
                    return self.bot.send_message(chat_id, &reply).await;
                }
            }

            let reply = self.respond(user_id, text).await?;
            return self.bot.send_message(chat_id, &reply).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replied_photo_id_takes_largest_size() {
        let msg: TelegramMessage = serde_json::from_value(serde_json::json!({
            "message_id": 2,
            "chat": {"id": 1},
            "text": "без сметаны",
            "reply_to_message": {
                "message_id": 1,
                "chat": {"id": 1},
                "photo": [
                    {"file_id": "small", "width": 90, "height": 90},
                    {"file_id": "big", "width": 800, "height": 800}
                ]
            }
        }))
        .unwrap();
        assert_eq!(replied_photo_id(&msg), Some("big"));
    }

    #[test]
    fn test_replied_photo_id_none_without_reply_photo() {
        let msg: TelegramMessage = serde_json::from_value(serde_json::json!({
            "message_id": 2,
            "chat": {"id": 1},
            "text": "привет"
        }))
        .unwrap();
        assert_eq!(replied_photo_id(&msg), None);
    }
}
