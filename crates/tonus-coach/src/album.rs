use std::collections::HashMap;

use tokio::sync::Mutex;

/// A media album still being collected from the long-poll stream.
#[derive(Debug, Clone)]
pub struct PendingAlbum {
    pub chat_id: i64,
    pub user_id: i64,
    /// Caption of whichever album message carried one.
    pub caption: Option<String>,
    /// file_id of the largest size of each photo, in arrival order.
    pub photos: Vec<String>,
}

/// Collects the messages of a Telegram media album.
///
/// Telegram delivers an album as separate messages sharing a media_group_id,
/// with no marker on the last one. The router appends each photo here and the
/// first append schedules a debounced flush; `take` hands the whole album to
/// exactly one caller.
#[derive(Default)]
pub struct AlbumCoalescer {
    pending: Mutex<HashMap<String, PendingAlbum>>,
}

impl AlbumCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a photo to the album. Returns true when this was the first photo
    /// of the group, i.e. the caller should schedule the flush.
    pub async fn append(
        &self,
        group_id: &str,
        chat_id: i64,
        user_id: i64,
        caption: Option<String>,
        file_id: String,
    ) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.get_mut(group_id) {
            Some(album) => {
                album.photos.push(file_id);
                if album.caption.is_none() {
                    album.caption = caption;
                }
                false
            }
            None => {
                pending.insert(
                    group_id.to_string(),
                    PendingAlbum {
                        chat_id,
                        user_id,
                        caption,
                        photos: vec![file_id],
                    },
                );
                true
            }
        }
    }

    /// Remove and return the album. Atomic with respect to `append`: a
    /// second take of the same group gets None.
    pub async fn take(&self, group_id: &str) -> Option<PendingAlbum> {
        self.pending.lock().await.remove(group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_append_signals_flush() {
        let albums = AlbumCoalescer::new();
        assert!(albums.append("g1", 1, 1, None, "a".into()).await);
        assert!(!albums.append("g1", 1, 1, None, "b".into()).await);
        assert!(!albums.append("g1", 1, 1, None, "c".into()).await);

        let album = albums.take("g1").await.unwrap();
        assert_eq!(album.photos, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_take_is_single_shot() {
        let albums = AlbumCoalescer::new();
        albums.append("g1", 1, 1, Some("обед".into()), "a".into()).await;
        assert!(albums.take("g1").await.is_some());
        assert!(albums.take("g1").await.is_none());
    }

    #[tokio::test]
    async fn test_caption_kept_from_any_message() {
        let albums = AlbumCoalescer::new();
        albums.append("g1", 1, 1, None, "a".into()).await;
        albums.append("g1", 1, 1, Some("ужин".into()), "b".into()).await;
        let album = albums.take("g1").await.unwrap();
        assert_eq!(album.caption.as_deref(), Some("ужин"));
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let albums = AlbumCoalescer::new();
        assert!(albums.append("g1", 1, 1, None, "a".into()).await);
        assert!(albums.append("g2", 2, 2, None, "x".into()).await);
        assert_eq!(albums.take("g1").await.unwrap().photos, vec!["a"]);
        assert_eq!(albums.take("g2").await.unwrap().photos, vec!["x"]);
    }
}
