//! Watch position persistence

use crate::core::source::PositionStore;
use crate::error::Result;
use crate::types::{VideoId, WatchPosition};
use crate::utils::paths::ensure_dir;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// Positions kept in a single JSON file, rewritten on every save
pub struct JsonPositionStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<VideoId, WatchPosition>>>,
}

impl JsonPositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    async fn read_file(&self) -> Result<HashMap<VideoId, WatchPosition>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        let list: Vec<WatchPosition> = serde_json::from_str(&content).unwrap_or_default();
        Ok(list.into_iter().map(|p| (p.video_id.clone(), p)).collect())
    }

    async fn write_file(&self, entries: &HashMap<VideoId, WatchPosition>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).await?;
        }
        let mut list: Vec<&WatchPosition> = entries.values().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let content = serde_json::to_string_pretty(&list)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl PositionStore for JsonPositionStore {
    async fn save(&self, video_id: &VideoId, position_millis: u64) -> Result<()> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await?);
        }
        let entries = guard.get_or_insert_with(HashMap::new);
        entries.insert(
            video_id.clone(),
            WatchPosition {
                video_id: video_id.clone(),
                position_millis,
                updated_at: Utc::now().timestamp(),
            },
        );
        self.write_file(entries).await
    }

    async fn load(&self, video_id: &VideoId) -> Result<Option<u64>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_file().await?);
        }
        Ok(guard
            .as_ref()
            .and_then(|entries| entries.get(video_id))
            .map(|p| p.position_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data/positions.json");

        let store = JsonPositionStore::new(&path);
        assert_eq!(store.load(&VideoId::new("v1")).await.unwrap(), None);
        store.save(&VideoId::new("v1"), 30_000).await.unwrap();
        store.save(&VideoId::new("v2"), 1_000).await.unwrap();
        store.save(&VideoId::new("v1"), 45_000).await.unwrap();

        let reopened = JsonPositionStore::new(&path);
        assert_eq!(reopened.load(&VideoId::new("v1")).await.unwrap(), Some(45_000));
        assert_eq!(reopened.load(&VideoId::new("v2")).await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("positions.json");
        fs::write(&path, "garbage").await.unwrap();

        let store = JsonPositionStore::new(&path);
        assert_eq!(store.load(&VideoId::new("v1")).await.unwrap(), None);
        store.save(&VideoId::new("v1"), 5).await.unwrap();
        assert_eq!(store.load(&VideoId::new("v1")).await.unwrap(), Some(5));
    }
}
