//! On-disk response caching

use crate::error::Result;
use crate::types::CacheEntry;
use crate::utils::paths::ensure_dir;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Skip ranges rarely change once a video has been out for a while
pub const SEGMENT_TTL: u64 = 6 * 3600;

/// Generate cache key from request parts
pub fn get_cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

/// Get cached data if present and fresh
pub async fn get_cached<T: serde::de::DeserializeOwned>(dir: &Path, key: &str) -> Option<T> {
    let path = cache_path(dir, key);

    let content = fs::read_to_string(&path).await.ok()?;
    let entry: CacheEntry<T> = serde_json::from_str(&content).ok()?;

    let now = Utc::now().timestamp();
    if now - entry.timestamp > entry.ttl as i64 {
        let _ = fs::remove_file(&path).await;
        return None;
    }

    Some(entry.data)
}

/// Store data under `key` for `ttl` seconds
pub async fn set_cache<T: serde::Serialize>(dir: &Path, key: &str, data: &T, ttl: u64) -> Result<()> {
    ensure_dir(dir).await?;

    let entry = CacheEntry {
        data,
        timestamp: Utc::now().timestamp(),
        ttl,
    };

    let content = serde_json::to_string(&entry)?;
    fs::write(cache_path(dir, key), content).await?;
    Ok(())
}

/// Remove every cached response
pub async fn clear_cache(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SegmentSet, SkipSegment};

    #[test]
    fn test_key_separates_parts() {
        assert_ne!(get_cache_key(&["ab", "c"]), get_cache_key(&["a", "bc"]));
        assert_eq!(get_cache_key(&["x"]), get_cache_key(&["x"]));
    }

    #[tokio::test]
    async fn test_store_and_expire() {
        let tmp = tempfile::tempdir().unwrap();
        let set = SegmentSet::new(vec![SkipSegment::new(1000, 2000, "sponsor")]);

        set_cache(tmp.path(), "fresh", &set, SEGMENT_TTL).await.unwrap();
        let cached: Option<SegmentSet> = get_cached(tmp.path(), "fresh").await;
        assert_eq!(cached, Some(set.clone()));

        // a negative age window can never be fresh
        let stale = CacheEntry {
            data: &set,
            timestamp: Utc::now().timestamp() - 10,
            ttl: 1,
        };
        fs::write(cache_path(tmp.path(), "stale"), serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();
        let cached: Option<SegmentSet> = get_cached(tmp.path(), "stale").await;
        assert!(cached.is_none());
        assert!(!cache_path(tmp.path(), "stale").exists());

        clear_cache(tmp.path()).await.unwrap();
        assert!(!tmp.path().exists());
    }
}
