use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::models::error::AppError;

const DIRECT_ID_PREFIX: &str = "direct_";
const DIRECT_ID_SUFFIX_LEN: usize = 9;

/// A directly processed result held in memory until a client collects it.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub bytes: Bytes,
    pub content_type: String,
    /// Hex sha256 of the bytes, served as the ETag.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// In-memory store for synchronous enhancement results. Topaz returns image
/// bytes inline for traditional models; we fabricate a process id for them so
/// clients can run the same poll/download flow as for queued jobs.
pub struct ResultCache {
    entries: DashMap<String, CachedResult>,
    ttl_secs: u64,
    max_bytes: u64,
}

impl ResultCache {
    pub fn new(ttl_secs: u64, max_bytes: u64) -> Self {
        ResultCache {
            entries: DashMap::new(),
            ttl_secs,
            max_bytes,
        }
    }

    /// Fabricated process id for a direct result: `direct_` + unix millis +
    /// a short random suffix. The prefix is what routes status/download
    /// lookups to the cache instead of the vendor.
    pub fn direct_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(DIRECT_ID_SUFFIX_LEN)
            .collect();
        format!("{DIRECT_ID_PREFIX}{millis}_{suffix}")
    }

    pub fn is_direct(process_id: &str) -> bool {
        process_id.starts_with(DIRECT_ID_PREFIX)
    }

    /// Stores a result and returns its fabricated process id. Evicts oldest
    /// entries first when the byte budget would be exceeded.
    pub fn store(&self, bytes: Bytes, content_type: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = hex::encode(hasher.finalize());

        self.evict_for(bytes.len() as u64);

        let process_id = Self::direct_id();
        let size = bytes.len();
        let now = Utc::now();
        self.entries.insert(
            process_id.clone(),
            CachedResult {
                bytes,
                content_type: content_type.to_string(),
                checksum,
                created_at: now,
                expires_at: now + Duration::seconds(self.ttl_secs as i64),
            },
        );
        debug!(process_id = %process_id, size, content_type, "Cached direct result");
        process_id
    }

    pub fn get(&self, process_id: &str) -> Result<CachedResult, AppError> {
        match self.entries.get(process_id) {
            Some(entry) => {
                if entry.expires_at < Utc::now() {
                    drop(entry);
                    self.entries.remove(process_id);
                    Err(AppError::ProcessNotFound(process_id.to_string()))
                } else {
                    Ok(entry.clone())
                }
            }
            None => Err(AppError::ProcessNotFound(process_id.to_string())),
        }
    }

    /// Drops entries past their TTL. Called periodically from the cleanup
    /// task and before evicting live entries.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.expires_at < now)
            .map(|entry| entry.key().clone())
            .collect();
        for process_id in expired {
            self.entries.remove(&process_id);
            info!(process_id = %process_id, "Expired cached result removed");
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.bytes.len() as u64)
            .sum()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Makes room for `incoming` bytes. Expired entries go first, then the
    /// oldest live ones. An oversized result still gets stored once the
    /// cache is empty; rejecting it would lose the enhancement entirely.
    fn evict_for(&self, incoming: u64) {
        self.cleanup_expired();
        while self.used_bytes() + incoming > self.max_bytes {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(process_id) => {
                    self.entries.remove(&process_id);
                    warn!(process_id = %process_id, "Evicted cached result over byte budget");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn store_and_get_round_trip() {
        let cache = ResultCache::new(60, 1024);
        let id = cache.store(Bytes::from_static(b"jpegbytes"), "image/jpeg");
        let cached = cache.get(&id).unwrap();
        assert_eq!(&cached.bytes[..], b"jpegbytes");
        assert_eq!(cached.content_type, "image/jpeg");
        assert_eq!(cached.checksum.len(), 64);
        assert!(cached.checksum.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.used_bytes(), 9);
    }

    #[test]
    fn direct_ids_have_expected_shape() {
        let id = ResultCache::direct_id();
        assert!(ResultCache::is_direct(&id));
        let rest = id.strip_prefix("direct_").unwrap();
        let (millis, suffix) = rest.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(ResultCache::direct_id(), ResultCache::direct_id());
    }

    #[test]
    fn vendor_ids_are_not_direct() {
        assert!(!ResultCache::is_direct("8b54f268-1a2b"));
        assert!(ResultCache::is_direct("direct_1700000000000_abc123def"));
    }

    #[test]
    fn unknown_id_is_process_not_found() {
        let cache = ResultCache::new(60, 1024);
        match cache.get("direct_0_missing00") {
            Err(AppError::ProcessNotFound(id)) => assert_eq!(id, "direct_0_missing00"),
            other => panic!("expected ProcessNotFound, got {other:?}"),
        }
    }

    #[test]
    fn expired_entries_disappear_on_get() {
        let cache = ResultCache::new(0, 1024);
        let id = cache.store(Bytes::from_static(b"soon gone"), "image/png");
        thread::sleep(StdDuration::from_millis(5));
        assert!(matches!(
            cache.get(&id),
            Err(AppError::ProcessNotFound(_))
        ));
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn cleanup_drops_only_expired_entries() {
        let cache = ResultCache::new(0, 1024);
        cache.store(Bytes::from_static(b"old"), "image/png");
        let fresh = ResultCache::new(3600, 1024);
        let keep = fresh.store(Bytes::from_static(b"new"), "image/png");
        thread::sleep(StdDuration::from_millis(5));
        cache.cleanup_expired();
        fresh.cleanup_expired();
        assert_eq!(cache.entry_count(), 0);
        assert!(fresh.get(&keep).is_ok());
    }

    #[test]
    fn evicts_oldest_when_over_budget() {
        let cache = ResultCache::new(3600, 100);
        let first = cache.store(Bytes::from(vec![1u8; 40]), "image/jpeg");
        thread::sleep(StdDuration::from_millis(5));
        let second = cache.store(Bytes::from(vec![2u8; 40]), "image/jpeg");
        thread::sleep(StdDuration::from_millis(5));
        let third = cache.store(Bytes::from(vec![3u8; 40]), "image/jpeg");
        assert!(matches!(
            cache.get(&first),
            Err(AppError::ProcessNotFound(_))
        ));
        assert!(cache.get(&second).is_ok());
        assert!(cache.get(&third).is_ok());
        assert!(cache.used_bytes() <= 100);
    }

    #[test]
    fn oversized_entry_still_stored_alone() {
        let cache = ResultCache::new(3600, 10);
        let id = cache.store(Bytes::from(vec![0u8; 64]), "image/tiff");
        assert!(cache.get(&id).is_ok());
        assert_eq!(cache.entry_count(), 1);
    }
}
