use std::path::PathBuf;
use std::time::Instant;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cli::config::{BrowserFingerprint, PrivacySettings};

/// Identity of one isolated browser profile: data directory plus a named
/// fingerprint. Immutable once created; used as the pooling and rotation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowserId {
    pub uuid: Uuid,
    pub data_dir: PathBuf,
    pub fingerprint: String,
}

impl std::fmt::Display for BrowserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "profile-{}", &self.uuid.to_string()[..8])
    }
}

/// Result of an identity selection. When the identity cap forces an eviction
/// the caller is responsible for tearing the evicted browser down.
#[derive(Debug, Clone)]
pub struct Selection {
    pub id: BrowserId,
    pub evicted: Option<BrowserId>,
}

struct IdentityEntry {
    id: BrowserId,
    degraded: bool,
    last_used: Instant,
}

/// Assigns fetch tasks to isolated browser identities and rotates away from
/// identities that picked up anti-bot punishment.
pub struct PrivacyManager {
    settings: PrivacySettings,
    fingerprints: Vec<BrowserFingerprint>,
    entries: Mutex<Vec<IdentityEntry>>,
}

impl PrivacyManager {
    /// Create a new privacy manager
    pub fn new(settings: PrivacySettings, fingerprints: Vec<BrowserFingerprint>) -> Self {
        Self {
            settings,
            fingerprints,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Select an identity for the next fetch attempt.
    ///
    /// Default policy: reuse the least-recently-used non-degraded identity.
    /// When every identity is degraded a fresh one is created; at the
    /// configured cap the least-recently-used degraded identity is evicted
    /// to make room.
    pub async fn select(&self) -> Selection {
        let mut entries = self.entries.lock().await;

        if let Some(idx) = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.degraded)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(i, _)| i)
        {
            entries[idx].last_used = Instant::now();
            return Selection {
                id: entries[idx].id.clone(),
                evicted: None,
            };
        }

        let cap = self.settings.max_identities.max(1);
        let evicted = if entries.len() >= cap {
            let idx = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i);
            idx.map(|i| {
                let entry = entries.remove(i);
                warn!("Evicting degraded identity {}", entry.id);
                entry.id
            })
        } else {
            None
        };

        let id = self.create_identity();
        entries.push(IdentityEntry {
            id: id.clone(),
            degraded: false,
            last_used: Instant::now(),
        });

        Selection { id, evicted }
    }

    fn create_identity(&self) -> BrowserId {
        let uuid = Uuid::new_v4();
        let fingerprint = self
            .fingerprints
            .choose(&mut rand::thread_rng())
            .map(|f| f.name.clone())
            .unwrap_or_else(|| "default".to_string());
        let data_dir = PathBuf::from(&self.settings.data_dir).join(uuid.to_string());

        debug!("Created identity {} with fingerprint {}", uuid, fingerprint);

        BrowserId {
            uuid,
            data_dir,
            fingerprint,
        }
    }

    /// Flag an identity as degraded after a PRIVACY-scoped retry signal.
    /// A degraded identity is skipped by `select` until reset.
    pub async fn mark_degraded(&self, id: &BrowserId) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == *id) {
            if !entry.degraded {
                warn!("Identity {} flagged degraded", id);
            }
            entry.degraded = true;
        }
    }

    /// Clear the degraded flag of one identity
    pub async fn reset(&self, id: &BrowserId) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == *id) {
            entry.degraded = false;
            debug!("Identity {} reset", id);
        }
    }

    /// Clear the degraded flag of every identity
    pub async fn reset_all(&self) {
        let mut entries = self.entries.lock().await;
        for entry in entries.iter_mut() {
            entry.degraded = false;
        }
    }

    /// Number of identities currently tracked
    pub async fn identity_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether an identity is currently flagged degraded
    pub async fn is_degraded(&self, id: &BrowserId) -> bool {
        self.entries
            .lock()
            .await
            .iter()
            .any(|e| e.id == *id && e.degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(cap: usize) -> PrivacyManager {
        PrivacyManager::new(
            PrivacySettings {
                max_identities: cap,
                data_dir: "/tmp/rendercrawl-test".to_string(),
            },
            vec![BrowserFingerprint {
                name: "linux_chrome".to_string(),
                user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0".to_string(),
                accept_language: "en-US,en;q=0.9".to_string(),
                platform: "Linux x86_64".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn reuses_clean_identity() {
        let manager = manager(4);
        let first = manager.select().await;
        let second = manager.select().await;
        assert_eq!(first.id, second.id);
        assert_eq!(manager.identity_count().await, 1);
    }

    #[tokio::test]
    async fn degraded_identity_is_not_reselected() {
        let manager = manager(4);
        let first = manager.select().await;
        manager.mark_degraded(&first.id).await;

        let second = manager.select().await;
        assert_ne!(first.id, second.id);
        assert!(second.evicted.is_none());
        assert!(manager.is_degraded(&first.id).await);
        assert!(!manager.is_degraded(&second.id).await);
    }

    #[tokio::test]
    async fn prefers_least_recently_used_clean_identity() {
        let manager = manager(4);
        let a = manager.select().await;
        manager.mark_degraded(&a.id).await;
        let b = manager.select().await;
        manager.reset(&a.id).await;

        // a was used before b, so a is the LRU clean identity now
        let third = manager.select().await;
        assert_eq!(third.id, a.id);
        let _ = b;
    }

    #[tokio::test]
    async fn evicts_oldest_degraded_identity_at_cap() {
        let manager = manager(2);
        let a = manager.select().await;
        manager.mark_degraded(&a.id).await;
        let b = manager.select().await;
        manager.mark_degraded(&b.id).await;
        assert_eq!(manager.identity_count().await, 2);

        let c = manager.select().await;
        assert_eq!(c.evicted, Some(a.id));
        assert_eq!(manager.identity_count().await, 2);
        assert!(!manager.is_degraded(&c.id).await);
    }

    #[tokio::test]
    async fn reset_all_clears_flags() {
        let manager = manager(4);
        let a = manager.select().await;
        manager.mark_degraded(&a.id).await;
        manager.reset_all().await;
        assert!(!manager.is_degraded(&a.id).await);
    }
}
