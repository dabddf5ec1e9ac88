//! Loading, publishing and resolving automations
//!
//! The loader owns the local snapshot and knows how to find the automations
//! a sequence was pinned to, even when they came from another node: pinned
//! hashes that are not local are fetched from the object store, verified and
//! cached.

use dashmap::DashMap;
use hops_broker::{BrokerError, Client};
use hops_core::{Channel, MessageBundle, HOPS_MESSAGE_ID};
use hops_dsl::{Automations, EMPTY_HASH};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};

/// Default lifetime of cached remote automations
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Object store key for automations with `hash`
pub fn object_key(hash: &str) -> String {
    format!("hopsconf-{}", hash)
}

struct Cached {
    automations: Arc<Automations>,
    expires_at: Instant,
}

/// Holds the current automations and resolves pinned ones
pub struct AutomationsLoader {
    root: PathBuf,
    current: Arc<RwLock<Arc<Automations>>>,
    cache: DashMap<String, Cached>,
    client: Client,
    cache_ttl: Duration,
}

impl AutomationsLoader {
    /// Load `root` and publish it
    ///
    /// Unlike later reloads, a failure here is returned.
    pub async fn new(root: impl Into<PathBuf>, client: Client, cache_ttl: Duration) -> RunnerResult<Self> {
        let loader = Self {
            root: root.into(),
            current: Arc::new(RwLock::new(Arc::new(Automations::empty()))),
            cache: DashMap::new(),
            client,
            cache_ttl,
        };
        loader.reload(false).await?;
        Ok(loader)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The local snapshot
    pub fn current(&self) -> Arc<Automations> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn swap(&self, automations: Arc<Automations>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = automations;
    }

    /// Re-read the automations directory
    ///
    /// When `tolerant`, a failed load keeps the previous automations, or
    /// falls back to empty automations if there were none.
    pub async fn reload(&self, tolerant: bool) -> RunnerResult<Arc<Automations>> {
        let automations = match Automations::from_dir(&self.root) {
            Ok(automations) => Arc::new(automations),
            Err(e) if tolerant => {
                let previous = self.current();
                if previous.is_empty_sentinel() {
                    warn!(path = %self.root.display(), "Failed to load automations, running with none: {}", e);
                } else {
                    warn!(path = %self.root.display(), hash = %previous.hash, "Failed to reload automations, keeping previous: {}", e);
                }
                return Ok(previous);
            }
            Err(e) => return Err(e.into()),
        };

        self.save(&automations).await?;
        self.swap(automations.clone());
        info!(hash = %automations.hash, "Loaded automations");
        Ok(automations)
    }

    /// Store `automations` so other nodes can resolve its hash
    pub async fn save(&self, automations: &Arc<Automations>) -> RunnerResult<()> {
        let encoded = automations.encode_files()?;
        self.client
            .put_sys_object(&object_key(&automations.hash), encoded)
            .await?;
        self.cache_insert(automations.clone());
        Ok(())
    }

    fn cache_insert(&self, automations: Arc<Automations>) {
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.expires_at > now);
        self.cache.insert(
            automations.hash.clone(),
            Cached {
                automations,
                expires_at: now + self.cache_ttl,
            },
        );
    }

    fn cache_get(&self, hash: &str) -> Option<Arc<Automations>> {
        let hit = self.cache.get(hash).and_then(|entry| {
            (entry.expires_at > Instant::now()).then(|| entry.automations.clone())
        });
        if hit.is_none() {
            self.cache.remove_if(hash, |_, entry| entry.expires_at <= Instant::now());
        }
        hit
    }

    /// Automations with `hash`: local, cached, or fetched from the object store
    pub async fn get(&self, hash: &str) -> RunnerResult<Arc<Automations>> {
        let local = self.current();
        if local.hash == hash {
            return Ok(local);
        }
        if hash == EMPTY_HASH {
            return Ok(Arc::new(Automations::empty()));
        }
        if let Some(cached) = self.cache_get(hash) {
            return Ok(cached);
        }

        debug!(hash, "Fetching automations from object store");
        let stored = self.client.get_sys_object(&object_key(hash)).await?;
        let automations = Automations::from_stored(&stored)?;
        if automations.hash != hash {
            return Err(RunnerError::Integrity {
                expected: hash.to_string(),
                found: automations.hash,
            });
        }

        let automations = Arc::new(automations);
        self.cache_insert(automations.clone());
        Ok(automations)
    }

    /// Automations a sequence is pinned to, pinning the local ones if unset
    pub async fn get_for_sequence(
        &self,
        sequence_id: &str,
        bundle: &MessageBundle,
    ) -> RunnerResult<Arc<Automations>> {
        let local = self.current();
        let hash = self
            .get_or_set_hash_for_sequence(sequence_id, bundle, &local.hash)
            .await?;
        if hash == local.hash {
            return Ok(local);
        }
        self.get(&hash).await
    }

    /// Hash a sequence is pinned to
    ///
    /// The first node to publish a `hops` message for the sequence wins; a
    /// node that loses the race reads the winner's hash back.
    pub async fn get_or_set_hash_for_sequence(
        &self,
        sequence_id: &str,
        bundle: &MessageBundle,
        local_hash: &str,
    ) -> RunnerResult<String> {
        if let Some(pinned) = bundle.get(HOPS_MESSAGE_ID) {
            return decode_hash(pinned);
        }

        let subject = self
            .client
            .subject(Channel::Notify, &[sequence_id, HOPS_MESSAGE_ID]);
        let data = serde_json::to_vec(local_hash).map_err(BrokerError::from)?;
        if self.client.publish(data, &subject).await? {
            debug!(sequence_id, hash = local_hash, "Pinned sequence to local automations");
            return Ok(local_hash.to_string());
        }

        let winner = self.client.get_msg(&subject).await?;
        decode_hash(&winner.data)
    }
}

fn decode_hash(data: &[u8]) -> RunnerResult<String> {
    serde_json::from_slice(data)
        .map_err(|e| RunnerError::EventFatal(format!("invalid hops message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hops_broker::{MemoryJetStream, MemoryObjectStore, ObjectStore};
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, path: &str, content: &str) {
        let path = dir.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn client(objects: Arc<MemoryObjectStore>) -> Client {
        Client::new(Arc::new(MemoryJetStream::new()), objects, "acct")
    }

    #[tokio::test]
    async fn test_load_saves_to_object_store() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one/main.hops", "on change {}");
        let objects = Arc::new(MemoryObjectStore::new());

        let loader = AutomationsLoader::new(dir.path(), client(objects.clone()), DEFAULT_CACHE_TTL)
            .await
            .unwrap();
        let hash = loader.current().hash.clone();
        assert!(objects.contains(&object_key(&hash)));
    }

    #[tokio::test]
    async fn test_startup_failure_is_returned() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one/main.hops", "on BAD {}");
        let result = AutomationsLoader::new(
            dir.path(),
            client(Arc::new(MemoryObjectStore::new())),
            DEFAULT_CACHE_TTL,
        )
        .await;
        assert!(matches!(result, Err(RunnerError::ConfigLoad(_))));
    }

    #[tokio::test]
    async fn test_tolerant_reload_keeps_previous() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one/main.hops", "on change {}");
        let loader = AutomationsLoader::new(
            dir.path(),
            client(Arc::new(MemoryObjectStore::new())),
            DEFAULT_CACHE_TTL,
        )
        .await
        .unwrap();
        let good = loader.current().hash.clone();

        write(dir.path(), "one/main.hops", "on change {");
        let kept = loader.reload(true).await.unwrap();
        assert_eq!(kept.hash, good);
        assert!(loader.reload(false).await.is_err());

        write(dir.path(), "one/main.hops", "on other {}");
        let reloaded = loader.reload(true).await.unwrap();
        assert_ne!(reloaded.hash, good);
        assert_eq!(loader.current().hash, reloaded.hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_entries_are_swept() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one/main.hops", "on change0 {}");
        let loader = AutomationsLoader::new(
            dir.path(),
            client(Arc::new(MemoryObjectStore::new())),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        for i in 1..5 {
            write(dir.path(), "one/main.hops", &format!("on change{} {{}}", i));
            loader.reload(false).await.unwrap();
        }
        assert_eq!(loader.cache.len(), 5);

        tokio::time::advance(Duration::from_secs(61)).await;
        write(dir.path(), "one/main.hops", "on latest {}");
        let latest = loader.reload(false).await.unwrap();
        assert_eq!(loader.cache.len(), 1);
        assert!(loader.cache.contains_key(&latest.hash));
    }

    #[tokio::test]
    async fn test_get_fetches_and_verifies_remote() {
        let objects = Arc::new(MemoryObjectStore::new());

        let remote_dir = TempDir::new().unwrap();
        write(remote_dir.path(), "one/main.hops", "on remote {}");
        let remote = AutomationsLoader::new(remote_dir.path(), client(objects.clone()), DEFAULT_CACHE_TTL)
            .await
            .unwrap();
        let remote_hash = remote.current().hash.clone();

        let local_dir = TempDir::new().unwrap();
        write(local_dir.path(), "one/main.hops", "on local {}");
        let local = AutomationsLoader::new(local_dir.path(), client(objects.clone()), DEFAULT_CACHE_TTL)
            .await
            .unwrap();

        let fetched = local.get(&remote_hash).await.unwrap();
        assert_eq!(fetched.hash, remote_hash);
        assert_eq!(fetched.hops.ons[0].label, "remote");

        // Stored under a key its content does not hash to
        let stored = objects.get(&object_key(&remote_hash)).await.unwrap();
        objects.put(&object_key("bogus"), stored).await.unwrap();
        assert!(matches!(
            local.get("bogus").await,
            Err(RunnerError::Integrity { .. })
        ));

        assert!(matches!(
            local.get("missing").await,
            Err(RunnerError::Broker(BrokerError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_pinning_first_writer_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one/main.hops", "on change {}");
        let loader = AutomationsLoader::new(
            dir.path(),
            client(Arc::new(MemoryObjectStore::new())),
            DEFAULT_CACHE_TTL,
        )
        .await
        .unwrap();

        let bundle = MessageBundle::new();
        let first = loader
            .get_or_set_hash_for_sequence("seq", &bundle, "aaa")
            .await
            .unwrap();
        let second = loader
            .get_or_set_hash_for_sequence("seq", &bundle, "bbb")
            .await
            .unwrap();
        assert_eq!(first, "aaa");
        assert_eq!(second, "aaa");

        let mut pinned = MessageBundle::new();
        pinned.insert(HOPS_MESSAGE_ID.to_string(), b"\"ccc\"".to_vec());
        let from_bundle = loader
            .get_or_set_hash_for_sequence("other", &pinned, "bbb")
            .await
            .unwrap();
        assert_eq!(from_bundle, "ccc");
    }
}
