//! Checkpoint persistence
//!
//! Session snapshots keyed by (user, thread). Stores hand back raw JSON;
//! callers normalize it with `SessionState::from_raw`.

pub mod postgres;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::models::SessionKey;
use crate::state::SessionState;
use crate::Result;

pub use postgres::PostgresCheckpointStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: Value,
    pub saved_at: DateTime<Utc>,
    pub state_hash: String,
}

impl Checkpoint {
    pub fn capture(state: &SessionState) -> Result<Self> {
        let state = serde_json::to_value(state)?;
        let state_hash = compute_state_hash(&state);
        Ok(Self {
            state,
            saved_at: Utc::now(),
            state_hash,
        })
    }

    /// Whether the stored hash still matches the stored state.
    pub fn verify(&self) -> bool {
        compute_state_hash(&self.state) == self.state_hash
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<Checkpoint>>;
    async fn put(&self, key: &SessionKey, state: &SessionState) -> Result<Checkpoint>;
}

/// In-memory checkpoint store for development and tests
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<SessionKey, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(key).cloned())
    }

    async fn put(&self, key: &SessionKey, state: &SessionState) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::capture(state)?;
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(key.clone(), checkpoint.clone());
        Ok(checkpoint)
    }
}

/// Postgres when a database URL is configured, otherwise in-memory.
pub fn build_checkpoint_store(config: &AgentConfig) -> Arc<dyn CheckpointStore> {
    if let Some(url) = &config.database_url {
        match PostgresCheckpointStore::connect_lazy(url) {
            Ok(store) => {
                info!("Checkpoint backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres checkpoint backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Checkpoint backend: in-memory");
    Arc::new(InMemoryCheckpointStore::new())
}

/// SHA-256 of the state's JSON encoding, hex encoded.
pub fn compute_state_hash(state: &Value) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), state).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateDefaults;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_in_memory_put_and_get() {
        let store = InMemoryCheckpointStore::new();
        let key = SessionKey::for_user("chinonso01");
        let mut state = SessionState::new(&StateDefaults::default());
        state.username = "Chinonso".to_string();

        assert!(assert_ok!(store.get(&key).await).is_none());

        assert_ok!(store.put(&key, &state).await);
        let checkpoint = assert_ok!(store.get(&key).await).unwrap();
        assert!(checkpoint.verify());
        assert_eq!(checkpoint.state["username"], "Chinonso");

        let other = SessionKey::new("chinonso01", "thread_other");
        assert!(assert_ok!(store.get(&other).await).is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryCheckpointStore::new();
        let key = SessionKey::for_user("ada12");
        let mut state = SessionState::new(&StateDefaults::default());

        assert_ok!(store.put(&key, &state).await);
        state.income = 1000.0;
        assert_ok!(store.put(&key, &state).await);

        let checkpoint = assert_ok!(store.get(&key).await).unwrap();
        assert_eq!(checkpoint.state["income"], 1000.0);
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_hash_detects_tampering() {
        let state = SessionState::new(&StateDefaults::default());
        let mut checkpoint = Checkpoint::capture(&state).unwrap();
        assert_eq!(checkpoint.state_hash.len(), 64);
        assert!(checkpoint.verify());

        checkpoint.state["income"] = serde_json::json!(99.0);
        assert!(!checkpoint.verify());
    }

    #[tokio::test]
    async fn test_build_without_database_is_in_memory() {
        let config = AgentConfig::default();
        let store = build_checkpoint_store(&config);
        let key = SessionKey::for_user("ada12");
        assert!(assert_ok!(store.get(&key).await).is_none());
    }
}
