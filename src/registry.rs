//! Per-program instance registry.
//!
//! Guards at most one constructed instance per `(runtime descriptor, uid:iid)`
//! within a process. Registries are plain values owned by the caller; there is
//! no process-wide table.
//!
//! Construction goes through an [`InstanceFactory`]. The first caller for a key
//! constructs and anchors the instance; concurrent callers for the same key
//! wait on the same cell and receive the same `Arc`. A failed construction
//! leaves the slot empty so a later call can retry.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Registry key: the program's runtime descriptor plus `uid:iid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub runtime: PathBuf,
    pub uid: String,
    pub iid: String,
}

impl InstanceKey {
    pub fn new(runtime: impl Into<PathBuf>, uid: impl Into<String>, iid: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            uid: uid.into(),
            iid: iid.into(),
        }
    }

    /// `uid:iid`
    pub fn id(&self) -> String {
        format!("{}:{}", self.uid, self.iid)
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}:{}", self.runtime.display(), self.uid, self.iid)
    }
}

/// A constructed instance.
#[async_trait]
pub trait Instance: Send + Sync + 'static {
    /// Called once after construction, before the instance is shared.
    async fn anchor_instance(&self, _key: &InstanceKey) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds an instance from its effective config.
#[async_trait]
pub trait InstanceFactory<T>: Send + Sync {
    async fn construct(&self, config: Value) -> anyhow::Result<T>;
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;

pub struct InstanceRegistry<T> {
    slots: Mutex<HashMap<InstanceKey, Slot<T>>>,
}

impl<T> Default for InstanceRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Instance> InstanceRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &InstanceKey) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    /// Return the instance for `key`, constructing it with `factory` if needed.
    pub async fn get_or_construct<F>(
        &self,
        key: InstanceKey,
        config: Value,
        factory: &F,
    ) -> anyhow::Result<Arc<T>>
    where
        F: InstanceFactory<T> + ?Sized,
    {
        let slot = self.slot(&key);
        let instance = slot
            .get_or_try_init(|| async {
                debug!(instance = %key, "Constructing instance");
                let instance = factory.construct(config).await?;
                instance.anchor_instance(&key).await?;
                info!(instance = %key, "Instance constructed");
                Ok::<_, anyhow::Error>(Arc::new(instance))
            })
            .await?;
        Ok(Arc::clone(instance))
    }

    /// The instance for `key`, if already constructed.
    pub fn get(&self, key: &InstanceKey) -> Option<Arc<T>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of constructed instances.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
