//! Consumer registry: registered factories and per-group active instances.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use clickerhub_protocol::{ConsumerDescriptor, QuestionSpec};

use crate::consumer::{Consumer, ConsumerFactory};
use crate::error::RegistryError;

/// A consumer instance that belongs to one open group.
#[derive(Clone)]
pub struct ActiveConsumer {
    pub group: String,
    pub descriptor: ConsumerDescriptor,
    pub instance: Arc<dyn Consumer>,
}

impl std::fmt::Debug for ActiveConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConsumer")
            .field("group", &self.group)
            .field("descriptor", &self.descriptor)
            .field("active", &self.instance.is_active())
            .finish()
    }
}

#[derive(Default)]
struct Partitions {
    available: BTreeMap<String, Arc<dyn ConsumerFactory>>,
    disabled: BTreeMap<String, Arc<dyn ConsumerFactory>>,
}

impl Partitions {
    fn contains(&self, key: &str) -> bool {
        self.available.contains_key(key) || self.disabled.contains_key(key)
    }

    /// Moves `key` into the requested partition. Already being there is fine.
    fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<bool, RegistryError> {
        let (from, to) = if enabled {
            (&mut self.disabled, &mut self.available)
        } else {
            (&mut self.available, &mut self.disabled)
        };
        if to.contains_key(key) {
            return Ok(false);
        }
        let factory = from
            .remove(key)
            .ok_or_else(|| RegistryError::ConsumerNotFound(key.to_string()))?;
        to.insert(key.to_string(), factory);
        Ok(true)
    }

    /// Strict move: the key must currently sit in the source partition.
    fn strict_move(&mut self, key: &str, enabled: bool) -> Result<(), RegistryError> {
        let source_has = if enabled {
            self.disabled.contains_key(key)
        } else {
            self.available.contains_key(key)
        };
        if !source_has {
            return Err(RegistryError::ConsumerNotFound(key.to_string()));
        }
        self.set_enabled(key, enabled).map(|_| ())
    }
}

/// Registered consumer types and the instances currently serving groups.
///
/// Every registered key sits in exactly one of two partitions: *available*
/// keys are instantiated when an Open names them, *disabled* keys are not.
#[derive(Default)]
pub struct ConsumerRegistry {
    factories: RwLock<Partitions>,
    active: RwLock<HashMap<String, Vec<ActiveConsumer>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer type as available.
    pub async fn register<F: ConsumerFactory>(&self, factory: F) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(factory)).await
    }

    pub async fn register_arc(&self, factory: Arc<dyn ConsumerFactory>) -> Result<(), RegistryError> {
        let key = factory.descriptor().key.clone();
        let mut parts = self.factories.write().await;
        if parts.contains(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }
        info!(consumer = %key, kind = %factory.descriptor().kind, "consumer registered");
        parts.available.insert(key, factory);
        Ok(())
    }

    /// Moves a disabled key back to available.
    pub async fn enable(&self, key: &str) -> Result<(), RegistryError> {
        self.factories.write().await.strict_move(key, true)?;
        debug!(consumer = %key, "consumer enabled");
        Ok(())
    }

    /// Moves an available key to disabled. Live instances keep running until
    /// their group closes.
    pub async fn disable(&self, key: &str) -> Result<(), RegistryError> {
        self.factories.write().await.strict_move(key, false)?;
        debug!(consumer = %key, "consumer disabled");
        Ok(())
    }

    /// Operator toggle. A no-op when the key is already where it should be.
    pub async fn set_enabled(&self, key: &str, enabled: bool) -> Result<(), RegistryError> {
        if self.factories.write().await.set_enabled(key, enabled)? {
            debug!(consumer = %key, enabled, "consumer toggled");
        }
        Ok(())
    }

    /// Applies a batch of toggles under one lock.
    ///
    /// Unknown keys are rejected up front and nothing is changed.
    pub async fn apply_selection(
        &self,
        selection: &BTreeMap<String, bool>,
    ) -> Result<(), RegistryError> {
        let mut parts = self.factories.write().await;
        if let Some(unknown) = selection.keys().find(|k| !parts.contains(k)) {
            return Err(RegistryError::ConsumerNotFound(unknown.clone()));
        }
        for (key, &enabled) in selection {
            parts.set_enabled(key, enabled)?;
        }
        Ok(())
    }

    /// Available keys in lexical order.
    pub async fn available_keys(&self) -> Vec<String> {
        self.factories.read().await.available.keys().cloned().collect()
    }

    /// Disabled keys in lexical order.
    pub async fn disabled_keys(&self) -> Vec<String> {
        self.factories.read().await.disabled.keys().cloned().collect()
    }

    /// Creates one instance per requested available key for `group`.
    ///
    /// Unknown and disabled keys are skipped. Instances already serving the
    /// group are deactivated and replaced.
    pub async fn instantiate_for_group(
        &self,
        keys: &[String],
        group: &str,
        question: &QuestionSpec,
    ) -> Vec<ActiveConsumer> {
        let mut created = Vec::new();
        {
            let parts = self.factories.read().await;
            let mut seen = BTreeSet::new();
            for key in keys {
                if !seen.insert(key.as_str()) {
                    continue;
                }
                let Some(factory) = parts.available.get(key) else {
                    debug!(group = %group, consumer = %key, "requested consumer not available");
                    continue;
                };
                let mut instance = factory.create();
                instance.set_group_identity(group);
                instance.set_question_context(question);
                instance.set_active_status(true);
                created.push(ActiveConsumer {
                    group: group.to_string(),
                    descriptor: factory.descriptor().clone(),
                    instance: Arc::from(instance),
                });
            }
        }

        let replaced = self
            .active
            .write()
            .await
            .insert(group.to_string(), created.clone());
        if let Some(old) = replaced {
            debug!(group = %group, count = old.len(), "replacing group consumers");
            for consumer in old {
                consumer.instance.set_active_status(false);
            }
        }
        created
    }

    /// Deactivates and drops every instance serving `group`. Returns how many
    /// were removed.
    pub async fn deactivate_group(&self, group: &str) -> usize {
        let Some(removed) = self.active.write().await.remove(group) else {
            return 0;
        };
        for consumer in &removed {
            consumer.instance.set_active_status(false);
        }
        removed.len()
    }

    /// Deactivates every instance of every group.
    pub async fn deactivate_all(&self) -> usize {
        let drained: Vec<_> = self.active.write().await.drain().collect();
        let mut count = 0;
        for (_, consumers) in drained {
            for consumer in consumers {
                consumer.instance.set_active_status(false);
                count += 1;
            }
        }
        count
    }

    pub async fn active_for_group(&self, group: &str) -> Vec<ActiveConsumer> {
        self.active
            .read()
            .await
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_active(&self, group: &str) -> bool {
        self.active
            .read()
            .await
            .get(group)
            .is_some_and(|c| !c.is_empty())
    }
}
