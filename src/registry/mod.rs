//! Point Type Registry
//!
//! Durable mapping from (edge, device, point) to the declared `PointType`,
//! kept in an external key-value store under `edge:device:point` keys
//! (optionally prefixed by a key group).
//!
//! Types are recorded once when a device table is created, read on every
//! write and typed read, and invalidated explicitly when the table is dropped.
//! Each call is an independent round trip bounded by the registry deadline:
//! concurrent declarations of the same point are not serialized and the last
//! write wins.

mod error;
mod store;

pub use error::{RegistryError, RegistryResult};
pub use store::{FileStore, KeyValueStore, MemoryStore};

#[cfg(test)]
pub(crate) use store::{SilentStore, UnavailableStore};

use crate::tsdb::PointType;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline of a single store round trip
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Registry of declared point types
#[derive(Clone)]
pub struct TypeRegistry {
    store: Arc<dyn KeyValueStore>,
    group: Option<String>,
    deadline: Duration,
}

impl TypeRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            group: None,
            deadline: DEFAULT_STORE_DEADLINE,
        }
    }

    /// Registry backed by a fresh in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Builder: prefix every key with `group:`
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.is_empty() { None } else { Some(group) };
        self
    }

    /// Builder: deadline of each store round trip
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run one store call, abandoning it when the deadline elapses
    async fn bounded<T>(
        &self,
        call: impl Future<Output = RegistryResult<T>>,
    ) -> RegistryResult<T> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Timeout(self.deadline)),
        }
    }

    fn device_prefix(&self, edge: &str, device: &str) -> String {
        match &self.group {
            Some(group) => format!("{}:{}:{}:", group, edge, device),
            None => format!("{}:{}:", edge, device),
        }
    }

    /// Composite key of one point
    pub fn key(&self, edge: &str, device: &str, point: &str) -> String {
        format!("{}{}", self.device_prefix(edge, device), point)
    }

    /// Record the declared type of a point
    pub async fn record_type(
        &self,
        edge: &str,
        device: &str,
        point: &str,
        point_type: PointType,
    ) -> RegistryResult<()> {
        let key = self.key(edge, device, point);
        self.bounded(self.store.set(&key, point_type.as_str())).await
    }

    /// Look up the declared type of a point
    ///
    /// `Ok(None)` means the point was never declared (or its device was
    /// dropped). A stored value that is not a point type is a decode error.
    pub async fn lookup_type(
        &self,
        edge: &str,
        device: &str,
        point: &str,
    ) -> RegistryResult<Option<PointType>> {
        let key = self.key(edge, device, point);
        match self.bounded(self.store.get(&key)).await? {
            None => Ok(None),
            Some(value) => match value.parse::<PointType>() {
                Ok(point_type) => Ok(Some(point_type)),
                Err(_) => Err(RegistryError::Decode { key, value }),
            },
        }
    }

    /// Forget every point type of a device
    pub async fn invalidate_device(&self, edge: &str, device: &str) -> RegistryResult<usize> {
        let prefix = self.device_prefix(edge, device);
        let removed = self.bounded(self.store.delete_prefix(&prefix)).await?;
        tracing::debug!(edge, device, removed, "Invalidated point types");
        Ok(removed)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("group", &self.group)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
