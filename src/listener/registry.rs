//! ListenerContainerRegistry - lifecycle coordination for many containers
//!
//! The registry owns a set of containers keyed by id and starts or stops them
//! together, typically once at application start-up and once at shutdown.

use crate::listener::container::ListenerContainer;
use crate::listener::error::{ContainerError, ContainerResult};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Keeps containers by id and drives their lifecycle
///
/// # Thread Safety
///
/// The registry can be shared as `Arc<ListenerContainerRegistry>`. The
/// container map lock is never held across an await.
///
/// # Example
///
/// ```rust,no_run
/// use queue_listener::listener::{
///     Listener, ListenerContainer, ListenerContainerRegistry, ListenerError,
/// };
/// use queue_listener::queue::{InMemoryQueue, Message};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = Arc::new(InMemoryQueue::new("orders"));
/// let listener = Listener::single(|message: Arc<Message>| async move {
///     println!("{}", message.data);
///     Ok::<(), ListenerError>(())
/// });
///
/// let registry = ListenerContainerRegistry::new();
/// registry.register(ListenerContainer::builder("orders", queue, listener).build()?)?;
/// registry.start_all()?;
/// // ...
/// registry.stop_all().await;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ListenerContainerRegistry {
    containers: RwLock<HashMap<String, Arc<ListenerContainer>>>,
}

impl ListenerContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container under its own id
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::DuplicateId`] if the id is already taken.
    pub fn register(&self, container: Arc<ListenerContainer>) -> ContainerResult<()> {
        let mut containers = self
            .containers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = container.id().to_string();
        if containers.contains_key(&id) {
            return Err(ContainerError::DuplicateId { id });
        }
        log::debug!("Registered container {} for {}", id, container.queue_name());
        containers.insert(id, container);
        Ok(())
    }

    /// Remove a container without stopping it
    pub fn unregister(&self, id: &str) -> Option<Arc<ListenerContainer>> {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ListenerContainer>> {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.containers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any registered container is running
    pub fn is_running(&self) -> bool {
        self.snapshot().iter().any(|c| c.is_running())
    }

    pub fn start(&self, id: &str) -> ContainerResult<()> {
        self.require(id)?.start()
    }

    pub async fn stop(&self, id: &str) -> ContainerResult<bool> {
        let container = self.require(id)?;
        Ok(container.stop().await)
    }

    /// Start every container in id order, stopping at the first failure
    pub fn start_all(&self) -> ContainerResult<()> {
        for container in self.snapshot() {
            container.start()?;
        }
        Ok(())
    }

    /// Stop every container concurrently
    ///
    /// Returns whether all of them stopped cleanly within their timeouts.
    pub async fn stop_all(&self) -> bool {
        let containers = self.snapshot();
        log::info!("Stopping {} containers", containers.len());
        let results =
            futures::future::join_all(containers.iter().map(|container| container.stop())).await;
        results.into_iter().all(|clean| clean)
    }

    fn require(&self, id: &str) -> ContainerResult<Arc<ListenerContainer>> {
        self.get(id).ok_or_else(|| ContainerError::NotFound { id: id.to_string() })
    }

    fn snapshot(&self) -> Vec<Arc<ListenerContainer>> {
        let containers = self
            .containers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<_> = containers.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id().cmp(b.id()));
        snapshot
    }
}
