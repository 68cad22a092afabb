use std::sync::Arc;

use crate::{
    config::Config,
    events::Bus,
    scrape::{Clock, RegistryHandle},
    source::RemoteSource,
    store::{MemoryStore, RecordStore},
    subscribers::Subscribe,
};

use super::poller::Poller;

/// Builder for a [`Poller`].
pub struct PollerBuilder {
    config: Config,
    source: Arc<dyn RemoteSource>,
    store: Option<Arc<dyn RecordStore>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: Option<RegistryHandle>,
    clock: Option<Clock>,
}

impl PollerBuilder {
    pub(super) fn new(config: Config, source: Arc<dyn RemoteSource>) -> Self {
        Self {
            config,
            source,
            store: None,
            subscribers: Vec::new(),
            registry: None,
            clock: None,
        }
    }

    /// Uses `store` instead of a [`MemoryStore`] at [`Config::snapshot_path`].
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive every event through dedicated workers with
    /// bounded queues, from `start` until `stop` returns.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Publishes into an existing registry handle.
    pub fn with_registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the wall clock used to age records.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the poller, stopped.
    pub fn build(self) -> Poller {
        let store = self.store.unwrap_or_else(|| {
            let store = match self.config.snapshot_path() {
                Some(path) => MemoryStore::with_snapshot(path),
                None => MemoryStore::new(),
            };
            Arc::new(store)
        });
        let bus = Bus::new(self.config.bus_capacity_clamped());

        Poller::from_parts(
            self.config,
            bus,
            self.source,
            store,
            self.registry.unwrap_or_default(),
            self.subscribers,
            self.clock,
        )
    }
}
