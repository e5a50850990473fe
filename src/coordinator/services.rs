use std::sync::Arc;

use crate::cache::AvailabilityCache;
use crate::config::Config;
use crate::events::EventBus;
use crate::lock::LockManager;
use crate::queue::JobQueue;
use crate::storage::Storage;

/// Every dependency the coordinator needs, injected at construction.
/// No global singletons, no statics — a caller wires this once at
/// bootstrap and hands it to `Coordinator::new`.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub lock_manager: Arc<dyn LockManager>,
    pub cache: Arc<dyn AvailabilityCache>,
    pub queue: Arc<dyn JobQueue>,
    pub event_bus: Arc<dyn EventBus>,
    pub config: Arc<Config>,
}
