//! Wiring of a complete engine from configuration.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use bookdav_caldav::{CaldavCalendarDao, CaldavClient};
use bookdav_core::error::BookdavResult;
use bookdav_core::ports::{AccountResolver, CalendarDao};

use crate::config::EngineConfig;
use crate::engine::SchedulingEngine;
use crate::events::NotificationSink;
use crate::reflection::ReflectionService;
use crate::store::{AvailabilityStore, ReflectionLockStore, StorePool};

/// A fully wired engine: the booking state machine plus its reflection
/// worker, sharing one store and one CalDAV client.
pub struct EngineRuntime {
    pub engine: SchedulingEngine,
    pub reflection: Arc<ReflectionService>,
}

impl EngineRuntime {
    /// Build the runtime from configuration. The reflection worker is
    /// wired but not started; call [`ReflectionService::start`] once a
    /// Tokio runtime is up.
    pub fn build(
        config: &EngineConfig,
        accounts: Arc<dyn AccountResolver>,
        sink: Arc<dyn NotificationSink>,
    ) -> BookdavResult<Self> {
        let pool = StorePool::open(Path::new(&config.database_path))?;
        let store = Arc::new(AvailabilityStore::new(pool.clone()));
        let locks = Arc::new(ReflectionLockStore::new(pool, config.lock_ttl()));

        let client = CaldavClient::new(&config.server_root);
        let calendar: Arc<dyn CalendarDao> = Arc::new(CaldavCalendarDao::new(client, accounts));

        let engine = SchedulingEngine::new(Arc::clone(&store), Arc::clone(&calendar), sink);
        let reflection =
            ReflectionService::new(store, calendar, locks, config.reflection_interval());

        info!(server_root = %config.server_root, "engine runtime assembled");
        Ok(EngineRuntime { engine, reflection })
    }
}
