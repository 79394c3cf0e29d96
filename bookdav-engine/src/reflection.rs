//! Background mirroring of availability into owners' remote calendars.
//!
//! Schedule changes enqueue the owner; a worker loop drains the queue on
//! an interval and pushes transparent placeholder events through the
//! [`CalendarDao`]. A per-owner advisory lock keeps concurrent engine
//! instances from reflecting the same owner at once; a held lock defers
//! the owner to the next pass instead of failing.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use bookdav_core::error::{BookdavError, BookdavResult};
use bookdav_core::identity::Owner;
use bookdav_core::ports::CalendarDao;
use bookdav_core::range::DateRange;

use crate::store::{AvailabilityStore, ReflectionLockStore};

pub struct ReflectionService {
    store: Arc<AvailabilityStore>,
    calendar: Arc<dyn CalendarDao>,
    locks: Arc<ReflectionLockStore>,
    pending: Arc<Mutex<VecDeque<Owner>>>,
    interval: Duration,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReflectionService {
    pub fn new(
        store: Arc<AvailabilityStore>,
        calendar: Arc<dyn CalendarDao>,
        locks: Arc<ReflectionLockStore>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(ReflectionService {
            store,
            calendar,
            locks,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            interval,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the worker loop. Calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(interval_secs = service.interval.as_secs(), "reflection worker started");
            loop {
                tokio::select! {
                    _ = service.cancel.cancelled() => {
                        info!("reflection worker stopping");
                        break;
                    }
                    _ = tokio::time::sleep(service.interval) => {
                        service.run_once().await;
                    }
                }
            }
        });
        *worker = Some(handle);
    }

    /// Signal the worker to stop and wait for it to wind down.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some() && !self.cancel.is_cancelled()
    }

    /// Note that the owner's schedule changed and a reflection is due.
    ///
    /// Owners with reflection disabled are skipped; an owner already
    /// queued is not queued twice.
    pub fn schedule_changed(&self, owner: &Owner) {
        if !owner.preferences.reflect_schedule {
            debug!(owner = %owner.identity.id, "reflection disabled, skipping");
            return;
        }
        let mut pending = self.pending.lock();
        if pending.iter().any(|o| o.identity.id == owner.identity.id) {
            return;
        }
        pending.push_back(owner.clone());
    }

    /// Remove the owner's placeholders from `range` and drop any pending
    /// reflection for them.
    #[instrument(skip(self, owner, range), fields(owner = %owner.identity.id))]
    pub async fn purge(&self, owner: &Owner, range: &DateRange) -> BookdavResult<()> {
        self.pending
            .lock()
            .retain(|o| o.identity.id != owner.identity.id);
        self.calendar.purge_reflections(owner, range).await
    }

    /// Drain the pending queue once. Each owner is processed under their
    /// advisory lock; failures are logged per owner and do not stop the
    /// pass. Lock-deferred owners are re-queued after the drain so one
    /// held lock never starves the rest of the queue.
    pub async fn run_once(&self) {
        let mut deferred = Vec::new();
        loop {
            let owner = match self.pending.lock().pop_front() {
                Some(owner) => owner,
                None => break,
            };
            match self.process_owner(&owner).await {
                Ok(()) => {}
                Err(BookdavError::LockUnavailable(_)) => {
                    debug!(owner = %owner.identity.id, "lock held, deferring to next pass");
                    deferred.push(owner);
                }
                Err(e) => {
                    error!(owner = %owner.identity.id, error = %e, "reflection failed");
                }
            }
        }
        if !deferred.is_empty() {
            self.pending.lock().extend(deferred);
        }
    }

    #[instrument(skip(self, owner), fields(owner = %owner.identity.id))]
    async fn process_owner(&self, owner: &Owner) -> BookdavResult<()> {
        self.locks.try_acquire(&owner.identity.id)?;

        let result = self.reflect(owner).await;
        let released = self.locks.release(&owner.identity.id);
        result?;
        released
    }

    async fn reflect(&self, owner: &Owner) -> BookdavResult<()> {
        let now = Utc::now();
        let horizon =
            now + chrono::Duration::weeks(i64::from(owner.preferences.window_weeks_end));
        let range = DateRange::new(now, horizon)?;

        let schedule = self.store.retrieve_in_range(&owner.identity.id, &range)?;
        self.calendar.reflect_schedule(owner, &schedule, &range).await?;
        info!(owner = %owner.identity.id, blocks = schedule.len(), "schedule reflected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use bookdav_core::appointment::CalendarResource;
    use bookdav_core::block::AvailableBlock;
    use bookdav_core::event::Event;
    use bookdav_core::identity::{IdentityRef, Preferences};
    use bookdav_core::schedule::AvailableSchedule;

    use crate::store::StorePool;

    #[derive(Default)]
    struct CountingCalendar {
        reflects: AtomicUsize,
        purges: AtomicUsize,
    }

    #[async_trait]
    impl CalendarDao for CountingCalendar {
        async fn get_calendars(
            &self,
            _owner: &IdentityRef,
            _range: &DateRange,
        ) -> BookdavResult<Vec<CalendarResource>> {
            Ok(vec![])
        }

        async fn create_appointment(
            &self,
            _owner: &Owner,
            _visitor: &IdentityRef,
            _block: &AvailableBlock,
            _description: &str,
        ) -> BookdavResult<Event> {
            unimplemented!("not exercised here")
        }

        async fn join_appointment(
            &self,
            _owner: &Owner,
            _visitor: &IdentityRef,
            _resource: &CalendarResource,
        ) -> BookdavResult<Event> {
            unimplemented!("not exercised here")
        }

        async fn leave_appointment(
            &self,
            _owner: &Owner,
            _visitor: &IdentityRef,
            _resource: &CalendarResource,
        ) -> BookdavResult<Event> {
            unimplemented!("not exercised here")
        }

        async fn cancel_appointment(
            &self,
            _owner: &Owner,
            _resource: &CalendarResource,
        ) -> BookdavResult<()> {
            unimplemented!("not exercised here")
        }

        async fn reflect_schedule(
            &self,
            _owner: &Owner,
            _schedule: &AvailableSchedule,
            _range: &DateRange,
        ) -> BookdavResult<()> {
            self.reflects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn purge_reflections(
            &self,
            _owner: &Owner,
            _range: &DateRange,
        ) -> BookdavResult<()> {
            self.purges.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reflecting_owner(id: &str) -> Owner {
        Owner {
            identity: IdentityRef::new(id, &format!("{id}@example.com"), id),
            preferences: Preferences {
                reflect_schedule: true,
                ..Preferences::default()
            },
        }
    }

    fn setup(
        calendar: Arc<CountingCalendar>,
    ) -> (Arc<ReflectionService>, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = StorePool::open(&dir.path().join("test.db")).unwrap();
        let store = Arc::new(AvailabilityStore::new(pool.clone()));
        let locks = Arc::new(ReflectionLockStore::new(pool, Duration::from_secs(60)));
        let service =
            ReflectionService::new(store, calendar, locks, Duration::from_secs(3600));
        (service, dir)
    }

    #[tokio::test]
    async fn test_change_is_reflected_once_per_pass() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar.clone());

        let owner = reflecting_owner("owner1");
        service.schedule_changed(&owner);
        service.schedule_changed(&owner);
        service.run_once().await;

        assert_eq!(calendar.reflects.load(Ordering::SeqCst), 1);
        assert!(service.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_owner_without_reflection_is_never_queued() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar.clone());

        let owner = Owner {
            identity: IdentityRef::new("owner1", "owner1@example.com", "Owner"),
            preferences: Preferences::default(),
        };
        service.schedule_changed(&owner);
        service.run_once().await;

        assert_eq!(calendar.reflects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_held_lock_defers_owner_to_next_pass() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar.clone());

        service.locks.try_acquire("owner1").unwrap();

        let owner = reflecting_owner("owner1");
        service.schedule_changed(&owner);
        service.run_once().await;

        assert_eq!(calendar.reflects.load(Ordering::SeqCst), 0);
        assert_eq!(service.pending.lock().len(), 1, "owner stays queued");

        service.locks.release("owner1").unwrap();
        service.run_once().await;
        assert_eq!(calendar.reflects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_held_lock_does_not_starve_other_owners() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar.clone());

        service.locks.try_acquire("owner1").unwrap();

        service.schedule_changed(&reflecting_owner("owner1"));
        service.schedule_changed(&reflecting_owner("owner2"));
        service.run_once().await;

        assert_eq!(
            calendar.reflects.load(Ordering::SeqCst),
            1,
            "owner2 reflects even while owner1's lock is held"
        );
        let pending = service.pending.lock();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identity.id, "owner1");
    }

    #[tokio::test]
    async fn test_purge_drops_pending_reflection() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar.clone());

        let owner = reflecting_owner("owner1");
        service.schedule_changed(&owner);

        let now = Utc::now();
        let range = DateRange::new(now, now + chrono::Duration::weeks(3)).unwrap();
        service.purge(&owner, &range).await.unwrap();

        assert_eq!(calendar.purges.load(Ordering::SeqCst), 1);
        assert!(service.pending.lock().is_empty());

        service.run_once().await;
        assert_eq!(calendar.reflects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_worker_start_stop() {
        let calendar = Arc::new(CountingCalendar::default());
        let (service, _dir) = setup(calendar);

        service.start();
        assert!(service.is_running());
        service.stop().await;
        assert!(!service.is_running());
    }
}
