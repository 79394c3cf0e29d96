//! Booking engine: availability persistence, the scheduling state
//! machine, and background reflection of schedules into remote calendars.

pub mod config;
pub mod engine;
pub mod events;
pub mod reflection;
pub mod runtime;
pub mod store;

pub use config::EngineConfig;
pub use engine::{CancelOutcome, ScheduleOutcome, SchedulingEngine};
pub use events::{AppointmentEvent, ChannelSink, NoopSink, NotificationSink};
pub use reflection::ReflectionService;
pub use runtime::EngineRuntime;
pub use store::{AvailabilityStore, ReflectionLockStore, StorePool};
