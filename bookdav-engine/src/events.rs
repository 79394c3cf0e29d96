//! Appointment lifecycle notifications.
//!
//! The engine publishes one [`AppointmentEvent`] per completed mutation.
//! Delivery is best-effort: a sink that has gone away never fails a
//! booking that already succeeded on the calendar server.

use bookdav_core::block::AvailableBlock;
use bookdav_core::event::Event;
use bookdav_core::identity::IdentityRef;
use tokio::sync::mpsc;
use tracing::debug;

/// What just happened to an appointment.
#[derive(Debug, Clone)]
pub enum AppointmentEvent {
    Created {
        appointment: Event,
        owner: IdentityRef,
        visitor: IdentityRef,
        block: AvailableBlock,
    },
    Joined {
        appointment: Event,
        owner: IdentityRef,
        visitor: IdentityRef,
        block: AvailableBlock,
    },
    Left {
        appointment: Event,
        owner: IdentityRef,
        visitor: IdentityRef,
        block: AvailableBlock,
    },
    Cancelled {
        owner: IdentityRef,
        visitor: IdentityRef,
        block: AvailableBlock,
        reason: Option<String>,
    },
}

/// Receives appointment events after the calendar write has succeeded.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: AppointmentEvent);
}

/// Sink that forwards events onto an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AppointmentEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AppointmentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, event: AppointmentEvent) {
        if self.tx.send(event).is_err() {
            debug!("notification receiver dropped, event discarded");
        }
    }
}

/// Sink that drops every event.
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn publish(&self, _event: AppointmentEvent) {}
}
