//! Notification sinks.
//!
//! [`ChannelNotifier`] is fire-and-forget: it wraps an unbounded channel
//! sender, never blocks, and silently drops intents once the receiving side
//! has gone away. Notification delivery must never stall a cycle boundary.

use tokio::sync::mpsc;
use tracing::trace;

use super::event::Notification;

/// Receiver of notification intents.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that forwards intents over an unbounded channel.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Creates a notifier together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl NotificationSink for ChannelNotifier {
    #[inline]
    fn notify(&self, notification: Notification) {
        trace!(kind = notification.kind.as_str(), "Notification emitted");
        // Ignore send errors - the consumer may have shut down
        let _ = self.tx.send(notification);
    }
}

/// Sink that discards every intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl NotificationSink for NoOpNotifier {
    fn notify(&self, _notification: Notification) {}
}
