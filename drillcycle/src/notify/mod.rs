//! Notification intents.
//!
//! The engine never delivers anything to clients itself. Components describe
//! what happened as a [`Notification`] and hand it to a [`NotificationSink`];
//! transport is the sink owner's concern.

mod client;
mod event;

pub use client::{ChannelNotifier, NoOpNotifier, NotificationSink};
pub use event::{Notification, NotificationKind};
