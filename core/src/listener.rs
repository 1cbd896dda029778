//! Outward observer interface of the central role
//!
//! The UI (or a test harness) implements `Listener`, or takes a
//! `ChannelListener` and consumes `ListenerEvent`s from a tokio channel.

use std::sync::Arc;
use tokio::sync::mpsc;

#[cfg_attr(test, mockall::automock)]
pub trait Listener: Send {
    fn connected_updated(&mut self, connected: bool);
    fn value_updated(&mut self, value: i64);
    fn scanning_updated(&mut self, scanning: bool);
}

/// A single listener notification, as carried by `ChannelListener`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    Connected(bool),
    Value(i64),
    Scanning(bool),
}

/// Listener that forwards every notification onto an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ChannelListener {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ListenerEvent) {
        // Receiver gone means nobody is watching anymore
        let _ = self.tx.send(event);
    }
}

impl Listener for ChannelListener {
    fn connected_updated(&mut self, connected: bool) {
        self.emit(ListenerEvent::Connected(connected));
    }

    fn value_updated(&mut self, value: i64) {
        self.emit(ListenerEvent::Value(value));
    }

    fn scanning_updated(&mut self, scanning: bool) {
        self.emit(ListenerEvent::Scanning(scanning));
    }
}

/// Shared listeners with interior mutability
impl<L> Listener for Arc<parking_lot::Mutex<L>>
where
    L: Listener,
{
    fn connected_updated(&mut self, connected: bool) {
        self.lock().connected_updated(connected);
    }

    fn value_updated(&mut self, value: i64) {
        self.lock().value_updated(value);
    }

    fn scanning_updated(&mut self, scanning: bool) {
        self.lock().scanning_updated(scanning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_preserves_order() {
        let (mut listener, mut rx) = ChannelListener::channel();
        listener.scanning_updated(true);
        listener.connected_updated(true);
        listener.value_updated(42);

        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Scanning(true));
        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Connected(true));
        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Value(42));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_listener_tolerates_dropped_receiver() {
        let (mut listener, rx) = ChannelListener::channel();
        drop(rx);
        listener.value_updated(1);
    }

    #[test]
    fn test_shared_listener_forwards() {
        let (inner, mut rx) = ChannelListener::channel();
        let mut shared = Arc::new(parking_lot::Mutex::new(inner));
        shared.connected_updated(false);
        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Connected(false));
    }
}
