//! Generic event channel abstraction and in-process implementation.
//!
//! # Responsibility
//! - Decouple the engine from any concrete host event bus: the engine only
//!   implements `EventHandler`, hosts own delivery.
//!
//! # Invariants
//! - `on_event` never fails and never panics; a handler that cannot process
//!   an event logs and returns.
//! - Handlers are invoked sequentially in registration order on the
//!   delivering thread.

use crate::sync::events::ChangeEvent;

/// Receiver side of the channel. Implemented by the mirror sync listener and
/// by test doubles.
pub trait EventHandler {
    /// Handles one event. Must not fail; errors are the handler's problem.
    fn on_event(&self, event: &ChangeEvent);
}

/// Registration surface a host channel exposes.
pub trait EventChannel<'h> {
    /// Registers one handler for all subsequent events.
    fn subscribe(&mut self, handler: &'h dyn EventHandler);
}

/// Minimal in-process channel: synchronous fan-out to registered handlers.
#[derive(Default)]
pub struct LocalEventChannel<'h> {
    handlers: Vec<&'h dyn EventHandler>,
}

impl<'h> LocalEventChannel<'h> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one event to every registered handler, in order.
    pub fn publish(&self, event: &ChangeEvent) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<'h> EventChannel<'h> for LocalEventChannel<'h> {
    fn subscribe(&mut self, handler: &'h dyn EventHandler) {
        self.handlers.push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::{EventChannel, EventHandler, LocalEventChannel};
    use crate::sync::events::ChangeEvent;
    use std::cell::RefCell;

    struct RecordingHandler {
        seen: RefCell<Vec<String>>,
    }

    impl EventHandler for RecordingHandler {
        fn on_event(&self, event: &ChangeEvent) {
            self.seen.borrow_mut().push(event.action.clone());
        }
    }

    #[test]
    fn publish_fans_out_to_all_handlers_in_order() {
        let first = RecordingHandler {
            seen: RefCell::new(Vec::new()),
        };
        let second = RecordingHandler {
            seen: RefCell::new(Vec::new()),
        };

        let mut channel = LocalEventChannel::new();
        channel.subscribe(&first);
        channel.subscribe(&second);
        assert_eq!(channel.len(), 2);

        let event = ChangeEvent {
            category: "workflow".to_string(),
            action: "rename".to_string(),
            subject_id: "id".to_string(),
            subject_path: "/content/documents/a".to_string(),
            arguments: vec!["b".to_string(), "b2".to_string()],
        };
        channel.publish(&event);

        assert_eq!(first.seen.borrow().as_slice(), ["rename"]);
        assert_eq!(second.seen.borrow().as_slice(), ["rename"]);
    }
}
