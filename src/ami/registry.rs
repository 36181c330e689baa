//! The event dispatch registry (spec.md §4.3.1).

use std::collections::HashMap;
use std::error::Error as StdError;

use crate::ami::message::Event;

/// A handler may fail instead of panicking; a returned `Err` is reported
/// to the fault sink instead of propagating, per spec.md §4.3.1 ("Handler
/// exceptions go to the fault sink; they do not affect other handlers or
/// connection state").
pub(crate) type EventHandler = Box<dyn FnMut(&Event) -> Result<(), Box<dyn StdError + Send + Sync>>>;

/// A token returned by `register`, used to `unregister` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

struct Slot {
    token: HandlerToken,
    event_name: String,
    handler: EventHandler,
}

/// Maps event names (plus the `"*"` wildcard) to handlers, firing specific
/// handlers before the wildcard, in registration order within each group.
#[derive(Default)]
pub(crate) struct EventRegistry {
    slots: Vec<Slot>,
    next_token: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_token: 0,
        }
    }

    pub fn register(&mut self, event_name: impl Into<String>, handler: EventHandler) -> HandlerToken {
        let token = HandlerToken(self.next_token);
        self.next_token += 1;
        self.slots.push(Slot {
            token,
            event_name: event_name.into(),
            handler,
        });
        token
    }

    pub fn unregister(&mut self, token: HandlerToken) {
        self.slots.retain(|s| s.token != token);
    }

    /// Dispatch `event` to every handler registered under its exact name,
    /// in registration order, then to every wildcard (`"*"`) handler. A
    /// handler's `Err` is reported through `on_error` rather than aborting
    /// dispatch to the remaining handlers. Returns `true` if at least one
    /// handler ran.
    pub fn dispatch(&mut self, event: &Event, on_error: &mut dyn FnMut(Box<dyn StdError + Send + Sync>)) -> bool {
        let mut dispatched = false;
        for slot in self.slots.iter_mut() {
            if slot.event_name == event.name() {
                if let Err(e) = (slot.handler)(event) {
                    on_error(e);
                }
                dispatched = true;
            }
        }
        for slot in self.slots.iter_mut() {
            if slot.event_name == "*" {
                if let Err(e) = (slot.handler)(event) {
                    on_error(e);
                }
                dispatched = true;
            }
        }
        dispatched
    }
}
