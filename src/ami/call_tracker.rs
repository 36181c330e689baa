//! The call tracker: a thin correlator layered atop the AMI engine
//! (spec.md §4.3.2).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::ami::config::AmiConfig;
use crate::ami::engine::{ActionOutcome, AmiEngine};
use crate::ami::message::Action;
use crate::deferred::DeferredHandle;
use crate::error::AmiError;
use crate::transport::Transport;

/// A per-call status transition reported through the callback supplied to
/// `originate_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Dialing,
    Up,
    HungUp,
    Failed,
}

/// Fields accepted by `Originate`. `extra_headers` carries anything not
/// given its own field (`CallerID`, `Timeout`, `Async`, ...); each becomes
/// a plain header on the rendered action, in order.
#[derive(Debug, Clone, Default)]
pub struct OriginateParams {
    pub channel: String,
    pub context: String,
    pub exten: String,
    pub priority: String,
    pub extra_headers: Vec<(String, String)>,
    pub variables: Vec<(String, String)>,
}

impl OriginateParams {
    pub fn new(channel: impl Into<String>, context: impl Into<String>, exten: impl Into<String>, priority: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            context: context.into(),
            exten: exten.into(),
            priority: priority.into(),
            extra_headers: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((key.into(), value.into()));
        self
    }

    fn into_action(self) -> Action {
        let mut action = Action::new("Originate")
            .header("Channel", self.channel)
            .header("Context", self.context)
            .header("Exten", self.exten)
            .header("Priority", self.priority);
        for (k, v) in self.extra_headers {
            action = action.header(k, v);
        }
        for (k, v) in self.variables {
            action = action.variable(k, v);
        }
        action
    }
}

struct Entry {
    callback: Box<dyn FnMut(CallStatus)>,
    status: CallStatus,
}

#[derive(Default)]
struct TrackerState {
    by_action_id: HashMap<String, Entry>,
    uniqueid_to_action: HashMap<String, String>,
}

/// Correlates `Originate` actions with the `OriginateResponse` /
/// `Newchannel` / `Hangup` events that describe their outcome.
///
/// Correlation with a channel's real AMI unique id is established only
/// once `OriginateResponse` carries it; a `Newchannel`/`Hangup` event
/// that arrives before that happens cannot be attributed to a call and
/// is ignored, per spec.md §5 ("unknown or late events are ignored").
pub struct CallTracker<T: Transport> {
    engine: AmiEngine<T>,
    state: Rc<RefCell<TrackerState>>,
}

impl<T: Transport + 'static> CallTracker<T> {
    pub fn new(config: AmiConfig) -> Self {
        let mut engine = AmiEngine::new(config);
        let state = Rc::new(RefCell::new(TrackerState::default()));

        let s = Rc::clone(&state);
        engine.register_event_handler("OriginateResponse", move |event| {
            let Some(action_id) = event.action_id() else { return Ok(()) };
            let mut state = s.borrow_mut();
            if !state.by_action_id.contains_key(action_id) {
                return Ok(());
            }
            let success = event
                .headers
                .get("Response")
                .map(|v| v.eq_ignore_ascii_case("Success"))
                .unwrap_or(false);
            if let Some(uid) = event.headers.get("Uniqueid") {
                state.uniqueid_to_action.insert(uid.to_owned(), action_id.to_owned());
            }
            let new_status = if success { CallStatus::Up } else { CallStatus::Failed };
            if let Some(entry) = state.by_action_id.get_mut(action_id) {
                entry.status = new_status;
                (entry.callback)(new_status);
            }
            Ok(())
        });

        let s = Rc::clone(&state);
        engine.register_event_handler("Newchannel", move |event| {
            let Some(uid) = event.headers.get("Uniqueid") else { return Ok(()) };
            let mut state = s.borrow_mut();
            let Some(action_id) = state.uniqueid_to_action.get(uid).cloned() else { return Ok(()) };
            if let Some(entry) = state.by_action_id.get_mut(&action_id) {
                // Dialing is the entry's initial status; once OriginateResponse has
                // moved it to Up/Failed (or Hangup has removed it), a later
                // Newchannel must not regress the monotonic sequence.
                if matches!(entry.status, CallStatus::Dialing) {
                    (entry.callback)(CallStatus::Dialing);
                }
            }
            Ok(())
        });

        let s = Rc::clone(&state);
        engine.register_event_handler("Hangup", move |event| {
            let Some(uid) = event.headers.get("Uniqueid") else { return Ok(()) };
            let mut state = s.borrow_mut();
            let Some(action_id) = state.uniqueid_to_action.remove(uid) else { return Ok(()) };
            if let Some(mut entry) = state.by_action_id.remove(&action_id) {
                (entry.callback)(CallStatus::HungUp);
            }
            Ok(())
        });

        Self { engine, state }
    }

    /// Issue an `Originate` and track its lifecycle. `on_status` fires
    /// synchronously on every recognized transition for this call.
    pub fn originate_call(
        &mut self,
        params: OriginateParams,
        on_status: impl FnMut(CallStatus) + 'static,
    ) -> DeferredHandle<ActionOutcome, AmiError> {
        let (action_id, handle) = self.engine.send_action_with_id(params.into_action(), None);
        self.state.borrow_mut().by_action_id.insert(
            action_id,
            Entry {
                callback: Box::new(on_status),
                status: CallStatus::Dialing,
            },
        );
        handle
    }

    /// Drive `connection_lost` on the underlying engine (failing all
    /// pending handles, originate included, with `ConnectionLost`) and
    /// drop any calls this tracker was still watching.
    pub fn connection_lost(&mut self, cause: crate::error::LostCause) {
        self.engine.connection_lost(cause);
        let mut state = self.state.borrow_mut();
        state.by_action_id.clear();
        state.uniqueid_to_action.clear();
    }
}

impl<T: Transport> Deref for CallTracker<T> {
    type Target = AmiEngine<T>;
    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl<T: Transport> DerefMut for CallTracker<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}
