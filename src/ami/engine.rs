//! The AMI Engine: framer-driven state machine for the Manager Interface
//! (spec.md §4.3).

use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::{debug, error, warn, Level};

use crate::ami::config::AmiConfig;
use crate::ami::message::{Action, Event, ListResult, Response};
use crate::ami::registry::{EventRegistry, HandlerToken};
use crate::deferred::DeferredHandle;
use crate::error::{AmiError, FaultEvent, ProtocolError};
use crate::framer::{HeaderBlock, LineFramer};
use crate::transport::Transport;

const BANNER_PREFIX: &str = "Asterisk Call Manager/";
const FOLLOWS_SENTINEL: &str = "--END COMMAND--";

/// The AMI engine's connection lifecycle (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmiState {
    Disconnected,
    AwaitingBanner,
    Unauthenticated,
    Authenticated,
    Closing,
    Closed,
}

/// Either shape a pending action's handle can resolve to, depending on
/// whether it was sent as a list-style action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Simple(Response),
    List(ListResult),
}

impl ActionOutcome {
    pub fn response(&self) -> &Response {
        match self {
            Self::Simple(r) => r,
            Self::List(l) => &l.response,
        }
    }
}

#[derive(Debug)]
enum Mode {
    HeaderBlock,
    /// Response: Follows is being collected as raw lines until the
    /// `--END COMMAND--` sentinel.
    Follows {
        action_id: String,
        headers: HeaderBlock,
        lines: Vec<String>,
    },
}

struct ListAccumulator {
    terminator_event: String,
    response: Option<Response>,
    events: Vec<Event>,
}

struct PendingAction {
    handle: DeferredHandle<ActionOutcome, AmiError>,
    is_login: bool,
    list: Option<ListAccumulator>,
}

/// Framer-driven AMI session. Owns no socket; driven entirely through
/// `connection_made` / `data_received` / `connection_lost`.
pub struct AmiEngine<T: Transport> {
    transport: Option<T>,
    framer: LineFramer,
    mode: Mode,
    state: AmiState,
    banner_version: Option<String>,
    next_action_id: u64,
    pending: HashMap<String, PendingAction>,
    registry: EventRegistry,
    config: AmiConfig,
}

impl<T: Transport> AmiEngine<T> {
    pub fn new(config: AmiConfig) -> Self {
        Self {
            transport: None,
            framer: LineFramer::new(config.encoding),
            mode: Mode::HeaderBlock,
            state: AmiState::Disconnected,
            banner_version: None,
            next_action_id: 1,
            pending: HashMap::new(),
            registry: EventRegistry::new(),
            config,
        }
    }

    pub fn state(&self) -> AmiState {
        self.state
    }

    /// The version string from the banner (`Asterisk Call Manager/<version>`),
    /// once received.
    pub fn banner_version(&self) -> Option<&str> {
        self.banner_version.as_deref()
    }

    /// Register a handler for `event_name` (or `"*"` for every event).
    /// A handler that returns `Err` has its error reported to the fault
    /// sink as `FaultEvent::HandlerError`; it does not stop dispatch to
    /// the remaining handlers, nor affect connection state (spec.md
    /// §4.3.1).
    pub fn register_event_handler(
        &mut self,
        event_name: impl Into<String>,
        handler: impl FnMut(&Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + 'static,
    ) -> HandlerToken {
        self.registry.register(event_name, Box::new(handler))
    }

    pub fn unregister_event_handler(&mut self, token: HandlerToken) {
        self.registry.unregister(token);
    }

    pub fn connection_made(&mut self, transport: T) {
        self.transport = Some(transport);
        self.state = AmiState::AwaitingBanner;
    }

    /// Send an action. `list_terminator` overrides the configured mapping
    /// for this one call; if neither supplies a terminator the action is
    /// not list-style, and any events sharing its `ActionID` dispatch as
    /// ordinary events (spec.md §9).
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, action), level = Level::TRACE))]
    pub fn send_action(
        &mut self,
        action: Action,
        list_terminator: Option<&str>,
    ) -> DeferredHandle<ActionOutcome, AmiError> {
        self.send_action_with_id(action, list_terminator).1
    }

    pub(crate) fn send_action_with_id(
        &mut self,
        action: Action,
        list_terminator: Option<&str>,
    ) -> (String, DeferredHandle<ActionOutcome, AmiError>) {
        let handle = DeferredHandle::new();
        let is_login = action.name.eq_ignore_ascii_case("Login");
        let action_id = self.next_action_id.to_string();
        self.next_action_id += 1;

        let allowed = match self.state {
            AmiState::Authenticated => true,
            AmiState::Unauthenticated if is_login => true,
            _ => false,
        };
        if !allowed {
            let _ = handle.set_exception(AmiError::NotConnected);
            return (action_id, handle);
        }

        let terminator = list_terminator
            .map(str::to_owned)
            .or_else(|| self.config.list_action_terminators.get(&action.name).cloned());

        let bytes = self.config.encoding.encode(&action.render(&action_id));
        let write_result = match &mut self.transport {
            Some(t) => t.write(&bytes),
            None => {
                let _ = handle.set_exception(AmiError::NotConnected);
                return (action_id, handle);
            }
        };
        if let Err(e) = write_result {
            let _ = handle.set_exception(AmiError::Io(e));
            return (action_id, handle);
        }

        self.pending.insert(
            action_id.clone(),
            PendingAction {
                handle: handle.clone(),
                is_login,
                list: terminator.map(|terminator_event| ListAccumulator {
                    terminator_event,
                    response: None,
                    events: Vec::new(),
                }),
            },
        );
        (action_id, handle)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, bytes), level = Level::TRACE))]
    pub fn data_received(&mut self, bytes: &[u8]) {
        self.framer.feed(bytes);
        self.pump();
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn connection_lost(&mut self, cause: crate::error::LostCause) {
        #[cfg(feature = "tracing")]
        warn!(pending = self.pending.len(), "AMI connection lost");
        for (_, pending) in self.pending.drain() {
            let _ = pending
                .handle
                .set_exception(AmiError::ConnectionLost(crate::error::clone_lost_cause(&cause)));
        }
        self.state = AmiState::Closed;
        self.transport = None;
    }

    pub fn close(&mut self) {
        self.state = AmiState::Closing;
        if let Some(t) = &mut self.transport {
            t.close();
        }
    }

    fn pump(&mut self) {
        loop {
            match self.state {
                AmiState::AwaitingBanner => match self.framer.next_line() {
                    None => break,
                    Some(Err(e)) => {
                        self.fail_connection(e);
                        break;
                    }
                    Some(Ok(line)) => {
                        if !self.handle_banner(line) {
                            break;
                        }
                    }
                },
                AmiState::Closing | AmiState::Closed | AmiState::Disconnected => break,
                AmiState::Unauthenticated | AmiState::Authenticated => {
                    let follows_in_progress = matches!(self.mode, Mode::Follows { .. });
                    if follows_in_progress {
                        match self.framer.next_line() {
                            None => break,
                            Some(Err(e)) => {
                                self.fail_connection(e);
                                break;
                            }
                            Some(Ok(line)) => self.handle_follows_line(line),
                        }
                    } else {
                        let strict = self.config.strict_headers;
                        let next = {
                            let framer = &mut self.framer;
                            let fault_sink = &mut *self.config.fault_sink;
                            framer.next_header_block(strict, fault_sink)
                        };
                        match next {
                            None => break,
                            Some(Err(e)) => {
                                self.fail_connection(e);
                                break;
                            }
                            Some(Ok(block)) => self.handle_block(block),
                        }
                    }
                }
            }
        }
    }

    /// Returns `false` if the connection was failed and the pump loop
    /// should stop.
    fn handle_banner(&mut self, line: String) -> bool {
        match line.strip_prefix(BANNER_PREFIX) {
            Some(version) => {
                #[cfg(feature = "tracing")]
                debug!(%version, "AMI banner received");
                self.banner_version = Some(version.to_owned());
                self.state = AmiState::Unauthenticated;
                true
            }
            None => {
                self.fail_connection(ProtocolError::MissingBanner(line));
                false
            }
        }
    }

    fn handle_follows_line(&mut self, line: String) {
        if line == FOLLOWS_SENTINEL {
            let Mode::Follows { action_id, headers, lines } = std::mem::replace(&mut self.mode, Mode::HeaderBlock) else {
                unreachable!("handle_follows_line called outside Follows mode");
            };
            let response = Response {
                headers,
                follows_body: Some(lines.join("\n")),
            };
            self.complete_action(action_id, Ok(response));
        } else if let Mode::Follows { lines, .. } = &mut self.mode {
            lines.push(line);
        }
    }

    fn handle_block(&mut self, block: HeaderBlock) {
        if let Some(status) = block.get("Response") {
            let status = status.to_owned();
            self.handle_response(block, status);
        } else if block.get("Event").is_some() {
            self.handle_event(Event { headers: block });
        } else {
            self.fail_connection(ProtocolError::UnclassifiableBlock);
        }
    }

    fn handle_response(&mut self, block: HeaderBlock, status: String) {
        let action_id = block.get("ActionID").map(str::to_owned);

        if status.eq_ignore_ascii_case("Follows") {
            match action_id {
                Some(action_id) => {
                    self.mode = Mode::Follows {
                        action_id,
                        headers: block,
                        lines: Vec::new(),
                    };
                }
                None => self.report_fault(FaultEvent::UnknownActionId("<missing>".to_owned())),
            }
            return;
        }

        let response = Response {
            headers: block,
            follows_body: None,
        };
        match action_id {
            Some(id) => {
                if status.eq_ignore_ascii_case("Error") {
                    let message = response.headers.get("Message").map(str::to_owned);
                    self.complete_action(id, Err(AmiError::ActionFailed { message }));
                } else {
                    self.accept_or_start_list(id, response);
                }
            }
            None => self.report_fault(FaultEvent::UnknownActionId("<missing>".to_owned())),
        }
    }

    /// A non-error, non-Follows response arrived. If the action is
    /// list-style, stash it and keep the pending record open; otherwise
    /// complete the handle immediately.
    fn accept_or_start_list(&mut self, action_id: String, response: Response) {
        let is_list = matches!(self.pending.get(&action_id), Some(p) if p.list.is_some());
        if is_list {
            if let Some(pending) = self.pending.get_mut(&action_id) {
                if let Some(list) = &mut pending.list {
                    list.response = Some(response);
                }
            }
        } else {
            self.complete_action(action_id, Ok(response));
        }
    }

    fn handle_event(&mut self, event: Event) {
        if let Some(action_id) = event.action_id().map(str::to_owned) {
            if let Some(pending) = self.pending.get(&action_id) {
                if pending.list.is_some() {
                    self.handle_list_event(action_id, event);
                    return;
                }
            }
        }
        let registry = &mut self.registry;
        let fault_sink = &mut *self.config.fault_sink;
        let dispatched = registry.dispatch(&event, &mut |e| {
            fault_sink(FaultEvent::HandlerError(e));
        });
        if !dispatched {
            self.report_fault(FaultEvent::UnhandledEvent(event.name().to_owned()));
        }
    }

    fn handle_list_event(&mut self, action_id: String, event: Event) {
        let is_terminator = self
            .pending
            .get(&action_id)
            .and_then(|p| p.list.as_ref())
            .map(|l| l.terminator_event.eq_ignore_ascii_case(event.name()))
            .unwrap_or(false);

        if !is_terminator {
            if let Some(pending) = self.pending.get_mut(&action_id) {
                if let Some(list) = &mut pending.list {
                    list.events.push(event);
                }
            }
            return;
        }

        if self.config.include_terminator_in_list {
            if let Some(pending) = self.pending.get_mut(&action_id) {
                if let Some(list) = &mut pending.list {
                    list.events.push(event.clone());
                }
            }
        }

        if let Some(pending) = self.pending.remove(&action_id) {
            if let Some(list) = pending.list {
                match list.response {
                    Some(response) => {
                        let _ = pending.handle.set_result(ActionOutcome::List(ListResult {
                            response,
                            events: list.events,
                        }));
                    }
                    None => self.report_fault(FaultEvent::UnknownActionId(action_id)),
                }
            }
        }
    }

    /// Fulfil (or fail) the pending action `action_id`, removing its
    /// record. If the handle was already fulfilled externally (the caller
    /// cancelled it), the outcome is silently discarded, matching the
    /// cancellation contract in spec.md §5.
    fn complete_action(&mut self, action_id: String, outcome: Result<Response, AmiError>) {
        let Some(pending) = self.pending.remove(&action_id) else {
            self.report_fault(FaultEvent::UnknownActionId(action_id));
            return;
        };
        let is_login = pending.is_login;
        let login_failed = is_login && outcome.is_err();
        let login_succeeded = is_login && outcome.is_ok();
        let _ = match outcome {
            Ok(response) => pending.handle.set_result(ActionOutcome::Simple(response)),
            Err(e) => pending.handle.set_exception(e),
        };
        if login_succeeded && self.state == AmiState::Unauthenticated {
            #[cfg(feature = "tracing")]
            debug!("AMI login succeeded, connection authenticated");
            self.state = AmiState::Authenticated;
        }
        if login_failed {
            #[cfg(feature = "tracing")]
            warn!("AMI login failed, closing connection");
            self.state = AmiState::Closed;
            if let Some(t) = &mut self.transport {
                t.close();
            }
            self.transport = None;
        }
    }

    fn fail_connection(&mut self, error: ProtocolError) {
        #[cfg(feature = "tracing")]
        error!(%error, "AMI connection failed");
        self.report_fault(FaultEvent::SkippedMalformedLine(error.to_string()));
        self.state = AmiState::Closed;
        if let Some(t) = &mut self.transport {
            t.close();
        }
        self.transport = None;
        for (_, pending) in self.pending.drain() {
            let _ = pending.handle.set_exception(AmiError::Protocol(error.clone()));
        }
    }

    fn report_fault(&mut self, event: FaultEvent) {
        (self.config.fault_sink)(event);
    }
}
