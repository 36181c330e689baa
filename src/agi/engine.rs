//! The AGI Engine: framer-driven state machine for the Gateway Interface
//! (spec.md §4.4).

use std::collections::VecDeque;
use std::io;

#[cfg(feature = "tracing")]
use tracing::{debug, warn, Level};

use crate::agi::config::AgiConfig;
use crate::agi::message::{parse_status_line, AgiReply, Environment};
use crate::deferred::DeferredHandle;
use crate::error::{AgiError, ProtocolError};
use crate::framer::LineFramer;
use crate::transport::Transport;

const USAGE_END_MARKER: &str = "End of proper usage";

/// The AGI engine's connection lifecycle (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgiState {
    HeaderIngest,
    Ready,
    AwaitingReply,
    /// Status 511 was seen: the channel is dead. Every subsequent
    /// `send_command` fails immediately until the transport closes.
    AwaitingReplyDead,
    Closed,
}

struct QueuedCommand {
    text: String,
    handle: DeferredHandle<AgiReply, AgiError>,
}

struct CurrentCommand {
    handle: DeferredHandle<AgiReply, AgiError>,
    info_lines: Vec<String>,
}

enum ReplyMode {
    WaitingStatusLine,
    CollectingUsageBody { lines: Vec<String> },
}

/// Framer-driven AGI session. Owns no socket, pipe, or process; driven
/// entirely through `connection_made` / `data_received` / `connection_lost`.
pub struct AgiEngine<T: Transport> {
    transport: Option<T>,
    framer: LineFramer,
    state: AgiState,
    environment: Option<Environment>,
    queue: VecDeque<QueuedCommand>,
    current: Option<CurrentCommand>,
    reply_mode: ReplyMode,
    config: AgiConfig,
}

impl<T: Transport> AgiEngine<T> {
    pub fn new(config: AgiConfig) -> Self {
        Self {
            transport: None,
            framer: LineFramer::new(config.encoding),
            state: AgiState::HeaderIngest,
            environment: None,
            queue: VecDeque::new(),
            current: None,
            reply_mode: ReplyMode::WaitingStatusLine,
            config,
        }
    }

    pub fn state(&self) -> AgiState {
        self.state
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn connection_made(&mut self, transport: T) {
        self.transport = Some(transport);
        self.state = AgiState::HeaderIngest;
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, text), level = Level::TRACE))]
    pub fn send_command(&mut self, text: impl Into<String>) -> DeferredHandle<AgiReply, AgiError> {
        let handle = DeferredHandle::new();
        match self.state {
            AgiState::Closed => {
                let _ = handle.set_exception(AgiError::NotConnected);
                return handle;
            }
            AgiState::AwaitingReplyDead => {
                let _ = handle.set_exception(AgiError::ChannelDead);
                return handle;
            }
            _ => {}
        }
        self.queue.push_back(QueuedCommand {
            text: text.into(),
            handle: handle.clone(),
        });
        if !matches!(self.state, AgiState::HeaderIngest) {
            self.pump_queue();
        }
        handle
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, bytes), level = Level::TRACE))]
    pub fn data_received(&mut self, bytes: &[u8]) {
        self.framer.feed(bytes);
        loop {
            match self.state {
                AgiState::Closed | AgiState::AwaitingReplyDead => break,
                AgiState::HeaderIngest => {
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
                        Some(Ok(block)) => {
                            self.environment = Some(block);
                            #[cfg(feature = "tracing")]
                            debug!("AGI environment block complete, engine ready");
                            self.state = AgiState::Ready;
                            self.pump_queue();
                        }
                    }
                }
                AgiState::Ready => break,
                AgiState::AwaitingReply => match self.framer.next_line() {
                    None => break,
                    Some(Err(e)) => {
                        self.fail_connection(e);
                        break;
                    }
                    Some(Ok(line)) => self.handle_reply_line(line),
                },
            }
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn connection_lost(&mut self, cause: crate::error::LostCause) {
        #[cfg(feature = "tracing")]
        warn!(queued = self.queue.len(), "AGI connection lost");
        if let Some(current) = self.current.take() {
            let _ = current
                .handle
                .set_exception(AgiError::ConnectionLost(crate::error::clone_lost_cause(&cause)));
        }
        for cmd in self.queue.drain(..) {
            let _ = cmd
                .handle
                .set_exception(AgiError::ConnectionLost(crate::error::clone_lost_cause(&cause)));
        }
        self.state = AgiState::Closed;
        self.transport = None;
    }

    /// Close the connection locally: every queued and in-flight command
    /// handle is failed with `ConnectionLost`, state becomes `Closed`
    /// (spec.md §4.4).
    pub fn close(&mut self) {
        if let Some(t) = &mut self.transport {
            t.close();
        }
        self.connection_lost(None);
    }

    fn handle_reply_line(&mut self, line: String) {
        if let ReplyMode::CollectingUsageBody { lines } = &mut self.reply_mode {
            if line.starts_with("520") && line.contains(USAGE_END_MARKER) {
                let ReplyMode::CollectingUsageBody { lines } =
                    std::mem::replace(&mut self.reply_mode, ReplyMode::WaitingStatusLine)
                else {
                    unreachable!();
                };
                self.complete_current(Err(AgiError::UsageError { body_lines: lines }));
            } else {
                lines.push(line);
            }
            return;
        }

        let status = match parse_status_line(&line) {
            Ok(s) => s,
            Err(e) => {
                self.fail_connection(e);
                return;
            }
        };

        match status.code {
            100..=199 => {
                if let Some(current) = &mut self.current {
                    current.info_lines.push(line);
                }
            }
            510 => self.complete_current(Err(AgiError::CommandError)),
            511 => self.enter_dead(),
            520 => {
                self.reply_mode = ReplyMode::CollectingUsageBody { lines: vec![line] };
            }
            _ => {
                let info_lines = self.current.as_mut().map(|c| std::mem::take(&mut c.info_lines)).unwrap_or_default();
                self.complete_current(Ok(AgiReply {
                    code: status.code,
                    result: status.result,
                    verbose: status.verbose,
                    extra: status.extra,
                    info_lines,
                    body_lines: Vec::new(),
                }));
            }
        }
    }

    fn complete_current(&mut self, outcome: Result<AgiReply, AgiError>) {
        if let Some(current) = self.current.take() {
            let _ = match outcome {
                Ok(reply) => current.handle.set_result(reply),
                Err(e) => current.handle.set_exception(e),
            };
        }
        self.pump_queue();
    }

    fn enter_dead(&mut self) {
        #[cfg(feature = "tracing")]
        warn!("AGI channel reported dead (511)");
        if let Some(current) = self.current.take() {
            let _ = current.handle.set_exception(AgiError::ChannelDead);
        }
        for cmd in self.queue.drain(..) {
            let _ = cmd.handle.set_exception(AgiError::ChannelDead);
        }
        self.state = AgiState::AwaitingReplyDead;
    }

    fn pump_queue(&mut self) {
        while self.current.is_none() {
            let Some(cmd) = self.queue.pop_front() else {
                if matches!(self.state, AgiState::AwaitingReply) {
                    self.state = AgiState::Ready;
                }
                return;
            };
            let bytes = self.config.encoding.encode(&format!("{}\n", cmd.text));
            let write_result = match &mut self.transport {
                Some(t) => t.write(&bytes),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "no transport attached")),
            };
            match write_result {
                Ok(()) => {
                    self.current = Some(CurrentCommand {
                        handle: cmd.handle,
                        info_lines: Vec::new(),
                    });
                    self.state = AgiState::AwaitingReply;
                    return;
                }
                Err(e) => {
                    let _ = cmd.handle.set_exception(AgiError::Io(e));
                }
            }
        }
    }

    fn fail_connection(&mut self, error: ProtocolError) {
        self.state = AgiState::Closed;
        if let Some(t) = &mut self.transport {
            t.close();
        }
        self.transport = None;
        if let Some(current) = self.current.take() {
            let _ = current.handle.set_exception(AgiError::Protocol(error.clone()));
        }
        for cmd in self.queue.drain(..) {
            let _ = cmd.handle.set_exception(AgiError::Protocol(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct FakeTransport {
        written: Rc<RefCell<Vec<u8>>>,
    }
    impl Transport for FakeTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn fresh() -> (AgiEngine<FakeTransport>, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AgiEngine::new(AgiConfig::default());
        engine.connection_made(FakeTransport { written: Rc::clone(&written) });
        (engine, written)
    }

    #[test]
    fn environment_then_command_resolves() {
        let (mut engine, written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\nagi_uniqueid: 123.45\n\n");
        assert_eq!(engine.state(), AgiState::Ready);
        assert_eq!(engine.environment().unwrap().get("agi_channel"), Some("SIP/x-0001"));

        let handle = engine.send_command("ANSWER");
        assert_eq!(written.borrow().as_slice(), b"ANSWER\n");
        engine.data_received(b"200 result=0\n");

        let reply = handle.take_outcome().unwrap().unwrap();
        assert_eq!(reply.code, 200);
        assert_eq!(reply.result.as_deref(), Some("0"));
        assert_eq!(engine.state(), AgiState::Ready);
    }

    #[test]
    fn commands_queue_and_run_in_fifo_order() {
        let (mut engine, written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");

        let first = engine.send_command("ANSWER");
        let second = engine.send_command("HANGUP");
        assert_eq!(written.borrow().as_slice(), b"ANSWER\n");

        engine.data_received(b"200 result=0\n");
        assert!(first.take_outcome().unwrap().is_ok());
        assert_eq!(written.borrow().as_slice(), b"ANSWER\nHANGUP\n");

        engine.data_received(b"200 result=1\n");
        assert!(second.take_outcome().unwrap().is_ok());
    }

    #[test]
    fn informational_lines_do_not_complete_the_command() {
        let (mut engine, _written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let handle = engine.send_command("STREAM FILE foo \"\"");
        engine.data_received(b"100 result=0 (stream)\n");
        assert!(!handle.is_fulfilled());
        engine.data_received(b"200 result=0 (stream) endpos=1000\n");
        let reply = handle.take_outcome().unwrap().unwrap();
        assert_eq!(reply.info_lines, vec!["100 result=0 (stream)".to_owned()]);
        assert_eq!(reply.extra.as_deref(), Some("endpos=1000"));
    }

    #[test]
    fn invalid_command_fails_with_command_error() {
        let (mut engine, _written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let handle = engine.send_command("NOTACOMMAND");
        engine.data_received(b"510\n");
        assert!(matches!(handle.take_outcome(), Some(Err(AgiError::CommandError))));
    }

    #[test]
    fn dead_channel_fails_command_and_rejects_subsequent_sends() {
        let (mut engine, written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let handle = engine.send_command("ANSWER");
        engine.data_received(b"511 result=-1\n");
        assert!(matches!(handle.take_outcome(), Some(Err(AgiError::ChannelDead))));
        assert_eq!(engine.state(), AgiState::AwaitingReplyDead);

        let next = engine.send_command("HANGUP");
        assert!(matches!(next.take_outcome(), Some(Err(AgiError::ChannelDead))));
        assert_eq!(written.borrow().as_slice(), b"ANSWER\n");
    }

    #[test]
    fn usage_error_collects_body_lines() {
        let (mut engine, _written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let handle = engine.send_command("SET VARIABLE");
        engine.data_received(b"520-Invalid command syntax.  Proper usage follows.\n");
        engine.data_received(b"Usage: SET VARIABLE <name> <value>\n");
        engine.data_received(b"520 End of proper usage\n");
        match handle.take_outcome() {
            Some(Err(AgiError::UsageError { body_lines })) => {
                assert_eq!(body_lines, vec!["520-Invalid command syntax.  Proper usage follows.".to_owned(), "Usage: SET VARIABLE <name> <value>".to_owned()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn close_fails_pending_commands_and_closes_the_connection() {
        let (mut engine, _written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let first = engine.send_command("ANSWER");
        let second = engine.send_command("HANGUP");
        engine.close();
        assert!(matches!(first.take_outcome(), Some(Err(AgiError::ConnectionLost(None)))));
        assert!(matches!(second.take_outcome(), Some(Err(AgiError::ConnectionLost(None)))));
        assert_eq!(engine.state(), AgiState::Closed);
    }

    #[test]
    fn connection_lost_fails_in_flight_and_queued_commands() {
        let (mut engine, _written) = fresh();
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        let first = engine.send_command("ANSWER");
        let second = engine.send_command("HANGUP");
        engine.connection_lost(None);
        assert!(matches!(first.take_outcome(), Some(Err(AgiError::ConnectionLost(None)))));
        assert!(matches!(second.take_outcome(), Some(Err(AgiError::ConnectionLost(None)))));
        assert_eq!(engine.state(), AgiState::Closed);
    }

    #[test]
    fn malformed_environment_line_fails_the_connection_when_strict() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AgiEngine::new(AgiConfig::default().strict(true));
        engine.connection_made(FakeTransport { written });
        engine.data_received(b"NoColonHere\n\n");
        assert_eq!(engine.state(), AgiState::Closed);
    }

    #[test]
    fn malformed_environment_line_is_skipped_via_fault_sink_when_lenient() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&reported);
        let mut config = AgiConfig::default();
        config.fault_sink = Box::new(move |e| r.borrow_mut().push(e.to_string()));
        let mut engine = AgiEngine::new(config);
        engine.connection_made(FakeTransport {
            written: Rc::new(RefCell::new(Vec::new())),
        });
        engine.data_received(b"NoColonHere\nagi_channel: SIP/x-0001\n\n");
        assert_eq!(engine.state(), AgiState::Ready);
        assert_eq!(engine.environment().unwrap().get("agi_channel"), Some("SIP/x-0001"));
        assert_eq!(reported.borrow().len(), 1);
    }
}
