//! The Async-AGI adapter: the same AGI engine contract, tunnelled through
//! an AMI carrier instead of its own socket (spec.md §4.4.1).
//!
//! Asterisk's `AsyncAGI` event carries a `SubEvent` field. This adapter
//! recognizes two: `Start`, whose `Env` header holds the session's
//! environment block verbatim, and `Exec`, whose `Result` header holds one
//! raw AGI reply line. A plain `Hangup` event for the bound channel is
//! translated to a synthetic `511` line, so the inner engine's dead-channel
//! handling applies uniformly whether the session is local or tunnelled.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::agi::config::AgiConfig;
use crate::agi::engine::AgiEngine;
use crate::agi::message::AgiReply;
use crate::ami::{Action, AmiEngine};
use crate::deferred::DeferredHandle;
use crate::error::AgiError;
use crate::transport::Transport;

/// A `Transport` that renders AGI command text as an `AGI` AMI action on a
/// shared carrier, instead of writing to a socket.
struct AsyncAgiTransport<T: Transport> {
    carrier: Rc<RefCell<AmiEngine<T>>>,
    channel: String,
}

impl<T: Transport> std::fmt::Debug for AsyncAgiTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncAgiTransport").field("channel", &self.channel).finish()
    }
}

impl<T: Transport> Transport for AsyncAgiTransport<T> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .trim_end_matches('\n');
        let action = Action::new("AGI").header("Channel", self.channel.clone()).header("Command", text);
        // The command's own AMI-level ack is not the AGI reply; the reply
        // arrives later as an `AsyncAGI` event. Fire and forget.
        let _ = self.carrier.borrow_mut().send_action(action, None);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Presents the `AgiEngine` contract over an AMI carrier bound to one
/// channel. Construct with [`AsyncAgiAdapter::bind`].
pub struct AsyncAgiAdapter<T: Transport + 'static> {
    inner: Rc<RefCell<AgiEngine<AsyncAgiTransport<T>>>>,
}

impl<T: Transport + 'static> AsyncAgiAdapter<T> {
    /// Bind a new Async-AGI session to `channel` on `carrier`, registering
    /// the event handlers that keep it fed.
    pub fn bind(carrier: Rc<RefCell<AmiEngine<T>>>, channel: impl Into<String>, config: AgiConfig) -> Self {
        let channel = channel.into();
        let inner = Rc::new(RefCell::new(AgiEngine::new(config)));
        inner.borrow_mut().connection_made(AsyncAgiTransport {
            carrier: Rc::clone(&carrier),
            channel: channel.clone(),
        });

        let bound_channel = channel.clone();
        let inner_for_event = Rc::clone(&inner);
        carrier.borrow_mut().register_event_handler("AsyncAGI", move |event| {
            if event.headers.get("Channel") != Some(bound_channel.as_str()) {
                return Ok(());
            }
            match event.headers.get("SubEvent") {
                Some("Start") => {
                    if let Some(env) = event.headers.get("Env") {
                        let mut block = env.replace("\\n", "\n");
                        if !block.ends_with('\n') {
                            block.push('\n');
                        }
                        block.push('\n');
                        inner_for_event.borrow_mut().data_received(block.as_bytes());
                    }
                }
                Some("Exec") => {
                    if let Some(result) = event.headers.get("Result") {
                        let mut line = result.to_owned();
                        line.push('\n');
                        inner_for_event.borrow_mut().data_received(line.as_bytes());
                    }
                }
                _ => {}
            }
            Ok(())
        });

        let bound_channel = channel.clone();
        let inner_for_hangup = Rc::clone(&inner);
        carrier.borrow_mut().register_event_handler("Hangup", move |event| {
            if event.headers.get("Channel") == Some(bound_channel.as_str()) {
                inner_for_hangup.borrow_mut().data_received(b"511\n");
            }
            Ok(())
        });

        Self { inner }
    }

    pub fn send_command(&self, text: impl Into<String>) -> DeferredHandle<AgiReply, AgiError> {
        self.inner.borrow_mut().send_command(text)
    }

    pub fn environment(&self) -> Option<crate::agi::message::Environment> {
        self.inner.borrow().environment().cloned()
    }

    pub fn state(&self) -> crate::agi::engine::AgiState {
        self.inner.borrow().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ami::AmiConfig;
    use std::io;

    #[derive(Debug)]
    struct FakeTransport;
    impl Transport for FakeTransport {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn authenticated_carrier() -> Rc<RefCell<AmiEngine<FakeTransport>>> {
        let carrier = Rc::new(RefCell::new(AmiEngine::new(AmiConfig::default())));
        carrier.borrow_mut().connection_made(FakeTransport);
        carrier.borrow_mut().data_received(b"Asterisk Call Manager/2.10.3\r\n");
        let _login = carrier
            .borrow_mut()
            .send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
        carrier
            .borrow_mut()
            .data_received(b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n");
        carrier
    }

    #[test]
    fn start_subevent_delivers_environment() {
        let carrier = authenticated_carrier();
        let adapter = AsyncAgiAdapter::bind(Rc::clone(&carrier), "SIP/x-0001", AgiConfig::default());

        carrier.borrow_mut().data_received(
            b"Event: AsyncAGI\r\nSubEvent: Start\r\nChannel: SIP/x-0001\r\nEnv: agi_channel: SIP/x-0001\\nagi_uniqueid: 123.45\\n\r\n\r\n",
        );

        let env = adapter.environment().unwrap();
        assert_eq!(env.get("agi_channel"), Some("SIP/x-0001"));
    }

    #[test]
    fn exec_subevent_completes_command() {
        let carrier = authenticated_carrier();
        let adapter = AsyncAgiAdapter::bind(Rc::clone(&carrier), "SIP/x-0001", AgiConfig::default());
        carrier.borrow_mut().data_received(
            b"Event: AsyncAGI\r\nSubEvent: Start\r\nChannel: SIP/x-0001\r\nEnv: agi_channel: SIP/x-0001\\n\r\n\r\n",
        );

        let handle = adapter.send_command("ANSWER");
        carrier.borrow_mut().data_received(
            b"Event: AsyncAGI\r\nSubEvent: Exec\r\nChannel: SIP/x-0001\r\nResult: 200 result=0\r\n\r\n",
        );

        let reply = handle.take_outcome().unwrap().unwrap();
        assert_eq!(reply.code, 200);
    }

    #[test]
    fn hangup_event_translates_to_dead_channel() {
        let carrier = authenticated_carrier();
        let adapter = AsyncAgiAdapter::bind(Rc::clone(&carrier), "SIP/x-0001", AgiConfig::default());
        carrier.borrow_mut().data_received(
            b"Event: AsyncAGI\r\nSubEvent: Start\r\nChannel: SIP/x-0001\r\nEnv: agi_channel: SIP/x-0001\\n\r\n\r\n",
        );

        let handle = adapter.send_command("ANSWER");
        carrier.borrow_mut().data_received(b"Event: Hangup\r\nChannel: SIP/x-0001\r\n\r\n");

        assert!(matches!(handle.take_outcome(), Some(Err(AgiError::ChannelDead))));
    }
}
