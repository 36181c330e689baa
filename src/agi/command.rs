//! Typed convenience wrappers over [`AgiEngine::send_command`], for the
//! handful of commands embedders reach for constantly. These are a thin
//! layer: anything not covered here is just as reachable through
//! `send_command` directly with the raw AGI reply.

use std::io;

use crate::agi::engine::AgiEngine;
use crate::agi::message::AgiReply;
use crate::deferred::DeferredHandle;
use crate::error::AgiError;
use crate::transport::Transport;

pub fn answer<T: Transport>(engine: &mut AgiEngine<T>) -> DeferredHandle<(), AgiError> {
    map_reply(engine.send_command("ANSWER"), |_reply| Ok(()))
}

pub fn verbose<T: Transport>(engine: &mut AgiEngine<T>, message: &str, level: u8) -> DeferredHandle<(), AgiError> {
    let cmd = format!("VERBOSE \"{message}\" {level}");
    map_reply(engine.send_command(cmd), |_reply| Ok(()))
}

/// `GET FULL VARIABLE`. Resolves to `None` when Asterisk reports the
/// variable undefined (`result=0`).
pub fn get_full_variable<T: Transport>(
    engine: &mut AgiEngine<T>,
    name: &str,
    channel: Option<&str>,
) -> DeferredHandle<Option<String>, AgiError> {
    let cmd = match channel {
        Some(channel) => format!("GET FULL VARIABLE {name} {channel}"),
        None => format!("GET FULL VARIABLE {name}"),
    };
    map_reply(engine.send_command(cmd), |reply| match reply.result.as_deref() {
        Some("1") => Ok(reply.verbose.clone()),
        _ => Ok(None),
    })
}

pub fn set_variable<T: Transport>(engine: &mut AgiEngine<T>, name: &str, value: &str) -> DeferredHandle<(), AgiError> {
    let cmd = format!("SET VARIABLE {name} \"{value}\"");
    map_reply(engine.send_command(cmd), |_reply| Ok(()))
}

/// Translate a generic `AgiReply` handle into a typed one, preserving
/// failures as-is. `f` runs once, synchronously, when the underlying
/// handle resolves successfully.
fn map_reply<U: 'static>(
    handle: DeferredHandle<AgiReply, AgiError>,
    f: impl Fn(&AgiReply) -> Result<U, AgiError> + 'static,
) -> DeferredHandle<U, AgiError> {
    let mapped = DeferredHandle::new();

    let on_ok = mapped.clone();
    handle.on_result(move |reply| match f(reply) {
        Ok(value) => {
            let _ = on_ok.set_result(value);
        }
        Err(e) => {
            let _ = on_ok.set_exception(e);
        }
    });

    let on_err = mapped.clone();
    handle.on_exception(move |e| {
        let _ = on_err.set_exception(e.clone());
    });

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agi::config::AgiConfig;

    #[derive(Debug)]
    struct FakeTransport {
        written: std::cell::RefCell<Vec<u8>>,
    }
    impl Transport for FakeTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn ready_engine() -> AgiEngine<FakeTransport> {
        let mut engine = AgiEngine::new(AgiConfig::default());
        engine.connection_made(FakeTransport {
            written: std::cell::RefCell::new(Vec::new()),
        });
        engine.data_received(b"agi_channel: SIP/x-0001\n\n");
        engine
    }

    #[test]
    fn answer_resolves_on_200() {
        let mut engine = ready_engine();
        let handle = answer(&mut engine);
        engine.data_received(b"200 result=0\n");
        assert!(handle.take_outcome().unwrap().is_ok());
    }

    #[test]
    fn get_full_variable_returns_none_when_undefined() {
        let mut engine = ready_engine();
        let handle = get_full_variable(&mut engine, "MY_VAR", None);
        engine.data_received(b"200 result=0\n");
        assert_eq!(handle.take_outcome().unwrap().unwrap(), None);
    }

    #[test]
    fn get_full_variable_returns_value_when_defined() {
        let mut engine = ready_engine();
        let handle = get_full_variable(&mut engine, "MY_VAR", None);
        engine.data_received(b"200 result=1 (hello world)\n");
        assert_eq!(handle.take_outcome().unwrap().unwrap(), Some("hello world".to_owned()));
    }

    #[test]
    fn command_error_propagates_through_the_typed_wrapper() {
        let mut engine = ready_engine();
        let handle = answer(&mut engine);
        engine.data_received(b"510\n");
        assert!(matches!(handle.take_outcome(), Some(Err(AgiError::CommandError))));
    }
}
