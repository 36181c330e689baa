//! Integration coverage for the six scenarios in spec.md §8, each driving
//! an engine through its public `connection_made` / `data_received` /
//! `connection_lost` surface against an in-memory fake transport, rather
//! than through any of the unit-level internals exercised by the
//! `#[cfg(test)]` modules alongside each engine.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use ami_agi_core::ami::{Action, ActionOutcome, AmiConfig, AmiEngine, AmiState};
use ami_agi_core::agi::{AgiConfig, AgiEngine, AgiState};
use ami_agi_core::error::AmiError;

#[derive(Debug, Default)]
struct FakeTransport {
    written: Rc<RefCell<Vec<u8>>>,
    closed: Rc<RefCell<bool>>,
}

impl ami_agi_core::Transport for FakeTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
    fn close(&mut self) {
        *self.closed.borrow_mut() = true;
    }
}

/// Feed `bytes` one byte at a time instead of as a single chunk. Per
/// spec.md §8's boundary behaviors, this must yield the same outcome as
/// feeding the whole frame at once.
fn feed_byte_by_byte(engine: &mut AmiEngine<FakeTransport>, bytes: &[u8]) {
    for b in bytes {
        engine.data_received(std::slice::from_ref(b));
    }
}

#[test]
fn scenario_1_ami_login_success() {
    let mut engine = AmiEngine::new(AmiConfig::default());
    engine.connection_made(FakeTransport::default());
    engine.data_received(b"Asterisk Call Manager/2.10.3\r\n");

    let handle = engine.send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
    engine.data_received(b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n");

    let outcome = handle.take_outcome().expect("resolved").expect("success");
    assert_eq!(outcome.response().status(), Some("Success"));
    assert_eq!(engine.state(), AmiState::Authenticated);
}

#[test]
fn scenario_1_split_byte_delivery_matches_whole_frame() {
    let mut engine = AmiEngine::new(AmiConfig::default());
    engine.connection_made(FakeTransport::default());
    feed_byte_by_byte(&mut engine, b"Asterisk Call Manager/2.10.3\r\n");

    let handle = engine.send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
    feed_byte_by_byte(
        &mut engine,
        b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n",
    );

    let outcome = handle.take_outcome().expect("resolved").expect("success");
    assert_eq!(outcome.response().status(), Some("Success"));
    assert_eq!(engine.state(), AmiState::Authenticated);
}

#[test]
fn scenario_2_ami_list_action() {
    let mut config = AmiConfig::default();
    config = config.with_terminator("CoreShowChannels", "CoreShowChannelsComplete");
    let mut engine = AmiEngine::new(config);
    engine.connection_made(FakeTransport::default());
    engine.data_received(b"Asterisk Call Manager/2.10.3\r\n");
    let _login = engine.send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
    engine.data_received(b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n");

    let handle = engine.send_action(Action::new("CoreShowChannels"), None);
    engine.data_received(b"Response: Success\r\nActionID: 2\r\n\r\n");
    engine.data_received(b"Event: CoreShowChannel\r\nActionID: 2\r\nChannel: SIP/1\r\n\r\n");
    engine.data_received(b"Event: CoreShowChannel\r\nActionID: 2\r\nChannel: SIP/2\r\n\r\n");
    assert!(!handle.is_fulfilled());
    engine.data_received(b"Event: CoreShowChannelsComplete\r\nActionID: 2\r\n\r\n");

    match handle.take_outcome().expect("resolved").expect("success") {
        ActionOutcome::List(list) => {
            assert!(list.response.is_success());
            assert_eq!(list.events.len(), 3);
            assert_eq!(list.events[2].name(), "CoreShowChannelsComplete");
        }
        ActionOutcome::Simple(_) => panic!("expected a list outcome"),
    }
}

#[test]
fn scenario_3_ami_follows_body() {
    let mut engine = AmiEngine::new(AmiConfig::default());
    engine.connection_made(FakeTransport::default());
    engine.data_received(b"Asterisk Call Manager/2.10.3\r\n");
    let _login = engine.send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
    engine.data_received(b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n");

    let handle = engine.send_action(Action::new("Command").header("Command", "core show version"), None);
    engine.data_received(b"Response: Follows\r\nActionID: 2\r\nPrivilege: Command\r\n\r\nline1\r\nline2\r\n--END COMMAND--\r\n");

    let outcome = handle.take_outcome().expect("resolved").expect("success");
    assert_eq!(outcome.response().follows_body.as_deref(), Some("line1\nline2"));
}

#[derive(Debug, Default)]
struct FakeAgiTransport {
    written: Rc<RefCell<Vec<u8>>>,
}

impl ami_agi_core::Transport for FakeAgiTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
    fn close(&mut self) {}
}

#[test]
fn scenario_4_agi_environment_and_command() {
    let mut engine = AgiEngine::new(AgiConfig::default());
    engine.connection_made(FakeAgiTransport::default());
    engine.data_received(b"agi_channel: SIP/x-0001\nagi_uniqueid: 123.45\n\n");

    let handle = engine.send_command("ANSWER");
    engine.data_received(b"200 result=0\n");

    let reply = handle.take_outcome().expect("resolved").expect("success");
    assert_eq!(reply.code, 200);
    assert_eq!(reply.result.as_deref(), Some("0"));
    assert_eq!(engine.state(), AgiState::Ready);
}

#[test]
fn scenario_5_agi_hangup_mid_session() {
    let mut engine = AgiEngine::new(AgiConfig::default());
    let written = Rc::new(RefCell::new(Vec::new()));
    engine.connection_made(FakeAgiTransport {
        written: Rc::clone(&written),
    });
    engine.data_received(b"agi_channel: SIP/x-0001\nagi_uniqueid: 123.45\n\n");

    let handle = engine.send_command("STREAM FILE foo \"\"");
    engine.data_received(b"511 result=-1\n");

    assert!(matches!(
        handle.take_outcome(),
        Some(Err(ami_agi_core::error::AgiError::ChannelDead))
    ));

    written.borrow_mut().clear();
    let next = engine.send_command("HANGUP");
    assert!(matches!(
        next.take_outcome(),
        Some(Err(ami_agi_core::error::AgiError::ChannelDead))
    ));
    assert!(written.borrow().is_empty());
}

#[test]
fn scenario_6_ami_connection_lost_with_pending() {
    let mut engine = AmiEngine::new(AmiConfig::default());
    engine.connection_made(FakeTransport::default());
    engine.data_received(b"Asterisk Call Manager/2.10.3\r\n");
    let _login = engine.send_action(Action::new("Login").header("Username", "a").header("Secret", "b"), None);
    engine.data_received(b"Response: Success\r\nActionID: 1\r\nMessage: Authentication accepted\r\n\r\n");

    let h1 = engine.send_action(Action::new("Ping"), None);
    let h2 = engine.send_action(Action::new("Ping"), None);
    let h3 = engine.send_action(Action::new("Ping"), None);

    engine.connection_lost(Some(Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))));

    for h in [h1, h2, h3] {
        assert!(matches!(h.take_outcome(), Some(Err(AmiError::ConnectionLost(Some(_))))));
    }
    assert_eq!(engine.state(), AmiState::Closed);

    let after = engine.send_action(Action::new("Ping"), None);
    assert!(matches!(after.take_outcome(), Some(Err(AmiError::NotConnected))));
}
