//! Error kinds shared by both engines, and the fault-sink plumbing for
//! non-fatal anomalies (spec.md §7).
//!
//! These are hand-rolled `Display`/`Error` impls rather than a derive
//! macro, matching how the teacher writes `AGIParseError`/`AGIError`.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A malformed frame, missing banner, or unexpected block shape. Fatal for
/// the connection that raised it: the transport is closed and every
/// pending handle on that connection fails with `ConnectionLost`.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    /// A header line contained no `:` separator.
    MalformedLine(String),
    /// Bytes could not be decoded with the configured encoding.
    DecodeError,
    /// The first line after connect was not a valid AMI banner.
    MissingBanner(String),
    /// A header block had neither `Response` nor `Event`.
    UnclassifiableBlock,
    /// A status line did not match the AGI status-line grammar.
    MalformedStatusLine(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine(line) => write!(f, "malformed header line: {line:?}"),
            Self::DecodeError => write!(f, "bytes could not be decoded with the configured encoding"),
            Self::MissingBanner(line) => write!(f, "expected an AMI banner, got: {line:?}"),
            Self::UnclassifiableBlock => write!(f, "header block is neither a Response nor an Event"),
            Self::MalformedStatusLine(line) => write!(f, "malformed AGI status line: {line:?}"),
        }
    }
}
impl StdError for ProtocolError {}

/// The cause carried by `ConnectionLost`, if the embedder supplied one.
pub type LostCause = Option<Box<dyn StdError + Send + Sync + 'static>>;

/// `LostCause` itself can't derive `Clone` (the boxed error trait object
/// isn't `Clone`); this degrades it to its `Display` text instead, which
/// is all `fail_connection`/`connection_lost` need when fanning the same
/// cause out to every pending handle.
pub(crate) fn clone_lost_cause(cause: &LostCause) -> LostCause {
    cause.as_ref().map(|c| Box::new(TextError(c.to_string())) as _)
}

#[derive(Debug)]
pub(crate) struct TextError(String);
impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl StdError for TextError {}

fn clone_io_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

/// Errors that can fail an AMI action's `DeferredHandle`.
#[derive(Debug)]
pub enum AmiError {
    /// The wire frame itself could not be parsed.
    Protocol(ProtocolError),
    /// `send_action` was called before the connection authenticated (or,
    /// for `Login`, before the connection was made at all), or after close.
    NotConnected,
    /// The connection was lost; every pending action fails with this.
    ConnectionLost(LostCause),
    /// `Response: Error` was received for this action.
    ActionFailed {
        /// The `Message` header of the error response, if present.
        message: Option<String>,
    },
    /// A `DeferredHandle` was fulfilled twice.
    InvalidState,
    /// The underlying transport's `write` raised an I/O error.
    Io(io::Error),
}
impl fmt::Display for AmiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::NotConnected => write!(f, "action sent while not connected"),
            Self::ConnectionLost(Some(cause)) => write!(f, "connection lost: {cause}"),
            Self::ConnectionLost(None) => write!(f, "connection lost"),
            Self::ActionFailed { message: Some(m) } => write!(f, "action failed: {m}"),
            Self::ActionFailed { message: None } => write!(f, "action failed"),
            Self::InvalidState => write!(f, "handle was already fulfilled"),
            Self::Io(e) => write!(f, "transport write failed: {e}"),
        }
    }
}
impl StdError for AmiError {}

impl Clone for AmiError {
    fn clone(&self) -> Self {
        match self {
            Self::Protocol(e) => Self::Protocol(e.clone()),
            Self::NotConnected => Self::NotConnected,
            Self::ConnectionLost(cause) => Self::ConnectionLost(clone_lost_cause(cause)),
            Self::ActionFailed { message } => Self::ActionFailed { message: message.clone() },
            Self::InvalidState => Self::InvalidState,
            Self::Io(e) => Self::Io(clone_io_error(e)),
        }
    }
}

/// Errors that can fail an AGI command's `DeferredHandle`.
#[derive(Debug)]
pub enum AgiError {
    /// The wire frame itself could not be parsed.
    Protocol(ProtocolError),
    /// A command was sent while the engine had no carrier to write to, or
    /// after the engine closed.
    NotConnected,
    /// The connection (or, for Async AGI, the carrier channel) was lost.
    ConnectionLost(LostCause),
    /// Status 510: asterisk considers the command invalid or unknown.
    CommandError,
    /// Status 511: the channel is dead. All subsequent commands fail the
    /// same way until the transport closes.
    ChannelDead,
    /// Status 520: a multi-line usage body was returned.
    UsageError {
        /// The body lines between `520 ...` and `520 End of proper usage`.
        body_lines: Vec<String>,
    },
    /// A `DeferredHandle` was fulfilled twice.
    InvalidState,
    /// The underlying transport's `write` raised an I/O error.
    Io(io::Error),
}
impl fmt::Display for AgiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::NotConnected => write!(f, "command sent while not connected"),
            Self::ConnectionLost(Some(cause)) => write!(f, "connection lost: {cause}"),
            Self::ConnectionLost(None) => write!(f, "connection lost"),
            Self::CommandError => write!(f, "asterisk reported 510 invalid or unknown command"),
            Self::ChannelDead => write!(f, "asterisk reported 511 dead channel"),
            Self::UsageError { body_lines } => {
                write!(f, "asterisk reported 520 usage error: {}", body_lines.join(" / "))
            }
            Self::InvalidState => write!(f, "handle was already fulfilled"),
            Self::Io(e) => write!(f, "transport write failed: {e}"),
        }
    }
}
impl StdError for AgiError {}

impl Clone for AgiError {
    fn clone(&self) -> Self {
        match self {
            Self::Protocol(e) => Self::Protocol(e.clone()),
            Self::NotConnected => Self::NotConnected,
            Self::ConnectionLost(cause) => Self::ConnectionLost(clone_lost_cause(cause)),
            Self::CommandError => Self::CommandError,
            Self::ChannelDead => Self::ChannelDead,
            Self::UsageError { body_lines } => Self::UsageError { body_lines: body_lines.clone() },
            Self::InvalidState => Self::InvalidState,
            Self::Io(e) => Self::Io(clone_io_error(e)),
        }
    }
}

/// A non-fatal anomaly reported to the configured fault sink instead of
/// tearing the connection down (spec.md §7, last paragraph).
#[derive(Debug)]
pub enum FaultEvent {
    /// An AMI response or follow-up event carried an `ActionID` with no
    /// matching pending record.
    UnknownActionId(String),
    /// An event handler (or fault-sink-adjacent user callback) panicked-
    /// equivalent: it returned an error that this crate caught so it would
    /// not tear down the connection.
    HandlerError(Box<dyn StdError + Send + Sync + 'static>),
    /// An event with no registered handler and no wildcard handler
    /// arrived and was dropped.
    UnhandledEvent(String),
    /// A header line failed to parse and `strict_headers` is `false`, so
    /// the line was skipped instead of failing the connection.
    SkippedMalformedLine(String),
}
impl fmt::Display for FaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownActionId(id) => write!(f, "no pending action for ActionID {id}"),
            Self::HandlerError(e) => write!(f, "handler error: {e}"),
            Self::UnhandledEvent(name) => write!(f, "no handler registered for event {name}"),
            Self::SkippedMalformedLine(line) => write!(f, "skipped malformed header line: {line:?}"),
        }
    }
}

/// A callback that receives non-fatal anomalies. The default (when the
/// caller configures none) logs at `warn!` and discards, per spec.md §4.2.
/// Not `Send`: engines (and their configured sinks) stay on one thread.
pub type FaultSink = Box<dyn FnMut(FaultEvent)>;

/// Build the default fault sink: log through `tracing` (if the `tracing`
/// feature is enabled) and otherwise discard silently.
pub fn default_fault_sink() -> FaultSink {
    Box::new(|event: FaultEvent| {
        #[cfg(feature = "tracing")]
        tracing::warn!(%event, "non-fatal protocol anomaly");
        #[cfg(not(feature = "tracing"))]
        let _ = event;
    })
}
