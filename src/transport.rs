//! The transport contract the engines are driven through.
//!
//! Neither engine owns a socket, a pipe, or a process. The embedder hands
//! each engine a `Transport` once (via `connection_made`), feeds it bytes as
//! they arrive (via `data_received`), and tells it when the underlying
//! connection goes away (via `connection_lost`). Engines never call back
//! into an I/O runtime themselves; they only call `write` and `close` on
//! whatever `Transport` they were given.

use std::fmt;
use std::io;

/// Something an engine can write encoded bytes to and ask to close.
///
/// Implementations are expected to be cheap handles (e.g. a clone of a
/// socket's write half) — the engine holds on to one for its entire
/// lifetime and never constructs one itself. Not `Send`: per spec.md §5 an
/// engine (and everything it owns, including its transport and its
/// `DeferredHandle`s) lives on a single thread for its whole lifetime.
pub trait Transport: fmt::Debug {
    /// Write already-encoded bytes, including the trailing line terminator.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Ask the transport to close. The engine does not wait for this to
    /// take effect; `connection_lost` is the embedder's signal that it has.
    fn close(&mut self);
}
