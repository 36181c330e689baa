//! The Line Framer: the one primitive shared by both engines.
//!
//! A pure function of (buffer, mode) → (events, new buffer), per the
//! design notes: framing is kept out of the engines entirely so it can be
//! tested by feeding bytes and inspecting what comes out, independent of
//! any state machine.
//!
//! The framer buffers raw bytes rather than decoded text, so line
//! boundaries (always ASCII `\n`) can be found safely even when a decode
//! would otherwise split a multi-byte codepoint across two `feed` calls.

use std::collections::HashMap;

use crate::encoding::Encoding;
use crate::error::{FaultEvent, ProtocolError};

/// An ordered `(name, value)` header block plus a case-folded index for
/// lookup, per the design notes: "store an ordered vector plus a
/// case-folded index." Lookups are case-insensitive and return the first
/// occurrence; emission (via `Display`/iteration) preserves original case
/// and order, including duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderBlock {
    pairs: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header pair, preserving case on emission.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let folded = name.to_ascii_lowercase();
        let idx = self.pairs.len();
        self.pairs.push((name, value.into()));
        self.index.entry(folded).or_insert(idx);
    }

    /// Case-insensitive lookup of the first occurrence of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        let folded = name.to_ascii_lowercase();
        self.index.get(&folded).map(|&idx| self.pairs[idx].1.as_str())
    }

    /// All values for `name`, in emission order, case-insensitively.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let folded = name.to_ascii_lowercase();
        self.pairs
            .iter()
            .filter(move |(n, _)| n.to_ascii_lowercase() == folded)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate all pairs in original order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Split a single header line (terminator already stripped) at the first
/// `:`, trimming exactly one leading space off the value. Returns `None`
/// when the line has no `:` at all (a malformed line).
pub(crate) fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    let (name, rest) = line.split_at(idx);
    let value = &rest[1..];
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name, value))
}

/// Accumulates a received byte stream and yields whole lines and header
/// blocks. Stateful across calls; buffers an incomplete trailing line.
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    encoding: Encoding,
    /// A header block accumulated across possibly-several `feed` calls,
    /// kept here (rather than as a local in `next_header_block`) so that
    /// lines consumed by one call are not lost if the block is still
    /// incomplete when that call returns.
    partial_block: HeaderBlock,
}

impl LineFramer {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            buf: Vec::new(),
            encoding,
            partial_block: HeaderBlock::new(),
        }
    }

    /// Append newly received bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete line, if one is buffered. CRLF and lone LF
    /// are both accepted as terminators; the terminator itself is not
    /// included in the returned line. An empty line (terminator on an
    /// otherwise-empty buffered line) is returned as `Some(Ok(String::new()))`.
    pub fn next_line(&mut self) -> Option<Result<String, ProtocolError>> {
        let nl_pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut end = nl_pos;
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }
        let line_bytes: Vec<u8> = self.buf.drain(..=nl_pos).take(end).collect();
        match self.encoding.decode(&line_bytes) {
            Some(s) => Some(Ok(s.to_owned())),
            None => Some(Err(ProtocolError::DecodeError)),
        }
    }

    /// Pull the next complete header block: a run of non-empty lines up to
    /// and including the terminating empty line.
    ///
    /// When `strict` is `true`, the first malformed line (no `:`) aborts
    /// the whole block with `Err`, consuming everything up through that
    /// line. When `strict` is `false`, malformed lines are reported to
    /// `fault_sink` and skipped, and collection continues.
    ///
    /// Returns `None` when no complete block is buffered yet.
    pub fn next_header_block(
        &mut self,
        strict: bool,
        fault_sink: &mut dyn FnMut(FaultEvent),
    ) -> Option<Result<HeaderBlock, ProtocolError>> {
        loop {
            match self.next_line() {
                None => return None,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(line)) if line.is_empty() => {
                    return Some(Ok(std::mem::take(&mut self.partial_block)))
                }
                Some(Ok(line)) => match split_header_line(&line) {
                    Some((name, value)) => self.partial_block.push(name, value),
                    None if strict => {
                        self.partial_block = HeaderBlock::new();
                        return Some(Err(ProtocolError::MalformedLine(line)));
                    }
                    None => fault_sink(FaultEvent::SkippedMalformedLine(line)),
                },
            }
        }
    }
}
