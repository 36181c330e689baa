//! The AGI engine's configuration bundle (spec.md §6).

use std::fmt;

use crate::encoding::Encoding;
use crate::error::{default_fault_sink, FaultSink};

/// Configuration recognized by the AGI engine. Construct with
/// `AgiConfig::default()` and override fields, or build one field at a
/// time with the builder methods.
pub struct AgiConfig {
    pub encoding: Encoding,
    /// On a malformed environment header line: `true` fails the
    /// connection, `false` skips the line and reports it to
    /// `fault_sink`. Mirrors `AmiConfig::strict_headers`.
    pub strict_headers: bool,
    pub fault_sink: FaultSink,
}

impl fmt::Debug for AgiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgiConfig")
            .field("encoding", &self.encoding)
            .field("strict_headers", &self.strict_headers)
            .field("fault_sink", &"<fn>")
            .finish()
    }
}

impl Default for AgiConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            strict_headers: false,
            fault_sink: default_fault_sink(),
        }
    }
}

impl AgiConfig {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_headers = strict;
        self
    }
}
