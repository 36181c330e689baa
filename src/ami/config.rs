//! The AMI engine's configuration bundle (spec.md §6).

use std::collections::HashMap;
use std::fmt;

use crate::encoding::Encoding;
use crate::error::{default_fault_sink, FaultSink};

/// Configuration recognized by the AMI engine. Construct with
/// `AmiConfig::default()` and override fields, or build one field at a
/// time with the builder methods.
pub struct AmiConfig {
    pub encoding: Encoding,
    /// On a malformed header line: `true` fails the connection, `false`
    /// skips the line and reports it to `fault_sink`.
    pub strict_headers: bool,
    /// Seeds the list-style classifier: action name → terminating event
    /// name. Overridable per call to `send_action`.
    pub list_action_terminators: HashMap<String, String>,
    /// Whether a list action's terminating event is included in the
    /// fulfilled event vector. Default `true` ("inside only"), per the
    /// open question in spec.md §9.
    pub include_terminator_in_list: bool,
    pub fault_sink: FaultSink,
}

impl fmt::Debug for AmiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmiConfig")
            .field("encoding", &self.encoding)
            .field("strict_headers", &self.strict_headers)
            .field("list_action_terminators", &self.list_action_terminators)
            .field("include_terminator_in_list", &self.include_terminator_in_list)
            .field("fault_sink", &"<fn>")
            .finish()
    }
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            strict_headers: false,
            list_action_terminators: HashMap::new(),
            include_terminator_in_list: true,
            fault_sink: default_fault_sink(),
        }
    }
}

impl AmiConfig {
    pub fn with_terminator(mut self, action_name: impl Into<String>, event_name: impl Into<String>) -> Self {
        self.list_action_terminators.insert(action_name.into(), event_name.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_headers = strict;
        self
    }
}
