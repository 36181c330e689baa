//! AMI data model: actions, responses, and events (spec.md §3).

use crate::framer::HeaderBlock;

/// An outbound AMI request. `ActionID` is assigned by the engine when the
/// action is sent, not by the caller (spec.md §3 invariant: ids are drawn
/// from a monotonic counter and never reused within a connection).
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    /// User-supplied headers, in insertion order. Does not include
    /// `Action` or `ActionID`; the engine adds those when emitting.
    pub headers: Vec<(String, String)>,
    /// `Variable: key=value` bindings, emitted in insertion order after
    /// the user headers.
    pub variables: Vec<(String, String)>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            headers: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.push((key.into(), value.into()));
        self
    }

    /// Render the wire form of this action, given the `ActionID` the
    /// engine allocated for it. CRLF-terminated throughout, blank line at
    /// the end, per spec.md §6.
    pub(crate) fn render(&self, action_id: &str) -> String {
        let mut out = String::new();
        out.push_str("Action: ");
        out.push_str(&self.name);
        out.push_str("\r\n");
        out.push_str("ActionID: ");
        out.push_str(action_id);
        out.push_str("\r\n");
        for (k, v) in &self.headers {
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
            out.push_str("\r\n");
        }
        for (k, v) in &self.variables {
            out.push_str("Variable: ");
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out
    }
}

/// An inbound AMI response. Carries the echoed `ActionID`, the
/// `Response` value itself (`Success`, `Error`, `Follows`, `Goodbye`, ...),
/// any extra headers, and — for `Follows` responses — the joined body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub headers: HeaderBlockOwned,
    /// Present only for `Response: Follows`: the lines between the header
    /// block and the `--END COMMAND--` sentinel, newline-joined.
    pub follows_body: Option<String>,
}

impl Response {
    pub fn status(&self) -> Option<&str> {
        self.headers.get("Response")
    }

    pub fn action_id(&self) -> Option<&str> {
        self.headers.get("ActionID")
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(s) if s.eq_ignore_ascii_case("Success"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status(), Some(s) if s.eq_ignore_ascii_case("Error"))
    }

    pub fn is_follows(&self) -> bool {
        matches!(self.status(), Some(s) if s.eq_ignore_ascii_case("Follows"))
    }
}

/// An inbound AMI event: `Event: <name>` plus arbitrary fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub headers: HeaderBlockOwned,
}

impl Event {
    pub fn name(&self) -> &str {
        self.headers.get("Event").unwrap_or("")
    }

    pub fn action_id(&self) -> Option<&str> {
        self.headers.get("ActionID")
    }
}

/// A cheap owned wrapper around `HeaderBlock` so `Response`/`Event` can
/// derive `PartialEq`/`Clone` without leaking the framer's internals.
pub type HeaderBlockOwned = HeaderBlock;

/// The fulfilled value of a list-style action's handle: the initial
/// response plus every event collected until (and, per the default
/// policy, including) the terminating event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResult {
    pub response: Response,
    pub events: Vec<Event>,
}
