//! AGI data model: the environment block, status-line grammar, and the
//! structured reply a command's handle resolves to (spec.md §3, §4.4).

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::ProtocolError;
use crate::framer::HeaderBlock;

/// The ordered `agi_key: value` pairs received before the command loop
/// starts. Reuses the generic header-block type; AGI's environment lines
/// happen to share AMI's `Key: Value` shape (spec.md §6).
pub type Environment = HeaderBlock;

/// The parsed shape of the environment's `agi_request` field: a `Url` when
/// the session arrived over FastAGI, a filesystem path otherwise (plain
/// AGI/STDIO, where Asterisk passes the dialplan script path verbatim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgiRequestType {
    File(PathBuf),
    FastAgi(Url),
}

impl fmt::Display for AgiRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::FastAgi(url) => write!(f, "{url}"),
        }
    }
}

impl AgiRequestType {
    fn parse(s: &str) -> Self {
        match s.parse::<Url>() {
            Ok(url) => Self::FastAgi(url),
            Err(_) => Self::File(PathBuf::from(s)),
        }
    }
}

/// Parse the `agi_request` field of an environment block, if present.
/// A bare path (no scheme) never fails to parse as a `Url`, so this falls
/// back to `AgiRequestType::File` whenever `Url::parse` rejects the value.
pub fn agi_request_type(environment: &Environment) -> Option<AgiRequestType> {
    environment.get("agi_request").map(AgiRequestType::parse)
}

/// The fulfilled value of a successful AGI command (status 200).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgiReply {
    pub code: u16,
    /// The token after `result=`, if the status line carried one.
    pub result: Option<String>,
    /// The text inside `(...)`, if present.
    pub verbose: Option<String>,
    /// Any trailing text that was neither `result=` nor `(verbose)`.
    pub extra: Option<String>,
    /// 100–199 continuation lines seen before the final status line.
    pub info_lines: Vec<String>,
    /// Present only when Asterisk wraps a reply in a multi-line body;
    /// empty for the ordinary single-line case.
    pub body_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub code: u16,
    pub result: Option<String>,
    pub verbose: Option<String>,
    pub extra: Option<String>,
}

/// `<3-digit-code>` ( SP `result=` token ( SP `(` verbose `)` )? )? ( SP extra )?
pub(crate) fn parse_status_line(line: &str) -> Result<StatusLine, ProtocolError> {
    if !looks_like_status_line(line) {
        return Err(ProtocolError::MalformedStatusLine(line.to_owned()));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| ProtocolError::MalformedStatusLine(line.to_owned()))?;
    let rest = line[3..].trim_start();
    if rest.is_empty() {
        return Ok(StatusLine {
            code,
            result: None,
            verbose: None,
            extra: None,
        });
    }
    if let Some(after_result) = rest.strip_prefix("result=") {
        let (token, tail) = match after_result.find(' ') {
            Some(i) => (&after_result[..i], after_result[i..].trim_start()),
            None => (after_result, ""),
        };
        let mut verbose = None;
        let mut extra_str = tail;
        if let Some(paren_body) = tail.strip_prefix('(') {
            if let Some(end) = paren_body.find(')') {
                verbose = Some(paren_body[..end].to_owned());
                extra_str = paren_body[end + 1..].trim_start();
            }
        }
        Ok(StatusLine {
            code,
            result: Some(token.to_owned()),
            verbose,
            extra: non_empty(extra_str),
        })
    } else {
        Ok(StatusLine {
            code,
            result: None,
            verbose: None,
            extra: non_empty(rest),
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

pub(crate) fn looks_like_status_line(line: &str) -> bool {
    line.len() >= 3 && line.as_bytes()[..3].iter().all(u8::is_ascii_digit)
}
