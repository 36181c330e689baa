//! The text codec used by the Line Framer, configurable per spec.md §6.
//!
//! Only UTF-8 is implemented today; the type exists so a caller's `Config`
//! can name an encoding without the framer hard-coding one, and so a second
//! codec can be added later without changing the framer's interface.

/// The text codec applied when decoding received bytes and encoding
/// outbound lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// The default. Matches Asterisk's own wire behavior for ASCII/UTF-8
    /// locales.
    Utf8,
}

impl Default for Encoding {
    fn default() -> Self {
        Self::Utf8
    }
}

impl Encoding {
    /// Decode a byte slice, returning `None` on invalid sequences.
    pub(crate) fn decode<'a>(self, bytes: &'a [u8]) -> Option<&'a str> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok(),
        }
    }

    /// Encode text to bytes for writing to the transport.
    pub(crate) fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
        }
    }
}
