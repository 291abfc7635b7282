//! The unit of work flowing through the pipeline and its buffer encoding.
//!
//! A record is a `(category, message)` pair. In the buffer it is a single
//! byte string `category<TAB>message`, split back apart on the *first* tab.
//! The ingestion gate guarantees a category never contains the separator, so
//! the split is unambiguous; messages may contain tabs and newlines freely.

/// Separator between category and message in the buffered wire form.
pub const SEPARATOR: char = '\t';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub category: String,
    pub message: String,
}

impl LogRecord {
    #[must_use]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Serializes the record for the buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.category.len() + 1 + self.message.len());
        buf.extend_from_slice(self.category.as_bytes());
        buf.push(SEPARATOR as u8);
        buf.extend_from_slice(self.message.as_bytes());
        buf
    }

    /// Parses a buffered payload. Returns `None` for malformed payloads:
    /// not valid UTF-8, no separator, or an empty category or message.
    /// Malformed data can never become well-formed, so callers drop it.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        let (category, message) = text.split_once(SEPARATOR)?;
        if category.is_empty() || message.is_empty() {
            return None;
        }
        Some(Self::new(category, message))
    }
}
