//! The token passed from the tokenizer to the hierarchy builder.

/// One marker/data pair found in the input.
///
/// `data` stays raw bytes: per-language encoding conversion happens later,
/// when the field is attached to a hierarchy node. `line` is the 1-based
/// line the marker was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub marker: String,
    pub data: Vec<u8>,
    pub line: usize,
}

impl Token {
    pub fn new(marker: impl Into<String>, data: Vec<u8>, line: usize) -> Self {
        Self {
            marker: marker.into(),
            data,
            line,
        }
    }

    /// Data with leading and trailing ASCII whitespace removed.
    ///
    /// The tokenizer leaves the final end-of-line sequence of a field
    /// verbatim; consumers that want the field value use this view.
    pub fn trimmed_data(&self) -> &[u8] {
        let mut start = 0;
        let mut end = self.data.len();
        while start < end && self.data[start].is_ascii_whitespace() {
            start += 1;
        }
        while end > start && self.data[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        &self.data[start..end]
    }

    pub fn has_data(&self) -> bool {
        !self.trimmed_data().is_empty()
    }
}
