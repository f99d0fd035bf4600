//! Fatal error types for the conversion engine.
//!
//! Only a handful of conditions abort a run: the input file or mapping file
//! cannot be read, the mapping is structurally unusable, the input carries a
//! UTF-32 byte-order mark, or the caller cancelled. Everything else is
//! recovered and recorded in the [`DiagnosticsLog`](crate::sfm::diagnostics).

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that stop a conversion run.
#[derive(Debug)]
pub enum ConvertError {
    /// Reading the input or writing the output failed.
    Io { path: PathBuf, source: io::Error },
    /// The mapping file could not be parsed.
    MappingLoad { path: PathBuf, detail: String },
    /// The mapping parsed but is structurally unusable (no hierarchy levels,
    /// or no begin fields at all).
    MappingInvalid(String),
    /// The input carries a UTF-32 byte-order mark, which is unsupported.
    Utf32Unsupported,
    /// The caller's cancellation flag was raised between tokens.
    Canceled,
    /// Writing the output document failed mid-stream.
    Output(String),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ConvertError::MappingLoad { path, detail } => {
                write!(f, "Cannot load mapping {}: {}", path.display(), detail)
            }
            ConvertError::MappingInvalid(msg) => write!(f, "Invalid mapping: {}", msg),
            ConvertError::Utf32Unsupported => {
                write!(f, "Input file has a UTF-32 byte-order mark, which is not supported")
            }
            ConvertError::Canceled => write!(f, "Conversion canceled"),
            ConvertError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ConvertError {
    fn from(e: io::Error) -> Self {
        ConvertError::Output(e.to_string())
    }
}

impl From<quick_xml::Error> for ConvertError {
    fn from(e: quick_xml::Error) -> Self {
        ConvertError::Output(e.to_string())
    }
}
