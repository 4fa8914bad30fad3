use std::fmt;

use crate::style::Style;

/// Which payload a vendor parser was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Request,
    Response,
    StreamChunk,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadKind::Request => "request",
            PayloadKind::Response => "response",
            PayloadKind::StreamChunk => "stream chunk",
        })
    }
}

/// Error type shared by every fallible API in the crate.
///
/// Malformed substructure inside an otherwise valid JSON document is never an
/// error: vendor parsers skip or pass such fields through. Only the failure
/// modes below reach callers.
#[derive(Debug, thiserror::Error)]
pub enum AilError {
    /// The outer JSON document handed to a vendor parser was not valid JSON.
    #[error("{style} {kind} is not valid JSON: {source}")]
    Parse {
        style: Style,
        kind: PayloadKind,
        #[source]
        source: serde_json::Error,
    },
    /// A registry lookup used a style name this build does not know.
    #[error("unknown style {0:?}")]
    UnknownStyle(String),
    /// The requested parser/emitter pair does not exist for this style.
    #[error("{style} has no {op}")]
    Unsupported { style: Style, op: &'static str },
    /// The binary decoder rejected its input.
    #[error("binary decode: {0}")]
    Decode(String),
    /// The assembler rejected a line of its input. Lines are 1-based.
    #[error("asm line {line}: {reason}")]
    Asm { line: usize, reason: String },
    /// The binary encoder's writer failed.
    #[error("binary encode: {0}")]
    EncodeIo(#[from] std::io::Error),
}

impl From<serde_json::Error> for AilError {
    fn from(err: serde_json::Error) -> Self {
        AilError::EncodeIo(err.into())
    }
}

impl AilError {
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        AilError::Decode(reason.into())
    }

    pub(crate) fn asm(line: usize, reason: impl Into<String>) -> Self {
        AilError::Asm {
            line,
            reason: reason.into(),
        }
    }
}
