#![forbid(unsafe_code)]

use std::fmt;
use std::io;

/// Errors raised while producing or writing a frame.
#[derive(Debug)]
pub enum RenderError {
    /// Rendered text embedded an escape sequence the renderer cannot model.
    UnrecognizedEscape { sequence: String },
    /// More than one input was activated in the same render pass.
    MultipleInputs,
    /// Writing the frame to the terminal failed.
    Io(io::Error),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedEscape { sequence } => {
                write!(f, "unrecognized escape sequence in rendered text: {}", sequence.escape_debug())
            }
            Self::MultipleInputs => f.write_str("only one input may be active per render pass"),
            Self::Io(e) => write!(f, "terminal write failed: {e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RenderError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
