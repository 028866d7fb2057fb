#![forbid(unsafe_code)]

use std::fmt;
use std::io;

use sectui_render::RenderError;

/// Error type run bodies and callbacks may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from running a section.
///
/// An aborted run is not an error: [`Section::run`](crate::Section::run)
/// returns `Ok(())` once the abort is observed.
#[derive(Debug)]
pub enum SectionError {
    /// The section was already run. Sections are single-use.
    AlreadyRun,
    /// Another section of the same session is still running.
    SectionAlreadyActive,
    /// A callback that allows one registration per run was registered twice.
    DuplicateCallback(&'static str),
    /// A callback was registered after the run finished.
    RunFinished,
    /// Rendering failed.
    Render(RenderError),
    /// The run body returned an error.
    RunBody(BoxError),
    /// Starting a worker thread or opening terminal input failed.
    Io(io::Error),
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRun => f.write_str("section has already been run"),
            Self::SectionAlreadyActive => {
                f.write_str("another section is already running in this session")
            }
            Self::DuplicateCallback(name) => {
                write!(f, "{name} may only be registered once per run")
            }
            Self::RunFinished => f.write_str("the run has already finished"),
            Self::Render(e) => write!(f, "render failed: {e}"),
            Self::RunBody(e) => write!(f, "run body failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(e) => Some(e),
            Self::RunBody(e) => Some(e.as_ref()),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderError> for SectionError {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

impl From<io::Error> for SectionError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
