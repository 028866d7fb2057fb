#![forbid(unsafe_code)]

//! Umbrella error for applications that touch several sectui layers.
//!
//! Each layer keeps its own typed error; this enum lets an application
//! propagate any of them with `?` and still match on the part it cares
//! about.

use std::fmt;

use sectui_core::ScopedDataError;
use sectui_core::ansi::AnsiError;
use sectui_render::RenderError;
use sectui_runtime::SectionError;

/// Any error a sectui application can hit.
#[derive(Debug)]
pub enum Error {
    /// Terminal I/O failed.
    Io(std::io::Error),
    /// A section failed to run.
    Section(SectionError),
    /// A frame could not be built.
    Render(RenderError),
    /// A scoped value could not be stored or read.
    Data(ScopedDataError),
    /// An escape sequence could not be decoded.
    Ansi(AnsiError),
    /// A configuration file could not be loaded.
    #[cfg(feature = "config-file")]
    Config(sectui_runtime::ConfigError),
    /// The log subscriber could not be installed.
    Logging(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Section(err) => write!(f, "{err}"),
            Self::Render(err) => write!(f, "{err}"),
            Self::Data(err) => write!(f, "{err}"),
            Self::Ansi(err) => write!(f, "{err}"),
            #[cfg(feature = "config-file")]
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(msg) => write!(f, "failed to install logging: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Section(err) => Some(err),
            Self::Render(err) => Some(err),
            Self::Data(err) => Some(err),
            Self::Ansi(err) => Some(err),
            #[cfg(feature = "config-file")]
            Self::Config(err) => Some(err),
            Self::Logging(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SectionError> for Error {
    fn from(err: SectionError) -> Self {
        Self::Section(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

impl From<ScopedDataError> for Error {
    fn from(err: ScopedDataError) -> Self {
        Self::Data(err)
    }
}

impl From<AnsiError> for Error {
    fn from(err: AnsiError) -> Self {
        Self::Ansi(err)
    }
}

#[cfg(feature = "config-file")]
impl From<sectui_runtime::ConfigError> for Error {
    fn from(err: sectui_runtime::ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Standard result type for sectui applications.
pub type Result<T> = std::result::Result<T, Error>;
