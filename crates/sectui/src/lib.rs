#![forbid(unsafe_code)]

//! sectui public facade crate.
//!
//! Inline terminal UIs built from *sections*: a render function that draws
//! a block of output below the cursor, plus a run body that executes
//! concurrently and changes state. Whenever state changes, the section is
//! erased and redrawn in place; once the run finishes, the last frame stays
//! on screen and the next section renders below it.
//!
//! ```no_run
//! use sectui::prelude::*;
//!
//! fn main() -> sectui::Result<()> {
//!     let session = sectui::open_tty_session()?;
//!     let count = session.live_var(0);
//!     let view = count.clone();
//!     session
//!         .section(move |s| s.textln(format!("Count: {}", view.get())))
//!         .run_with(move |scope| {
//!             for i in 1..=3 {
//!                 scope.sleep(std::time::Duration::from_millis(250));
//!                 count.set(i);
//!             }
//!             Ok(())
//!         })?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// --- Core re-exports -------------------------------------------------------

pub use sectui_core::ansi::{Color, ColorLayer};
pub use sectui_core::{CharKey, ConcurrentScopedData, DataKey, Key, KeyEvents, Lifecycle};

// --- Render re-exports -----------------------------------------------------

pub use sectui_render::{Attributes, ClearStrategy, StyleChange};

// --- Backend re-exports ----------------------------------------------------

pub use sectui_backend::{Terminal, VirtualTerminal};
#[cfg(feature = "tty")]
pub use sectui_tty::{TtyOptions, TtyTerminal};

// --- Runtime re-exports ----------------------------------------------------

pub use sectui_runtime::{
    Completer, InputChange, InputEntered, InputOptions, KeyScope, LineEditState, LiveList, LiveVar,
    PrefixCompleter, RenderScope, RunScope, Section, SectionError, Session, SessionConfig,
};

pub use error::{Error, Result};

/// Open a session on the process's terminal, configured from the
/// environment.
///
/// # Errors
///
/// Fails if the terminal cannot be opened (for example when another
/// [`TtyTerminal`] is already open).
#[cfg(feature = "tty")]
pub fn open_tty_session() -> Result<Session> {
    open_tty_session_with(TtyOptions::default(), SessionConfig::from_env())
}

/// Open a session on the process's terminal with explicit settings.
///
/// # Errors
///
/// See [`open_tty_session`].
#[cfg(feature = "tty")]
pub fn open_tty_session_with(options: TtyOptions, config: SessionConfig) -> Result<Session> {
    let terminal = TtyTerminal::open(options)?;
    let session = Session::with_config(terminal, config)?;
    tracing::debug!(?config, "tty session opened");
    Ok(session)
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Color, Error, InputOptions, Key, LiveList, LiveVar, RenderScope, Result, RunScope, Section,
        Session, SessionConfig, StyleChange,
    };

    pub use crate::{backend, core, render, runtime};
}

pub use sectui_backend as backend;
pub use sectui_core as core;
pub use sectui_render as render;
pub use sectui_runtime as runtime;
#[cfg(feature = "tty")]
pub use sectui_tty as tty;
