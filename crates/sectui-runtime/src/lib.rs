#![forbid(unsafe_code)]

//! sectui Runtime
//!
//! Sessions, sections, and the threads that keep a section's output in step
//! with shared state.
//!
//! # Key Components
//!
//! - [`Session`] - owns the terminal, the shared store, and the render worker
//! - [`Section`] - a render function plus one concurrent run body
//! - [`RenderScope`] - what a render function draws on
//! - [`RunScope`] - signal, abort, key and input callbacks for a run body
//! - [`LiveVar`] / [`LiveList`] - reactive values that request rerenders
//! - [`LineEditState`] - the key-driven editing state behind inputs
//! - [`SessionConfig`] - timings and clear strategy
//!
//! # Role in sectui
//! `sectui-runtime` is the orchestrator. It takes decoded keys from
//! `sectui-core`, builds frames with `sectui-render`, and writes them
//! through a `sectui-backend` terminal.
//!
//! # Threads
//!
//! | Thread | Owner | Lifetime |
//! |--------|-------|----------|
//! | `sectui-render` | [`Session`] | session |
//! | `sectui-run` | [`Section::run_with`] | run body |
//! | `sectui-keys` | key decoding | until terminal input closes |
//! | `sectui-key-listener`, `sectui-input` | [`RunScope`] | run lifecycle |

pub mod cancellation;
pub mod config;
pub mod error;
pub mod input;
pub mod live;
pub mod render_scope;
pub mod run_scope;
pub mod section;
pub mod session;

pub use cancellation::{CancellationSource, CancellationToken};
#[cfg(feature = "config-file")]
pub use config::ConfigError;
pub use config::SessionConfig;
pub use error::{BoxError, SectionError};
pub use input::{
    Completer, InputChange, InputEntered, InputOptions, KeyOutcome, LineEditState, PrefixCompleter,
};
pub use live::{LiveList, LiveVar};
pub use render_scope::RenderScope;
pub use run_scope::{KeyScope, RunScope};
pub use section::Section;
pub use session::Session;
