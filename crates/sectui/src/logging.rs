#![forbid(unsafe_code)]

//! Log subscriber setup.
//!
//! sectui logs through `tracing`. An inline UI owns the terminal it draws
//! on, so logs must go somewhere else: pass a file or any other
//! [`MakeWriter`] to [`init`].
//!
//! Verbosity comes from `SECTUI_LOG` using `EnvFilter` directive syntax,
//! e.g. `SECTUI_LOG=sectui_runtime=trace`. Unset or invalid values fall
//! back to `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::Error;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "SECTUI_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_DIRECTIVES: &str = "warn";

/// Build the filter for `directives`, falling back to
/// [`DEFAULT_DIRECTIVES`].
#[must_use]
pub fn filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// The filter configured by [`LOG_ENV`].
#[must_use]
pub fn filter_from_env() -> EnvFilter {
    filter(std::env::var(LOG_ENV).ok().as_deref())
}

/// Install a global subscriber writing to `writer`.
///
/// With the `tracing-json` feature, events are written as JSON lines.
///
/// # Errors
///
/// [`Error::Logging`] if a global subscriber is already installed.
pub fn init<W>(writer: W) -> Result<(), Error>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_writer(writer)
        .with_ansi(false);

    #[cfg(feature = "tracing-json")]
    let result = builder.json().try_init();
    #[cfg(not(feature = "tracing-json"))]
    let result = builder.try_init();

    result.map_err(|e| Error::Logging(e.to_string()))
}
