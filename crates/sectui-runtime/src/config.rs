#![forbid(unsafe_code)]

//! Session configuration.
//!
//! # Sources
//!
//! 1. [`SessionConfig::default`]: 50ms escape timeout, scalpel clears,
//!    10ms key poll interval, terminal-reported width.
//! 2. [`SessionConfig::from_env`]: overrides from `SECTUI_ESC_TIMEOUT_MS`,
//!    `SECTUI_CLEAR_STRATEGY` (`scalpel` or `reset`), `SECTUI_WIDTH`.
//! 3. With the `config-file` feature, [`SessionConfig::from_toml_str`] and
//!    [`SessionConfig::load`]:
//!
//! ```toml
//! esc_timeout_ms = 40
//! clear_strategy = "reset"
//! key_poll_interval_ms = 5
//! width = 100
//! ```
//!
//! Every source ends in [`SessionConfig::validated`], which clamps timings
//! to sane ranges.

use std::time::Duration;

#[cfg(feature = "config-file")]
use std::path::Path;

#[cfg(feature = "config-file")]
use serde::Deserialize;

use sectui_core::key_decoder::{DecoderConfig, MAX_ESC_TIMEOUT_MS, MIN_ESC_TIMEOUT_MS};
use sectui_render::ClearStrategy;

/// Default interval at which key listeners check for cancellation.
pub const DEFAULT_KEY_POLL_INTERVAL_MS: u64 = 10;

const MIN_KEY_POLL_INTERVAL_MS: u64 = 1;
const MAX_KEY_POLL_INTERVAL_MS: u64 = 250;

/// Runtime settings for a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Lone-Escape disambiguation window.
    pub esc_timeout: Duration,
    /// How styles are cleared.
    pub clear_strategy: ClearStrategy,
    /// How often key listener threads wake to check for cancellation.
    pub key_poll_interval: Duration,
    /// Use this width for line accounting instead of asking the terminal.
    pub render_width_override: Option<u16>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            esc_timeout: DecoderConfig::default().esc_timeout,
            clear_strategy: ClearStrategy::Scalpel,
            key_poll_interval: Duration::from_millis(DEFAULT_KEY_POLL_INTERVAL_MS),
            render_width_override: None,
        }
    }
}

/// Parse a clear strategy name as used in env vars and config files.
#[must_use]
pub fn parse_clear_strategy(name: &str) -> Option<ClearStrategy> {
    match name.trim().to_ascii_lowercase().as_str() {
        "scalpel" => Some(ClearStrategy::Scalpel),
        "reset" | "reset-and-replay" | "reset_and_replay" => Some(ClearStrategy::ResetAndReplay),
        _ => None,
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_esc_timeout(mut self, timeout: Duration) -> Self {
        self.esc_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clear_strategy(mut self, strategy: ClearStrategy) -> Self {
        self.clear_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_key_poll_interval(mut self, interval: Duration) -> Self {
        self.key_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_width(mut self, width: u16) -> Self {
        self.render_width_override = Some(width);
        self
    }

    /// Load overrides from environment variables. Unparseable values are
    /// ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SECTUI_ESC_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.esc_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("SECTUI_CLEAR_STRATEGY")
            && let Some(strategy) = parse_clear_strategy(&val)
        {
            config.clear_strategy = strategy;
        }

        if let Ok(val) = std::env::var("SECTUI_WIDTH")
            && let Ok(width) = val.parse::<u16>()
        {
            config.render_width_override = Some(width);
        }

        config.validated()
    }

    /// Clamp values to safe ranges.
    ///
    /// - `esc_timeout` to 10..=500ms
    /// - `key_poll_interval` to 1..=250ms
    /// - a zero width override is dropped
    #[must_use]
    pub fn validated(mut self) -> Self {
        let esc_ms = u64::try_from(self.esc_timeout.as_millis()).unwrap_or(u64::MAX);
        self.esc_timeout = Duration::from_millis(esc_ms.clamp(MIN_ESC_TIMEOUT_MS, MAX_ESC_TIMEOUT_MS));

        let poll_ms = u64::try_from(self.key_poll_interval.as_millis()).unwrap_or(u64::MAX);
        self.key_poll_interval =
            Duration::from_millis(poll_ms.clamp(MIN_KEY_POLL_INTERVAL_MS, MAX_KEY_POLL_INTERVAL_MS));

        self.render_width_override = self.render_width_override.filter(|w| *w > 0);
        self
    }

    /// The decoder settings implied by this config.
    #[must_use]
    pub fn decoder(&self) -> DecoderConfig {
        DecoderConfig::default()
            .with_esc_timeout(self.esc_timeout)
            .validated()
    }
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[cfg(feature = "config-file")]
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SessionConfigFile {
    esc_timeout_ms: Option<u64>,
    clear_strategy: Option<String>,
    key_poll_interval_ms: Option<u64>,
    width: Option<u16>,
}

#[cfg(feature = "config-file")]
impl SessionConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Toml`] for malformed TOML or unknown keys,
    /// [`ConfigError::Validation`] for an unknown clear strategy.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: SessionConfigFile = toml::from_str(s).map_err(ConfigError::Toml)?;
        let mut config = Self::default();
        if let Some(ms) = file.esc_timeout_ms {
            config.esc_timeout = Duration::from_millis(ms);
        }
        if let Some(name) = file.clear_strategy {
            config.clear_strategy = parse_clear_strategy(&name)
                .ok_or_else(|| ConfigError::Validation(format!("unknown clear_strategy {name:?}")))?;
        }
        if let Some(ms) = file.key_poll_interval_ms {
            config.key_poll_interval = Duration::from_millis(ms);
        }
        config.render_width_override = file.width;
        Ok(config.validated())
    }

    /// Load a TOML file from disk.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }
}

/// Errors from loading a configuration file.
#[cfg(feature = "config-file")]
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Validation(String),
}

#[cfg(feature = "config-file")]
impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Validation(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

#[cfg(feature = "config-file")]
impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
