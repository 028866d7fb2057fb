#![forbid(unsafe_code)]

//! Core: lifecycles, scoped data, the ANSI codec, and input decoding.
//!
//! # Role in sectui
//! `sectui-core` holds everything the render and runtime layers share but
//! that has no notion of a terminal or a section:
//!
//! - **Lifecycle / DataKey**: identity-compared scope markers and typed keys.
//! - **ConcurrentScopedData**: a thread-safe, lifecycle-gated value store.
//! - **ansi**: CSI/OSC encoding and a cursor-based decoder.
//! - **Key / KeyDecoder**: raw bytes to logical keys, with the lone-Esc
//!   timing disambiguation.
//! - **KeyEvents**: a multi-listener key broadcast with a readiness gate.
//!
//! # How it fits in the system
//! `sectui-render` builds terminal commands on top of [`ansi`], and
//! `sectui-runtime` drives sections whose state lives in
//! [`scoped_data::ConcurrentScopedData`] and whose input arrives through
//! [`key_events::KeyEvents`].

pub mod ansi;
pub mod key;
pub mod key_decoder;
pub mod key_events;
pub mod lifecycle;
pub mod scoped_data;

pub use key::{CharKey, Key};
pub use key_decoder::{DecoderConfig, KeyDecoder};
pub use key_events::{KeyEvents, KeySubscription};
pub use lifecycle::Lifecycle;
pub use scoped_data::{ConcurrentScopedData, DataKey, ExclusiveGuard, HeldLevels, ScopedDataError};
