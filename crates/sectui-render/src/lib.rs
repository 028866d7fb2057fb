#![forbid(unsafe_code)]

//! Render layer: terminal commands, style diffing, and frame encoding.
//!
//! # Role in sectui
//! A section's render function writes text and style calls into a
//! [`FrameBuilder`]. The builder resolves nested style scopes through a
//! [`StyleDiffer`] so the resulting [`TerminalCommand`] list contains only
//! real style transitions. [`metrics`] then tells the runtime how many lines
//! the previous frame occupied, which is exactly how much it must erase
//! before writing the next one.

pub mod command;
pub mod differ;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod style;
pub mod styled_text;

pub use command::{TerminalCommand, encode, encode_into, plain_text};
pub use differ::{ClearStrategy, StyleDiffer};
pub use error::RenderError;
pub use frame::FrameBuilder;
pub use metrics::{clear_sequence, line_count};
pub use style::{Attributes, Channel, StyleChange, StyleState};
