#![forbid(unsafe_code)]

//! Atomic rendering instructions and their byte encoding.

use sectui_core::ansi::{self, CsiCode};

/// One rendering instruction.
///
/// A rendered frame is a flat list of these. Style scoping has already been
/// resolved by the time commands exist: every [`Sgr`](Self::Sgr) here is a
/// real transition the terminal must see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// A run of printable text with no newlines.
    Text(String),
    Newline,
    /// A style set or clear code.
    Sgr(CsiCode),
    /// Open (`Some(uri)`) or close (`None`) a hyperlink.
    Link(Option<String>),
}

impl TerminalCommand {
    /// Encode onto `out`. Newlines carry their own carriage return because
    /// raw-mode terminals do not translate `\n`.
    pub fn encode_into(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Newline => out.push_str("\r\n"),
            Self::Sgr(code) => code.encode_into(out),
            Self::Link(Some(uri)) => out.push_str(&ansi::hyperlink_open(uri, "")),
            Self::Link(None) => out.push_str(&ansi::hyperlink_close()),
        }
    }
}

/// Encode a command list to the bytes written to the terminal.
#[must_use]
pub fn encode(commands: &[TerminalCommand]) -> String {
    let mut out = String::new();
    encode_into(commands, &mut out);
    out
}

/// Append the encoding of `commands` to `out`.
pub fn encode_into(commands: &[TerminalCommand], out: &mut String) {
    for command in commands {
        command.encode_into(out);
    }
}

/// Concatenated text of `commands`, with newlines as `\n` and no escapes.
///
/// Handy for asserting on what a frame says rather than how it is styled.
#[must_use]
pub fn plain_text(commands: &[TerminalCommand]) -> String {
    let mut out = String::new();
    for command in commands {
        match command {
            TerminalCommand::Text(text) => out.push_str(text),
            TerminalCommand::Newline => out.push('\n'),
            TerminalCommand::Sgr(_) | TerminalCommand::Link(_) => {}
        }
    }
    out
}
