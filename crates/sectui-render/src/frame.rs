#![forbid(unsafe_code)]

//! Building one frame's command list.

use crate::command::TerminalCommand;
use crate::differ::{ClearStrategy, StyleDiffer};
use crate::error::RenderError;
use crate::style::StyleChange;
use crate::styled_text::{self, TextPiece};

/// Accumulates the commands of one frame, resolving style scopes through a
/// [`StyleDiffer`] as text is written.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    differ: StyleDiffer,
    commands: Vec<TerminalCommand>,
    /// Text has been written since the last newline.
    line_open: bool,
    link_open: bool,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new(ClearStrategy::default())
    }
}

impl FrameBuilder {
    #[must_use]
    pub fn new(strategy: ClearStrategy) -> Self {
        Self {
            differ: StyleDiffer::new(strategy),
            commands: Vec::new(),
            line_open: false,
            link_open: false,
        }
    }

    /// Write plain text. `\n` characters become newline commands; any escape
    /// sequence is written verbatim, so use [`styled_text`](Self::styled_text)
    /// for text that may carry them.
    pub fn text(&mut self, text: &str) {
        for (i, segment) in text.split('\n').enumerate() {
            if i > 0 {
                self.newline();
            }
            if !segment.is_empty() {
                self.differ.sync(&mut self.commands);
                self.commands.push(TerminalCommand::Text(segment.to_owned()));
                self.line_open = true;
            }
        }
    }

    /// Write text whose embedded SGR and hyperlink sequences are routed
    /// through the style differ.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnrecognizedEscape`] if the text embeds any other
    /// escape sequence. Nothing is written in that case.
    pub fn styled_text(&mut self, text: &str) -> Result<(), RenderError> {
        for piece in styled_text::scan(text)? {
            match piece {
                TextPiece::Text(run) => self.text(run),
                TextPiece::Style(change) => self.style(change),
                TextPiece::Link(Some(uri)) => self.link_open(&uri),
                TextPiece::Link(None) => self.link_close(),
            }
        }
        Ok(())
    }

    pub fn newline(&mut self) {
        self.commands.push(TerminalCommand::Newline);
        self.line_open = false;
    }

    /// Apply a style change to the innermost scope.
    pub fn style(&mut self, change: StyleChange) {
        self.differ.change(change);
    }

    pub fn push_scope(&mut self) {
        self.differ.push_scope();
    }

    pub fn pop_scope(&mut self) {
        self.differ.pop_scope();
    }

    /// Run `f` inside a nested style scope.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push_scope();
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Open a hyperlink, closing any link already open.
    pub fn link_open(&mut self, uri: &str) {
        if self.link_open {
            self.commands.push(TerminalCommand::Link(None));
        }
        self.commands.push(TerminalCommand::Link(Some(uri.to_owned())));
        self.link_open = true;
    }

    pub fn link_close(&mut self) {
        if self.link_open {
            self.commands.push(TerminalCommand::Link(None));
            self.link_open = false;
        }
    }

    /// Commands written so far.
    #[must_use]
    pub fn commands(&self) -> &[TerminalCommand] {
        &self.commands
    }

    /// The differ driving style emission.
    #[must_use]
    pub fn differ(&self) -> &StyleDiffer {
        &self.differ
    }

    /// Close open links, return the terminal to the unstyled state, and
    /// terminate the last line.
    #[must_use]
    pub fn finish(mut self) -> Vec<TerminalCommand> {
        self.link_close();
        self.differ.finish(&mut self.commands);
        if self.line_open {
            self.commands.push(TerminalCommand::Newline);
        }
        self.commands
    }
}
