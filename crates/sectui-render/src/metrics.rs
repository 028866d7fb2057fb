#![forbid(unsafe_code)]

//! Line accounting for the clear-and-redraw protocol.
//!
//! After a frame is written the cursor sits at column 0 of the line just
//! below it (frames always end in a newline). Erasing the frame therefore
//! means: carriage return, then once per occupied line move up one row and
//! erase it. [`line_count`] computes how many lines a frame occupies,
//! including soft wraps when the terminal width is known.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use sectui_core::ansi::cursor::{self, EraseLine};

use crate::command::TerminalCommand;

/// Display width of a grapheme cluster.
#[inline]
fn grapheme_width(grapheme: &str) -> usize {
    grapheme.width()
}

/// Tracks the cursor column across text runs to count wrapped rows.
struct RowCounter {
    width: Option<usize>,
    column: usize,
    rows_in_line: usize,
}

impl RowCounter {
    fn new(width: Option<usize>) -> Self {
        Self {
            width: width.filter(|w| *w > 0),
            column: 0,
            rows_in_line: 1,
        }
    }

    fn text(&mut self, text: &str) {
        let Some(width) = self.width else {
            self.column += text.width();
            return;
        };
        for grapheme in text.graphemes(true) {
            let w = grapheme_width(grapheme);
            if self.column > 0 && self.column + w > width {
                self.rows_in_line += 1;
                self.column = 0;
            }
            self.column += w;
        }
    }

    /// Close the current line and return how many rows it occupied.
    fn end_line(&mut self) -> usize {
        let rows = self.rows_in_line;
        self.column = 0;
        self.rows_in_line = 1;
        rows
    }

    fn has_content(&self) -> bool {
        self.column > 0 || self.rows_in_line > 1
    }
}

/// Number of terminal lines `commands` occupies.
///
/// `width` is the terminal width in columns, or `None` when unbounded (no
/// soft wrapping). A trailing unterminated line counts as one line.
#[must_use]
pub fn line_count(commands: &[TerminalCommand], width: Option<usize>) -> usize {
    let mut counter = RowCounter::new(width);
    let mut lines = 0;
    for command in commands {
        match command {
            TerminalCommand::Text(text) => counter.text(text),
            TerminalCommand::Newline => lines += counter.end_line(),
            TerminalCommand::Sgr(_) | TerminalCommand::Link(_) => {}
        }
    }
    if counter.has_content() {
        lines += counter.end_line();
    }
    lines
}

/// Bytes that erase `lines` lines above the cursor, leaving the cursor at
/// the start of the topmost erased line.
#[must_use]
pub fn clear_sequence(lines: usize) -> String {
    if lines == 0 {
        return String::new();
    }
    let up = cursor::up(1);
    let erase = cursor::erase_line(EraseLine::All);
    let mut out = String::with_capacity(1 + lines * 8);
    out.push('\r');
    for _ in 0..lines {
        up.encode_into(&mut out);
        erase.encode_into(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> TerminalCommand {
        TerminalCommand::Text(s.into())
    }

    #[test]
    fn counts_newline_terminated_lines() {
        let commands = vec![text("a"), TerminalCommand::Newline, TerminalCommand::Newline, text("b"), TerminalCommand::Newline];
        assert_eq!(line_count(&commands, None), 3);
        assert_eq!(line_count(&[], None), 0);
    }

    #[test]
    fn unterminated_line_counts() {
        assert_eq!(line_count(&[text("abc")], None), 1);
    }

    #[test]
    fn wraps_at_width() {
        let commands = vec![text("abcdefghij"), TerminalCommand::Newline];
        assert_eq!(line_count(&commands, Some(4)), 3);
        assert_eq!(line_count(&commands, Some(10)), 1);
        assert_eq!(line_count(&commands, Some(9)), 2);
        assert_eq!(line_count(&commands, None), 1);
        assert_eq!(line_count(&commands, Some(0)), 1);
    }

    #[test]
    fn wide_graphemes_wrap_early() {
        // Three double-width chars in a 5-column terminal: 2 fit, 1 wraps.
        let commands = vec![text("日本語"), TerminalCommand::Newline];
        assert_eq!(line_count(&commands, Some(5)), 2);
    }

    #[test]
    fn style_commands_take_no_space() {
        let commands = vec![
            TerminalCommand::Sgr(sectui_core::ansi::sgr::bold()),
            text("ab"),
            TerminalCommand::Link(None),
            TerminalCommand::Newline,
        ];
        assert_eq!(line_count(&commands, Some(2)), 1);
    }

    #[test]
    fn clear_sequence_shape() {
        assert_eq!(clear_sequence(0), "");
        assert_eq!(clear_sequence(2), "\r\x1b[1A\x1b[2K\x1b[1A\x1b[2K");
    }
}
