#![forbid(unsafe_code)]

//! Terminal abstraction for sectui.
//!
//! The runtime only ever talks to a terminal through [`Terminal`]: write a
//! batch of bytes, obtain the raw input stream, query the size, close. Two
//! implementations exist:
//!
//! - `sectui-tty` drives the real terminal (raw mode, stdin reader thread).
//! - [`VirtualTerminal`] keeps everything in memory. Each `write` call is
//!   recorded as one batch, input bytes are injected by the test, and
//!   [`VirtualTerminal::screen`] replays the output through a minimal screen
//!   model so assertions can be made on what a user would actually see.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use sectui_core::ansi::{self, Sequence};
use tracing::trace;
use unicode_width::UnicodeWidthChar;

// ── Trait ────────────────────────────────────────────────────────────────

/// A terminal the runtime can draw on and read keys from.
pub trait Terminal: Send + Sync {
    /// Write raw text, escape sequences included, as one batch.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write failure.
    fn write(&self, text: &str) -> io::Result<()>;

    /// Take the raw input byte stream. Each message is one chunk of bytes
    /// as read from the device. The stream ends when the terminal closes.
    ///
    /// # Errors
    ///
    /// Fails if the stream was already taken or cannot be opened.
    fn read(&self) -> io::Result<Receiver<Vec<u8>>>;

    /// Width in columns, or `None` if unbounded.
    fn width(&self) -> Option<u16>;

    /// Height in rows, or `None` if unbounded.
    fn height(&self) -> Option<u16>;

    /// Release the terminal. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates failures restoring the device state.
    fn close(&self) -> io::Result<()>;
}

impl<T: Terminal + ?Sized> Terminal for Arc<T> {
    fn write(&self, text: &str) -> io::Result<()> {
        (**self).write(text)
    }

    fn read(&self) -> io::Result<Receiver<Vec<u8>>> {
        (**self).read()
    }

    fn width(&self) -> Option<u16> {
        (**self).width()
    }

    fn height(&self) -> Option<u16> {
        (**self).height()
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

// ── Virtual terminal ─────────────────────────────────────────────────────

struct VirtualInner {
    width: Option<u16>,
    height: Option<u16>,
    writes: Mutex<Vec<String>>,
    written: Condvar,
    input: Mutex<InputState>,
    closed: AtomicBool,
}

enum InputState {
    NotTaken,
    Taken(Sender<Vec<u8>>),
    Closed,
}

/// In-memory terminal for headless tests. Clones share state.
#[derive(Clone)]
pub struct VirtualTerminal {
    inner: Arc<VirtualInner>,
}

impl std::fmt::Debug for VirtualTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualTerminal")
            .field("width", &self.inner.width)
            .field("writes", &self.inner.writes.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for VirtualTerminal {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl VirtualTerminal {
    /// A terminal of fixed size.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self::build(Some(width), Some(height))
    }

    /// A terminal with no width limit (no soft wrapping).
    #[must_use]
    pub fn unbounded() -> Self {
        Self::build(None, None)
    }

    fn build(width: Option<u16>, height: Option<u16>) -> Self {
        Self {
            inner: Arc::new(VirtualInner {
                width,
                height,
                writes: Mutex::new(Vec::new()),
                written: Condvar::new(),
                input: Mutex::new(InputState::NotTaken),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Inject input bytes. Returns `false` if nobody is reading yet or the
    /// terminal is closed.
    pub fn send_bytes(&self, bytes: &[u8]) -> bool {
        match &*self.inner.input.lock() {
            InputState::Taken(tx) => tx.send(bytes.to_vec()).is_ok(),
            InputState::NotTaken | InputState::Closed => false,
        }
    }

    /// Inject text as typed input.
    pub fn send_text(&self, text: &str) -> bool {
        self.send_bytes(text.as_bytes())
    }

    /// Every write batch so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.inner.writes.lock().clone()
    }

    /// Number of write batches so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().len()
    }

    /// All output concatenated.
    #[must_use]
    pub fn output(&self) -> String {
        self.inner.writes.lock().concat()
    }

    /// Block until at least `count` batches were written or `timeout`
    /// elapses. Returns whether the count was reached.
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut writes = self.inner.writes.lock();
        while writes.len() < count {
            if self.inner.written.wait_until(&mut writes, deadline).timed_out() {
                return writes.len() >= count;
            }
        }
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The visible screen after replaying all output: one string per line,
    /// trailing blanks trimmed, trailing empty lines removed.
    #[must_use]
    pub fn screen(&self) -> Vec<String> {
        let mut screen = Screen::new(self.inner.width.map(usize::from));
        screen.feed(&self.output());
        screen.into_lines()
    }
}

impl Terminal for VirtualTerminal {
    fn write(&self, text: &str) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "virtual terminal closed"));
        }
        trace!(bytes = text.len(), "virtual terminal write");
        self.inner.writes.lock().push(text.to_owned());
        self.inner.written.notify_all();
        Ok(())
    }

    fn read(&self) -> io::Result<Receiver<Vec<u8>>> {
        let mut input = self.inner.input.lock();
        match &*input {
            InputState::NotTaken => {}
            InputState::Taken(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "input stream already taken",
                ));
            }
            InputState::Closed => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "virtual terminal closed"));
            }
        }
        let (tx, rx) = mpsc::channel();
        *input = InputState::Taken(tx);
        Ok(rx)
    }

    fn width(&self) -> Option<u16> {
        self.inner.width
    }

    fn height(&self) -> Option<u16> {
        self.inner.height
    }

    fn close(&self) -> io::Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        *self.inner.input.lock() = InputState::Closed;
        Ok(())
    }
}

// ── Screen model ─────────────────────────────────────────────────────────

/// Just enough of a terminal to resolve inline redraws: printable text,
/// CR/LF, cursor up/down/forward/back, and erase-line. Styles and links are
/// ignored.
///
/// Each cell holds the text drawn there. A wide character leaves an empty
/// continuation cell after it; zero-width characters join the previous cell.
struct Screen {
    width: Option<usize>,
    lines: Vec<Vec<String>>,
    row: usize,
    col: usize,
}

impl Screen {
    fn new(width: Option<usize>) -> Self {
        Self {
            width: width.filter(|w| *w > 0),
            lines: vec![Vec::new()],
            row: 0,
            col: 0,
        }
    }

    fn line(&mut self) -> &mut Vec<String> {
        while self.lines.len() <= self.row {
            self.lines.push(Vec::new());
        }
        &mut self.lines[self.row]
    }

    fn feed(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < text.len() {
            match bytes[i] {
                0x1b => {
                    i += match ansi::decode(&bytes[i..]) {
                        Ok((sequence, len)) => {
                            self.apply(&sequence);
                            len
                        }
                        Err(_) => 1,
                    };
                }
                b'\r' => {
                    self.col = 0;
                    i += 1;
                }
                b'\n' => {
                    self.row += 1;
                    self.line();
                    i += 1;
                }
                _ => {
                    let Some(ch) = text.get(i..).and_then(|rest| rest.chars().next()) else {
                        i += 1;
                        continue;
                    };
                    self.put(ch);
                    i += ch.len_utf8();
                }
            }
        }
    }

    fn put(&mut self, ch: char) {
        let cells = ch.width().unwrap_or(0);
        if cells == 0 {
            let col = self.col.saturating_sub(1);
            let line = self.line();
            if let Some(cell) = line.get_mut(col) {
                cell.push(ch);
            }
            return;
        }
        if let Some(width) = self.width
            && self.col > 0
            && self.col + cells > width
        {
            self.row += 1;
            self.col = 0;
        }
        let col = self.col;
        let line = self.line();
        if line.len() < col + cells {
            line.resize(col + cells, " ".to_owned());
        }
        line[col] = ch.to_string();
        for continuation in &mut line[col + 1..col + cells] {
            continuation.clear();
        }
        self.col += cells;
    }

    fn apply(&mut self, sequence: &Sequence) {
        let Sequence::Csi(code) = sequence else {
            return;
        };
        let n = code.leading().map_or(1, |n| n.max(1)) as usize;
        match code.identifier() {
            'A' => self.row = self.row.saturating_sub(n),
            'B' => self.row += n,
            'C' => self.col += n,
            'D' => self.col = self.col.saturating_sub(n),
            'K' => {
                let col = self.col;
                let line = self.line();
                match code.leading().unwrap_or(0) {
                    0 => line.truncate(col),
                    1 => line
                        .iter_mut()
                        .take(col + 1)
                        .for_each(|cell| *cell = " ".to_owned()),
                    _ => line.clear(),
                }
            }
            _ => {}
        }
    }

    fn into_lines(self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .lines
            .into_iter()
            .map(|line| line.concat().trim_end().to_owned())
            .collect();
        while lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_batches() {
        let term = VirtualTerminal::unbounded();
        term.write("a").unwrap();
        term.write("b").unwrap();
        assert_eq!(term.writes(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(term.output(), "ab");
    }

    #[test]
    fn screen_resolves_redraw() {
        let term = VirtualTerminal::unbounded();
        term.write("Count: 0\r\n").unwrap();
        term.write("\r\x1b[1A\x1b[2K\x1b[31mCount: 3\x1b[39m\r\n").unwrap();
        assert_eq!(term.screen(), vec!["Count: 3".to_owned()]);
    }

    #[test]
    fn screen_wraps_at_width() {
        let term = VirtualTerminal::new(3, 10);
        term.write("abcde\r\n").unwrap();
        assert_eq!(term.screen(), vec!["abc".to_owned(), "de".to_owned()]);
    }

    #[test]
    fn screen_wraps_wide_characters_like_line_count() {
        let term = VirtualTerminal::new(5, 10);
        term.write("日本語\r\n").unwrap();
        assert_eq!(term.screen(), vec!["日本".to_owned(), "語".to_owned()]);
    }

    #[test]
    fn screen_keeps_combining_marks_in_their_cell() {
        let term = VirtualTerminal::new(4, 10);
        term.write("cafe\u{301}!\r\n").unwrap();
        assert_eq!(term.screen(), vec!["cafe\u{301}".to_owned(), "!".to_owned()]);
    }

    #[test]
    fn input_stream_is_single_use() {
        let term = VirtualTerminal::unbounded();
        assert!(!term.send_text("x"));
        let rx = term.read().unwrap();
        assert!(term.read().is_err());
        assert!(term.send_text("x"));
        assert_eq!(rx.recv().unwrap(), b"x".to_vec());
    }

    #[test]
    fn close_ends_input_and_rejects_writes() {
        let term = VirtualTerminal::unbounded();
        let rx = term.read().unwrap();
        term.close().unwrap();
        assert!(rx.recv().is_err());
        assert!(term.write("late").is_err());
        assert!(term.is_closed());
    }

    #[test]
    fn wait_for_writes_across_threads() {
        let term = VirtualTerminal::unbounded();
        let writer = term.clone();
        let handle = std::thread::spawn(move || writer.write("hello"));
        assert!(term.wait_for_writes(1, Duration::from_secs(2)));
        handle.join().unwrap().unwrap();
        assert!(!term.wait_for_writes(2, Duration::from_millis(10)));
    }
}
