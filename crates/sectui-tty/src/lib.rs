#![forbid(unsafe_code)]

//! Native terminal backend for sectui.
//!
//! [`TtyTerminal`] implements [`Terminal`] on top of the process's
//! stdin/stdout:
//!
//! - raw mode is entered on [`TtyTerminal::open`] (via crossterm) so key
//!   presses arrive unbuffered and unechoed;
//! - a reader thread named `sectui-stdin` forwards raw input chunks;
//! - the cursor is hidden while open, since sections draw their own;
//! - [`close`](Terminal::close), `Drop`, a panic hook, and SIGINT/SIGTERM
//!   all restore the terminal.
//!
//! Only one `TtyTerminal` may be open per process.
//!
//! # Ctrl-C
//!
//! Raw mode turns Ctrl-C into a plain `0x03` byte instead of SIGINT. With
//! [`TtyOptions::exit_on_ctrl_c`] (the default) the reader thread treats
//! that byte as an interrupt: it restores the terminal and exits with
//! status 130.

use std::io::{self, Read, Write};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};

use crossterm::{cursor, terminal};
use parking_lot::Mutex;
use sectui_backend::Terminal;
use tracing::{debug, info, warn};

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

static TTY_ACTIVE: AtomicBool = AtomicBool::new(false);

const CTRL_C: u8 = 0x03;
const READ_CHUNK: usize = 1024;

/// Options for [`TtyTerminal::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyOptions {
    /// Exit the process (status 130) when Ctrl-C is read.
    pub exit_on_ctrl_c: bool,
    /// Hide the cursor while the terminal is open.
    pub hide_cursor: bool,
}

impl Default for TtyOptions {
    fn default() -> Self {
        Self {
            exit_on_ctrl_c: true,
            hide_cursor: true,
        }
    }
}

#[derive(Debug)]
struct TtyLock;

impl TtyLock {
    fn acquire() -> io::Result<Self> {
        if TTY_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(io::Error::other("TtyTerminal already open"));
        }
        Ok(Self)
    }
}

impl Drop for TtyLock {
    fn drop(&mut self) {
        TTY_ACTIVE.store(false, Ordering::SeqCst);
    }
}

struct OpenState {
    _lock: TtyLock,
    #[cfg(unix)]
    _signals: Option<SignalGuard>,
}

/// The process's own terminal.
pub struct TtyTerminal {
    options: TtyOptions,
    state: Mutex<Option<OpenState>>,
    input_taken: AtomicBool,
}

impl std::fmt::Debug for TtyTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtyTerminal")
            .field("options", &self.options)
            .field("open", &self.state.lock().is_some())
            .finish()
    }
}

impl TtyTerminal {
    /// Enter raw mode and take over the terminal.
    ///
    /// # Errors
    ///
    /// Fails if another `TtyTerminal` is open or raw mode cannot be entered.
    pub fn open(options: TtyOptions) -> io::Result<Self> {
        let lock = TtyLock::acquire()?;
        install_panic_hook();
        terminal::enable_raw_mode()?;
        if options.hide_cursor {
            crossterm::execute!(io::stdout(), cursor::Hide)?;
        }

        #[cfg(unix)]
        let signals = match SignalGuard::new() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "signal handler unavailable; relying on Drop for cleanup");
                None
            }
        };

        info!(?options, "tty opened");
        Ok(Self {
            options,
            state: Mutex::new(Some(OpenState {
                _lock: lock,
                #[cfg(unix)]
                _signals: signals,
            })),
            input_taken: AtomicBool::new(false),
        })
    }

    /// Whether [`close`](Terminal::close) has not run yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }
}

impl Terminal for TtyTerminal {
    fn write(&self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }

    fn read(&self) -> io::Result<Receiver<Vec<u8>>> {
        if self.input_taken.swap(true, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "input stream already taken"));
        }
        let (tx, rx) = mpsc::channel();
        let exit_on_ctrl_c = self.options.exit_on_ctrl_c;
        std::thread::Builder::new()
            .name("sectui-stdin".into())
            .spawn(move || {
                let mut stdin = io::stdin();
                let mut buf = [0u8; READ_CHUNK];
                loop {
                    let n = match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!(error = %e, "stdin read failed");
                            break;
                        }
                    };
                    let chunk = &buf[..n];
                    if exit_on_ctrl_c && chunk.contains(&CTRL_C) {
                        debug!("ctrl-c read; exiting");
                        best_effort_cleanup();
                        std::process::exit(130);
                    }
                    if tx.send(chunk.to_vec()).is_err() {
                        break;
                    }
                }
                debug!("stdin reader stopped");
            })?;
        Ok(rx)
    }

    fn width(&self) -> Option<u16> {
        terminal::size().ok().map(|(cols, _)| cols).filter(|cols| *cols > 0)
    }

    fn height(&self) -> Option<u16> {
        terminal::size().ok().map(|(_, rows)| rows).filter(|rows| *rows > 0)
    }

    fn close(&self) -> io::Result<()> {
        let Some(state) = self.state.lock().take() else {
            return Ok(());
        };
        let mut stdout = io::stdout();
        if self.options.hide_cursor {
            crossterm::execute!(stdout, cursor::Show)?;
        }
        terminal::disable_raw_mode()?;
        stdout.flush()?;
        drop(state);
        info!("tty closed");
        Ok(())
    }
}

impl Drop for TtyTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to restore terminal on drop");
        }
    }
}

fn install_panic_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if TTY_ACTIVE.load(Ordering::SeqCst) {
                best_effort_cleanup();
            }
            previous(info);
        }));
    });
}

/// Restore cooked mode and the cursor without needing the terminal handle.
///
/// Call this before `std::process::exit` when destructors will not run.
pub fn best_effort_cleanup() {
    let mut stdout = io::stdout();
    let _ = crossterm::execute!(stdout, cursor::Show);
    let _ = terminal::disable_raw_mode();
    let _ = stdout.flush();
}

#[cfg(unix)]
struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalGuard {
    fn new() -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("sectui-signals".into())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    warn!(signal, "termination signal received, cleaning up");
                    best_effort_cleanup();
                    std::process::exit(128 + signal);
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = TtyOptions::default();
        assert!(options.exit_on_ctrl_c);
        assert!(options.hide_cursor);
    }

    #[test]
    fn lock_is_exclusive() {
        let first = TtyLock::acquire().unwrap();
        assert!(TtyLock::acquire().is_err());
        drop(first);
        let again = TtyLock::acquire().unwrap();
        drop(again);
    }
}
