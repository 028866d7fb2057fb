#![forbid(unsafe_code)]

//! Raw input bytes to logical [`Key`]s.
//!
//! # State Machine
//!
//! ```text
//!                 ┌──────────── printable / control byte ─────────┐
//!                 ▼                                               │
//!   ┌────────┐  ESC   ┌──────────────┐  completes CSI/SS3  ┌──────┴─┐
//!   │  Idle  │───────▶│  Escape(buf) │────────────────────▶│  emit  │
//!   └────────┘        └──────────────┘                     └────────┘
//!       │ ▲              │ timeout with buf == [ESC] → Escape
//!       │ │              │ ESC + other byte → Escape, re-feed byte
//!  UTF-8│ │complete      │ unrecognized → dropped
//!  lead ▼ │
//!   ┌─────────────┐
//!   │  Utf8(buf)  │
//!   └─────────────┘
//! ```
//!
//! Terminals send multi-byte escape sequences in a single burst. A human
//! pressing Escape does not follow it with `[` within a few milliseconds, so
//! a lone ESC that sees no further byte within [`DecoderConfig::esc_timeout`]
//! is reported as [`Key::Escape`].
//!
//! The decoder is a pure state machine: time is passed in by the caller, so
//! it is fully deterministic under test. [`KeyEvents`](crate::KeyEvents)
//! drives it from a reader thread.
//!
//! # Failure Modes
//!
//! Malformed or unsupported sequences and invalid UTF-8 are dropped with a
//! `trace!` event. Input decoding never fails.

use std::time::Duration;

use smallvec::SmallVec;
use tracing::trace;
use web_time::Instant;

use crate::ansi::{self, AnsiError, CsiCode, Sequence};
use crate::key::Key;

/// Default lone-Escape disambiguation window.
pub const DEFAULT_ESC_TIMEOUT_MS: u64 = 50;

/// Minimum accepted escape timeout.
pub const MIN_ESC_TIMEOUT_MS: u64 = 10;

/// Maximum accepted escape timeout.
pub const MAX_ESC_TIMEOUT_MS: u64 = 500;

/// Longest escape sequence buffered before giving up on it.
const MAX_SEQUENCE_LEN: usize = 32;

/// Keys produced by a single byte. Almost always zero or one.
pub type DecodedKeys = SmallVec<[Key; 2]>;

/// Decoder timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// How long a lone ESC waits for a follow-up byte before it is reported
    /// as [`Key::Escape`].
    pub esc_timeout: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            esc_timeout: Duration::from_millis(DEFAULT_ESC_TIMEOUT_MS),
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn with_esc_timeout(mut self, timeout: Duration) -> Self {
        self.esc_timeout = timeout;
        self
    }

    /// Load from the environment.
    ///
    /// Reads `SECTUI_ESC_TIMEOUT_MS`. Values are clamped by
    /// [`validated`](Self::validated).
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("SECTUI_ESC_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.esc_timeout = Duration::from_millis(ms);
        }
        config.validated()
    }

    /// Clamp `esc_timeout` to 10..=500ms.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let ms = u64::try_from(self.esc_timeout.as_millis()).unwrap_or(u64::MAX);
        self.esc_timeout = Duration::from_millis(ms.clamp(MIN_ESC_TIMEOUT_MS, MAX_ESC_TIMEOUT_MS));
        self
    }
}

#[derive(Debug, Clone)]
enum DecoderState {
    Idle,
    Escape {
        buf: SmallVec<[u8; 8]>,
        last_byte_at: Instant,
    },
    Utf8 {
        buf: SmallVec<[u8; 4]>,
        expected: usize,
    },
}

/// Byte-at-a-time key decoder.
#[derive(Debug, Clone)]
pub struct KeyDecoder {
    config: DecoderConfig,
    state: DecoderState,
}

impl Default for KeyDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl KeyDecoder {
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::Idle,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Whether an escape sequence is being accumulated.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, DecoderState::Escape { .. })
    }

    /// When [`check_timeout`](Self::check_timeout) should next be called,
    /// if an escape sequence is pending.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DecoderState::Escape { last_byte_at, .. } => Some(*last_byte_at + self.config.esc_timeout),
            _ => None,
        }
    }

    /// Feed one byte received at `now`.
    pub fn feed(&mut self, byte: u8, now: Instant) -> DecodedKeys {
        let mut out = DecodedKeys::new();
        if let Some(key) = self.check_timeout(now) {
            out.push(key);
        }
        self.step(byte, now, &mut out);
        out
    }

    /// Feed a chunk of bytes that all arrived at `now`.
    pub fn feed_all(&mut self, bytes: &[u8], now: Instant) -> Vec<Key> {
        let mut out = Vec::with_capacity(bytes.len());
        for &byte in bytes {
            out.extend(self.feed(byte, now));
        }
        out
    }

    /// Resolve a pending escape whose window has elapsed.
    ///
    /// Emits [`Key::Escape`] when only the lone ESC byte is buffered. A
    /// partial sequence that timed out is dropped.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Key> {
        let DecoderState::Escape { buf, last_byte_at } = &self.state else {
            return None;
        };
        if now.saturating_duration_since(*last_byte_at) < self.config.esc_timeout {
            return None;
        }
        let lone = buf.len() == 1;
        if !lone {
            trace!(len = buf.len(), "dropped incomplete escape sequence after timeout");
        }
        self.state = DecoderState::Idle;
        lone.then_some(Key::Escape)
    }

    /// Flush state at end of input. A pending lone ESC becomes
    /// [`Key::Escape`]; anything else pending is dropped.
    pub fn finish(&mut self) -> Option<Key> {
        let state = std::mem::replace(&mut self.state, DecoderState::Idle);
        match state {
            DecoderState::Escape { buf, .. } if buf.len() == 1 => Some(Key::Escape),
            _ => None,
        }
    }

    fn step(&mut self, byte: u8, now: Instant, out: &mut DecodedKeys) {
        match &mut self.state {
            DecoderState::Idle => self.step_idle(byte, now, out),
            DecoderState::Utf8 { buf, expected } => {
                if byte & 0xC0 != 0x80 {
                    trace!(len = buf.len(), "dropped truncated UTF-8 sequence");
                    self.state = DecoderState::Idle;
                    self.step_idle(byte, now, out);
                    return;
                }
                buf.push(byte);
                if buf.len() < *expected {
                    return;
                }
                match std::str::from_utf8(buf).ok().and_then(|s| s.chars().next()) {
                    Some(ch) => out.push(Key::char(ch)),
                    None => trace!("dropped invalid UTF-8 sequence"),
                }
                self.state = DecoderState::Idle;
            }
            DecoderState::Escape { buf, last_byte_at } => {
                *last_byte_at = now;
                if buf.len() == 1 {
                    match byte {
                        b'[' | b'O' => buf.push(byte),
                        0x1b => out.push(Key::Escape),
                        _ => {
                            out.push(Key::Escape);
                            self.state = DecoderState::Idle;
                            self.step_idle(byte, now, out);
                        }
                    }
                    return;
                }
                buf.push(byte);
                if buf[1] == b'O' {
                    match ss3_key(byte) {
                        Some(key) => out.push(key),
                        None => trace!(byte, "dropped unrecognized SS3 sequence"),
                    }
                    self.state = DecoderState::Idle;
                    return;
                }
                match ansi::decode(buf) {
                    Ok((Sequence::Csi(code), _)) => {
                        match csi_key(&code) {
                            Some(key) => out.push(key),
                            None => trace!(sequence = %code, "dropped unrecognized CSI sequence"),
                        }
                        self.state = DecoderState::Idle;
                    }
                    Err(AnsiError::Incomplete) if buf.len() < MAX_SEQUENCE_LEN => {}
                    Ok(_) | Err(_) => {
                        trace!(len = buf.len(), "dropped unrecognized escape sequence");
                        self.state = DecoderState::Idle;
                    }
                }
            }
        }
    }

    fn step_idle(&mut self, byte: u8, now: Instant, out: &mut DecodedKeys) {
        match byte {
            0x1b => {
                let mut buf = SmallVec::new();
                buf.push(byte);
                self.state = DecoderState::Escape {
                    buf,
                    last_byte_at: now,
                };
            }
            b'\r' | b'\n' => out.push(Key::Enter),
            0x7f | 0x08 => out.push(Key::Backspace),
            b'\t' => out.push(Key::Tab),
            0x04 => out.push(Key::Eof),
            0x20..=0x7e => out.push(Key::char(char::from(byte))),
            0xc0..=0xf7 => {
                let expected = match byte {
                    0xc0..=0xdf => 2,
                    0xe0..=0xef => 3,
                    _ => 4,
                };
                let mut buf = SmallVec::new();
                buf.push(byte);
                self.state = DecoderState::Utf8 { buf, expected };
            }
            _ => trace!(byte, "dropped unsupported input byte"),
        }
    }
}

fn ss3_key(byte: u8) -> Option<Key> {
    Some(match byte {
        b'A' => Key::Up,
        b'B' => Key::Down,
        b'C' => Key::Right,
        b'D' => Key::Left,
        b'H' => Key::Home,
        b'F' => Key::End,
        _ => return None,
    })
}

fn csi_key(code: &CsiCode) -> Option<Key> {
    match code.identifier() {
        // `CSI 1;5A` and friends carry modifiers we do not report.
        'A' | 'B' | 'C' | 'D' | 'H' | 'F' if matches!(code.leading(), None | Some(1)) => {
            u8::try_from(code.identifier()).ok().and_then(ss3_key)
        }
        '~' => Some(match code.leading()? {
            1 | 7 => Key::Home,
            2 => Key::Insert,
            3 => Key::Delete,
            4 | 8 => Key::End,
            5 => Key::PageUp,
            6 => Key::PageDown,
            _ => return None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn lone_escape_needs_the_timeout() {
        let mut decoder = KeyDecoder::default();
        let t0 = Instant::now();
        assert!(decoder.feed(0x1b, t0).is_empty());
        assert_eq!(decoder.check_timeout(t0 + ms(10)), None);
        assert!(decoder.is_pending());
        assert_eq!(decoder.check_timeout(t0 + ms(50)), Some(Key::Escape));
        assert!(!decoder.is_pending());
        assert_eq!(decoder.check_timeout(t0 + ms(100)), None);
    }

    #[test]
    fn arrow_sequence_in_one_burst() {
        let mut decoder = KeyDecoder::default();
        let now = Instant::now();
        assert_eq!(decoder.feed_all(b"\x1b[A", now), vec![Key::Up]);
        assert_eq!(decoder.check_timeout(now + ms(100)), None);
    }

    #[test]
    fn all_navigation_sequences() {
        let cases: &[(&[u8], Key)] = &[
            (b"\x1b[B", Key::Down),
            (b"\x1b[C", Key::Right),
            (b"\x1b[D", Key::Left),
            (b"\x1b[H", Key::Home),
            (b"\x1b[F", Key::End),
            (b"\x1bOH", Key::Home),
            (b"\x1bOA", Key::Up),
            (b"\x1b[1~", Key::Home),
            (b"\x1b[7~", Key::Home),
            (b"\x1b[2~", Key::Insert),
            (b"\x1b[3~", Key::Delete),
            (b"\x1b[4~", Key::End),
            (b"\x1b[8~", Key::End),
            (b"\x1b[5~", Key::PageUp),
            (b"\x1b[6~", Key::PageDown),
            (b"\x1b[1;5A", Key::Up),
        ];
        let now = Instant::now();
        for (bytes, key) in cases {
            let mut decoder = KeyDecoder::default();
            assert_eq!(decoder.feed_all(bytes, now), vec![*key], "{bytes:?}");
        }
    }

    #[test]
    fn plain_bytes_one_key_each() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all(b"hi!", Instant::now());
        assert_eq!(keys, vec![Key::char('h'), Key::char('i'), Key::char('!')]);
    }

    #[test]
    fn control_bytes() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all(b"\r\n\x7f\x08\t\x04", Instant::now());
        assert_eq!(
            keys,
            vec![Key::Enter, Key::Enter, Key::Backspace, Key::Backspace, Key::Tab, Key::Eof]
        );
    }

    #[test]
    fn escape_then_letter_is_two_keys() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all(b"\x1bx", Instant::now());
        assert_eq!(keys, vec![Key::Escape, Key::char('x')]);
    }

    #[test]
    fn double_escape() {
        let mut decoder = KeyDecoder::default();
        let t0 = Instant::now();
        assert_eq!(decoder.feed_all(b"\x1b\x1b", t0), vec![Key::Escape]);
        assert_eq!(decoder.check_timeout(t0 + ms(60)), Some(Key::Escape));
    }

    #[test]
    fn late_byte_resolves_pending_escape_first() {
        let mut decoder = KeyDecoder::default();
        let t0 = Instant::now();
        decoder.feed(0x1b, t0);
        let keys = decoder.feed(b'[', t0 + ms(80));
        // The ESC timed out, so '[' is an ordinary character.
        assert_eq!(keys.as_slice(), &[Key::Escape, Key::char('[')]);
    }

    #[test]
    fn utf8_is_assembled() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all("é✓".as_bytes(), Instant::now());
        assert_eq!(keys, vec![Key::char('é'), Key::char('✓')]);
    }

    #[test]
    fn truncated_utf8_is_dropped() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all(&[0xe2, 0x9c, b'a'], Instant::now());
        assert_eq!(keys, vec![Key::char('a')]);
    }

    #[traced_test]
    #[test]
    fn unrecognized_sequence_is_dropped() {
        let mut decoder = KeyDecoder::default();
        let keys = decoder.feed_all(b"\x1b[99~z", Instant::now());
        assert_eq!(keys, vec![Key::char('z')]);
        assert!(logs_contain("dropped unrecognized CSI sequence"));
    }

    #[test]
    fn finish_flushes_lone_escape() {
        let mut decoder = KeyDecoder::default();
        decoder.feed(0x1b, Instant::now());
        assert_eq!(decoder.finish(), Some(Key::Escape));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn deadline_tracks_last_byte() {
        let mut decoder = KeyDecoder::default();
        let t0 = Instant::now();
        assert_eq!(decoder.deadline(), None);
        decoder.feed(0x1b, t0);
        assert_eq!(decoder.deadline(), Some(t0 + ms(DEFAULT_ESC_TIMEOUT_MS)));
    }

    #[test]
    fn config_is_clamped() {
        assert_eq!(
            DecoderConfig::default().with_esc_timeout(ms(1)).validated().esc_timeout,
            ms(MIN_ESC_TIMEOUT_MS)
        );
        assert_eq!(
            DecoderConfig::default().with_esc_timeout(ms(9_000)).validated().esc_timeout,
            ms(MAX_ESC_TIMEOUT_MS)
        );
        assert_eq!(DecoderConfig::default().validated().esc_timeout, ms(50));
    }
}
