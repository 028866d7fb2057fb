#![forbid(unsafe_code)]

//! ANSI escape codec: CSI and OSC encoding plus a cursor-based decoder.
//!
//! # Wire format
//!
//! ```text
//! CSI:  ESC [ {leading-int}? {; int}* {final}        final in 0x40..=0x7E
//! OSC:  ESC ] {command} ; {payload} (ESC \ | BEL)
//! ```
//!
//! Decoded [`CsiCode`]s compare by their parsed parts (leading integer,
//! trailing integers, final character), never by raw text. `ESC[031m` and
//! `ESC[31m` are therefore the same code, which is what the style differ
//! relies on to compare meaning rather than bytes.
//!
//! # Escape Sequences Reference
//!
//! | Purpose | Sequence |
//! |---------|----------|
//! | Cursor up/down/forward/back | `CSI n A` / `B` / `C` / `D` |
//! | Erase line | `CSI 0 K` (to end), `CSI 1 K` (to start), `CSI 2 K` (all) |
//! | Reset | `CSI 0 m` |
//! | Bold / clear | `CSI 1 m` / `CSI 22 m` |
//! | Underline / clear | `CSI 4 m` / `CSI 24 m` |
//! | Invert / clear | `CSI 7 m` / `CSI 27 m` |
//! | Strikethrough / clear | `CSI 9 m` / `CSI 29 m` |
//! | 3/4-bit fg, bg | `CSI 30..37 m`, `CSI 90..97 m`; `CSI 40..47 m`, `CSI 100..107 m` |
//! | 8-bit fg, bg | `CSI 38;5;n m`, `CSI 48;5;n m` |
//! | 24-bit fg, bg | `CSI 38;2;r;g;b m`, `CSI 48;2;r;g;b m` |
//! | Clear fg, bg | `CSI 39 m`, `CSI 49 m` |
//! | Hyperlink open/close | `OSC 8 ; params ; uri ST` / `OSC 8 ; ; ST` |

use std::fmt::{self, Write as _};

use smallvec::SmallVec;

/// The escape byte.
pub const ESC: char = '\x1b';

/// Control Sequence Introducer prefix.
pub const CSI: &str = "\x1b[";

/// Operating System Command prefix.
pub const OSC: &str = "\x1b]";

/// String Terminator (ends OSC sequences).
pub const ST: &str = "\x1b\\";

const BEL: u8 = 0x07;

/// SGR final character.
pub const SGR: char = 'm';

/// SGR sub-code selecting an 8-bit palette index (`38;5;n`).
pub const SGR_LOOKUP: u32 = 5;

/// SGR sub-code selecting a 24-bit color (`38;2;r;g;b`).
pub const SGR_TRUECOLOR: u32 = 2;

/// Errors from decoding escape sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiError {
    /// Input does not start with ESC.
    NotAnEscape,
    /// The sequence is a valid prefix but needs more bytes.
    Incomplete,
    /// The sequence cannot be decoded. `at` is the offending byte offset.
    Unrecognized { at: usize },
}

impl fmt::Display for AnsiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnEscape => f.write_str("input does not start with ESC"),
            Self::Incomplete => f.write_str("escape sequence is incomplete"),
            Self::Unrecognized { at } => write!(f, "unrecognized escape sequence at byte {at}"),
        }
    }
}

impl std::error::Error for AnsiError {}

// ============================================================================
// CSI
// ============================================================================

/// A decoded (or to-be-encoded) CSI sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsiCode {
    leading: Option<u32>,
    trailing: SmallVec<[u32; 4]>,
    identifier: char,
}

impl CsiCode {
    /// A code with no numeric parts, e.g. `ESC [ K`.
    #[must_use]
    pub fn bare(identifier: char) -> Self {
        Self {
            leading: None,
            trailing: SmallVec::new(),
            identifier,
        }
    }

    /// A code from a list of integers; the first becomes the leading int.
    #[must_use]
    pub fn with_params(params: &[u32], identifier: char) -> Self {
        let (leading, trailing) = match params.split_first() {
            Some((first, rest)) => (Some(*first), SmallVec::from_slice(rest)),
            None => (None, SmallVec::new()),
        };
        Self {
            leading,
            trailing,
            identifier,
        }
    }

    /// The optional leading integer.
    #[must_use]
    pub fn leading(&self) -> Option<u32> {
        self.leading
    }

    /// Integers following the leading one.
    #[must_use]
    pub fn trailing(&self) -> &[u32] {
        &self.trailing
    }

    /// The final (identifier) character.
    #[must_use]
    pub fn identifier(&self) -> char {
        self.identifier
    }

    /// Whether this is an SGR (`m`) code.
    #[must_use]
    pub fn is_sgr(&self) -> bool {
        self.identifier == SGR
    }

    /// Append the encoded sequence to `out`.
    pub fn encode_into(&self, out: &mut String) {
        out.push_str(CSI);
        if let Some(leading) = self.leading {
            let _ = write!(out, "{leading}");
        }
        for value in &self.trailing {
            let _ = write!(out, ";{value}");
        }
        out.push(self.identifier);
    }

    /// Encode to a new string.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(8);
        self.encode_into(&mut out);
        out
    }
}

impl fmt::Display for CsiCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Cursor and erase codes.
pub mod cursor {
    use super::CsiCode;

    /// `CSI n A`
    #[must_use]
    pub fn up(n: u32) -> CsiCode {
        CsiCode::with_params(&[n], 'A')
    }

    /// `CSI n B`
    #[must_use]
    pub fn down(n: u32) -> CsiCode {
        CsiCode::with_params(&[n], 'B')
    }

    /// `CSI n C`
    #[must_use]
    pub fn forward(n: u32) -> CsiCode {
        CsiCode::with_params(&[n], 'C')
    }

    /// `CSI n D`
    #[must_use]
    pub fn back(n: u32) -> CsiCode {
        CsiCode::with_params(&[n], 'D')
    }

    /// Erase-line mode for `CSI n K`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EraseLine {
        /// Cursor to end of line.
        ToEnd = 0,
        /// Start of line to cursor.
        ToStart = 1,
        /// Whole line.
        All = 2,
    }

    /// `CSI n K`
    #[must_use]
    pub fn erase_line(mode: EraseLine) -> CsiCode {
        CsiCode::with_params(&[mode as u32], 'K')
    }
}

/// A terminal color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
    /// 8-bit palette index.
    Indexed(u8),
    /// 24-bit truecolor.
    Rgb(u8, u8, u8),
}

/// Whether a color applies to text or to the cell background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLayer {
    Foreground,
    Background,
}

impl Color {
    fn base_offset(self) -> Option<(u32, bool)> {
        let (offset, bright) = match self {
            Self::Black => (0, false),
            Self::Red => (1, false),
            Self::Green => (2, false),
            Self::Yellow => (3, false),
            Self::Blue => (4, false),
            Self::Magenta => (5, false),
            Self::Cyan => (6, false),
            Self::White => (7, false),
            Self::BrightBlack => (0, true),
            Self::BrightRed => (1, true),
            Self::BrightGreen => (2, true),
            Self::BrightYellow => (3, true),
            Self::BrightBlue => (4, true),
            Self::BrightMagenta => (5, true),
            Self::BrightCyan => (6, true),
            Self::BrightWhite => (7, true),
            Self::Indexed(_) | Self::Rgb(..) => return None,
        };
        Some((offset, bright))
    }

    /// The SGR code selecting this color on `layer`.
    #[must_use]
    pub fn sgr(self, layer: ColorLayer) -> CsiCode {
        let (base, bright_base, extended) = match layer {
            ColorLayer::Foreground => (30, 90, 38),
            ColorLayer::Background => (40, 100, 48),
        };
        match self {
            Self::Indexed(index) => {
                CsiCode::with_params(&[extended, SGR_LOOKUP, u32::from(index)], SGR)
            }
            Self::Rgb(r, g, b) => CsiCode::with_params(
                &[
                    extended,
                    SGR_TRUECOLOR,
                    u32::from(r),
                    u32::from(g),
                    u32::from(b),
                ],
                SGR,
            ),
            named => {
                let (offset, bright) = named.base_offset().unwrap_or((0, false));
                let start = if bright { bright_base } else { base };
                CsiCode::with_params(&[start + offset], SGR)
            }
        }
    }

    fn from_named(offset: u32, bright: bool) -> Option<Self> {
        let colors = if bright {
            [
                Self::BrightBlack,
                Self::BrightRed,
                Self::BrightGreen,
                Self::BrightYellow,
                Self::BrightBlue,
                Self::BrightMagenta,
                Self::BrightCyan,
                Self::BrightWhite,
            ]
        } else {
            [
                Self::Black,
                Self::Red,
                Self::Green,
                Self::Yellow,
                Self::Blue,
                Self::Magenta,
                Self::Cyan,
                Self::White,
            ]
        };
        colors.get(offset as usize).copied()
    }
}

/// Style codes (SGR).
pub mod sgr {
    use super::{CsiCode, SGR};

    /// Reset every attribute.
    #[must_use]
    pub fn reset() -> CsiCode {
        CsiCode::with_params(&[0], SGR)
    }

    #[must_use]
    pub fn bold() -> CsiCode {
        CsiCode::with_params(&[1], SGR)
    }

    #[must_use]
    pub fn underline() -> CsiCode {
        CsiCode::with_params(&[4], SGR)
    }

    #[must_use]
    pub fn invert() -> CsiCode {
        CsiCode::with_params(&[7], SGR)
    }

    #[must_use]
    pub fn strikethrough() -> CsiCode {
        CsiCode::with_params(&[9], SGR)
    }

    /// Clears bold (and faint).
    #[must_use]
    pub fn clear_bold() -> CsiCode {
        CsiCode::with_params(&[22], SGR)
    }

    #[must_use]
    pub fn clear_underline() -> CsiCode {
        CsiCode::with_params(&[24], SGR)
    }

    #[must_use]
    pub fn clear_invert() -> CsiCode {
        CsiCode::with_params(&[27], SGR)
    }

    #[must_use]
    pub fn clear_strikethrough() -> CsiCode {
        CsiCode::with_params(&[29], SGR)
    }

    #[must_use]
    pub fn clear_fg() -> CsiCode {
        CsiCode::with_params(&[39], SGR)
    }

    #[must_use]
    pub fn clear_bg() -> CsiCode {
        CsiCode::with_params(&[49], SGR)
    }
}

/// Meaning of a single SGR code, as far as the style model cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgrMeaning {
    Reset,
    Color(ColorLayer, Color),
    ClearColor(ColorLayer),
    Bold,
    ClearBold,
    Underline,
    ClearUnderline,
    Strikethrough,
    ClearStrikethrough,
    Invert,
    ClearInvert,
}

impl CsiCode {
    /// Interpret an SGR code. Returns `None` for non-SGR codes and SGR codes
    /// outside the supported set.
    #[must_use]
    pub fn sgr_meaning(&self) -> Option<SgrMeaning> {
        if !self.is_sgr() {
            return None;
        }
        let lead = self.leading.unwrap_or(0);
        let rest = self.trailing.as_slice();
        if !rest.is_empty() && lead != 38 && lead != 48 {
            return None;
        }
        let meaning = match lead {
            0 => SgrMeaning::Reset,
            1 => SgrMeaning::Bold,
            4 => SgrMeaning::Underline,
            7 => SgrMeaning::Invert,
            9 => SgrMeaning::Strikethrough,
            22 => SgrMeaning::ClearBold,
            24 => SgrMeaning::ClearUnderline,
            27 => SgrMeaning::ClearInvert,
            29 => SgrMeaning::ClearStrikethrough,
            39 => SgrMeaning::ClearColor(ColorLayer::Foreground),
            49 => SgrMeaning::ClearColor(ColorLayer::Background),
            30..=37 => SgrMeaning::Color(ColorLayer::Foreground, Color::from_named(lead - 30, false)?),
            90..=97 => SgrMeaning::Color(ColorLayer::Foreground, Color::from_named(lead - 90, true)?),
            40..=47 => SgrMeaning::Color(ColorLayer::Background, Color::from_named(lead - 40, false)?),
            100..=107 => {
                SgrMeaning::Color(ColorLayer::Background, Color::from_named(lead - 100, true)?)
            }
            38 | 48 => {
                let layer = if lead == 38 {
                    ColorLayer::Foreground
                } else {
                    ColorLayer::Background
                };
                let byte = |v: u32| u8::try_from(v).ok();
                let color = match rest {
                    [SGR_LOOKUP, index] => Color::Indexed(byte(*index)?),
                    [SGR_TRUECOLOR, r, g, b] => Color::Rgb(byte(*r)?, byte(*g)?, byte(*b)?),
                    _ => return None,
                };
                SgrMeaning::Color(layer, color)
            }
            _ => return None,
        };
        Some(meaning)
    }
}

// ============================================================================
// OSC
// ============================================================================

/// A decoded OSC sequence: numeric command plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OscCode {
    pub command: u32,
    pub payload: String,
}

impl OscCode {
    /// For OSC 8, split the payload into `(params, uri)`.
    #[must_use]
    pub fn hyperlink(&self) -> Option<(&str, &str)> {
        if self.command != 8 {
            return None;
        }
        self.payload.split_once(';')
    }
}

/// `OSC 8 ; params ; uri ST`
#[must_use]
pub fn hyperlink_open(uri: &str, params: &str) -> String {
    format!("{OSC}8;{params};{uri}{ST}")
}

/// `OSC 8 ; ; ST`
#[must_use]
pub fn hyperlink_close() -> String {
    format!("{OSC}8;;{ST}")
}

// ============================================================================
// Decoding
// ============================================================================

/// One decoded escape sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sequence {
    Csi(CsiCode),
    Osc(OscCode),
}

/// Cursor over raw bytes used by the decoder.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Read an unsigned decimal integer. `Ok(None)` if no digit is present.
    fn read_int(&mut self) -> Result<Option<u32>, AnsiError> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(byte) = self.peek() {
            if !byte.is_ascii_digit() {
                break;
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u32::from(byte - b'0')))
                .ok_or(AnsiError::Unrecognized { at: self.pos })?;
            self.pos += 1;
        }
        Ok((self.pos > start).then_some(value))
    }

    fn csi(&mut self) -> Result<CsiCode, AnsiError> {
        let leading = self.read_int()?;
        let mut trailing = SmallVec::new();
        while self.peek() == Some(b';') {
            self.pos += 1;
            match self.read_int()? {
                Some(value) => trailing.push(value),
                None if self.peek().is_none() => return Err(AnsiError::Incomplete),
                None => return Err(AnsiError::Unrecognized { at: self.pos }),
            }
        }
        let terminator = self.peek().ok_or(AnsiError::Incomplete)?;
        if !(0x40..=0x7E).contains(&terminator) {
            return Err(AnsiError::Unrecognized { at: self.pos });
        }
        self.pos += 1;
        Ok(CsiCode {
            leading,
            trailing,
            identifier: char::from(terminator),
        })
    }

    fn osc(&mut self) -> Result<OscCode, AnsiError> {
        let command = match self.read_int()? {
            Some(command) => command,
            None if self.peek().is_none() => return Err(AnsiError::Incomplete),
            None => return Err(AnsiError::Unrecognized { at: self.pos }),
        };
        match self.peek() {
            Some(b';') => self.pos += 1,
            Some(_) => return Err(AnsiError::Unrecognized { at: self.pos }),
            None => return Err(AnsiError::Incomplete),
        }
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(AnsiError::Incomplete),
                Some(BEL) => {
                    let payload = &self.bytes[start..self.pos];
                    self.pos += 1;
                    return Ok(Self::osc_code(command, payload));
                }
                Some(0x1b) => {
                    let payload = &self.bytes[start..self.pos];
                    match self.bytes.get(self.pos + 1) {
                        Some(b'\\') => {
                            self.pos += 2;
                            return Ok(Self::osc_code(command, payload));
                        }
                        Some(_) => return Err(AnsiError::Unrecognized { at: self.pos }),
                        None => return Err(AnsiError::Incomplete),
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn osc_code(command: u32, payload: &[u8]) -> OscCode {
        OscCode {
            command,
            payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }
}

/// Decode one escape sequence at the start of `input`.
///
/// Returns the sequence and the number of bytes it occupied.
///
/// # Errors
///
/// - [`AnsiError::NotAnEscape`] if `input` does not begin with ESC.
/// - [`AnsiError::Incomplete`] if `input` is a valid but unfinished prefix.
/// - [`AnsiError::Unrecognized`] for anything else.
pub fn decode(input: &[u8]) -> Result<(Sequence, usize), AnsiError> {
    match input.first() {
        Some(0x1b) => {}
        Some(_) | None => return Err(AnsiError::NotAnEscape),
    }
    let mut scanner = Scanner::new(input, 2);
    let sequence = match input.get(1) {
        None => return Err(AnsiError::Incomplete),
        Some(b'[') => Sequence::Csi(scanner.csi()?),
        Some(b']') => Sequence::Osc(scanner.osc()?),
        Some(_) => return Err(AnsiError::Unrecognized { at: 1 }),
    };
    Ok((sequence, scanner.pos))
}

/// Decode a complete CSI sequence (e.g. `"\x1b[38;5;9m"`).
///
/// # Errors
///
/// Fails if `input` is not exactly one CSI sequence.
pub fn decode_csi(input: &str) -> Result<CsiCode, AnsiError> {
    match decode(input.as_bytes())? {
        (Sequence::Csi(code), len) if len == input.len() => Ok(code),
        (_, len) => Err(AnsiError::Unrecognized { at: len.min(1) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_cursor_and_erase() {
        assert_eq!(cursor::up(1).encode(), "\x1b[1A");
        assert_eq!(cursor::erase_line(cursor::EraseLine::All).encode(), "\x1b[2K");
        assert_eq!(CsiCode::bare('K').encode(), "\x1b[K");
    }

    #[test]
    fn encode_colors() {
        assert_eq!(Color::Red.sgr(ColorLayer::Foreground).encode(), "\x1b[31m");
        assert_eq!(Color::BrightBlue.sgr(ColorLayer::Background).encode(), "\x1b[104m");
        assert_eq!(
            Color::Indexed(208).sgr(ColorLayer::Foreground).encode(),
            "\x1b[38;5;208m"
        );
        assert_eq!(
            Color::Rgb(1, 2, 3).sgr(ColorLayer::Background).encode(),
            "\x1b[48;2;1;2;3m"
        );
    }

    #[test]
    fn decode_compares_by_value() {
        let padded = decode_csi("\x1b[031m").unwrap();
        assert_eq!(padded, Color::Red.sgr(ColorLayer::Foreground));
    }

    #[test]
    fn decode_reports_length() {
        let (sequence, len) = decode(b"\x1b[2Kabc").unwrap();
        assert_eq!(sequence, Sequence::Csi(cursor::erase_line(cursor::EraseLine::All)));
        assert_eq!(len, 4);
    }

    #[test]
    fn decode_incomplete_prefixes() {
        assert_eq!(decode(b"\x1b"), Err(AnsiError::Incomplete));
        assert_eq!(decode(b"\x1b["), Err(AnsiError::Incomplete));
        assert_eq!(decode(b"\x1b[38;"), Err(AnsiError::Incomplete));
        assert_eq!(decode(b"\x1b]8;;http"), Err(AnsiError::Incomplete));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode(b"\x1b[\x01"), Err(AnsiError::Unrecognized { .. })));
        assert!(matches!(decode(b"\x1bZ"), Err(AnsiError::Unrecognized { .. })));
        assert!(matches!(decode(b"\x1b[1;;2m"), Err(AnsiError::Unrecognized { .. })));
        assert_eq!(decode(b"abc"), Err(AnsiError::NotAnEscape));
    }

    #[test]
    fn decode_rejects_overflowing_ints() {
        assert!(matches!(
            decode(b"\x1b[99999999999m"),
            Err(AnsiError::Unrecognized { .. })
        ));
    }

    #[test]
    fn hyperlink_round_trip() {
        let open = hyperlink_open("https://example.com", "id=1");
        let (sequence, len) = decode(open.as_bytes()).unwrap();
        assert_eq!(len, open.len());
        let Sequence::Osc(osc) = sequence else {
            panic!("expected OSC");
        };
        assert_eq!(osc.hyperlink(), Some(("id=1", "https://example.com")));

        let close = hyperlink_close();
        let (sequence, _) = decode(close.as_bytes()).unwrap();
        let Sequence::Osc(osc) = sequence else {
            panic!("expected OSC");
        };
        assert_eq!(osc.hyperlink(), Some(("", "")));
    }

    #[test]
    fn osc_accepts_bel_terminator() {
        let (sequence, len) = decode(b"\x1b]8;;x\x07rest").unwrap();
        assert_eq!(len, 7);
        assert!(matches!(sequence, Sequence::Osc(OscCode { command: 8, .. })));
    }

    #[test]
    fn sgr_meanings() {
        assert_eq!(sgr::reset().sgr_meaning(), Some(SgrMeaning::Reset));
        assert_eq!(decode_csi("\x1b[m").unwrap().sgr_meaning(), Some(SgrMeaning::Reset));
        assert_eq!(
            Color::Indexed(3).sgr(ColorLayer::Background).sgr_meaning(),
            Some(SgrMeaning::Color(ColorLayer::Background, Color::Indexed(3)))
        );
        assert_eq!(
            Color::BrightWhite.sgr(ColorLayer::Foreground).sgr_meaning(),
            Some(SgrMeaning::Color(ColorLayer::Foreground, Color::BrightWhite))
        );
        assert_eq!(sgr::clear_invert().sgr_meaning(), Some(SgrMeaning::ClearInvert));
        assert_eq!(cursor::up(1).sgr_meaning(), None);
        assert_eq!(CsiCode::with_params(&[38, 5, 300], SGR).sgr_meaning(), None);
        assert_eq!(CsiCode::with_params(&[1, 4], SGR).sgr_meaning(), None);
    }
}
