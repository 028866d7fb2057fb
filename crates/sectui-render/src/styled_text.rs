#![forbid(unsafe_code)]

//! Splitting text that carries embedded escape sequences.
//!
//! Text handed to the renderer may already contain ANSI codes (output of
//! another program, pre-colored strings). Those codes must flow through the
//! style differ like any other style call, otherwise the differ's idea of
//! the terminal state would drift from reality. [`scan`] splits such text
//! into plain runs, style changes, and hyperlink boundaries.
//!
//! Only SGR codes the style model understands and OSC 8 hyperlinks are
//! accepted. Any other sequence is an error: emitting it blindly could move
//! the cursor and break the line accounting used to erase the frame.

use smallvec::SmallVec;

use sectui_core::ansi::{self, CsiCode, SGR, SGR_LOOKUP, SGR_TRUECOLOR, Sequence};

use crate::error::RenderError;
use crate::style::StyleChange;

/// One piece of scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPiece<'a> {
    Text(&'a str),
    Style(StyleChange),
    /// Hyperlink open (`Some(uri)`) or close (`None`).
    Link(Option<String>),
}

/// Split `text` at its escape sequences.
///
/// # Errors
///
/// [`RenderError::UnrecognizedEscape`] for malformed sequences, non-SGR CSI
/// codes, unsupported SGR parameters, and OSC commands other than 8.
pub fn scan(text: &str) -> Result<Vec<TextPiece<'_>>, RenderError> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(ansi::ESC) {
        if pos > 0 {
            pieces.push(TextPiece::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];
        let unrecognized = || RenderError::UnrecognizedEscape {
            sequence: tail.chars().take(16).collect(),
        };
        let (sequence, len) = ansi::decode(tail.as_bytes()).map_err(|_| unrecognized())?;
        match sequence {
            Sequence::Csi(code) => {
                let changes = split_sgr(&code).ok_or_else(unrecognized)?;
                pieces.extend(changes.into_iter().map(TextPiece::Style));
            }
            Sequence::Osc(osc) => {
                let (_, uri) = osc.hyperlink().ok_or_else(unrecognized)?;
                let link = (!uri.is_empty()).then(|| uri.to_owned());
                pieces.push(TextPiece::Link(link));
            }
        }
        rest = tail.get(len..).ok_or_else(unrecognized)?;
    }
    if !rest.is_empty() {
        pieces.push(TextPiece::Text(rest));
    }
    Ok(pieces)
}

/// Break a possibly compound SGR code (`CSI 1;31 m`) into single changes.
fn split_sgr(code: &CsiCode) -> Option<SmallVec<[StyleChange; 4]>> {
    if !code.is_sgr() {
        return None;
    }
    let Some(leading) = code.leading() else {
        // `CSI m` is a reset.
        let mut changes = SmallVec::new();
        changes.push(StyleChange::Reset);
        return Some(changes);
    };
    let params: SmallVec<[u32; 8]> = std::iter::once(leading)
        .chain(code.trailing().iter().copied())
        .collect();

    let mut changes = SmallVec::new();
    let mut i = 0;
    while i < params.len() {
        let take = match params[i] {
            38 | 48 => match params.get(i + 1) {
                Some(&SGR_LOOKUP) => 3,
                Some(&SGR_TRUECOLOR) => 5,
                _ => return None,
            },
            _ => 1,
        };
        let part = params.get(i..i + take)?;
        changes.push(StyleChange::from_sgr(&CsiCode::with_params(part, SGR))?);
        i += take;
    }
    Some(changes)
}
