#![forbid(unsafe_code)]

//! Resolved style state for the six style channels.

use bitflags::bitflags;
use sectui_core::ansi::{Color, ColorLayer, CsiCode, SgrMeaning, sgr};

bitflags! {
    /// On/off text decorations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attributes: u8 {
        const BOLD = 1 << 0;
        const UNDERLINE = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const INVERT = 1 << 3;
    }
}

impl Attributes {
    /// Every decoration, in emission order.
    pub const ORDERED: [Attributes; 4] = [
        Attributes::BOLD,
        Attributes::UNDERLINE,
        Attributes::STRIKETHROUGH,
        Attributes::INVERT,
    ];

    pub(crate) fn set_code(self) -> CsiCode {
        if self == Self::BOLD {
            sgr::bold()
        } else if self == Self::UNDERLINE {
            sgr::underline()
        } else if self == Self::STRIKETHROUGH {
            sgr::strikethrough()
        } else {
            sgr::invert()
        }
    }

    pub(crate) fn clear_code(self) -> CsiCode {
        if self == Self::BOLD {
            sgr::clear_bold()
        } else if self == Self::UNDERLINE {
            sgr::clear_underline()
        } else if self == Self::STRIKETHROUGH {
            sgr::clear_strikethrough()
        } else {
            sgr::clear_invert()
        }
    }
}

/// One style channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Foreground,
    Background,
    Bold,
    Underline,
    Strikethrough,
    Invert,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Foreground,
        Channel::Background,
        Channel::Bold,
        Channel::Underline,
        Channel::Strikethrough,
        Channel::Invert,
    ];

    fn attribute(self) -> Option<Attributes> {
        match self {
            Self::Bold => Some(Attributes::BOLD),
            Self::Underline => Some(Attributes::UNDERLINE),
            Self::Strikethrough => Some(Attributes::STRIKETHROUGH),
            Self::Invert => Some(Attributes::INVERT),
            Self::Foreground | Self::Background => None,
        }
    }
}

/// A change to one channel requested by a style call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleChange {
    Color(ColorLayer, Color),
    ClearColor(ColorLayer),
    Set(Attributes),
    Clear(Attributes),
    /// Clear every channel.
    Reset,
}

impl StyleChange {
    /// The style change an SGR code stands for, if supported.
    #[must_use]
    pub fn from_sgr(code: &CsiCode) -> Option<Self> {
        Some(match code.sgr_meaning()? {
            SgrMeaning::Reset => Self::Reset,
            SgrMeaning::Color(layer, color) => Self::Color(layer, color),
            SgrMeaning::ClearColor(layer) => Self::ClearColor(layer),
            SgrMeaning::Bold => Self::Set(Attributes::BOLD),
            SgrMeaning::ClearBold => Self::Clear(Attributes::BOLD),
            SgrMeaning::Underline => Self::Set(Attributes::UNDERLINE),
            SgrMeaning::ClearUnderline => Self::Clear(Attributes::UNDERLINE),
            SgrMeaning::Strikethrough => Self::Set(Attributes::STRIKETHROUGH),
            SgrMeaning::ClearStrikethrough => Self::Clear(Attributes::STRIKETHROUGH),
            SgrMeaning::Invert => Self::Set(Attributes::INVERT),
            SgrMeaning::ClearInvert => Self::Clear(Attributes::INVERT),
        })
    }
}

/// The resolved value of every channel. `Default` is the terminal's
/// unstyled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StyleState {
    pub fg: Option<Color>,
    pub bg: Option<Color>,
    pub attrs: Attributes,
}

impl StyleState {
    /// Apply a change in place.
    pub fn apply(&mut self, change: StyleChange) {
        match change {
            StyleChange::Color(ColorLayer::Foreground, color) => self.fg = Some(color),
            StyleChange::Color(ColorLayer::Background, color) => self.bg = Some(color),
            StyleChange::ClearColor(ColorLayer::Foreground) => self.fg = None,
            StyleChange::ClearColor(ColorLayer::Background) => self.bg = None,
            StyleChange::Set(attrs) => self.attrs.insert(attrs),
            StyleChange::Clear(attrs) => self.attrs.remove(attrs),
            StyleChange::Reset => *self = Self::default(),
        }
    }

    /// Whether `channel` differs between `self` and `other`.
    #[must_use]
    pub fn differs(&self, other: &Self, channel: Channel) -> bool {
        match channel {
            Channel::Foreground => self.fg != other.fg,
            Channel::Background => self.bg != other.bg,
            _ => channel
                .attribute()
                .is_some_and(|attr| self.attrs.contains(attr) != other.attrs.contains(attr)),
        }
    }

    /// Whether `channel` holds a non-default value.
    #[must_use]
    pub fn is_set(&self, channel: Channel) -> bool {
        self.differs(&Self::default(), channel)
    }

    /// The code that sets `channel` to this state's value, or clears it if
    /// unset.
    #[must_use]
    pub fn code_for(&self, channel: Channel) -> CsiCode {
        match channel {
            Channel::Foreground => self
                .fg
                .map_or_else(sgr::clear_fg, |c| c.sgr(ColorLayer::Foreground)),
            Channel::Background => self
                .bg
                .map_or_else(sgr::clear_bg, |c| c.sgr(ColorLayer::Background)),
            _ => match channel.attribute() {
                Some(attr) if self.attrs.contains(attr) => attr.set_code(),
                Some(attr) => attr.clear_code(),
                None => sgr::reset(),
            },
        }
    }
}
