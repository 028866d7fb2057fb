#![forbid(unsafe_code)]

//! Logical keys produced by the input decoder.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A printable character key.
///
/// Two `CharKey`s are equal when their characters match case-insensitively,
/// so a handler matching `'q'` also fires for `'Q'`. The exact character
/// typed is still available through [`CharKey::char`].
#[derive(Clone, Copy)]
pub struct CharKey {
    ch: char,
}

impl CharKey {
    #[must_use]
    pub const fn new(ch: char) -> Self {
        Self { ch }
    }

    /// The character as typed, case preserved.
    #[must_use]
    pub const fn char(self) -> char {
        self.ch
    }

    fn folded(self) -> char {
        // Simple case folding; characters whose lowercase form expands to
        // several chars compare by their first one.
        self.ch.to_lowercase().next().unwrap_or(self.ch)
    }
}

impl PartialEq for CharKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded() == other.folded()
    }
}

impl Eq for CharKey {}

impl Hash for CharKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded().hash(state);
    }
}

impl fmt::Debug for CharKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharKey({:?})", self.ch)
    }
}

/// A decoded logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    Enter,
    Backspace,
    Delete,
    /// End of input (Ctrl-D).
    Eof,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Insert,
    PageUp,
    PageDown,
    Tab,
    Char(CharKey),
}

impl Key {
    /// Shorthand for `Key::Char(CharKey::new(ch))`.
    #[must_use]
    pub const fn char(ch: char) -> Self {
        Self::Char(CharKey::new(ch))
    }

    /// The typed character, if this is a character key.
    #[must_use]
    pub const fn as_char(&self) -> Option<char> {
        match self {
            Self::Char(key) => Some(key.char()),
            _ => None,
        }
    }
}

impl From<char> for Key {
    fn from(ch: char) -> Self {
        Self::char(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn char_keys_compare_case_insensitively() {
        assert_eq!(Key::char('q'), Key::char('Q'));
        assert_ne!(Key::char('q'), Key::char('w'));
    }

    #[test]
    fn case_is_recoverable() {
        assert_eq!(Key::char('Q').as_char(), Some('Q'));
        assert_eq!(Key::Enter.as_char(), None);
    }

    #[test]
    fn hashing_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(Key::char('a'));
        assert!(set.contains(&Key::char('A')));
        assert!(!set.contains(&Key::Escape));
    }
}
