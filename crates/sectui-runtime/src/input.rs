#![forbid(unsafe_code)]

//! Line editing driven by decoded keys.
//!
//! [`LineEditState`] is the text buffer and cursor behind an input widget.
//! It is a pure state machine: [`LineEditState::handle_key`] turns one
//! [`Key`] into a cursor move, a proposed text change, or a submission.
//!
//! # Change interception
//!
//! Every proposed text change is first offered to a hook as an
//! [`InputChange`]. The hook may rewrite the proposed text or reject it; a
//! rejected change leaves text and cursor exactly as they were.
//!
//! # Cursor
//!
//! The cursor is a byte offset that always sits on a grapheme boundary, so
//! Left/Right/Backspace/Delete step over whole user-perceived characters.
//!
//! # Multiline
//!
//! In multiline mode Enter inserts a newline and submission needs
//! [`Key::Eof`]. Up/Down move to the same column on the adjacent line,
//! clamped to its length; the column the user started from is remembered
//! across consecutive vertical moves so passing a short line does not lose
//! it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sectui_core::Key;
use unicode_segmentation::UnicodeSegmentation;

/// Supplies autocompletion suggestions for an input.
pub trait Completer: Send + Sync {
    /// The text to append to `input`, if any completion applies.
    fn complete(&self, input: &str) -> Option<String>;
}

impl<F> Completer for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn complete(&self, input: &str) -> Option<String> {
        self(input)
    }
}

/// Completes from a fixed list of candidates by case-insensitive prefix.
#[derive(Debug, Clone, Default)]
pub struct PrefixCompleter {
    candidates: Vec<String>,
}

impl PrefixCompleter {
    #[must_use]
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

impl Completer for PrefixCompleter {
    fn complete(&self, input: &str) -> Option<String> {
        if input.is_empty() {
            return None;
        }
        let lowered = input.to_lowercase();
        self.candidates.iter().find_map(|candidate| {
            let rest = candidate.get(input.len()..)?;
            (candidate.len() > input.len() && candidate[..input.len()].to_lowercase() == lowered)
                .then(|| rest.to_owned())
        })
    }
}

/// Options for one input widget.
#[derive(Clone, Default)]
pub struct InputOptions {
    /// Distinguishes inputs across renders. State is kept per id.
    pub id: String,
    /// Text the input starts with when first shown.
    pub initial_text: String,
    pub multiline: bool,
    pub completer: Option<Arc<dyn Completer>>,
}

impl fmt::Debug for InputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputOptions")
            .field("id", &self.id)
            .field("initial_text", &self.initial_text)
            .field("multiline", &self.multiline)
            .field("completer", &self.completer.is_some())
            .finish()
    }
}

impl InputOptions {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn initial_text(mut self, text: impl Into<String>) -> Self {
        self.initial_text = text.into();
        self
    }

    #[must_use]
    pub fn multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    #[must_use]
    pub fn completer(mut self, completer: impl Completer + 'static) -> Self {
        self.completer = Some(Arc::new(completer));
        self
    }
}

/// A proposed text change, offered to the change hook before it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputChange {
    id: String,
    previous: String,
    input: String,
    rejected: bool,
}

impl InputChange {
    #[must_use]
    pub fn new(id: impl Into<String>, previous: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            previous: previous.into(),
            input: input.into(),
            rejected: false,
        }
    }

    /// Id of the input being edited.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Text before the change.
    #[must_use]
    pub fn previous(&self) -> &str {
        &self.previous
    }

    /// Text the change would produce.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the proposed text.
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Keep the previous text and cursor.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }
}

/// A submitted input, offered to the submit hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEntered {
    id: String,
    input: String,
    clear: bool,
}

impl InputEntered {
    #[must_use]
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            clear: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The submitted text.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Empty the input once the hook returns.
    pub fn clear_input(&mut self) {
        self.clear = true;
    }

    #[must_use]
    pub fn clears_input(&self) -> bool {
        self.clear
    }
}

/// What a key did to a [`LineEditState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The key means nothing here.
    Ignored,
    /// Only the cursor moved.
    Moved,
    /// The text changed.
    Changed,
    /// A change was proposed and the hook rejected it.
    Rejected,
    /// The user submitted this text.
    Submitted(String),
}

/// Text buffer and cursor of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEditState {
    text: String,
    cursor: usize,
    multiline: bool,
    ideal_column: Option<usize>,
}

impl LineEditState {
    /// A state holding `text` with the cursor at the end.
    #[must_use]
    pub fn new(text: impl Into<String>, multiline: bool) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self {
            text,
            cursor,
            multiline,
            ideal_column: None,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor as a byte offset into [`text`](Self::text).
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn is_multiline(&self) -> bool {
        self.multiline
    }

    /// Replace the text and move the cursor to its end.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.len();
        self.ideal_column = None;
    }

    /// Apply `key`.
    ///
    /// `completer` is consulted when Right is pressed at the end of the
    /// text. `on_change` sees every proposed text change first.
    pub fn handle_key(
        &mut self,
        id: &str,
        key: Key,
        completer: Option<&dyn Completer>,
        on_change: &mut dyn FnMut(&mut InputChange),
    ) -> KeyOutcome {
        let vertical = matches!(key, Key::Up | Key::Down);
        if !vertical {
            self.ideal_column = None;
        }
        match key {
            Key::Left => self.move_to(self.prev_boundary(self.cursor)),
            Key::Right if self.cursor < self.text.len() => self.move_to(self.next_boundary(self.cursor)),
            Key::Right => {
                let suffix = completer
                    .and_then(|c| c.complete(&self.text))
                    .filter(|s| !s.is_empty());
                match suffix {
                    Some(suffix) => {
                        let proposed = format!("{}{suffix}", self.text);
                        let cursor = proposed.len();
                        self.propose(id, proposed, cursor, on_change)
                    }
                    None => KeyOutcome::Ignored,
                }
            }
            Key::Home => self.move_to(self.line_start(self.cursor)),
            Key::End => self.move_to(self.line_end(self.cursor)),
            Key::Up | Key::Down if self.multiline => self.move_vertically(key == Key::Up),
            Key::Backspace if self.cursor > 0 => {
                let start = self.prev_boundary(self.cursor);
                let mut proposed = self.text.clone();
                proposed.replace_range(start..self.cursor, "");
                self.propose(id, proposed, start, on_change)
            }
            Key::Delete if self.cursor < self.text.len() => {
                let end = self.next_boundary(self.cursor);
                let mut proposed = self.text.clone();
                proposed.replace_range(self.cursor..end, "");
                self.propose(id, proposed, self.cursor, on_change)
            }
            Key::Enter if self.multiline => self.insert(id, '\n', on_change),
            Key::Enter => KeyOutcome::Submitted(self.text.clone()),
            Key::Eof if self.multiline => KeyOutcome::Submitted(self.text.clone()),
            Key::Char(ch) => self.insert(id, ch.char(), on_change),
            _ => KeyOutcome::Ignored,
        }
    }

    fn insert(&mut self, id: &str, ch: char, on_change: &mut dyn FnMut(&mut InputChange)) -> KeyOutcome {
        let mut proposed = self.text.clone();
        proposed.insert(self.cursor, ch);
        let cursor = self.cursor + ch.len_utf8();
        self.propose(id, proposed, cursor, on_change)
    }

    fn propose(
        &mut self,
        id: &str,
        proposed: String,
        cursor: usize,
        on_change: &mut dyn FnMut(&mut InputChange),
    ) -> KeyOutcome {
        let proposed_len = proposed.len();
        let mut change = InputChange::new(id, self.text.clone(), proposed);
        on_change(&mut change);
        if change.rejected {
            return KeyOutcome::Rejected;
        }
        let text = change.input;
        // A rewritten proposal shifts the cursor by however much the hook
        // grew or shrank the text.
        let cursor = if text.len() == proposed_len {
            cursor
        } else {
            (cursor + text.len()).saturating_sub(proposed_len)
        };
        self.cursor = floor_boundary(&text, cursor.min(text.len()));
        self.text = text;
        KeyOutcome::Changed
    }

    fn move_to(&mut self, cursor: usize) -> KeyOutcome {
        if cursor == self.cursor {
            return KeyOutcome::Ignored;
        }
        self.cursor = cursor;
        KeyOutcome::Moved
    }

    fn move_vertically(&mut self, up: bool) -> KeyOutcome {
        let start = self.line_start(self.cursor);
        let column = self.text[start..self.cursor].graphemes(true).count();
        let target_column = *self.ideal_column.get_or_insert(column);

        let target_start = if up {
            if start == 0 {
                return KeyOutcome::Ignored;
            }
            self.line_start(start - 1)
        } else {
            let end = self.line_end(self.cursor);
            if end == self.text.len() {
                return KeyOutcome::Ignored;
            }
            end + 1
        };
        let target_end = self.line_end(target_start);
        let offset = self.text[target_start..target_end]
            .grapheme_indices(true)
            .nth(target_column)
            .map_or(target_end, |(i, _)| target_start + i);
        self.cursor = offset;
        KeyOutcome::Moved
    }

    fn prev_boundary(&self, at: usize) -> usize {
        self.text[..at]
            .grapheme_indices(true)
            .next_back()
            .map_or(0, |(i, _)| i)
    }

    fn next_boundary(&self, at: usize) -> usize {
        self.text[at..]
            .graphemes(true)
            .next()
            .map_or(at, |g| at + g.len())
    }

    fn line_start(&self, at: usize) -> usize {
        if !self.multiline {
            return 0;
        }
        self.text[..at].rfind('\n').map_or(0, |i| i + 1)
    }

    fn line_end(&self, at: usize) -> usize {
        if !self.multiline {
            return self.text.len();
        }
        self.text[at..].find('\n').map_or(self.text.len(), |i| at + i)
    }
}

// ── Registry ───────────────────────────────────────────────────────────────

struct InputSlot {
    state: LineEditState,
    completer: Option<Arc<dyn Completer>>,
}

/// Edit state of every input a section has shown, plus which one is live.
///
/// Stored under the section lifecycle so edits survive rerenders. Each
/// render pass deactivates the registry first; only an input drawn by that
/// pass receives keys.
#[derive(Default)]
pub(crate) struct InputRegistry {
    slots: HashMap<String, InputSlot>,
    active: Option<String>,
}

/// What the key router needs from the live input.
pub(crate) struct ActiveInput {
    pub(crate) id: String,
    pub(crate) state: LineEditState,
    pub(crate) completer: Option<Arc<dyn Completer>>,
}

impl InputRegistry {
    pub(crate) fn deactivate(&mut self) {
        self.active = None;
    }

    /// Make `options.id` the live input, creating its state on first use.
    pub(crate) fn activate(&mut self, options: InputOptions) -> ActiveInput {
        let InputOptions {
            id,
            initial_text,
            multiline,
            completer,
        } = options;
        let slot = self.slots.entry(id.clone()).or_insert_with(|| InputSlot {
            state: LineEditState::new(initial_text, multiline),
            completer: None,
        });
        slot.completer = completer;
        let active = ActiveInput {
            id: id.clone(),
            state: slot.state.clone(),
            completer: slot.completer.clone(),
        };
        self.active = Some(id);
        active
    }

    pub(crate) fn active(&self) -> Option<ActiveInput> {
        let id = self.active.as_ref()?;
        let slot = self.slots.get(id)?;
        Some(ActiveInput {
            id: id.clone(),
            state: slot.state.clone(),
            completer: slot.completer.clone(),
        })
    }

    pub(crate) fn commit(&mut self, id: &str, state: LineEditState) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.state = state;
        }
    }

    pub(crate) fn clear(&mut self, id: &str) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.state.set_text("");
        }
    }
}

fn floor_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
