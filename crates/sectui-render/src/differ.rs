#![forbid(unsafe_code)]

//! Minimal style emission across nested scopes.
//!
//! # Model
//!
//! The differ keeps a stack of *deferred* states, one per open scope. Pushing
//! a scope copies the parent's resolved state, so lookups never walk the
//! chain. Style calls mutate the top of the stack only.
//!
//! A single *applied* state records what the terminal currently shows.
//! Nothing is emitted when a style call is made; instead, right before text
//! is written, [`StyleDiffer::sync`] compares the top deferred state with the
//! applied one channel by channel and emits a code only for channels whose
//! resolved value differs. Setting red inside red therefore emits red once,
//! and a scope that sets a style but writes no text emits nothing at all.
//!
//! # Clear strategies
//!
//! [`ClearStrategy::Scalpel`] clears a single channel with its dedicated
//! code (`CSI 39 m`, `CSI 22 m`, ...). Some terminals mishandle those, so
//! [`ClearStrategy::ResetAndReplay`] instead emits `CSI 0 m` whenever any
//! channel must be cleared and then replays every channel that should stay
//! set.

use smallvec::SmallVec;
use tracing::trace;

use sectui_core::ansi::sgr;

use crate::command::TerminalCommand;
use crate::style::{Channel, StyleChange, StyleState};

/// How a channel returning to its default is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClearStrategy {
    /// Per-channel clear codes.
    #[default]
    Scalpel,
    /// Full reset, then replay of still-applied channels.
    ResetAndReplay,
}

/// Nested-scope style state machine.
#[derive(Debug, Clone)]
pub struct StyleDiffer {
    scopes: SmallVec<[StyleState; 8]>,
    applied: StyleState,
    strategy: ClearStrategy,
    emitted: usize,
}

impl Default for StyleDiffer {
    fn default() -> Self {
        Self::new(ClearStrategy::default())
    }
}

impl StyleDiffer {
    #[must_use]
    pub fn new(strategy: ClearStrategy) -> Self {
        let mut scopes = SmallVec::new();
        scopes.push(StyleState::default());
        Self {
            scopes,
            applied: StyleState::default(),
            strategy,
            emitted: 0,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> ClearStrategy {
        self.strategy
    }

    /// Open a nested scope inheriting the current resolved state.
    pub fn push_scope(&mut self) {
        let inherited = self.resolved();
        self.scopes.push(inherited);
    }

    /// Close the innermost scope. The base scope is never popped; returns
    /// `false` if there was nothing to close.
    pub fn pop_scope(&mut self) -> bool {
        if self.scopes.len() <= 1 {
            trace!("pop_scope on base scope ignored");
            return false;
        }
        self.scopes.pop();
        true
    }

    /// Number of open scopes, counting the base scope.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Record a style change in the innermost scope. Emits nothing yet.
    pub fn change(&mut self, change: StyleChange) {
        if let Some(top) = self.scopes.last_mut() {
            top.apply(change);
        }
    }

    /// What the innermost scope currently wants.
    #[must_use]
    pub fn resolved(&self) -> StyleState {
        self.scopes.last().copied().unwrap_or_default()
    }

    /// What the terminal currently shows.
    #[must_use]
    pub fn applied(&self) -> StyleState {
        self.applied
    }

    /// Total style codes emitted so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Emit whatever brings the terminal in line with the innermost scope.
    /// Returns the number of codes pushed onto `out`.
    pub fn sync(&mut self, out: &mut Vec<TerminalCommand>) -> usize {
        let target = self.resolved();
        self.transition_to(target, out)
    }

    /// Return the terminal to the unstyled state, e.g. at the end of a frame.
    pub fn finish(&mut self, out: &mut Vec<TerminalCommand>) -> usize {
        self.transition_to(StyleState::default(), out)
    }

    fn transition_to(&mut self, target: StyleState, out: &mut Vec<TerminalCommand>) -> usize {
        if target == self.applied {
            return 0;
        }
        let before = out.len();
        let needs_clear = Channel::ALL
            .iter()
            .any(|&ch| self.applied.is_set(ch) && !target.is_set(ch));

        if self.strategy == ClearStrategy::ResetAndReplay && needs_clear {
            out.push(TerminalCommand::Sgr(sgr::reset()));
            for ch in Channel::ALL {
                if target.is_set(ch) {
                    out.push(TerminalCommand::Sgr(target.code_for(ch)));
                }
            }
        } else {
            for ch in Channel::ALL {
                if target.differs(&self.applied, ch) {
                    out.push(TerminalCommand::Sgr(target.code_for(ch)));
                }
            }
        }

        self.applied = target;
        let pushed = out.len() - before;
        self.emitted += pushed;
        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Attributes;
    use sectui_core::ansi::{Color, ColorLayer};

    fn red() -> StyleChange {
        StyleChange::Color(ColorLayer::Foreground, Color::Red)
    }

    fn sgr_count(out: &[TerminalCommand]) -> usize {
        out.iter()
            .filter(|c| matches!(c, TerminalCommand::Sgr(_)))
            .count()
    }

    #[test]
    fn nested_same_color_emits_once() {
        let mut differ = StyleDiffer::default();
        let mut out = Vec::new();
        differ.push_scope();
        differ.change(red());
        differ.push_scope();
        differ.change(red());
        differ.sync(&mut out);
        differ.pop_scope();
        differ.sync(&mut out);
        differ.pop_scope();
        differ.finish(&mut out);

        let red_code = Color::Red.sgr(ColorLayer::Foreground);
        let reds = out
            .iter()
            .filter(|c| **c == TerminalCommand::Sgr(red_code.clone()))
            .count();
        assert_eq!(reds, 1);
        assert_eq!(out.last(), Some(&TerminalCommand::Sgr(sgr::clear_fg())));
    }

    #[test]
    fn unused_scope_emits_nothing() {
        let mut differ = StyleDiffer::default();
        let mut out = Vec::new();
        differ.push_scope();
        differ.change(StyleChange::Set(Attributes::BOLD));
        differ.pop_scope();
        differ.sync(&mut out);
        differ.finish(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn scalpel_clears_single_channel() {
        let mut differ = StyleDiffer::default();
        let mut out = Vec::new();
        differ.change(red());
        differ.change(StyleChange::Set(Attributes::UNDERLINE));
        differ.sync(&mut out);
        out.clear();

        differ.change(StyleChange::Clear(Attributes::UNDERLINE));
        differ.sync(&mut out);
        assert_eq!(out, vec![TerminalCommand::Sgr(sgr::clear_underline())]);
    }

    #[test]
    fn reset_and_replay_keeps_remaining_channels() {
        let mut differ = StyleDiffer::new(ClearStrategy::ResetAndReplay);
        let mut out = Vec::new();
        differ.change(red());
        differ.change(StyleChange::Set(Attributes::BOLD));
        differ.sync(&mut out);
        out.clear();

        differ.change(StyleChange::Clear(Attributes::BOLD));
        differ.sync(&mut out);
        assert_eq!(
            out,
            vec![
                TerminalCommand::Sgr(sgr::reset()),
                TerminalCommand::Sgr(Color::Red.sgr(ColorLayer::Foreground)),
            ]
        );
    }

    #[test]
    fn reset_and_replay_sets_without_reset() {
        let mut differ = StyleDiffer::new(ClearStrategy::ResetAndReplay);
        let mut out = Vec::new();
        differ.change(red());
        differ.sync(&mut out);
        assert_eq!(out, vec![TerminalCommand::Sgr(Color::Red.sgr(ColorLayer::Foreground))]);
    }

    #[test]
    fn base_scope_survives_extra_pops() {
        let mut differ = StyleDiffer::default();
        assert!(!differ.pop_scope());
        differ.push_scope();
        assert!(differ.pop_scope());
        assert_eq!(differ.depth(), 1);
    }

    #[test]
    fn emitted_counts_codes() {
        let mut differ = StyleDiffer::default();
        let mut out = Vec::new();
        differ.change(red());
        differ.change(StyleChange::Color(ColorLayer::Background, Color::Blue));
        differ.sync(&mut out);
        differ.finish(&mut out);
        assert_eq!(differ.emitted(), 4);
        assert_eq!(sgr_count(&out), 4);
    }
}
