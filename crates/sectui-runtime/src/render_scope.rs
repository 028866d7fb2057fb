#![forbid(unsafe_code)]

//! The surface a render function draws on.

use std::fmt;
use std::sync::Arc;

use sectui_core::ansi::{Color, ColorLayer};
use sectui_core::{ConcurrentScopedData, DataKey, Lifecycle};
use sectui_render::{Attributes, FrameBuilder, RenderError, StyleChange, TerminalCommand};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::input::{InputOptions, InputRegistry};
use crate::run_scope::RunScope;
use crate::section::SectionShared;

/// Collects one frame (or one aside) of output.
///
/// Style calls apply to the innermost [`scoped`](Self::scoped) block and
/// are undone when it closes. Only real transitions reach the terminal:
/// setting red inside red emits nothing.
///
/// Errors are not returned from individual calls. The first one is kept
/// and fails the whole render.
pub struct RenderScope<'a> {
    section: &'a Arc<SectionShared>,
    frame: FrameBuilder,
    /// Claimed by the first input drawn in this pass. `None` for asides.
    input_claim: Option<DataKey<()>>,
    width: Option<usize>,
    error: Option<RenderError>,
}

impl fmt::Debug for RenderScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("section", &self.section.id)
            .field("aside", &self.input_claim.is_none())
            .field("width", &self.width)
            .field("error", &self.error)
            .finish()
    }
}

impl<'a> RenderScope<'a> {
    pub(crate) fn for_pass(section: &'a Arc<SectionShared>, pass: &Lifecycle, width: Option<usize>) -> Self {
        Self {
            section,
            frame: FrameBuilder::new(section.core.config.clear_strategy),
            input_claim: Some(DataKey::new("input", pass)),
            width,
            error: None,
        }
    }

    pub(crate) fn for_aside(section: &'a Arc<SectionShared>, width: Option<usize>) -> Self {
        Self {
            section,
            frame: FrameBuilder::new(section.core.config.clear_strategy),
            input_claim: None,
            width,
            error: None,
        }
    }

    pub(crate) fn finish(self) -> Result<Vec<TerminalCommand>, RenderError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.frame.finish()),
        }
    }

    fn record(&mut self, err: RenderError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Shared state, for reading values the frame depends on.
    #[must_use]
    pub fn data(&self) -> &Arc<ConcurrentScopedData> {
        &self.section.core.data
    }

    /// Terminal width in columns, if bounded.
    #[must_use]
    pub fn width(&self) -> Option<usize> {
        self.width
    }

    // ── Text ───────────────────────────────────────────────────────────────

    /// Write text. Embedded SGR and OSC 8 sequences are honoured; any other
    /// escape sequence fails the render.
    pub fn text(&mut self, text: impl AsRef<str>) {
        if let Err(err) = self.frame.styled_text(text.as_ref()) {
            self.record(err);
        }
    }

    /// Write text followed by a newline.
    pub fn textln(&mut self, text: impl AsRef<str>) {
        self.text(text);
        self.frame.newline();
    }

    pub fn newline(&mut self) {
        self.frame.newline();
    }

    // ── Style ──────────────────────────────────────────────────────────────

    pub fn style(&mut self, change: StyleChange) {
        self.frame.style(change);
    }

    pub fn fg(&mut self, color: Color) {
        self.style(StyleChange::Color(ColorLayer::Foreground, color));
    }

    pub fn bg(&mut self, color: Color) {
        self.style(StyleChange::Color(ColorLayer::Background, color));
    }

    pub fn clear_fg(&mut self) {
        self.style(StyleChange::ClearColor(ColorLayer::Foreground));
    }

    pub fn clear_bg(&mut self) {
        self.style(StyleChange::ClearColor(ColorLayer::Background));
    }

    pub fn bold(&mut self) {
        self.style(StyleChange::Set(Attributes::BOLD));
    }

    pub fn underline(&mut self) {
        self.style(StyleChange::Set(Attributes::UNDERLINE));
    }

    pub fn strikethrough(&mut self) {
        self.style(StyleChange::Set(Attributes::STRIKETHROUGH));
    }

    pub fn invert(&mut self) {
        self.style(StyleChange::Set(Attributes::INVERT));
    }

    /// Clear every channel in the current scope.
    pub fn reset(&mut self) {
        self.style(StyleChange::Reset);
    }

    /// Run `f` in a nested style scope.
    pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.frame.push_scope();
        let result = f(self);
        self.frame.pop_scope();
        result
    }

    /// Run `f` in a nested scope with `change` applied.
    pub fn styled<R>(&mut self, change: StyleChange, f: impl FnOnce(&mut Self) -> R) -> R {
        self.scoped(|scope| {
            scope.style(change);
            f(scope)
        })
    }

    /// Wrap what `f` writes in an OSC 8 hyperlink to `url`.
    pub fn link<R>(&mut self, url: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.frame.link_open(url);
        let result = f(self);
        self.frame.link_close();
        result
    }

    // ── Input ──────────────────────────────────────────────────────────────

    /// Draw an editable input and make it receive keys.
    ///
    /// Edit state is kept per [`InputOptions::id`] for the life of the
    /// section. Only one input may be drawn per render pass; a second one
    /// fails the render with [`RenderError::MultipleInputs`].
    pub fn input(&mut self, options: InputOptions) {
        let Some(claim) = self.input_claim.clone() else {
            warn!(input = %options.id, "input ignored in aside");
            return;
        };
        let section = self.section;
        let data = &section.core.data;
        if !data.try_put(&claim, || (), None) {
            self.record(RenderError::MultipleInputs);
            return;
        }
        let Some(active) = data.put_if_absent(&section.inputs, InputRegistry::default, None, |registry| {
            registry.activate(options)
        }) else {
            return;
        };

        let run = section.current_run.lock().clone();
        if let Some(run) = run {
            RunScope::from_shared(run).ensure_input_pump();
        }

        let state = &active.state;
        let completion = if state.cursor() == state.text().len() {
            active.completer.as_ref().and_then(|c| c.complete(state.text()))
        } else {
            None
        };
        self.draw_input(state.text(), state.cursor(), completion.as_deref());
    }

    fn draw_input(&mut self, text: &str, cursor: usize, completion: Option<&str>) {
        let (before, after) = text.split_at(cursor);
        let mut rest = after.graphemes(true);
        let under = rest.next();
        self.frame.text(before);

        match (under, completion) {
            (Some("\n"), _) => {
                self.cursor_cell(" ", None);
                self.frame.newline();
            }
            (Some(cell), _) => self.cursor_cell(cell, None),
            (None, Some(suffix)) if !suffix.is_empty() => {
                let mut hint = suffix.graphemes(true);
                let first = hint.next().unwrap_or(" ");
                self.cursor_cell(first, Some(Color::BrightBlack));
                let remaining = hint.as_str();
                self.frame.scoped(|frame| {
                    frame.style(StyleChange::Color(ColorLayer::Foreground, Color::BrightBlack));
                    frame.text(remaining);
                });
            }
            (None, _) => self.cursor_cell(" ", None),
        }
        self.frame.text(rest.as_str());
    }

    fn cursor_cell(&mut self, cell: &str, color: Option<Color>) {
        self.frame.scoped(|frame| {
            frame.style(StyleChange::Set(Attributes::INVERT));
            if let Some(color) = color {
                frame.style(StyleChange::Color(ColorLayer::Foreground, color));
            }
            frame.text(cell);
        });
    }
}
