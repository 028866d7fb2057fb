#![forbid(unsafe_code)]

//! The execution context handed to a run body.
//!
//! A [`RunScope`] lives exactly as long as one [`Section::run`] call. It
//! offers:
//!
//! - a one-shot completion signal ([`signal`](RunScope::signal) /
//!   [`wait_for_signal`](RunScope::wait_for_signal)) for "run until" loops;
//! - [`abort`](RunScope::abort), which releases the caller of
//!   [`Section::run`] at once and wakes every cooperative wait;
//! - exclusive key and input callbacks, whose listener threads are cancelled
//!   when the run lifecycle stops;
//! - [`aside`](RunScope::aside) output written above the section.
//!
//! # Suspension
//!
//! The body runs holding the store's exclusive lock, so renders, input
//! routing, and key handlers that touch shared values wait for it. The lock
//! is released only at suspension points: [`wait_for_signal`],
//! [`wait_for_signal_timeout`], [`sleep`], [`suspend`], and return. Updates
//! made between two suspension points therefore land in one frame.
//!
//! After an abort the body keeps running on its own thread but without the
//! lock, and it no longer redraws the session's sections.
//!
//! [`Section::run`]: crate::Section::run
//! [`wait_for_signal`]: RunScope::wait_for_signal
//! [`wait_for_signal_timeout`]: RunScope::wait_for_signal_timeout
//! [`sleep`]: RunScope::sleep
//! [`suspend`]: RunScope::suspend

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use sectui_core::{ConcurrentScopedData, DataKey, Key, KeySubscription, Lifecycle};
use sectui_render::RenderError;
use tracing::{debug, trace, warn};
use web_time::Instant;

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::error::{BoxError, SectionError};
use crate::input::{ActiveInput, InputChange, InputEntered, InputRegistry, KeyOutcome};
use crate::render_scope::RenderScope;
use crate::section::{RunBody, SectionShared};

type InputChangedHook = Arc<dyn Fn(&mut InputChange) + Send + Sync>;
type InputEnteredHook = Arc<dyn Fn(&mut InputEntered) + Send + Sync>;

thread_local! {
    static BODY_OF_SECTION: Cell<Option<u64>> = const { Cell::new(None) };
}

/// The section whose run body is executing on this thread, if any.
pub(crate) fn body_section() -> Option<u64> {
    BODY_OF_SECTION.with(Cell::get)
}

pub(crate) enum BodyOutcome {
    Finished(Result<(), BoxError>),
    Panicked(Box<dyn Any + Send>),
    Aborted,
}

#[derive(Default)]
struct RunState {
    signalled: bool,
    aborted: bool,
    outcome: Option<BodyOutcome>,
}

pub(crate) struct RunShared {
    section: Arc<SectionShared>,
    lifecycle: Lifecycle,
    state: Mutex<RunState>,
    changed: Condvar,
    key_listener: DataKey<CancellationSource>,
    input_pump: DataKey<CancellationSource>,
    input_changed: DataKey<InputChangedHook>,
    input_entered: DataKey<InputEnteredHook>,
}

impl RunShared {
    pub(crate) fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            state.aborted = true;
            debug!(section = self.section.id, "run aborted");
        }
        self.changed.notify_all();
    }

    fn complete(&self, outcome: BodyOutcome) {
        self.state.lock().outcome = Some(outcome);
        self.changed.notify_all();
    }

    fn wait_outcome(&self) -> BodyOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome.take() {
                return outcome;
            }
            if state.aborted {
                return BodyOutcome::Aborted;
            }
            self.changed.wait(&mut state);
        }
    }
}

/// Handle to the current run. Cheap to clone.
#[derive(Clone)]
pub struct RunScope {
    shared: Arc<RunShared>,
}

impl fmt::Debug for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("RunScope")
            .field("section", &self.shared.section.id)
            .field("signalled", &state.signalled)
            .field("aborted", &state.aborted)
            .finish()
    }
}

impl RunScope {
    pub(crate) fn new(section: Arc<SectionShared>, lifecycle: Lifecycle) -> Self {
        Self {
            shared: Arc::new(RunShared {
                key_listener: DataKey::new("on_key_pressed", &lifecycle),
                input_pump: DataKey::new("input_pump", &lifecycle),
                input_changed: DataKey::new("on_input_changed", &lifecycle),
                input_entered: DataKey::new("on_input_entered", &lifecycle),
                section,
                lifecycle,
                state: Mutex::new(RunState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<RunShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> Arc<RunShared> {
        Arc::clone(&self.shared)
    }

    fn section(&self) -> &Arc<SectionShared> {
        &self.shared.section
    }

    /// Run `body` on its own thread and wait for it or for an abort.
    pub(crate) fn execute(&self, body: RunBody) -> io::Result<BodyOutcome> {
        let scope = self.clone();
        thread::Builder::new().name("sectui-run".into()).spawn(move || {
            BODY_OF_SECTION.with(|section| section.set(Some(scope.section().id)));
            let outcome = {
                let _held = scope.data().hold();
                match panic::catch_unwind(AssertUnwindSafe(|| body(&scope))) {
                    Ok(result) => BodyOutcome::Finished(result),
                    Err(payload) => BodyOutcome::Panicked(payload),
                }
            };
            scope.shared.complete(outcome);
        })?;
        Ok(self.shared.wait_outcome())
    }

    /// Lifecycle active for the duration of the run.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    #[must_use]
    pub fn data(&self) -> &Arc<ConcurrentScopedData> {
        &self.section().core.data
    }

    /// Request a rerender of the section.
    pub fn rerender(&self) {
        self.section().request_rerender();
    }

    /// Complete the one-shot signal, releasing every
    /// [`wait_for_signal`](Self::wait_for_signal).
    pub fn signal(&self) {
        self.shared.state.lock().signalled = true;
        self.shared.changed.notify_all();
    }

    /// Block until [`signal`](Self::signal) is called or the run is aborted.
    pub fn wait_for_signal(&self) {
        self.suspend(|| {
            let mut state = self.shared.state.lock();
            while !state.signalled && !state.aborted {
                self.shared.changed.wait(&mut state);
            }
        });
    }

    /// Like [`wait_for_signal`](Self::wait_for_signal), giving up after
    /// `timeout`. Returns `true` if signalled.
    pub fn wait_for_signal_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.suspend(|| {
            let mut state = self.shared.state.lock();
            while !state.signalled && !state.aborted {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.shared.changed.wait_for(&mut state, deadline - now);
            }
            state.signalled
        })
    }

    /// Run `wait` with the store's exclusive lock released, letting
    /// pending renders and other writers through.
    ///
    /// Use it around any blocking call in a run body that is not one of
    /// the scope's own waits (channel receives, joins, blocking reads).
    pub fn suspend<R>(&self, wait: impl FnOnce() -> R) -> R {
        let data = self.data();
        let held = data.release_held();
        let result = wait();
        if self.is_aborted() {
            drop(held);
        } else {
            data.reacquire(held);
        }
        result
    }

    /// Stop the run. [`Section::run`](crate::Section::run) returns `Ok(())`
    /// without waiting for the body, which observes the abort at its next
    /// cooperative point.
    pub fn abort(&self) {
        self.shared.abort();
        if body_section() == Some(self.section().id) {
            drop(self.data().release_held());
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().aborted
    }

    /// Sleep for `duration`, waking early on abort. Returns `false` if the
    /// run was aborted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        self.suspend(|| {
            let mut state = self.shared.state.lock();
            while !state.aborted {
                let now = Instant::now();
                if now >= deadline {
                    return true;
                }
                self.shared.changed.wait_for(&mut state, deadline - now);
            }
            false
        })
    }

    /// Register a callback for after the run body finishes.
    pub fn on_finishing(&self, callback: impl FnOnce() + Send + 'static) {
        self.section().on_finishing(Box::new(callback));
    }

    /// Render output once, above the section. It is written with the next
    /// frame and never erased.
    ///
    /// # Errors
    ///
    /// [`SectionError::Render`] if `render` wrote an unrecognized escape.
    pub fn aside(&self, render: impl FnOnce(&mut RenderScope<'_>)) -> Result<(), SectionError> {
        let section = self.section();
        let width = section.core.width();
        let data = self.data();
        data.lock(|| {
            let mut scope = RenderScope::for_aside(section, width);
            render(&mut scope);
            let commands = scope.finish()?;
            section.asides.lock().push(commands);
            Ok::<_, RenderError>(())
        })?;
        section.request_rerender();
        Ok(())
    }

    // ── Exclusive callbacks ────────────────────────────────────────────────

    fn claim<T: Send + Sync + 'static>(
        &self,
        key: &DataKey<T>,
        value: T,
        dispose: Option<Box<dyn FnOnce(T) + Send>>,
    ) -> Result<(), SectionError> {
        let data = self.data();
        if data.try_put(key, move || value, dispose) {
            return Ok(());
        }
        if data.is_active(&self.shared.lifecycle) {
            Err(SectionError::DuplicateCallback(key.name()))
        } else {
            Err(SectionError::RunFinished)
        }
    }

    /// Call `handler` for every key pressed during the run.
    ///
    /// Keys are delivered in order on a dedicated listener thread, which
    /// stops when the run finishes.
    ///
    /// # Errors
    ///
    /// - [`SectionError::DuplicateCallback`] if a key handler is already
    ///   registered for this run.
    /// - [`SectionError::RunFinished`] after the run finished.
    /// - [`SectionError::Io`] if terminal input cannot be opened.
    pub fn on_key_pressed(
        &self,
        handler: impl Fn(&KeyScope<'_>) + Send + Sync + 'static,
    ) -> Result<(), SectionError> {
        let source = CancellationSource::new("sectui-key-listener");
        let token = source.token();
        self.claim(&self.shared.key_listener, source, Some(Box::new(|s: CancellationSource| s.cancel())))?;

        let scope = self.clone();
        let started = self.spawn_listener("sectui-key-listener", token, move |key| {
            handler(&KeyScope { key, run: &scope });
        });
        if let Err(e) = started {
            self.data().remove(&self.shared.key_listener);
            return Err(SectionError::Io(e));
        }
        Ok(())
    }

    /// Intercept every proposed change to the active input. The hook may
    /// rewrite or reject the change.
    ///
    /// # Errors
    ///
    /// [`SectionError::DuplicateCallback`] or [`SectionError::RunFinished`],
    /// as for [`on_key_pressed`](Self::on_key_pressed).
    pub fn on_input_changed(
        &self,
        hook: impl Fn(&mut InputChange) + Send + Sync + 'static,
    ) -> Result<(), SectionError> {
        self.claim(&self.shared.input_changed, Arc::new(hook), None)
    }

    /// Receive text submitted from the active input.
    ///
    /// # Errors
    ///
    /// [`SectionError::DuplicateCallback`] or [`SectionError::RunFinished`],
    /// as for [`on_key_pressed`](Self::on_key_pressed).
    pub fn on_input_entered(
        &self,
        hook: impl Fn(&mut InputEntered) + Send + Sync + 'static,
    ) -> Result<(), SectionError> {
        self.claim(&self.shared.input_entered, Arc::new(hook), None)
    }

    // ── Input routing ──────────────────────────────────────────────────────

    /// Start routing keys to the section's active input, once per run.
    pub(crate) fn ensure_input_pump(&self) {
        let source = CancellationSource::new("sectui-input");
        let token = source.token();
        let claimed = self.data().try_put(
            &self.shared.input_pump,
            move || source,
            Some(Box::new(|s: CancellationSource| s.cancel())),
        );
        if !claimed {
            return;
        }
        let scope = self.clone();
        if let Err(e) = self.spawn_listener("sectui-input", token, move |key| scope.route_to_input(key)) {
            warn!(error = %e, "input routing unavailable");
            self.data().remove(&self.shared.input_pump);
        }
    }

    fn spawn_listener(
        &self,
        name: &str,
        token: CancellationToken,
        on_key: impl FnMut(Key) + Send + 'static,
    ) -> io::Result<()> {
        let core = &self.section().core;
        let subscription = core.keys()?.subscribe();
        let poll = core.config.key_poll_interval;
        thread::Builder::new()
            .name(name.into())
            .spawn(move || listen(&subscription, &token, poll, on_key))?;
        Ok(())
    }

    fn route_to_input(&self, key: Key) {
        let section = self.section();
        let data = self.data();
        let inputs = &section.inputs;

        let submitted = data.lock(|| {
            let ActiveInput {
                id,
                mut state,
                completer,
            } = data.with(inputs, InputRegistry::active).flatten()?;
            let hook = data.get(&self.shared.input_changed);
            let outcome = state.handle_key(&id, key, completer.as_deref(), &mut |change: &mut InputChange| {
                if let Some(hook) = &hook {
                    hook(change);
                }
            });
            match outcome {
                KeyOutcome::Ignored | KeyOutcome::Rejected => None,
                KeyOutcome::Moved | KeyOutcome::Changed => {
                    data.update(inputs, |registry| registry.commit(&id, state));
                    section.request_rerender();
                    None
                }
                KeyOutcome::Submitted(text) => Some(InputEntered::new(id, text)),
            }
        });

        let Some(mut entered) = submitted else {
            return;
        };
        trace!(input = entered.id(), "input submitted");
        if let Some(hook) = data.get(&self.shared.input_entered) {
            hook(&mut entered);
        }
        if entered.clears_input() {
            data.update(inputs, |registry| registry.clear(entered.id()));
            section.request_rerender();
        }
    }
}

fn listen(
    subscription: &KeySubscription,
    token: &CancellationToken,
    poll: Duration,
    mut on_key: impl FnMut(Key),
) {
    while !token.is_cancelled() {
        match subscription.recv_timeout(poll) {
            Ok(key) if !token.is_cancelled() => on_key(key),
            Ok(_) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    trace!("key listener stopped");
}

/// A key press, with access to the run it happened in.
pub struct KeyScope<'a> {
    key: Key,
    run: &'a RunScope,
}

impl KeyScope<'_> {
    #[must_use]
    pub fn key(&self) -> Key {
        self.key
    }

    #[must_use]
    pub fn run(&self) -> &RunScope {
        self.run
    }
}

impl Deref for KeyScope<'_> {
    type Target = RunScope;

    fn deref(&self) -> &RunScope {
        self.run
    }
}

impl fmt::Debug for KeyScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyScope").field("key", &self.key).finish()
    }
}
