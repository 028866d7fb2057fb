#![forbid(unsafe_code)]

//! Sections: one render-then-run unit.
//!
//! # State Machine
//!
//! ```text
//! Created ──run()──► Rendered-once ──► Running ──► Finishing ──► Disposed
//! ```
//!
//! [`Section::run`] performs the whole walk on the caller's thread:
//!
//! 1. Claim the session (one active section at a time) and mark the section
//!    consumed. Sections are single-use.
//! 2. Start the section and run lifecycles, then render once and wait for it.
//! 3. Execute the run body on its own thread (`sectui-run`) and block until
//!    it returns or the run is aborted. The body holds the store's
//!    exclusive lock except while suspended, so renders it requests run at
//!    its next suspension point.
//! 4. Stop the run lifecycle. Key listeners and input routing registered
//!    under it are cancelled by their disposers.
//! 5. Run finishing callbacks. They may still trigger a last render.
//! 6. Release the session, drain outstanding render jobs, stop the section
//!    lifecycle.
//! 7. Report the outcome: a body panic is resumed, then a body error, then a
//!    render failure.
//!
//! # Coalescing
//!
//! [`Section::rerender`] sets a pending flag and enqueues a job only when
//! the flag was clear. The job clears the flag once it holds the store's
//! exclusive lock, so every request made before then is served by that one
//! job, which reads the state current at that moment.

use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use sectui_core::{DataKey, Lifecycle};
use sectui_render::{RenderError, TerminalCommand};
use tracing::{info, trace};

use crate::error::{BoxError, SectionError};
use crate::input::InputRegistry;
use crate::render_scope::RenderScope;
use crate::run_scope::{BodyOutcome, RunScope, RunShared};
use crate::session::SessionCore;

static NEXT_SECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type RenderFn = Arc<dyn Fn(&mut RenderScope<'_>) + Send + Sync>;
pub(crate) type RunBody = Box<dyn FnOnce(&RunScope) -> Result<(), BoxError> + Send>;
type FinishingCallback = Box<dyn FnOnce() + Send>;

/// Why a render job failed.
pub(crate) enum Failure {
    Render(RenderError),
    Panic(Box<dyn Any + Send>),
}

/// Outstanding render jobs of one section.
#[derive(Default)]
pub(crate) struct JobCounter {
    outstanding: Mutex<usize>,
    idle: Condvar,
}

impl JobCounter {
    fn begin(&self) {
        *self.outstanding.lock() += 1;
    }

    pub(crate) fn end(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut outstanding = self.outstanding.lock();
        while *outstanding > 0 {
            self.idle.wait(&mut outstanding);
        }
    }
}

pub(crate) struct SectionShared {
    pub(crate) id: u64,
    pub(crate) core: Arc<SessionCore>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) render_fn: RenderFn,
    pub(crate) inputs: DataKey<InputRegistry>,
    pub(crate) last_rendered: Mutex<Vec<TerminalCommand>>,
    pub(crate) asides: Mutex<Vec<Vec<TerminalCommand>>>,
    pub(crate) jobs: JobCounter,
    pub(crate) current_run: Mutex<Option<Arc<RunShared>>>,
    consumed: AtomicBool,
    pending: AtomicBool,
    renders: AtomicUsize,
    finishing: Mutex<Vec<FinishingCallback>>,
    failure: Mutex<Option<Failure>>,
}

impl SectionShared {
    /// Request a render job, coalescing with one already pending.
    ///
    /// The job is counted while the session's active slot is locked, so
    /// teardown, which clears the slot before draining jobs, either sees
    /// it or rejects the request.
    pub(crate) fn request_rerender(self: &Arc<Self>) {
        {
            let active = self.core.active.lock();
            if !active.as_ref().is_some_and(|active| Arc::ptr_eq(active, self)) {
                return;
            }
            if self.pending.swap(true, Ordering::AcqRel) {
                trace!(section = self.id, "rerender coalesced");
                return;
            }
            self.jobs.begin();
        }
        if !self.core.enqueue(Arc::clone(self)) {
            self.pending.store(false, Ordering::Release);
            self.jobs.end();
        }
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub(crate) fn rendered(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a render failure and stop the run waiting on the body.
    /// Only the first failure is kept.
    pub(crate) fn fail(&self, failure: Failure) {
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(failure);
            }
        }
        let run = self.current_run.lock().clone();
        if let Some(run) = run {
            run.abort();
        }
    }

    fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    pub(crate) fn on_finishing(&self, callback: FinishingCallback) {
        self.finishing.lock().push(callback);
    }
}

/// A block of output drawn by a render function and kept up to date while
/// its run body executes.
///
/// Created by [`Session::section`](crate::Session::section).
#[derive(Clone)]
pub struct Section {
    shared: Arc<SectionShared>,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("id", &self.shared.id)
            .field("consumed", &self.shared.consumed.load(Ordering::Relaxed))
            .field("renders", &self.render_count())
            .finish()
    }
}

impl Section {
    pub(crate) fn new(core: Arc<SessionCore>, render_fn: RenderFn) -> Self {
        let lifecycle = Lifecycle::child_of("section", &core.lifecycle);
        let inputs = DataKey::new("inputs", &lifecycle);
        Self {
            shared: Arc::new(SectionShared {
                id: NEXT_SECTION_ID.fetch_add(1, Ordering::Relaxed),
                core,
                lifecycle,
                render_fn,
                inputs,
                last_rendered: Mutex::new(Vec::new()),
                asides: Mutex::new(Vec::new()),
                jobs: JobCounter::default(),
                current_run: Mutex::new(None),
                consumed: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                renders: AtomicUsize::new(0),
                finishing: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Lifecycle active from the start of [`run`](Self::run) until the
    /// section is disposed.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    /// Number of frames written so far.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.shared.renders.load(Ordering::Relaxed)
    }

    /// Request a rerender. A no-op unless this section is running.
    pub fn rerender(&self) {
        self.shared.request_rerender();
    }

    /// Register a callback to run after the run body finishes, before the
    /// section is disposed.
    pub fn on_finishing(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.on_finishing(Box::new(callback));
    }

    /// Render once, then finish.
    ///
    /// # Errors
    ///
    /// See [`run_with`](Self::run_with).
    pub fn run(&self) -> Result<(), SectionError> {
        self.run_inner(None)
    }

    /// Render once, run `body` concurrently, and block until it completes
    /// or the run is aborted.
    ///
    /// An aborted run returns `Ok(())`. If `body` panics, teardown still
    /// completes and the panic is resumed on this thread.
    ///
    /// # Errors
    ///
    /// - [`SectionError::AlreadyRun`] if this section was run before.
    /// - [`SectionError::SectionAlreadyActive`] if another section of the
    ///   session is running.
    /// - [`SectionError::RunBody`] if `body` returned an error.
    /// - [`SectionError::Render`] if a render failed.
    /// - [`SectionError::Io`] if the body thread could not be spawned.
    pub fn run_with<F>(&self, body: F) -> Result<(), SectionError>
    where
        F: FnOnce(&RunScope) -> Result<(), BoxError> + Send + 'static,
    {
        self.run_inner(Some(Box::new(body)))
    }

    fn run_inner(&self, body: Option<RunBody>) -> Result<(), SectionError> {
        let shared = &self.shared;
        let core = &shared.core;
        {
            let mut active = core.active.lock();
            if shared.consumed.load(Ordering::Acquire) {
                return Err(SectionError::AlreadyRun);
            }
            if active.is_some() {
                return Err(SectionError::SectionAlreadyActive);
            }
            shared.consumed.store(true, Ordering::Release);
            *active = Some(Arc::clone(shared));
        }
        info!(section = shared.id, "section run started");

        let data = &core.data;
        data.start(&shared.lifecycle);
        let run_lifecycle = Lifecycle::child_of("run", &shared.lifecycle);
        data.start(&run_lifecycle);
        let scope = RunScope::new(Arc::clone(shared), run_lifecycle.clone());
        *shared.current_run.lock() = Some(scope.shared());

        shared.request_rerender();
        shared.jobs.wait_idle();

        let outcome = match body {
            Some(body) if !shared.has_failed() => scope.execute(body),
            _ => Ok(BodyOutcome::Finished(Ok(()))),
        };

        // Teardown.
        shared.current_run.lock().take();
        data.stop(&run_lifecycle);
        let finishing = std::mem::take(&mut *shared.finishing.lock());
        for callback in finishing {
            callback();
        }
        core.active.lock().take();
        shared.jobs.wait_idle();
        data.stop(&shared.lifecycle);
        info!(section = shared.id, renders = self.render_count(), "section run finished");

        let body_result = match outcome {
            Ok(BodyOutcome::Panicked(payload)) => panic::resume_unwind(payload),
            Ok(BodyOutcome::Finished(result)) => result.map_err(SectionError::RunBody),
            Ok(BodyOutcome::Aborted) => Ok(()),
            Err(e) => Err(SectionError::Io(e)),
        };
        body_result?;

        let failure = shared.failure.lock().take();
        match failure {
            Some(Failure::Panic(payload)) => panic::resume_unwind(payload),
            Some(Failure::Render(err)) => Err(SectionError::Render(err)),
            None => Ok(()),
        }
    }
}
