#![forbid(unsafe_code)]

//! Sessions and the render worker.
//!
//! A [`Session`] owns the [`Terminal`], the root [`ConcurrentScopedData`],
//! and a single render worker thread (`sectui-render`). Every render job of
//! every section goes through that one thread, so at most one render
//! executes at a time across the session.
//!
//! # Render job
//!
//! 1. Take the store's exclusive lock and clear the section's pending flag.
//!    Rerender requests that arrive while the job is still waiting for the
//!    lock therefore coalesce into it.
//! 2. Start a render-pass lifecycle and run the render function into a
//!    [`RenderScope`].
//! 3. Release the lock, then build one batch: erase the lines of the
//!    previous frame, write queued asides, write the new frame.
//! 4. Write the batch with a single [`Terminal::write`] call.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use sectui_backend::Terminal;
use sectui_core::{ConcurrentScopedData, KeyEvents, Lifecycle};
use sectui_render::{RenderError, clear_sequence, encode_into, line_count};
use tracing::{debug, debug_span, trace, warn};

use crate::config::SessionConfig;
use crate::live::{LiveList, LiveVar};
use crate::render_scope::RenderScope;
use crate::run_scope;
use crate::section::{Failure, Section, SectionShared};

/// State shared by a session, its sections, and its live values.
pub(crate) struct SessionCore {
    pub(crate) terminal: Arc<dyn Terminal>,
    pub(crate) data: Arc<ConcurrentScopedData>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) config: SessionConfig,
    pub(crate) active: Mutex<Option<Arc<SectionShared>>>,
    render_tx: Mutex<Option<Sender<Arc<SectionShared>>>>,
    keys: Mutex<Option<KeyEvents>>,
}

impl SessionCore {
    /// Queue a render job. Returns `false` once the worker has shut down.
    pub(crate) fn enqueue(&self, section: Arc<SectionShared>) -> bool {
        match &*self.render_tx.lock() {
            Some(tx) => tx.send(section).is_ok(),
            None => false,
        }
    }

    /// Ask the running section, if any, to rerender.
    ///
    /// Ignored on the body thread of an earlier, aborted run: that body
    /// may still update shared values, but only its own section redraws
    /// for it.
    pub(crate) fn rerender_active(&self) {
        let active = self.active.lock().clone();
        if let Some(section) = active
            && run_scope::body_section().is_none_or(|id| id == section.id)
        {
            section.request_rerender();
        }
    }

    /// Width used for line accounting.
    pub(crate) fn width(&self) -> Option<usize> {
        self.config
            .render_width_override
            .or_else(|| self.terminal.width())
            .map(usize::from)
    }

    /// The decoded key stream, opening terminal input on first use.
    pub(crate) fn keys(&self) -> io::Result<KeyEvents> {
        let mut keys = self.keys.lock();
        if let Some(events) = &*keys {
            return Ok(events.clone());
        }
        let bytes = self.terminal.read()?;
        let (events, _reader) = KeyEvents::spawn(bytes, self.config.decoder())?;
        debug!("terminal input opened");
        *keys = Some(events.clone());
        Ok(events)
    }
}

/// Entry point: a terminal plus the shared state its sections render from.
///
/// Dropping the session stops the render worker, stops the session
/// lifecycle (disposing session-scoped values), and closes the terminal.
pub struct Session {
    core: Arc<SessionCore>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.core.config)
            .field("data", &self.core.data)
            .finish()
    }
}

impl Session {
    /// Open a session with [`SessionConfig::default`].
    ///
    /// # Errors
    ///
    /// Fails if the render worker thread cannot be spawned.
    pub fn new(terminal: impl Terminal + 'static) -> io::Result<Self> {
        Self::with_config(terminal, SessionConfig::default())
    }

    /// Open a session with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Fails if the render worker thread cannot be spawned.
    pub fn with_config(terminal: impl Terminal + 'static, config: SessionConfig) -> io::Result<Self> {
        let config = config.validated();
        let data = Arc::new(ConcurrentScopedData::new());
        let lifecycle = Lifecycle::new("session");
        data.start(&lifecycle);

        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("sectui-render".into())
            .spawn(move || render_worker(&rx))?;

        debug!(?config, "session opened");
        Ok(Self {
            core: Arc::new(SessionCore {
                terminal: Arc::new(terminal),
                data,
                lifecycle,
                config,
                active: Mutex::new(None),
                render_tx: Mutex::new(Some(tx)),
                keys: Mutex::new(None),
            }),
            worker: Some(worker),
        })
    }

    /// Create a section drawn by `render`.
    ///
    /// `render` runs on the render worker, under the store's exclusive lock,
    /// once per render job.
    pub fn section(&self, render: impl Fn(&mut RenderScope<'_>) + Send + Sync + 'static) -> Section {
        Section::new(Arc::clone(&self.core), Arc::new(render))
    }

    /// A reactive value bound to the session lifecycle.
    pub fn live_var<T>(&self, value: T) -> LiveVar<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        LiveVar::new(Arc::clone(&self.core), &self.core.lifecycle, value)
    }

    /// A reactive list bound to the session lifecycle.
    pub fn live_list<T>(&self, items: Vec<T>) -> LiveList<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        LiveList::new(Arc::clone(&self.core), &self.core.lifecycle, items)
    }

    #[must_use]
    pub fn data(&self) -> &Arc<ConcurrentScopedData> {
        &self.core.data
    }

    /// Lifecycle that lives as long as the session.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.core.lifecycle
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    #[must_use]
    pub fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.core.terminal
    }

    /// Decoded keys from the terminal. The first call opens terminal input.
    ///
    /// # Errors
    ///
    /// Fails if the terminal's input stream cannot be opened.
    pub fn keys(&self) -> io::Result<KeyEvents> {
        self.core.keys()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.core.render_tx.lock().take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("render worker panicked");
        }
        self.core.data.stop(&self.core.lifecycle);
        if let Err(e) = self.core.terminal.close() {
            warn!(error = %e, "failed to close terminal");
        }
        debug!("session closed");
    }
}

// ── Render worker ──────────────────────────────────────────────────────────

fn render_worker(jobs: &Receiver<Arc<SectionShared>>) {
    debug!("render worker started");
    while let Ok(section) = jobs.recv() {
        run_render_job(&section);
    }
    debug!("render worker stopped");
}

pub(crate) fn run_render_job(section: &Arc<SectionShared>) {
    let _span = debug_span!("render", section = section.id).entered();
    match panic::catch_unwind(AssertUnwindSafe(|| render_frame(section))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(error = %err, "render failed");
            section.fail(Failure::Render(err));
        }
        Err(payload) => {
            warn!("render function panicked");
            section.fail(Failure::Panic(payload));
        }
    }
    section.jobs.end();
}

fn render_frame(section: &Arc<SectionShared>) -> Result<(), RenderError> {
    let core = &section.core;
    let data = &core.data;
    let width = core.width();

    let (frame, asides) = data.lock(|| {
        section.clear_pending();
        let pass = Lifecycle::child_of("render-pass", &section.lifecycle);
        data.start(&pass);
        data.update(&section.inputs, |inputs| inputs.deactivate());

        let mut scope = RenderScope::for_pass(section, &pass, width);
        (section.render_fn)(&mut scope);
        data.stop(&pass);
        let frame = scope.finish()?;
        let asides = std::mem::take(&mut *section.asides.lock());
        Ok::<_, RenderError>((frame, asides))
    })?;

    let mut last = section.last_rendered.lock();
    let erase = line_count(&last, width);
    let mut batch = clear_sequence(erase);
    for aside in &asides {
        encode_into(aside, &mut batch);
    }
    encode_into(&frame, &mut batch);
    core.terminal.write(&batch)?;

    trace!(
        erased = erase,
        asides = asides.len(),
        lines = line_count(&frame, width),
        bytes = batch.len(),
        "frame written"
    );
    *last = frame;
    section.rendered();
    Ok(())
}
