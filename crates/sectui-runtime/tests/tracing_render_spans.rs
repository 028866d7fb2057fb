#![forbid(unsafe_code)]

//! Tracing emitted by the render worker.
//!
//! 1. Every render job runs inside a `render` span carrying the section id.
//! 2. The `frame written` event is emitted inside that span with byte and
//!    line counts.
//! 3. A request made while one is pending is reported as `rerender
//!    coalesced`.
//!
//! The capture layer is installed as the global default because render
//! jobs run on the session's worker thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use sectui_backend::VirtualTerminal;
use sectui_runtime::Session;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

// ── Capture layer ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: String,
    fields: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct CapturedEvent {
    message: String,
    fields: HashMap<String, String>,
    parent_span: Option<CapturedSpan>,
}

struct SpanCapture {
    spans: Arc<Mutex<HashMap<u64, CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

#[derive(Clone)]
struct CaptureHandle {
    spans: Arc<Mutex<HashMap<u64, CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureHandle {
    fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans
            .lock()
            .unwrap()
            .values()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    fn events_with(&self, message: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.message == message)
            .cloned()
            .collect()
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> tracing_subscriber::Layer<S> for SpanCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);
        self.spans.lock().unwrap().insert(
            id.into_u64(),
            CapturedSpan {
                name: attrs.metadata().name().to_string(),
                fields: visitor.0.into_iter().collect(),
            },
        );
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        let fields: HashMap<String, String> = visitor.0.into_iter().collect();
        let message = fields.get("message").cloned().unwrap_or_default();

        let parent_span = ctx
            .current_span()
            .id()
            .and_then(|id| self.spans.lock().unwrap().get(&id.into_u64()).cloned());

        self.events.lock().unwrap().push(CapturedEvent {
            message,
            fields,
            parent_span,
        });
    }
}

fn capture() -> &'static CaptureHandle {
    static HANDLE: OnceLock<CaptureHandle> = OnceLock::new();
    HANDLE.get_or_init(|| {
        let spans = Arc::new(Mutex::new(HashMap::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let layer = SpanCapture {
            spans: Arc::clone(&spans),
            events: Arc::clone(&events),
        };
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::TRACE)
            .with(layer);
        tracing::subscriber::set_global_default(subscriber).expect("no other global subscriber");
        CaptureHandle { spans, events }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[test]
fn render_jobs_run_in_render_span() {
    let capture = capture();
    let term = VirtualTerminal::unbounded();
    let session = Session::new(term.clone()).unwrap();
    let section = session.section(|s| s.textln("traced"));
    section.run().unwrap();

    let render_spans = capture.spans_named("render");
    assert!(!render_spans.is_empty());
    assert!(render_spans.iter().all(|span| span.fields.contains_key("section")));

    let written = capture.events_with("frame written");
    let ours = written
        .iter()
        .find(|event| event.fields.get("bytes").map(String::as_str) == Some("8"))
        .expect("frame written event for this section");
    let parent = ours.parent_span.as_ref().expect("event inside a span");
    assert_eq!(parent.name, "render");
    assert_eq!(ours.fields.get("lines").map(String::as_str), Some("1"));
}

#[test]
fn pending_requests_are_reported_as_coalesced() {
    let capture = capture();
    let term = VirtualTerminal::unbounded();
    let session = Session::new(term).unwrap();
    let value = session.live_var(0);
    let view = value.clone();
    let section = session.section(move |s| s.textln(view.get().to_string()));

    section
        .run_with(move |_| {
            value.set(1);
            value.set(2);
            Ok(())
        })
        .unwrap();

    assert!(!capture.events_with("rerender coalesced").is_empty());
}
