//! LogCapture - タスク実行中のログを per-execution バッファに集める
//!
//! # フロー
//! 1. `LogCapture::open()` がバッファを登録し、`capture_id` 付きの span を作る
//! 2. `CaptureLayer::on_new_span` がその span の extensions にバッファを付ける
//! 3. span の内側で発生したイベントは `on_event` でバッファに追記される
//! 4. `finish()`（または drop）で登録解除。span の外のイベントは入らない
//!
//! blocking スレッドでも span に入り直せば同じバッファに書かれる。

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{SecondsFormat, Utc};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Span, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

pub const CAPTURE_SPAN_NAME: &str = "spindle.capture";

pub const DEFAULT_LOG_FORMAT: &str = "[{timestamp}][{level}][{target}:{line}] {message}";

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

fn sinks() -> MutexGuard<'static, HashMap<u64, CaptureSink>> {
    static SINKS: OnceLock<Mutex<HashMap<u64, CaptureSink>>> = OnceLock::new();
    SINKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Timestamp,
    Level,
    Target,
    Module,
    File,
    Line,
    Message,
    Fields,
}

/// Parsed `log_collector_format` template.
///
/// Placeholders: `{timestamp}` `{level}` `{target}` `{module}` `{file}`
/// `{line}` `{message}` `{fields}`. Anything else is copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormat {
    segments: Vec<Segment>,
}

impl LogFormat {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            literal.push_str(&rest[..start]);
            let after = &rest[start..];
            let Some(end) = after.find('}') else {
                rest = after;
                break;
            };
            let placeholder = match &after[1..end] {
                "timestamp" => Some(Segment::Timestamp),
                "level" => Some(Segment::Level),
                "target" => Some(Segment::Target),
                "module" => Some(Segment::Module),
                "file" => Some(Segment::File),
                "line" => Some(Segment::Line),
                "message" => Some(Segment::Message),
                "fields" => Some(Segment::Fields),
                _ => None,
            };
            match placeholder {
                Some(segment) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                None => literal.push_str(&after[..=end]),
            }
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    fn render(&self, event: &Event<'_>, out: &mut String) {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        for segment in &self.segments {
            // writing into a String cannot fail
            let _ = match segment {
                Segment::Literal(s) => out.write_str(s),
                Segment::Timestamp => {
                    out.write_str(&Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                Segment::Level => write!(out, "{:<5}", meta.level().as_str()),
                Segment::Target => out.write_str(meta.target()),
                Segment::Module => out.write_str(meta.module_path().unwrap_or("-")),
                Segment::File => out.write_str(meta.file().unwrap_or("-")),
                Segment::Line => match meta.line() {
                    Some(line) => write!(out, "{line}"),
                    None => out.write_str("-"),
                },
                Segment::Message => out.write_str(&visitor.message),
                Segment::Fields => out.write_str(&visitor.fields.join(" ")),
            };
        }
        out.push('\n');
    }
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::parse(DEFAULT_LOG_FORMAT)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[derive(Default)]
struct CaptureIdVisitor(Option<u64>);

impl Visit for CaptureIdVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "capture_id" {
            self.0 = Some(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "capture_id" {
            self.0 = u64::try_from(value).ok();
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}

#[derive(Clone)]
struct CaptureSink {
    buffer: Arc<Mutex<String>>,
    format: Arc<LogFormat>,
}

impl CaptureSink {
    fn append(&self, event: &Event<'_>) {
        let mut line = String::new();
        self.format.render(event, &mut line);
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(&line);
    }
}

/// `tracing_subscriber` layer that feeds open [`LogCapture`] scopes.
///
/// Install it unfiltered next to the fmt layer, otherwise events below the
/// console level are not captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureLayer;

impl CaptureLayer {
    pub fn new() -> Self {
        CaptureLayer
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != CAPTURE_SPAN_NAME {
            return;
        }
        let mut visitor = CaptureIdVisitor::default();
        attrs.record(&mut visitor);
        let Some(capture_id) = visitor.0 else {
            return;
        };
        let Some(sink) = sinks().get(&capture_id).cloned() else {
            return;
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(sink);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };
        for span in scope {
            if let Some(sink) = span.extensions().get::<CaptureSink>() {
                sink.append(event);
                return;
            }
        }
    }
}

/// One capture scope. Events emitted inside [`LogCapture::span`] end up in
/// this capture's buffer.
pub struct LogCapture {
    id: u64,
    span: Span,
    buffer: Arc<Mutex<String>>,
}

impl LogCapture {
    pub fn open(format: Arc<LogFormat>) -> Self {
        let id = NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(Mutex::new(String::new()));
        sinks().insert(
            id,
            CaptureSink {
                buffer: Arc::clone(&buffer),
                format,
            },
        );
        let span = tracing::span!(
            target: "spindle::capture",
            Level::INFO,
            "spindle.capture",
            capture_id = id
        );
        Self { id, span, buffer }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Close the scope and return everything captured.
    pub fn finish(self) -> String {
        sinks().remove(&self.id);
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        sinks().remove(&self.id);
    }
}
