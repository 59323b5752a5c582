use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use crate::{context::Context, errors::ValidationError};

/// Public client operations that are timed, logged and traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    HealthCheck,
    SendRequest,
    IsValidOperateMethod,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Connect => "Connect",
            Operation::HealthCheck => "HealthCheck",
            Operation::SendRequest => "sendRequest",
            Operation::IsValidOperateMethod => "isValidOperateMethod",
        }
    }

    /// Span name used when a tracer is attached.
    pub fn span_name(&self) -> String {
        format!("opentsdb-{}", self.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Fail,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished operation, handed to [`Logger::debug`].
#[derive(Debug, Clone)]
pub struct OperationStats {
    pub operation: Operation,
    pub started_at: SystemTime,
    pub duration_us: u64,
    pub status: OperationStatus,
    pub message: String,
}

/// Structured log sink injected into the client.
pub trait Logger: Send + Sync {
    /// Receives exactly one record per wrapped operation.
    fn debug(&self, stats: &OperationStats);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default logger: forwards everything to `tracing` under the `opentsdb` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, stats: &OperationStats) {
        tracing::debug!(
            target: "opentsdb",
            operation = %stats.operation,
            duration_us = stats.duration_us,
            status = %stats.status,
            detail = %stats.message,
            "operation completed"
        );
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "opentsdb", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "opentsdb", "{message}");
    }
}

/// Serialized trace-context pair: a 32-hex-digit trace id and a 16-hex-digit span id.
///
/// The textual form is `trace_id|span_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
}

impl TraceContext {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let trace_id = trace_id.into().to_ascii_lowercase();
        let span_id = span_id.into().to_ascii_lowercase();
        if !is_valid_id(&trace_id, 32) {
            return Err(ValidationError::new("expected 32 non-zero hex digits").with_field("trace_id"));
        }
        if !is_valid_id(&span_id, 16) {
            return Err(ValidationError::new("expected 16 non-zero hex digits").with_field("span_id"));
        }
        Ok(Self { trace_id, span_id })
    }

    /// A new root context with random ids.
    pub fn generate() -> Self {
        Self {
            trace_id: format!("{:016x}{:016x}", fastrand::u64(1..), fastrand::u64(..)),
            span_id: random_span_id(),
        }
    }

    /// Same trace, new span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: random_span_id(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// W3C `traceparent` header value for outgoing HTTP requests.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.trace_id, self.span_id)
    }
}

impl FromStr for TraceContext {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('|') {
            Some((trace_id, span_id)) => Self::new(trace_id, span_id),
            None => Err(ValidationError::new("expected trace_id|span_id").with_field("trace_context")),
        }
    }
}

fn random_span_id() -> String {
    format!("{:016x}", fastrand::u64(1..))
}

fn is_valid_id(id: &str, len: usize) -> bool {
    id.len() == len
        && id.bytes().all(|b| b.is_ascii_hexdigit())
        && id.bytes().any(|b| b != b'0')
}

/// A started span. Ended exactly once by the operation wrapper.
pub trait Span {
    fn context(&self) -> TraceContext;
    fn set_attribute(&mut self, key: &str, value: i64);
    fn end(self: Box<Self>);
}

/// Span factory injected into the client.
pub trait Tracer: Send + Sync {
    /// Start a span, as a child of `parent` when one is given.
    fn start(&self, name: &str, parent: Option<&TraceContext>) -> Box<dyn Span>;
}

/// Tracer backed by `tracing` spans; ids are generated locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn start(&self, name: &str, parent: Option<&TraceContext>) -> Box<dyn Span> {
        let context = match parent {
            Some(parent) => parent.child(),
            None => TraceContext::generate(),
        };
        let span = tracing::info_span!(
            target: "opentsdb",
            "opentsdb",
            otel.name = %name,
            trace_id = %context.trace_id(),
            span_id = %context.span_id(),
            parent_span_id = ?parent.map(TraceContext::span_id),
            duration_us = tracing::field::Empty,
        );
        Box::new(TracingSpan {
            entered: span.entered(),
            context,
        })
    }
}

struct TracingSpan {
    entered: tracing::span::EnteredSpan,
    context: TraceContext,
}

impl Span for TracingSpan {
    fn context(&self) -> TraceContext {
        self.context.clone()
    }

    /// `opentsdb.<op>.duration` lands in the span's `duration_us` field; other
    /// keys have no declared field and become events inside the span.
    fn set_attribute(&mut self, key: &str, value: i64) {
        if key.ends_with(".duration") {
            self.entered.record("duration_us", value);
        } else {
            tracing::debug!(target: "opentsdb", attribute = key, value, "span attribute");
        }
    }

    fn end(self: Box<Self>) {}
}

/// User-provided callbacks for emitting metrics without taking on a metrics dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub operation: Option<Arc<dyn Fn(OperationMetrics) + Send + Sync>>,
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field("operation", &self.operation.as_ref().map(|_| "callback"))
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .finish()
    }
}

/// Latency and outcome of one wrapped operation.
#[derive(Clone, Debug)]
pub struct OperationMetrics {
    pub operation: Operation,
    pub latency: Duration,
    pub status: OperationStatus,
}

/// HTTP round-trip latency and outcome, reported by the dispatch engine.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub method: String,
    pub url: String,
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Internal helper that owns the injected collaborators.
#[derive(Clone)]
pub(crate) struct Telemetry {
    logger: Arc<dyn Logger>,
    tracer: Option<Arc<dyn Tracer>>,
    callbacks: MetricsCallbacks,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            tracer: None,
            callbacks: MetricsCallbacks::default(),
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("tracer", &self.tracer.as_ref().map(|_| "tracer"))
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = logger;
    }

    pub fn set_tracer(&mut self, tracer: Arc<dyn Tracer>) {
        self.tracer = Some(tracer);
    }

    pub fn set_metrics(&mut self, callbacks: MetricsCallbacks) {
        self.callbacks = callbacks;
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    /// Open the operation wrapper. Stats are emitted when the guard drops.
    pub fn start(&self, operation: Operation, ctx: &Context) -> OperationGuard<'_> {
        let span = self
            .tracer
            .as_ref()
            .map(|tracer| tracer.start(&operation.span_name(), ctx.trace()));
        let ctx = match &span {
            Some(span) => ctx.clone().with_trace(span.context()),
            None => ctx.clone(),
        };
        OperationGuard {
            telemetry: self,
            operation,
            started_at: SystemTime::now(),
            start: Instant::now(),
            status: OperationStatus::Fail,
            message: String::new(),
            span,
            ctx,
        }
    }
}

/// RAII wrapper around one operation. Starts as `FAIL`; callers flip it with
/// [`OperationGuard::succeed`].
pub(crate) struct OperationGuard<'a> {
    telemetry: &'a Telemetry,
    operation: Operation,
    started_at: SystemTime,
    start: Instant,
    status: OperationStatus,
    message: String,
    span: Option<Box<dyn Span>>,
    ctx: Context,
}

impl OperationGuard<'_> {
    /// The caller's context, carrying this operation's span as trace parent.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn succeed(&mut self, message: impl Into<String>) {
        self.status = OperationStatus::Success;
        self.message = message.into();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = OperationStatus::Fail;
        self.message = message.into();
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let latency = self.start.elapsed();
        let duration_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let stats = OperationStats {
            operation: self.operation,
            started_at: self.started_at,
            duration_us,
            status: self.status,
            message: std::mem::take(&mut self.message),
        };
        self.telemetry.logger.debug(&stats);

        if let Some(cb) = &self.telemetry.callbacks.operation {
            cb(OperationMetrics {
                operation: self.operation,
                latency,
                status: self.status,
            });
        }

        if let Some(mut span) = self.span.take() {
            span.set_attribute(
                &format!("opentsdb.{}.duration", self.operation.as_str()),
                i64::try_from(duration_us).unwrap_or(i64::MAX),
            );
            span.end();
        }
    }
}
