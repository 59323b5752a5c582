//! Helpers for exercising the client in tests: recording collaborators and
//! preconfigured clients.

use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    telemetry::{Logger, OperationStats, Span, TraceContext, Tracer},
    Client, Config, Context,
};

#[derive(Debug, Default)]
struct LogBook {
    records: Vec<OperationStats>,
    infos: Vec<String>,
    errors: Vec<String>,
}

/// Logger that keeps everything it receives. Clones share one log.
#[derive(Clone, Debug, Default)]
pub struct RecordingLogger {
    book: Arc<Mutex<LogBook>>,
}

impl RecordingLogger {
    fn book(&self) -> MutexGuard<'_, LogBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stats records, one per finished operation, in completion order.
    pub fn records(&self) -> Vec<OperationStats> {
        self.book().records.clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.book().infos.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.book().errors.clone()
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, stats: &OperationStats) {
        self.book().records.push(stats.clone());
    }

    fn info(&self, message: &str) {
        self.book().infos.push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.book().errors.push(message.to_string());
    }
}

/// A span as it looked when it was ended.
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    pub name: String,
    pub context: TraceContext,
    pub parent: Option<TraceContext>,
    pub attributes: Vec<(String, i64)>,
}

/// Tracer that collects ended spans. Clones share one collection.
#[derive(Clone, Debug, Default)]
pub struct RecordingTracer {
    finished: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl RecordingTracer {
    pub fn finished(&self) -> Vec<FinishedSpan> {
        self.finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Tracer for RecordingTracer {
    fn start(&self, name: &str, parent: Option<&TraceContext>) -> Box<dyn Span> {
        let context = match parent {
            Some(parent) => parent.child(),
            None => TraceContext::generate(),
        };
        Box::new(RecordingSpan {
            span: FinishedSpan {
                name: name.to_string(),
                context,
                parent: parent.cloned(),
                attributes: Vec::new(),
            },
            sink: self.finished.clone(),
        })
    }
}

struct RecordingSpan {
    span: FinishedSpan,
    sink: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl Span for RecordingSpan {
    fn context(&self) -> TraceContext {
        self.span.context.clone()
    }

    fn set_attribute(&mut self, key: &str, value: i64) {
        self.span.attributes.push((key.to_string(), value));
    }

    fn end(self: Box<Self>) {
        let RecordingSpan { span, sink } = *self;
        sink.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(span);
    }
}

/// An address nothing listens on: bound once, then released.
pub fn closed_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local port");
    listener.local_addr().expect("local addr")
}

/// Strip the scheme from a mock server URI, leaving `host:port`.
pub fn host_of(base_url: &str) -> &str {
    base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
}

/// A connected client pointed at `base_url` (e.g. a wiremock server URI).
///
/// Blocking clients must not be built or dropped on an async runtime thread;
/// call this from `spawn_blocking` in async tests.
pub fn connected_client(base_url: &str) -> Client {
    let mut client = Client::new(Config::new(host_of(base_url)));
    client
        .connect(&Context::background())
        .expect("connect test client");
    client
}

/// Like [`connected_client`], with a [`RecordingLogger`] attached before connecting.
pub fn recording_client(base_url: &str) -> (Client, RecordingLogger) {
    let logger = RecordingLogger::default();
    let mut client =
        Client::new(Config::new(host_of(base_url))).with_logger(Arc::new(logger.clone()));
    client
        .connect(&Context::background())
        .expect("connect test client");
    (client, logger)
}
