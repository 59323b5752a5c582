//! Blocking REST client engine for OpenTSDB.
//!
//! The crate owns the connection lifecycle, request dispatch and response parsing
//! contract; endpoint-specific request/response types are built on top of it by
//! implementing [`Response`].
//!
//! ```no_run
//! use opentsdb::{Client, Config, Context, Response, VERSION_PATH};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Version {
//!     #[serde(skip)]
//!     status: u16,
//!     version: String,
//! }
//!
//! impl Response for Version {
//!     fn set_status(&mut self, _ctx: &Context, status: u16) {
//!         self.status = status;
//!     }
//! }
//!
//! let ctx = Context::background();
//! let mut client = Client::new(Config::new("localhost:4242"));
//! client.connect(&ctx)?;
//! client.health_check(&ctx)?;
//!
//! let mut version = Version::default();
//! client.send_request(&ctx, "GET", VERSION_PATH, "", &mut version)?;
//! println!("{} ({})", version.version, version.status);
//! # Ok::<(), opentsdb::Error>(())
//! ```
#![allow(clippy::result_large_err)]

use std::time::Duration;

/// Dial timeout for the default transport and the health check.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP keep-alive for sockets of the default transport.
pub const CONNECTION_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Idle pooled connections kept per host by the default transport.
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 10;

pub const DEFAULT_MAX_PUT_POINTS_NUM: i64 = 75;
pub const DEFAULT_DETECT_DELTA_NUM: i64 = 3;
pub const DEFAULT_MAX_CONTENT_LENGTH: i64 = 40960;

/// Content-Type sent with every request.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

mod client;
mod context;
mod endpoints;
mod errors;
mod http;
mod responses;
mod telemetry;
pub mod testing;

pub use client::{Client, Config, ContextClient};
pub use context::{CancelHandle, Context};
pub use endpoints::*;
pub use errors::{
    BoxError, Error, ErrorKind, ParseError, Result, TransportError, TransportErrorKind,
    ValidationError,
};
pub use http::{default_transport, normalize_operate_method};
pub use responses::{CustomParser, Response};
pub use telemetry::{
    HttpRequestMetrics, Logger, MetricsCallbacks, Operation, OperationMetrics, OperationStats,
    OperationStatus, Span, TraceContext, Tracer, TracingLogger, TracingTracer,
};

/// Re-exported so callers can name the transport type in [`Config::transport`].
pub use reqwest::{blocking::Client as HttpClient, Method};
