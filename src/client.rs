use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Instant,
};

use reqwest::{blocking::Client as HttpClient, header::CONTENT_TYPE, Method, Url};
use serde::de::DeserializeOwned;

use crate::{
    context::Context,
    errors::{Error, ParseError, Result, TransportError, ValidationError},
    http::{default_transport, normalize_operate_method, resolve_url, TRACEPARENT_HEADER},
    responses::Response,
    telemetry::{HttpRequestMetrics, Logger, MetricsCallbacks, Operation, Telemetry, Tracer},
    DEFAULT_DETECT_DELTA_NUM, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_CONTENT_LENGTH,
    DEFAULT_MAX_PUT_POINTS_NUM, JSON_CONTENT_TYPE,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// `host:port` of the OpenTSDB server. Surrounding whitespace is ignored.
    pub host: String,
    /// Override the pooled default transport. The client only clones the handle.
    pub transport: Option<HttpClient>,
    /// Max data points per `/api/put` batch (defaults to 75 when ≤ 0).
    pub max_put_points_num: i64,
    /// Delta-detection window for puts (defaults to 3 when ≤ 0).
    pub detect_delta_num: i64,
    /// Max request body size in bytes (defaults to 40960 when ≤ 0). Documented, not enforced.
    pub max_content_length: i64,
}

impl Config {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    fn with_defaults(mut self) -> Self {
        self.host = self.host.trim().to_string();
        if self.max_put_points_num <= 0 {
            self.max_put_points_num = DEFAULT_MAX_PUT_POINTS_NUM;
        }
        if self.detect_delta_num <= 0 {
            self.detect_delta_num = DEFAULT_DETECT_DELTA_NUM;
        }
        if self.max_content_length <= 0 {
            self.max_content_length = DEFAULT_MAX_CONTENT_LENGTH;
        }
        self
    }
}

/// Live state produced by [`Client::connect`]; shared read-only by derived clients.
#[derive(Debug)]
struct Connection {
    endpoint: String,
    base_url: Url,
    http: HttpClient,
    settings: Config,
}

impl Connection {
    fn establish(config: &Config) -> Result<Self> {
        let settings = config.clone().with_defaults();
        if settings.host.is_empty() {
            return Err(Error::Config(
                "the host in the given configuration cannot be empty".to_string(),
            ));
        }

        let endpoint = format!("http://{}", settings.host);
        let base_url = Url::parse(&endpoint)
            .map_err(|err| Error::Config(format!("invalid host {:?}: {err}", settings.host)))?;

        let http = match &settings.transport {
            Some(transport) => transport.clone(),
            None => default_transport()
                .map_err(|err| Error::Config(format!("failed to build default transport: {err}")))?,
        };

        Ok(Self {
            endpoint,
            base_url,
            http,
            settings,
        })
    }
}

/// Blocking OpenTSDB client.
///
/// Created unconnected from a [`Config`]; [`Client::connect`] builds the transport
/// and endpoint. Every operation takes the caller's [`Context`], so one connected
/// client can be shared across threads.
#[derive(Clone, Debug)]
pub struct Client {
    config: Config,
    telemetry: Telemetry,
    connection: Option<Arc<Connection>>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            telemetry: Telemetry::default(),
            connection: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.telemetry.set_logger(logger);
        self
    }

    pub fn with_metrics(mut self, callbacks: MetricsCallbacks) -> Self {
        self.telemetry.set_metrics(callbacks);
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.telemetry.set_tracer(tracer);
        self
    }

    /// The configuration as given by the caller.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The configuration with defaults applied; `None` until connected.
    pub fn effective_config(&self) -> Option<&Config> {
        self.connection.as_ref().map(|conn| &conn.settings)
    }

    /// `http://<host>`, once connected.
    pub fn endpoint(&self) -> Option<&str> {
        self.connection.as_ref().map(|conn| conn.endpoint.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Join an API path such as [`crate::PUT_PATH`] onto the endpoint.
    pub fn endpoint_url(&self, path: &str) -> Result<Url> {
        let conn = self.connection.as_deref().ok_or(Error::NotConnected)?;
        resolve_url(&conn.base_url, path).map_err(Error::Config)
    }

    /// Validate the host, fill policy defaults and bind the transport.
    ///
    /// Failures are logged and returned; the client is left unconnected.
    /// Calling it again recomputes everything from the configuration given to [`Client::new`].
    pub fn connect(&mut self, ctx: &Context) -> Result<()> {
        let mut op = self.telemetry.start(Operation::Connect, ctx);
        match Connection::establish(&self.config) {
            Ok(conn) => {
                self.telemetry.logger().info("connection successful");
                op.succeed(format!("connected to {}", conn.endpoint));
                self.connection = Some(Arc::new(conn));
                Ok(())
            }
            Err(err) => {
                self.telemetry.logger().error(&err.to_string());
                op.fail(err.to_string());
                self.connection = None;
                Err(err)
            }
        }
    }

    /// Derive a client bound to `ctx`. The transport and configuration are shared.
    pub fn with_context(&self, ctx: Context) -> ContextClient {
        ContextClient {
            client: self.clone(),
            ctx,
        }
    }

    /// Open and immediately close a TCP connection to the configured host.
    ///
    /// Does not need [`Client::connect`] to have run.
    pub fn health_check(&self, ctx: &Context) -> Result<()> {
        let mut op = self.telemetry.start(Operation::HealthCheck, ctx);
        match probe(self.config.host.trim(), op.context()) {
            Ok(()) => {
                op.succeed("connection to OpenTSDB is alive");
                Ok(())
            }
            Err(err) => {
                op.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Send `body` to `url` and decode the reply into `response`.
    ///
    /// `url` may be absolute or a path relative to the endpoint. The whole body is
    /// buffered. The status code reaches `response` before any parsing, so it is
    /// set even when parsing fails. With no custom parser the decoded value
    /// replaces `*response` and receives the status again.
    pub fn send_request<R>(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: impl Into<String>,
        response: &mut R,
    ) -> Result<()>
    where
        R: Response + DeserializeOwned,
    {
        let mut op = self.telemetry.start(Operation::SendRequest, ctx);
        match self.dispatch(op.context(), method, url, body.into(), response) {
            Ok(target) => {
                op.succeed(format!("{method} request sent at : {target}"));
                Ok(())
            }
            Err(err) => {
                op.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// True only for POST, PUT and DELETE, ignoring case and surrounding whitespace.
    pub fn is_valid_operate_method(&self, ctx: &Context, method: &str) -> bool {
        self.check_operate_method(ctx, method).is_some()
    }

    /// Like [`Client::is_valid_operate_method`], returning the normalized method.
    pub fn validate_operate_method(&self, ctx: &Context, method: &str) -> Result<Method> {
        self.check_operate_method(ctx, method).ok_or_else(|| {
            let message = if method.trim().is_empty() {
                "operate method cannot be empty".to_string()
            } else {
                format!(
                    "unsupported operate method {}; expected POST, PUT or DELETE",
                    method.trim()
                )
            };
            ValidationError::new(message).with_field("method").into()
        })
    }

    fn check_operate_method(&self, ctx: &Context, method: &str) -> Option<Method> {
        let mut op = self.telemetry.start(Operation::IsValidOperateMethod, ctx);
        let normalized = normalize_operate_method(method);
        match &normalized {
            Some(valid) => op.succeed(format!("{valid} is a valid operate method")),
            None => op.succeed(format!("{:?} is not a valid operate method", method.trim())),
        }
        normalized
    }

    fn dispatch<R>(
        &self,
        ctx: &Context,
        method: &str,
        url: &str,
        body: String,
        response: &mut R,
    ) -> Result<Url>
    where
        R: Response + DeserializeOwned,
    {
        let conn = self.connection.as_deref().ok_or(Error::NotConnected)?;
        let creation = |message: String| Error::RequestCreation {
            method: method.to_string(),
            url: url.to_string(),
            message,
        };

        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|err| creation(format!("invalid method: {err}")))?;
        let target = resolve_url(&conn.base_url, url).map_err(creation)?;

        let transport = |source: TransportError| Error::Transport {
            method: method.to_string(),
            url: target.to_string(),
            source,
        };
        ctx.check().map_err(transport)?;

        let mut builder = conn
            .http
            .request(http_method, target.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body);
        if let Some(left) = ctx.remaining() {
            builder = builder.timeout(left);
        }
        if let Some(trace) = ctx.trace() {
            builder = builder.header(TRACEPARENT_HEADER, trace.traceparent());
        }
        let request = builder.build().map_err(|err| creation(err.to_string()))?;

        let start = Instant::now();
        let resp = match conn.http.execute(request) {
            Ok(resp) => resp,
            Err(err) => {
                self.record_http(method, &target, start, None, Some(err.to_string()));
                return Err(transport(err.into()));
            }
        };

        let status = resp.status().as_u16();
        let read = |source: TransportError| Error::Read {
            method: method.to_string(),
            url: target.to_string(),
            source,
        };
        let bytes = match ctx.check().map_err(read).and_then(|()| {
            resp.bytes().map_err(|err| read(err.into()))
        }) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record_http(method, &target, start, Some(status), Some(err.to_string()));
                return Err(err);
            }
        };
        self.record_http(method, &target, start, Some(status), None);

        response.set_status(ctx, status);
        let parse = |source: ParseError| Error::Parse {
            method: method.to_string(),
            url: target.to_string(),
            source,
        };
        match response.custom_parser(ctx) {
            Some(parser) => parser(response, &bytes).map_err(|err| parse(ParseError::Custom(err)))?,
            None => {
                let mut decoded: R =
                    serde_json::from_slice(&bytes).map_err(|err| parse(err.into()))?;
                decoded.set_status(ctx, status);
                *response = decoded;
            }
        }

        Ok(target)
    }

    fn record_http(
        &self,
        method: &str,
        target: &Url,
        start: Instant,
        status: Option<u16>,
        error: Option<String>,
    ) {
        if self.telemetry.http_enabled() {
            self.telemetry.record_http(HttpRequestMetrics {
                method: method.to_string(),
                url: target.to_string(),
                latency: start.elapsed(),
                status,
                error,
            });
        }
    }
}

fn probe(host: &str, ctx: &Context) -> Result<()> {
    let unreachable = |source: io::Error| Error::Connection {
        host: host.to_string(),
        source,
    };

    if ctx.is_cancelled() {
        return Err(unreachable(io::Error::new(
            io::ErrorKind::Interrupted,
            "context cancelled",
        )));
    }
    let timeout = match ctx.remaining() {
        Some(left) => left.min(DEFAULT_DIAL_TIMEOUT),
        None => DEFAULT_DIAL_TIMEOUT,
    };
    if timeout.is_zero() {
        return Err(unreachable(io::Error::new(
            io::ErrorKind::TimedOut,
            "context deadline exceeded",
        )));
    }

    let mut last_err = None;
    for addr in host.to_socket_addrs().map_err(unreachable)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                drop(stream);
                return Ok(());
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(unreachable(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    })))
}

/// A [`Client`] bound to one [`Context`], from [`Client::with_context`].
#[derive(Clone, Debug)]
pub struct ContextClient {
    client: Client,
    ctx: Context,
}

impl ContextClient {
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn health_check(&self) -> Result<()> {
        self.client.health_check(&self.ctx)
    }

    pub fn send_request<R>(
        &self,
        method: &str,
        url: &str,
        body: impl Into<String>,
        response: &mut R,
    ) -> Result<()>
    where
        R: Response + DeserializeOwned,
    {
        self.client
            .send_request(&self.ctx, method, url, body, response)
    }

    pub fn is_valid_operate_method(&self, method: &str) -> bool {
        self.client.is_valid_operate_method(&self.ctx, method)
    }

    pub fn validate_operate_method(&self, method: &str) -> Result<Method> {
        self.client.validate_operate_method(&self.ctx, method)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        errors::ErrorKind,
        telemetry::OperationStatus,
        testing::{closed_local_addr, RecordingLogger},
    };

    fn recorded_client(config: Config) -> (Client, RecordingLogger) {
        let logger = RecordingLogger::default();
        let client = Client::new(config).with_logger(Arc::new(logger.clone()));
        (client, logger)
    }

    #[test]
    fn client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Client>();
        assert_send_sync::<ContextClient>();
    }

    #[test]
    fn connect_fills_unset_policy_knobs() {
        let mut client = Client::new(Config::new("localhost:4242"));
        client.connect(&Context::background()).unwrap();

        let effective = client.effective_config().unwrap();
        assert_eq!(effective.max_put_points_num, DEFAULT_MAX_PUT_POINTS_NUM);
        assert_eq!(effective.detect_delta_num, DEFAULT_DETECT_DELTA_NUM);
        assert_eq!(effective.max_content_length, DEFAULT_MAX_CONTENT_LENGTH);
        assert_eq!(client.config().max_put_points_num, 0);
    }

    #[test]
    fn connect_treats_negative_knobs_as_unset() {
        let mut client = Client::new(Config {
            host: "localhost:4242".into(),
            max_put_points_num: -5,
            detect_delta_num: -1,
            max_content_length: 1024,
            ..Default::default()
        });
        client.connect(&Context::background()).unwrap();

        let effective = client.effective_config().unwrap();
        assert_eq!(effective.max_put_points_num, 75);
        assert_eq!(effective.detect_delta_num, 3);
        assert_eq!(effective.max_content_length, 1024);
    }

    #[test]
    fn connect_trims_host_and_derives_endpoint() {
        let (mut client, logger) = recorded_client(Config::new("  tsdb.internal:4242 \n"));
        client.connect(&Context::background()).unwrap();

        assert_eq!(client.endpoint(), Some("http://tsdb.internal:4242"));
        assert_eq!(client.effective_config().unwrap().host, "tsdb.internal:4242");
        assert_eq!(logger.infos(), vec!["connection successful".to_string()]);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, Operation::Connect);
        assert_eq!(records[0].status, OperationStatus::Success);
        assert_eq!(records[0].message, "connected to http://tsdb.internal:4242");
    }

    #[test]
    fn connect_is_idempotent() {
        let mut client = Client::new(Config::new("localhost:4242"));
        client.connect(&Context::background()).unwrap();
        client.connect(&Context::background()).unwrap();
        assert_eq!(client.effective_config().unwrap().max_put_points_num, 75);
        assert_eq!(client.endpoint(), Some("http://localhost:4242"));
    }

    #[test]
    fn connect_rejects_blank_host_and_logs_it() {
        let (mut client, logger) = recorded_client(Config::new("   "));
        let err = client.connect(&Context::background()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!client.is_connected());
        assert_eq!(logger.errors().len(), 1);
        assert!(logger.errors()[0].contains("cannot be empty"));
        assert_eq!(logger.records()[0].status, OperationStatus::Fail);
    }

    #[test]
    fn endpoint_url_joins_api_paths() {
        let mut client = Client::new(Config::new("localhost:4242"));
        assert_eq!(
            client.endpoint_url(crate::PUT_PATH).unwrap_err().kind(),
            ErrorKind::NotConnected
        );
        client.connect(&Context::background()).unwrap();
        let url = client.endpoint_url(crate::QUERY_LAST_PATH).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4242/api/query/last");
    }

    #[test]
    fn operate_method_validation_is_logged_as_success() {
        let (client, logger) = recorded_client(Config::new("localhost:4242"));
        let ctx = Context::background();

        assert!(client.is_valid_operate_method(&ctx, "post"));
        assert!(client.is_valid_operate_method(&ctx, "PUT"));
        assert!(client.is_valid_operate_method(&ctx, " delete "));
        assert!(!client.is_valid_operate_method(&ctx, "get"));
        assert!(!client.is_valid_operate_method(&ctx, ""));
        assert!(!client.is_valid_operate_method(&ctx, "PATCH"));

        let records = logger.records();
        assert_eq!(records.len(), 6);
        assert!(records
            .iter()
            .all(|r| r.operation == Operation::IsValidOperateMethod
                && r.status == OperationStatus::Success));
    }

    #[test]
    fn validate_operate_method_reports_validation_errors() {
        let client = Client::new(Config::new("localhost:4242"));
        let ctx = Context::background();

        assert_eq!(client.validate_operate_method(&ctx, " put").unwrap(), Method::PUT);

        let err = client.validate_operate_method(&ctx, "GET").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().starts_with("method: unsupported operate method GET"));

        let err = client.validate_operate_method(&ctx, "  ").unwrap_err();
        assert_eq!(err.to_string(), "method: operate method cannot be empty");
    }

    #[test]
    fn send_request_requires_connect() {
        let (client, logger) = recorded_client(Config::new("localhost:4242"));
        let mut resp = Probe::default();
        let err = client
            .send_request(&Context::background(), "GET", crate::VERSION_PATH, "", &mut resp)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(resp.status, 0);
        assert_eq!(logger.records()[0].status, OperationStatus::Fail);
    }

    #[test]
    fn send_request_rejects_malformed_method_tokens() {
        let mut client = Client::new(Config::new("localhost:4242"));
        client.connect(&Context::background()).unwrap();
        let mut resp = Probe::default();
        let err = client
            .send_request(&Context::background(), "BAD METHOD", "/api/put", "[]", &mut resp)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestCreation);
        assert!(err.to_string().contains("BAD METHOD"));
    }

    #[test]
    fn cancelled_context_stops_dispatch_before_io() {
        let mut client = Client::new(Config::new(closed_local_addr().to_string()));
        client.connect(&Context::background()).unwrap();
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let mut resp = Probe::default();
        let err = client
            .with_context(ctx)
            .send_request("POST", "/api/put", "[]", &mut resp)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err.transport_kind(),
            Some(crate::errors::TransportErrorKind::Cancelled)
        );
    }

    #[test]
    fn health_check_reports_unreachable_host() {
        let (client, logger) = recorded_client(Config::new(closed_local_addr().to_string()));
        let err = client.health_check(&Context::background()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("OpenTSDB is unreachable"));
        let records = logger.records();
        assert_eq!(records[0].operation, Operation::HealthCheck);
        assert_eq!(records[0].status, OperationStatus::Fail);
        assert!(records[0].message.contains("OpenTSDB is unreachable"));
    }

    #[test]
    fn health_check_succeeds_against_listener_without_connect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = Client::new(Config::new(listener.local_addr().unwrap().to_string()));
        assert!(!client.is_connected());
        client.health_check(&Context::background()).unwrap();
    }

    #[test]
    fn health_check_honours_expired_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = Client::new(Config::new(listener.local_addr().unwrap().to_string()));
        let ctx = Context::background().with_timeout(Duration::ZERO);
        let err = client.health_check(&ctx).unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn derived_clients_own_their_contexts() {
        let mut client = Client::new(Config::new("localhost:4242"));
        client.connect(&Context::background()).unwrap();

        let (first_ctx, cancel_first) = Context::background().with_cancel();
        let first = client.with_context(first_ctx);
        let second = client.with_context(Context::background().with_timeout(Duration::from_secs(5)));

        cancel_first.cancel();
        assert!(first.context().is_cancelled());
        assert!(!second.context().is_cancelled());
        assert!(first.context().deadline().is_none());
        assert!(second.context().deadline().is_some());
        assert_eq!(first.client().endpoint(), second.client().endpoint());
    }

    #[derive(Debug, Default, serde::Deserialize)]
    struct Probe {
        #[serde(skip)]
        status: u16,
    }

    impl Response for Probe {
        fn set_status(&mut self, _ctx: &Context, status: u16) {
            self.status = status;
        }
    }
}
