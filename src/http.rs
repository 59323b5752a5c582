use std::{sync::OnceLock, time::Duration};

use reqwest::{blocking::Client as HttpClient, Method, Url};

use crate::{CONNECTION_KEEP_ALIVE, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_IDLE_CONNS_PER_HOST};

/// Header used to propagate the caller's trace context.
pub(crate) const TRACEPARENT_HEADER: &str = "traceparent";

static DEFAULT_TRANSPORT: OnceLock<HttpClient> = OnceLock::new();

/// Process-wide pooled transport shared by every client without an override.
///
/// Keeps at most [`DEFAULT_MAX_IDLE_CONNS_PER_HOST`] idle connections per host,
/// dials with [`DEFAULT_DIAL_TIMEOUT`] and keeps sockets alive for
/// [`CONNECTION_KEEP_ALIVE`]. There is no overall timeout; calls are bounded by
/// their context deadline.
pub fn default_transport() -> Result<HttpClient, reqwest::Error> {
    if let Some(client) = DEFAULT_TRANSPORT.get() {
        return Ok(client.clone());
    }
    let built = HttpClient::builder()
        .pool_max_idle_per_host(DEFAULT_MAX_IDLE_CONNS_PER_HOST)
        .connect_timeout(DEFAULT_DIAL_TIMEOUT)
        .tcp_keepalive(CONNECTION_KEEP_ALIVE)
        .timeout(None::<Duration>)
        .build()?;
    Ok(DEFAULT_TRANSPORT.get_or_init(|| built).clone())
}

/// Trim and upper-case `method`, keeping it only if it is POST, PUT or DELETE.
pub fn normalize_operate_method(method: &str) -> Option<Method> {
    match method.trim().to_ascii_uppercase().as_str() {
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}

/// Absolute URLs pass through; anything else is joined onto `endpoint`.
pub(crate) fn resolve_url(endpoint: &Url, url: &str) -> Result<Url, String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Url::parse(url).map_err(|err| err.to_string())
    } else {
        endpoint
            .join(url)
            .map_err(|err| format!("invalid path: {err}"))
    }
}
