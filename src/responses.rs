//! Response parsing contract shared by every endpoint.
//!
//! The dispatch engine owns request execution, headers and error classification;
//! a [`Response`] only decides how its own body is decoded. Types that are happy
//! with structural JSON decoding implement [`Response::set_status`] and nothing
//! else:
//!
//! ```
//! use opentsdb::{Context, Response};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct VersionResponse {
//!     #[serde(skip)]
//!     status_code: u16,
//!     version: String,
//! }
//!
//! impl Response for VersionResponse {
//!     fn set_status(&mut self, _ctx: &Context, status: u16) {
//!         self.status_code = status;
//!     }
//! }
//! ```
//!
//! Endpoints whose bodies do not map onto the type (a bare JSON array, or an
//! error payload with a different shape) return a [`CustomParser`] instead.
//!
//! [`Client::send_request`](crate::Client::send_request) requires
//! `Response + DeserializeOwned` for every response type, including ones that
//! always return a custom parser; those can derive `Deserialize` with
//! `#[serde(skip)]` on every field. Without a custom parser the body is decoded
//! into a fresh value that replaces the caller's one and then receives the
//! status again. State the caller set before dispatch that the body does not
//! carry (`#[serde(skip)]` fields, for one) is reset to its `Default`; keep such
//! state outside the response, or decode in a custom parser that writes only
//! the fields it reads.

use crate::{context::Context, errors::BoxError};

/// Decodes a raw response body into the response in place.
pub type CustomParser<R> = fn(&mut R, &[u8]) -> Result<(), BoxError>;

pub trait Response {
    /// Called with the HTTP status code before the body is parsed, whatever the code.
    fn set_status(&mut self, ctx: &Context, status: u16);

    /// Parser that replaces default JSON decoding. `None` keeps the default.
    fn custom_parser(&self, _ctx: &Context) -> Option<CustomParser<Self>> {
        None
    }
}
