//! Response normalization.
//!
//! Every HTTP outcome funnels through `normalize`, which yields exactly one of
//! a transport error, a server error, or a parsed body.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::http::HttpResponse;

/// The only status the service uses for success.
pub const STATUS_OK: u16 = 200;

/// Map a transport outcome to the parsed body or the error it represents.
///
/// An empty body parses to `Value::Null`; a body that is not JSON is
/// returned as `Value::String`.
pub fn normalize(outcome: Result<HttpResponse>) -> Result<Value> {
    let response = outcome?;
    if response.status != STATUS_OK {
        return Err(ApiError::Server {
            status: response.status,
        });
    }
    Ok(parse_body(&response.body))
}

/// Normalize and then deserialize the body into `T`.
pub fn decode<T: DeserializeOwned>(outcome: Result<HttpResponse>) -> Result<T> {
    let value = normalize(outcome)?;
    serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
}

pub(crate) fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}
