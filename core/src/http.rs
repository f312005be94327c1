//! HTTP transport types shared by the operation builders and the session.
//!
//! # Design
//! Requests and responses are plain data. `LibraryApi` builds `HttpRequest`
//! values and parses `HttpResponse` values without touching the network; a
//! `Transport` implementation (normally `Session`) executes the round-trip.
//! Keeping the I/O boundary explicit makes every operation testable with a
//! scripted transport.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// HTTP method for a request. The library service only needs these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// A file attached to a multipart body. The transport reads `path` when the
/// request is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub name: String,
    pub path: PathBuf,
}

/// Multipart form: exactly one binary file part plus one text part per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub file: FilePart,
    pub fields: BTreeMap<String, String>,
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// Serialized JSON document, sent with `content-type: application/json`.
    Json(String),
    Multipart(MultipartBody),
}

/// An HTTP request described as plain data.
///
/// `url` is absolute (base URL already prefixed). `query` pairs are appended
/// in order by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

/// An HTTP response described as plain data: the status line and the body
/// read to a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}
