//! Authenticated HTTP session.
//!
//! # Design
//! `Transport` is the seam between the pure request builders and the network.
//! `Session` implements it on a reqwest `Client` with an in-memory cookie
//! store, so the cookie set by a successful login is replayed on every later
//! request. Cloning a `Session` shares the connection pool and the cookie
//! jar; reqwest synchronizes both, so concurrent requests need no extra
//! locking here. One attempt per call, no retries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, MultipartBody, RequestBody};

/// Executes an `HttpRequest` and returns the raw response.
///
/// Implementations must return `Ok` for every response that carries a status
/// line, whatever the status; status interpretation belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport holding the session cookies.
#[derive(Debug, Clone)]
pub struct Session {
    http: Client,
}

impl Session {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("library-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Wrap an already configured reqwest client. Cookie persistence depends
    /// on how that client was built.
    pub fn from_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for Session {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "Sending request");

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url),
            HttpMethod::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.header(CONTENT_TYPE, "application/json").body(body),
            RequestBody::Multipart(form) => builder.multipart(multipart_form(form).await?),
        };

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        debug!(status, url = %request.url, "Received response");
        Ok(HttpResponse { status, body })
    }
}

async fn multipart_form(body: MultipartBody) -> Result<Form> {
    let contents = tokio::fs::read(&body.file.path)
        .await
        .map_err(|e| ApiError::File {
            path: body.file.path.display().to_string(),
            message: e.to_string(),
        })?;

    let part = Part::bytes(contents).file_name(file_name(&body.file.path));
    let mut form = Form::new().part(body.file.name, part);
    for (name, value) in body.fields {
        form = form.text(name, value);
    }
    Ok(form)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string()
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Transport(format!("timed out: {e}"))
    } else if e.is_connect() {
        ApiError::Transport(format!("connection failed: {e}"))
    } else {
        ApiError::Transport(e.to_string())
    }
}
