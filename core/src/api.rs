//! Request builders and response parsers for the library service routes.
//!
//! # Design
//! `LibraryApi` holds only a `base_url` and carries no mutable state between
//! calls. Each operation is split into a `build_*` method that produces an
//! `HttpRequest` and a `parse_*` method that consumes the transport outcome
//! through `normalize`. The facade executes the round-trip in between.

use std::collections::BTreeMap;

use urlencoding::encode;

use crate::error::{ApiError, Result};
use crate::http::{FilePart, HttpMethod, HttpRequest, HttpResponse, MultipartBody, RequestBody};
use crate::normalize::{decode, normalize};
use crate::types::{Credentials, Profile, QueueTaskBody, References, Settings, Task, UploadRequest};

/// Name of the multipart part carrying the uploaded file.
pub const FILE_PART: &str = "file";

/// Query key that always carries the library ID on reference queries.
pub const LIBRARY_PARAM: &str = "library";

/// Stateless request builder and response parser for the library service.
#[derive(Debug, Clone)]
pub struct LibraryApi {
    base_url: String,
}

impl LibraryApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    pub fn build_login(&self, credentials: &Credentials) -> Result<HttpRequest> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.url("users/login"),
            query: Vec::new(),
            body: RequestBody::Json(to_json(credentials)?),
        })
    }

    pub fn build_upload(&self, upload: &UploadRequest) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.url("libraries/import"),
            query: Vec::new(),
            body: RequestBody::Multipart(MultipartBody {
                file: FilePart {
                    name: FILE_PART.to_string(),
                    path: upload.file_path.clone(),
                },
                fields: upload.fields.clone(),
            }),
        }
    }

    /// Missing settings are sent as an empty object.
    pub fn build_queue_task(
        &self,
        library_id: &str,
        task_alias: &str,
        settings: Option<&Settings>,
    ) -> Result<HttpRequest> {
        let empty = Settings::new();
        let body = QueueTaskBody {
            settings: settings.unwrap_or(&empty),
        };
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.url(&format!(
                "tasks/library/{}/{}",
                encode(library_id),
                encode(task_alias)
            )),
            query: Vec::new(),
            body: RequestBody::Json(to_json(&body)?),
        })
    }

    pub fn build_get_task(&self, task_id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.url(&format!("tasks/{}", encode(task_id))),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// `library` is inserted after `extra_query`, so it replaces any
    /// conflicting key. Pairs are emitted in key order.
    pub fn build_library_references(
        &self,
        library_id: &str,
        extra_query: &BTreeMap<String, String>,
    ) -> HttpRequest {
        let mut query = extra_query.clone();
        query.insert(LIBRARY_PARAM.to_string(), library_id.to_string());
        HttpRequest {
            method: HttpMethod::Get,
            url: self.url("references"),
            query: query.into_iter().collect(),
            body: RequestBody::Empty,
        }
    }

    pub fn parse_login(&self, outcome: Result<HttpResponse>) -> Result<Profile> {
        normalize(outcome)
    }

    pub fn parse_upload(&self, outcome: Result<HttpResponse>) -> Result<Task> {
        decode(outcome)
    }

    pub fn parse_queue_task(&self, outcome: Result<HttpResponse>) -> Result<Task> {
        decode(outcome)
    }

    pub fn parse_get_task(&self, outcome: Result<HttpResponse>) -> Result<Task> {
        decode(outcome)
    }

    pub fn parse_library_references(&self, outcome: Result<HttpResponse>) -> Result<References> {
        normalize(outcome)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ApiError::Serialization(e.to_string()))
}
