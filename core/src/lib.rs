//! Asynchronous client for the library management service.
//!
//! # Overview
//! Authenticates, uploads files for import, enqueues server-side tasks and
//! polls those tasks until they finish while reporting progress. The client
//! never runs work itself; it only observes task state on the server.
//!
//! # Design
//! - `LibraryApi` builds `HttpRequest` values and parses responses without
//!   touching the network; `Transport` (implemented by the reqwest-backed
//!   `Session`) executes them.
//! - `normalize` turns every outcome into exactly one of a transport error,
//!   a server error or a parsed body.
//! - `TaskPoller` is a pure state machine; `wait_for_task` drives it on a
//!   fixed interval and stops on a caller-supplied `CancellationToken`.
//! - `LibraryClient` composes the pieces around one `ClientConfig`.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod normalize;
pub mod poller;
pub mod session;
pub mod types;

pub use api::LibraryApi;
pub use client::{LibraryClient, TaskWatch};
pub use config::ClientConfig;
pub use error::{ApiError, Result};
pub use http::{FilePart, HttpMethod, HttpRequest, HttpResponse, MultipartBody, RequestBody};
pub use poller::{wait_for_task, PollState, TaskPoller, Transition};
pub use session::{Session, Transport};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    Credentials, Profile, Progress, References, Settings, Task, TaskSnapshot, TaskStatus,
    UploadRequest,
};
