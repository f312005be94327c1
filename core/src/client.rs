//! Client facade over the library service.
//!
//! # Design
//! `LibraryClient` is an explicit value owned by the caller; there is no
//! process-wide instance. It pairs the stateless `LibraryApi` builders with a
//! shared `Transport`, and every operation resolves exactly once to a
//! `Result`. Clones share the transport (and therefore the session cookies)
//! but carry their own copy of the configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::LibraryApi;
use crate::config::{validate_interval, ClientConfig};
use crate::error::{ApiError, Result};
use crate::poller;
use crate::session::{Session, Transport};
use crate::types::{Credentials, Profile, References, Settings, Task, TaskSnapshot, UploadRequest};

/// Asynchronous client for the library management service.
///
/// # Example
///
/// ```ignore
/// use library_core::{ApiError, ClientConfig, LibraryClient, UploadRequest};
/// use tokio_util::sync::CancellationToken;
///
/// let client = LibraryClient::new(ClientConfig::from_env()?)?;
/// client.login("admin", "admin").await?;
///
/// let task = client
///     .upload(&UploadRequest::new("books.xml").field("libraryTitle", "Home"))
///     .await?;
/// let task_id = task.id.ok_or(ApiError::EmptyResponse)?;
/// let done = client
///     .wait_for_task(&task_id, &CancellationToken::new(), |s| {
///         println!("{:?}%", s.percent);
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct LibraryClient {
    config: ClientConfig,
    api: LibraryApi,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for LibraryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LibraryClient {
    /// Create a client backed by a new cookie-keeping `Session`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(Session::new()?))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        validate_interval(config.poll_interval)?;
        Ok(Self {
            api: LibraryApi::new(&config.base_url),
            config,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.config.base_url = base_url.into();
        self.api = LibraryApi::new(&self.config.base_url);
        self
    }

    pub fn set_poll_interval(&mut self, interval: Duration) -> Result<&mut Self> {
        validate_interval(interval)?;
        self.config.poll_interval = interval;
        Ok(self)
    }

    /// Log in. The session cookie returned by the server is kept by the
    /// transport for later calls; the credentials are not.
    pub async fn login(&self, username: &str, password: &str) -> Result<Profile> {
        let request = self.api.build_login(&Credentials::new(username, password))?;
        let profile = self.api.parse_login(self.transport.execute(request).await)?;
        debug!(username, "Logged in");
        Ok(profile)
    }

    /// Upload a file for import. Returns the task created by the server.
    pub async fn upload(&self, upload: &UploadRequest) -> Result<Task> {
        let request = self.api.build_upload(upload);
        self.api.parse_upload(self.transport.execute(request).await)
    }

    /// Enqueue `task_alias` on a library. `None` settings are sent as `{}`.
    pub async fn queue_task(
        &self,
        library_id: &str,
        task_alias: &str,
        settings: Option<&Settings>,
    ) -> Result<Task> {
        let request = self.api.build_queue_task(library_id, task_alias, settings)?;
        self.api.parse_queue_task(self.transport.execute(request).await)
    }

    /// Fetch a task once, without interpreting its status.
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        let request = self.api.build_get_task(task_id);
        self.api.parse_get_task(self.transport.execute(request).await)
    }

    pub async fn library_references(
        &self,
        library_id: &str,
        extra_query: &BTreeMap<String, String>,
    ) -> Result<References> {
        let request = self.api.build_library_references(library_id, extra_query);
        self.api
            .parse_library_references(self.transport.execute(request).await)
    }

    /// Poll a task every `poll_interval` until it completes, fails or
    /// `cancel` fires. See [`poller::wait_for_task`].
    pub async fn wait_for_task<F>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<Task>
    where
        F: FnMut(TaskSnapshot) + Send,
    {
        poller::wait_for_task(
            self.transport.as_ref(),
            &self.api,
            task_id,
            self.config.poll_interval,
            cancel,
            on_progress,
        )
        .await
    }

    /// Enqueue a task and wait for it to finish.
    pub async fn queue_and_wait<F>(
        &self,
        library_id: &str,
        task_alias: &str,
        settings: Option<&Settings>,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<Task>
    where
        F: FnMut(TaskSnapshot) + Send,
    {
        let queued = self.queue_task(library_id, task_alias, settings).await?;
        let task_id = queued.id.ok_or(ApiError::EmptyResponse)?;
        self.wait_for_task(&task_id, cancel, on_progress).await
    }

    /// Start polling on the tokio runtime and return immediately.
    ///
    /// The wait listens on a child of `cancel`: cancelling `cancel` stops it,
    /// and so does dropping the returned `TaskWatch`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_task(&self, task_id: impl Into<String>, cancel: CancellationToken) -> TaskWatch {
        let client = self.clone();
        let task_id = task_id.into();
        let cancel = cancel.child_token();
        let wait_cancel = cancel.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            client
                .wait_for_task(&task_id, &wait_cancel, move |snapshot| {
                    // Fails only after the watch was dropped, which also stops the wait.
                    let _ = tx.send(snapshot);
                })
                .await
        });
        TaskWatch {
            progress: rx,
            cancel,
            handle,
        }
    }
}

/// Handle to a task wait running in the background.
///
/// Progress snapshots arrive on a channel; the terminal result is delivered
/// once by [`TaskWatch::finish`]. Dropping the handle, including dropping a
/// `finish` future that timed out, stops the wait: no request is sent after
/// the drop.
#[derive(Debug)]
pub struct TaskWatch {
    progress: mpsc::UnboundedReceiver<TaskSnapshot>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Task>>,
}

impl TaskWatch {
    /// Next progress snapshot, or `None` once the wait has ended and every
    /// snapshot was received.
    pub async fn next_progress(&mut self) -> Option<TaskSnapshot> {
        self.progress.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the wait. `finish` then resolves to `ApiError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal result.
    ///
    /// A panic inside the wait is resumed on the caller. A wait torn down
    /// without finishing (the runtime shut down under it) resolves to
    /// `ApiError::Cancelled`, the same as a cancelled token.
    pub async fn finish(mut self) -> Result<Task> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                debug!(error = %e, "Task wait torn down before finishing");
                Err(ApiError::Cancelled)
            }
        }
    }
}

impl Drop for TaskWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers every one with the same response.
    struct Fixed {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Transport for Fixed {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn fixed(status: u16, body: &str) -> Arc<Fixed> {
        Arc::new(Fixed {
            response: HttpResponse::new(status, body),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = ClientConfig {
            poll_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(LibraryClient::with_transport(config, fixed(200, "{}")).is_err());
    }

    #[test]
    fn setters_chain_and_rebuild_urls() {
        let mut client = LibraryClient::with_transport(ClientConfig::default(), fixed(200, "{}")).unwrap();
        client
            .set_base_url("https://lib.example.com/")
            .set_poll_interval(Duration::from_millis(50))
            .unwrap();
        assert_eq!(client.config().poll_interval, Duration::from_millis(50));
        assert_eq!(client.api.base_url(), "https://lib.example.com");
    }

    #[tokio::test]
    async fn server_error_is_forwarded() {
        let transport = fixed(503, "down");
        let client = LibraryClient::with_transport(ClientConfig::default(), transport.clone()).unwrap();
        let err = client.login("a", "b").await.unwrap_err();
        assert_eq!(err, ApiError::Server { status: 503 });
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queue_and_wait_requires_task_id() {
        let transport = fixed(200, r#"{"status":"pending"}"#);
        let client = LibraryClient::with_transport(ClientConfig::default(), transport.clone()).unwrap();
        let err = client
            .queue_and_wait("lib", "scan", None, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::EmptyResponse);
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_watch_finishes_cancelled() {
        let transport = fixed(200, r#"{"_id":"t1","status":"pending"}"#);
        let client = LibraryClient::with_transport(ClientConfig::default(), transport.clone()).unwrap();
        let watch = client.watch_task("t1", CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        watch.cancel();
        assert_eq!(watch.finish().await.unwrap_err(), ApiError::Cancelled);
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn runtime_shutdown_finishes_cancelled() {
        let transport = fixed(200, r#"{"_id":"t1","status":"pending"}"#);
        let client = LibraryClient::with_transport(ClientConfig::default(), transport).unwrap();

        let first = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let watch = first.block_on(async { client.watch_task("t1", CancellationToken::new()) });
        drop(first);

        let second = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = second.block_on(watch.finish());
        assert_eq!(result.unwrap_err(), ApiError::Cancelled);
    }
}
