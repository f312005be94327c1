//! Task polling state machine and its async driver.
//!
//! # Design
//! `TaskPoller` is pure: it is fed one poll outcome at a time and answers
//! with a `Transition`. A finished transition consumes the poller, so a task
//! that reached `completed` or `error` can never be polled again.
//! `wait_for_task` drives the machine with a fixed interval between ticks and
//! a caller-supplied `CancellationToken`; there is no built-in timeout or
//! backoff.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::api::LibraryApi;
use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::normalize::{parse_body, STATUS_OK};
use crate::session::Transport;
use crate::types::{Task, TaskSnapshot, TaskStatus};

/// Where a polled task stands from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Processing,
    Completed,
    Errored,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Completed | PollState::Errored)
    }
}

/// Result of feeding one poll outcome to a `TaskPoller`.
#[derive(Debug)]
pub enum Transition {
    /// Poll again after the interval. `progress` is set only while the task
    /// is processing.
    Continue {
        poller: TaskPoller,
        progress: Option<TaskSnapshot>,
    },
    /// Terminal outcome. `Ok` only for a completed task.
    Finished(Result<Task>),
}

impl Transition {
    pub fn state(&self) -> PollState {
        match self {
            Transition::Continue { poller, .. } => poller.state(),
            Transition::Finished(Ok(_)) => PollState::Completed,
            Transition::Finished(Err(_)) => PollState::Errored,
        }
    }
}

/// Poll state for one task.
#[derive(Debug, Clone)]
pub struct TaskPoller {
    task_id: String,
    state: PollState,
    ticks: u32,
}

impl TaskPoller {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: PollState::Pending,
            ticks: 0,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Number of poll outcomes consumed so far.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn request(&self, api: &LibraryApi) -> HttpRequest {
        api.build_get_task(&self.task_id)
    }

    pub fn on_response(mut self, outcome: Result<HttpResponse>) -> Transition {
        self.ticks += 1;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => return Transition::Finished(Err(e)),
        };
        if response.status != STATUS_OK {
            return Transition::Finished(Err(ApiError::Server {
                status: response.status,
            }));
        }

        let body = parse_body(&response.body);
        if !has_id_or_status(&body) {
            return Transition::Finished(Err(ApiError::EmptyResponse));
        }
        let status = match raw_status(&body) {
            Ok(status) => status,
            Err(raw) => return Transition::Finished(Err(ApiError::UnknownStatus(raw))),
        };
        let task: Task = match serde_json::from_value(body) {
            Ok(task) => task,
            Err(e) => return Transition::Finished(Err(ApiError::Deserialization(e.to_string()))),
        };

        match status {
            TaskStatus::Completed => Transition::Finished(Ok(task)),
            TaskStatus::Error => Transition::Finished(Err(ApiError::TaskFailed(Box::new(task)))),
            TaskStatus::Pending => {
                self.state = PollState::Pending;
                Transition::Continue {
                    poller: self,
                    progress: None,
                }
            }
            TaskStatus::Processing => {
                self.state = PollState::Processing;
                Transition::Continue {
                    poller: self,
                    progress: Some(TaskSnapshot::new(task)),
                }
            }
        }
    }
}

fn has_id_or_status(body: &Value) -> bool {
    let present = |key: &str| body.get(key).is_some_and(|v| !v.is_null());
    present("_id") || present("status")
}

/// The known status in `body`, or the raw text to report as unknown.
/// A missing status reads as `""`; a non-string one as its JSON text.
fn raw_status(body: &Value) -> std::result::Result<TaskStatus, String> {
    let raw = match body.get("status") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    TaskStatus::parse(&raw).ok_or(raw)
}

/// Poll `GET tasks/{task_id}` until the task reaches a terminal state.
///
/// The first request is issued immediately; each later one `interval` after
/// the previous response. `on_progress` receives every processing snapshot.
/// Once `cancel` fires no further request is sent, an in-flight request is
/// abandoned, `on_progress` is not called again and the result is
/// `ApiError::Cancelled`.
pub async fn wait_for_task<F>(
    transport: &dyn Transport,
    api: &LibraryApi,
    task_id: &str,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<Task>
where
    F: FnMut(TaskSnapshot) + Send,
{
    let mut poller = TaskPoller::new(task_id);
    loop {
        let request = poller.request(api);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            outcome = transport.execute(request) => outcome,
        };

        let transition = poller.on_response(outcome);
        poller = match transition {
            Transition::Finished(result) => {
                debug!(task_id, ok = result.is_ok(), "Task wait finished");
                return result;
            }
            Transition::Continue { poller, progress } => {
                trace!(task_id, tick = poller.ticks(), state = ?poller.state(), "Task not finished");
                if let Some(snapshot) = progress {
                    on_progress(snapshot);
                }
                poller
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
