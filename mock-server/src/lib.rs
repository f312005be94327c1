//! In-memory stand-in for the library management service.
//!
//! Tasks advance one step per `GET /api/tasks/{id}`: `pending`, then
//! `processing` 1/3, 2/3, 3/3, then `completed`. The alias `fail` ends in
//! `error` instead and the alias `bogus` reports the status `bogus`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin";
pub const SESSION_COOKIE: &str = "session";

/// Number of `processing` steps every task goes through.
pub const PROCESSING_STEPS: u64 = 3;

#[derive(Debug, Clone)]
pub struct MockTask {
    pub id: String,
    pub alias: String,
    pub library: Option<String>,
    /// Alias-specific payload echoed on every poll (settings or upload info).
    pub payload: Map<String, Value>,
    /// Number of status polls served so far.
    pub polls: u64,
}

impl MockTask {
    fn new(alias: &str, library: Option<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alias: alias.to_string(),
            library,
            payload,
            polls: 0,
        }
    }

    /// JSON body for the task as of `self.polls` polls.
    pub fn view(&self) -> Value {
        let mut body = self.payload.clone();
        body.insert("_id".into(), json!(self.id));
        body.insert("alias".into(), json!(self.alias));
        if let Some(library) = &self.library {
            body.insert("library".into(), json!(library));
        }

        let status = match self.polls {
            0 => "pending",
            _ if self.alias == "bogus" => "bogus",
            n if n <= PROCESSING_STEPS => {
                body.insert(
                    "progress".into(),
                    json!({"current": n, "max": PROCESSING_STEPS}),
                );
                "processing"
            }
            _ if self.alias == "fail" => "error",
            _ => {
                body.insert("result".into(), json!({"alias": self.alias}));
                "completed"
            }
        };
        body.insert("status".into(), json!(status));
        Value::Object(body)
    }
}

#[derive(Debug, Default)]
pub struct AppState {
    pub sessions: RwLock<HashSet<String>>,
    pub tasks: RwLock<HashMap<String, MockTask>>,
}

pub type Db = Arc<AppState>;

#[derive(Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct QueueTask {
    #[serde(default)]
    pub settings: Value,
}

pub fn app() -> Router {
    app_with_state(Db::default())
}

/// Build the router over caller-owned state so tests can inspect it.
pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/api/users/login", post(login))
        .route("/api/libraries/import", post(import))
        .route("/api/tasks/library/{library}/{alias}", post(queue_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/references", get(references))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn login(
    State(db): State<Db>,
    Json(input): Json<Login>,
) -> Result<impl IntoResponse, StatusCode> {
    if input.username != USERNAME || input.password != PASSWORD {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = Uuid::new_v4().to_string();
    db.sessions.write().await.insert(token.clone());
    info!(username = %input.username, "User logged in");

    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly");
    let profile = json!({"_id": "user-1", "username": input.username, "role": "admin"});
    Ok(([(header::SET_COOKIE, cookie)], Json(profile)))
}

async fn import(
    State(db): State<Db>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    require_session(&db, &headers).await?;

    let mut file: Option<(String, usize)> = None;
    let mut fields = BTreeMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            if file.replace((file_name, data.len())).is_some() {
                return Err(StatusCode::BAD_REQUEST);
            }
        } else {
            let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            fields.insert(name, value);
        }
    }
    let (file_name, size) = file.ok_or(StatusCode::BAD_REQUEST)?;

    let mut payload = Map::new();
    payload.insert(
        "upload".into(),
        json!({"fileName": file_name, "size": size, "fields": fields}),
    );
    let task = MockTask::new("import", fields.get("library").cloned(), payload);
    Ok(Json(insert_task(&db, task).await))
}

async fn queue_task(
    State(db): State<Db>,
    headers: HeaderMap,
    Path((library, alias)): Path<(String, String)>,
    Json(input): Json<QueueTask>,
) -> Result<Json<Value>, StatusCode> {
    require_session(&db, &headers).await?;
    if !input.settings.is_object() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut payload = Map::new();
    payload.insert("settings".into(), input.settings);
    let task = MockTask::new(&alias, Some(library), payload);
    Ok(Json(insert_task(&db, task).await))
}

async fn get_task(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    require_session(&db, &headers).await?;
    let mut tasks = db.tasks.write().await;
    let task = tasks.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    let view = task.view();
    task.polls += 1;
    debug!(task_id = %id, status = %view["status"], "Task polled");
    Ok(Json(view))
}

async fn references(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    require_session(&db, &headers).await?;
    let library = query.get("library").cloned().ok_or(StatusCode::BAD_REQUEST)?;
    Ok(Json(json!({
        "library": library,
        "query": query,
        "references": [
            {"_id": "ref-1", "title": "A Wizard of Earthsea", "library": library},
            {"_id": "ref-2", "title": "The Left Hand of Darkness", "library": library},
        ],
    })))
}

async fn insert_task(db: &Db, task: MockTask) -> Value {
    let view = task.view();
    debug!(task_id = %task.id, alias = %task.alias, "Task created");
    db.tasks.write().await.insert(task.id.clone(), task);
    view
}

async fn require_session(db: &Db, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = session_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if db.sessions.read().await.contains(token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(alias: &str) -> MockTask {
        MockTask::new(alias, Some("lib-1".into()), Map::new())
    }

    #[test]
    fn task_walks_through_statuses() {
        let mut t = task("scan");
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(t.view()["status"].as_str().unwrap().to_string());
            t.polls += 1;
        }
        assert_eq!(
            seen,
            ["pending", "processing", "processing", "processing", "completed"]
        );
    }

    #[test]
    fn processing_carries_progress() {
        let mut t = task("scan");
        t.polls = 2;
        let view = t.view();
        assert_eq!(view["progress"]["current"], 2);
        assert_eq!(view["progress"]["max"], PROCESSING_STEPS);
    }

    #[test]
    fn fail_alias_ends_in_error() {
        let mut t = task("fail");
        t.polls = PROCESSING_STEPS + 1;
        assert_eq!(t.view()["status"], "error");
    }

    #[test]
    fn bogus_alias_reports_unknown_status() {
        let mut t = task("bogus");
        t.polls = 1;
        assert_eq!(t.view()["status"], "bogus");
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; session=abc; lang=en".parse().unwrap());
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[test]
    fn missing_cookie_has_no_session() {
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
