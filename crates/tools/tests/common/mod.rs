//! In-memory todo service and a handle on a spawned tool process.
#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use todoclaw_core::protocol::Frame;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub const GOOD_TOKEN: &str = "good-token";

#[derive(Default)]
struct Store {
    todos: BTreeMap<i64, Value>,
    next_id: i64,
}

type Shared = Arc<Mutex<Store>>;
type Reply = (StatusCode, Json<Value>);

fn check_auth(headers: &HeaderMap) -> Result<(), Reply> {
    let ok = headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer good-token");
    if ok {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, Json(json!({"detail": "Could not validate credentials"}))))
    }
}

fn not_found() -> Reply {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Todo not found"})))
}

async fn list(State(store): State<Shared>, headers: HeaderMap) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    let store = store.lock().unwrap();
    let todos: Vec<Value> = store.todos.values().cloned().collect();
    let total = todos.len();
    (
        StatusCode::OK,
        Json(json!({"todos": todos, "total": total, "page": 1, "page_size": 10, "total_pages": 1})),
    )
}

async fn create(State(store): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    let mut store = store.lock().unwrap();
    store.next_id += 1;
    let id = store.next_id;
    let todo = json!({
        "id": id,
        "name": body["name"],
        "description": body.get("description").cloned().unwrap_or(Value::Null),
        "creation_date": "2025-01-01T08:00:00",
        "due_date": body.get("due_date").cloned().unwrap_or(Value::Null),
        "created_by": 1,
        "is_completed": false,
        "completed_at": null
    });
    store.todos.insert(id, todo.clone());
    (StatusCode::OK, Json(todo))
}

async fn fetch(State(store): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    match store.lock().unwrap().todos.get(&id) {
        Some(todo) => (StatusCode::OK, Json(todo.clone())),
        None => not_found(),
    }
}

async fn update(
    State(store): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    let mut store = store.lock().unwrap();
    let Some(todo) = store.todos.get_mut(&id) else {
        return not_found();
    };
    if let (Some(target), Some(fields)) = (todo.as_object_mut(), body.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
    (StatusCode::OK, Json(todo.clone()))
}

async fn remove(State(store): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    match store.lock().unwrap().todos.remove(&id) {
        Some(_) => (StatusCode::OK, Json(json!({"message": "Todo deleted successfully"}))),
        None => not_found(),
    }
}

async fn toggle(State(store): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    if let Err(e) = check_auth(&headers) {
        return e;
    }
    let mut store = store.lock().unwrap();
    let Some(todo) = store.todos.get_mut(&id) else {
        return not_found();
    };
    let done = !todo["is_completed"].as_bool().unwrap_or(false);
    todo["is_completed"] = json!(done);
    todo["completed_at"] = if done { json!("2025-01-02T10:00:00") } else { Value::Null };
    (StatusCode::OK, Json(todo.clone()))
}

/// Start the fake todo service on an ephemeral port; returns its base URL.
pub async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/api/todos", get(list).post(create))
        .route("/api/todos/{id}", get(fetch).put(update).delete(remove))
        .route("/api/todos/{id}/toggle-complete", patch(toggle))
        .with_state(Shared::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A running `todoclaw-tools` binary with piped stdio.
pub struct ToolProcess {
    pub child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ToolProcess {
    pub fn spawn(env: &[(&str, &str)]) -> Self {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_todoclaw-tools"));
        cmd.env_remove("TODOCLAW_AUTH_TOKEN")
            .env_remove("TODOCLAW_API_BASE_URL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().unwrap();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().unwrap();
        Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        }
    }

    pub fn with_credential(token: &str, base_url: &str) -> Self {
        Self::spawn(&[("TODOCLAW_AUTH_TOKEN", token), ("TODOCLAW_API_BASE_URL", base_url)])
    }

    pub async fn send_raw(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().unwrap();
        stdin.write_all(line.as_bytes()).await.unwrap();
        stdin.write_all(b"\n").await.unwrap();
        stdin.flush().await.unwrap();
    }

    pub async fn send(&mut self, frame: &Frame) {
        let line = frame.encode().unwrap();
        self.send_raw(line.trim_end()).await;
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .expect("tool process did not answer in time")
            .unwrap()?;
        Some(Frame::decode(&line).unwrap())
    }

    /// Send a call frame and return the answer.
    pub async fn call(&mut self, id: &str, tool: &str, arguments: Value) -> Frame {
        self.send(&Frame::Call {
            id: id.into(),
            tool: tool.into(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        })
        .await;
        self.recv().await.expect("tool process closed stdout")
    }

    pub async fn handshake(&mut self) -> Frame {
        self.send(&Frame::init()).await;
        self.recv().await.expect("no capabilities frame")
    }

    /// Close stdin and wait for the exit status.
    pub async fn finish(mut self) -> std::process::ExitStatus {
        drop(self.stdin.take());
        tokio::time::timeout(Duration::from_secs(10), self.child.wait())
            .await
            .expect("tool process did not exit")
            .unwrap()
    }
}
