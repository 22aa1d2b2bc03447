//! Todo routes guarded by the admission middleware.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A single todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub task: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /todos`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTodo {
    pub task: String,
    #[serde(default)]
    pub done: bool,
}

/// In-process todo list.
#[derive(Debug, Default)]
pub struct TodoStore {
    todos: RwLock<Vec<Todo>>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Todo> {
        self.todos.read().clone()
    }

    /// Append a todo and return it with its assigned id.
    pub fn add(&self, new: NewTodo) -> Todo {
        let mut todos = self.todos.write();
        let todo = Todo {
            id: todos.last().map_or(1, |t| t.id + 1),
            task: new.task,
            done: new.done,
            created_at: Utc::now(),
        };
        todos.push(todo.clone());
        todo
    }
}

/// `GET /todos` and `POST /todos`.
pub fn routes(store: Arc<TodoStore>) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(add_todo))
        .with_state(store)
}

async fn list_todos(State(store): State<Arc<TodoStore>>) -> Json<Vec<Todo>> {
    Json(store.list())
}

async fn add_todo(
    State(store): State<Arc<TodoStore>>,
    Json(new): Json<NewTodo>,
) -> (StatusCode, Json<Todo>) {
    let todo = store.add(new);
    info!(id = todo.id, task = %todo.task, "Added new todo");
    (StatusCode::CREATED, Json(todo))
}
