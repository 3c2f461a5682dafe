use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Default)]
pub struct Store {
    /// username -> password
    users: HashMap<String, String>,
    /// token -> username
    tokens: HashMap<String, String>,
    /// username -> todos, oldest first
    todos: HashMap<String, Vec<Todo>>,
    next_id: u64,
}

pub type Db = Arc<RwLock<Store>>;

/// Who a bearer token belongs to, attached to authenticated requests.
#[derive(Clone, Debug)]
struct Caller {
    username: String,
    token: String,
}

/// Failure status with an `{"error": ...}` body.
#[derive(Debug)]
struct Failure(StatusCode, &'static str);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

pub fn app() -> Router {
    let db = Db::default();
    let protected = Router::new()
        .route("/user/logout", post(logout))
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", get(get_todo).put(update_todo).delete(delete_todo))
        .route_layer(middleware::from_fn_with_state(db.clone(), require_bearer));

    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .merge(protected)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_bearer(State(db): State<Db>, mut request: Request, next: Next) -> Result<Response, Failure> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(Failure(StatusCode::UNAUTHORIZED, "No token provided"))?;
    let username = db
        .read()
        .await
        .tokens
        .get(&token)
        .cloned()
        .ok_or(Failure(StatusCode::UNAUTHORIZED, "Invalid token"))?;
    request.extensions_mut().insert(Caller { username, token });
    Ok(next.run(request).await)
}

async fn register(
    State(db): State<Db>,
    Json(input): Json<Credentials>,
) -> Result<(StatusCode, Json<serde_json::Value>), Failure> {
    if input.username.trim().is_empty() || input.password.is_empty() {
        return Err(Failure(StatusCode::BAD_REQUEST, "Invalid data"));
    }
    let mut store = db.write().await;
    if store.users.contains_key(&input.username) {
        return Err(Failure(StatusCode::CONFLICT, "username already exists"));
    }
    debug!(username = %input.username, email = %input.email, "user registered");
    store.users.insert(input.username, input.password);
    Ok((StatusCode::CREATED, Json(json!({ "message": "User registered" }))))
}

async fn login(State(db): State<Db>, Json(input): Json<Credentials>) -> Result<Json<TokenResponse>, Failure> {
    let mut store = db.write().await;
    if store.users.get(&input.username) != Some(&input.password) {
        return Err(Failure(StatusCode::UNAUTHORIZED, "invalid username or password"));
    }
    let token = Uuid::new_v4().to_string();
    store.tokens.insert(token.clone(), input.username.clone());
    info!(username = %input.username, "user logged in");
    Ok(Json(TokenResponse { token }))
}

async fn logout(State(db): State<Db>, Extension(caller): Extension<Caller>) -> Json<serde_json::Value> {
    db.write().await.tokens.remove(&caller.token);
    info!(username = %caller.username, "user logged out");
    Json(json!({ "message": "Logged out" }))
}

async fn list_todos(State(db): State<Db>, Extension(caller): Extension<Caller>) -> Json<Vec<Todo>> {
    let store = db.read().await;
    let todos = store.todos.get(&caller.username);
    Json(todos.into_iter().flatten().rev().cloned().collect())
}

async fn create_todo(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(input): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), Failure> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(Failure(StatusCode::UNPROCESSABLE_ENTITY, "title must not be empty"));
    }
    let mut store = db.write().await;
    store.next_id += 1;
    let todo = Todo {
        id: store.next_id,
        title: title.to_string(),
        completed: input.completed,
    };
    store.todos.entry(caller.username).or_default().push(todo.clone());
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn get_todo(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<u64>,
) -> Result<Json<Todo>, Failure> {
    let store = db.read().await;
    store
        .todos
        .get(&caller.username)
        .and_then(|todos| todos.iter().find(|todo| todo.id == id))
        .cloned()
        .map(Json)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Todo not found"))
}

async fn update_todo(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateTodo>,
) -> Result<Json<Todo>, Failure> {
    if input.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(Failure(StatusCode::UNPROCESSABLE_ENTITY, "title must not be empty"));
    }
    let mut store = db.write().await;
    let todo = store
        .todos
        .get_mut(&caller.username)
        .and_then(|todos| todos.iter_mut().find(|todo| todo.id == id))
        .ok_or(Failure(StatusCode::NOT_FOUND, "Todo not found"))?;
    if let Some(title) = input.title {
        todo.title = title.trim().to_string();
    }
    if let Some(completed) = input.completed {
        todo.completed = completed;
    }
    Ok(Json(todo.clone()))
}

async fn delete_todo(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Failure> {
    let mut store = db.write().await;
    let todos = store
        .todos
        .get_mut(&caller.username)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Todo not found"))?;
    let index = todos
        .iter()
        .position(|todo| todo.id == id)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Todo not found"))?;
    todos.remove(index);
    Ok(StatusCode::NO_CONTENT)
}
