use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, Todo, TokenResponse};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<String> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.to_string()).unwrap()
}

fn bare_request(method: &str, uri: &str, token: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(String::new())
        .unwrap()
}

async fn send(app: &Router, request: Request<String>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

/// Register `username` and return a fresh token for it.
async fn sign_up(app: &Router, username: &str) -> String {
    let body = format!(r#"{{"username":"{username}","password":"pw","email":"{username}@example.com"}}"#);
    let resp = send(app, json_request("POST", "/user/register", None, &body)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body = format!(r#"{{"username":"{username}","password":"pw"}}"#);
    let resp = send(app, json_request("POST", "/user/login", None, &body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json::<TokenResponse>(resp).await.token
}

// --- auth ---

#[tokio::test]
async fn todos_require_a_token() {
    let app = app();
    let resp = send(&app, Request::builder().uri("/todos").body(String::new()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "No token provided");
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let app = app();
    let resp = send(&app, bare_request("GET", "/todos", "forged")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    sign_up(&app, "ada").await;
    let resp = send(
        &app,
        json_request("POST", "/user/register", None, r#"{"username":"ada","password":"other"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = app();
    sign_up(&app, "ada").await;
    let resp = send(
        &app,
        json_request("POST", "/user/login", None, r#"{"username":"ada","password":"nope"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_token() {
    let app = app();
    let token = sign_up(&app, "ada").await;

    let resp = send(&app, json_request("POST", "/user/logout", Some(&token), "{}")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, bare_request("GET", "/todos", &token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn todos_are_private_to_their_owner() {
    let app = app();
    let ada = sign_up(&app, "ada").await;
    let bob = sign_up(&app, "bob").await;

    let resp = send(&app, json_request("POST", "/todos", Some(&ada), r#"{"title":"Ada's"}"#)).await;
    let created: Todo = body_json(resp).await;

    let resp = send(&app, bare_request("GET", "/todos", &bob)).await;
    let todos: Vec<Todo> = body_json(resp).await;
    assert!(todos.is_empty());

    let resp = send(&app, bare_request("DELETE", &format!("/todos/{}", created.id), &bob)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- create ---

#[tokio::test]
async fn create_todo_returns_201() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, json_request("POST", "/todos", Some(&token), r#"{"title":"Buy milk"}"#)).await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let todo: Todo = body_json(resp).await;
    assert_eq!(todo.title, "Buy milk");
    assert!(!todo.completed);
}

#[tokio::test]
async fn create_todo_malformed_json_returns_422() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, json_request("POST", "/todos", Some(&token), r#"{"not_title":1}"#)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_todo_blank_title_returns_422() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, json_request("POST", "/todos", Some(&token), r#"{"title":"   "}"#)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "title must not be empty");
}

// --- get / update / delete ---

#[tokio::test]
async fn get_todo_bad_id_returns_400() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, bare_request("GET", "/todos/not-a-number", &token)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_todo_not_found() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, json_request("PUT", "/todos/999", Some(&token), r#"{"title":"Nope"}"#)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_todo_not_found() {
    let app = app();
    let token = sign_up(&app, "ada").await;
    let resp = send(&app, bare_request("DELETE", "/todos/999", &token)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- full CRUD lifecycle ---

#[tokio::test]
async fn crud_lifecycle() {
    use tower::Service;

    let router = app();
    let token = sign_up(&router, "ada").await;
    let mut app = router.into_service();

    // create two; the list comes back newest first
    for title in ["Walk dog", "Buy milk"] {
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(json_request("POST", "/todos", Some(&token), &format!(r#"{{"title":"{title}"}}"#)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(bare_request("GET", "/todos", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let todos: Vec<Todo> = body_json(resp).await;
    assert_eq!(
        todos.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
        vec!["Buy milk", "Walk dog"]
    );
    let id = todos[1].id;

    // update, full pair
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PUT",
            &format!("/todos/{id}"),
            Some(&token),
            r#"{"title":"Walk cat","completed":true}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Todo = body_json(resp).await;
    assert_eq!(updated.id, id);
    assert_eq!(updated.title, "Walk cat");
    assert!(updated.completed);

    // update, partial: only completed
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request("PUT", &format!("/todos/{id}"), Some(&token), r#"{"completed":false}"#))
        .await
        .unwrap();
    let updated: Todo = body_json(resp).await;
    assert_eq!(updated.title, "Walk cat"); // unchanged
    assert!(!updated.completed);

    // get
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(bare_request("GET", &format!("/todos/{id}"), &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Todo = body_json(resp).await;
    assert_eq!(fetched, updated);

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(bare_request("DELETE", &format!("/todos/{id}"), &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete is 404
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(bare_request("GET", &format!("/todos/{id}"), &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
