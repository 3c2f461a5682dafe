//! Stateless HTTP request builder and response parser for the todo API.
//!
//! # Design
//! `TodoClient` holds only a `base_url` and carries no mutable state between
//! calls. Each remote operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. The caller executes the actual HTTP round trip, keeping
//! the core deterministic and free of I/O dependencies.
//!
//! Builders for authenticated routes take a `&Credential`. Without one there
//! is no way to produce the request, which is how "no credential, no call"
//! is enforced.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::credential::Credential;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    CreateTodo, ErrorBody, LoginRequest, LoginResponse, RegisterRequest, Todo, TodoId, UpdateTodo,
};

/// Synchronous, stateless client for the todo API.
#[derive(Debug, Clone)]
pub struct TodoClient {
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --- session ---

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/user/login", None, input)
    }

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/user/register", None, input)
    }

    pub fn build_logout(&self, credential: &Credential) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            path: self.url("/user/logout"),
            headers: vec![
                authorization(credential),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body: Some("{}".to_string()),
        }
    }

    pub fn parse_login(&self, response: HttpResponse) -> Result<Credential, ApiError> {
        check_status(&response)?;
        let login: LoginResponse = decode(&response)?;
        if login.token.trim().is_empty() {
            return Err(ApiError::DeserializationError("login response carried an empty token".to_string()));
        }
        Ok(Credential::new(login.token))
    }

    pub fn parse_register(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    pub fn parse_logout(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    // --- todos ---

    pub fn build_list_todos(&self, credential: &Credential) -> HttpRequest {
        self.bare_request(HttpMethod::Get, "/todos".to_string(), credential)
    }

    pub fn build_get_todo(&self, credential: &Credential, id: &TodoId) -> HttpRequest {
        self.bare_request(HttpMethod::Get, format!("/todos/{id}"), credential)
    }

    pub fn build_create_todo(&self, credential: &Credential, input: &CreateTodo) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, "/todos", Some(credential), input)
    }

    pub fn build_update_todo(
        &self,
        credential: &Credential,
        id: &TodoId,
        input: &UpdateTodo,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Put, &format!("/todos/{id}"), Some(credential), input)
    }

    pub fn build_delete_todo(&self, credential: &Credential, id: &TodoId) -> HttpRequest {
        self.bare_request(HttpMethod::Delete, format!("/todos/{id}"), credential)
    }

    pub fn parse_list_todos(&self, response: HttpResponse) -> Result<Vec<Todo>, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn parse_get_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn parse_create_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn parse_update_todo(&self, response: HttpResponse) -> Result<Todo, ApiError> {
        check_status(&response)?;
        decode(&response)
    }

    pub fn parse_delete_todo(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    fn bare_request(&self, method: HttpMethod, route: String, credential: &Credential) -> HttpRequest {
        HttpRequest {
            method,
            path: self.url(&route),
            headers: vec![authorization(credential)],
            body: None,
        }
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        route: &str,
        credential: Option<&Credential>,
        input: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut headers: Vec<(String, String)> = credential.map(authorization).into_iter().collect();
        headers.push(("content-type".to_string(), "application/json".to_string()));
        Ok(HttpRequest {
            method,
            path: self.url(route),
            headers,
            body: Some(body),
        })
    }
}

fn authorization(credential: &Credential) -> (String, String) {
    ("authorization".to_string(), credential.bearer())
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    match response.status {
        401 | 403 => Err(ApiError::AuthRejected(error_message(response))),
        404 => Err(ApiError::NotFound),
        400 | 409 | 422 => Err(ApiError::ValidationFailure(error_message(response))),
        status => Err(ApiError::HttpError {
            status,
            body: response.body.clone(),
        }),
    }
}

/// The `error` field of a JSON failure body, or the raw body otherwise.
fn error_message(response: &HttpResponse) -> String {
    match serde_json::from_str::<ErrorBody>(&response.body) {
        Ok(body) => body.error,
        Err(_) if response.body.trim().is_empty() => format!("HTTP {}", response.status),
        Err(_) => response.body.trim().to_string(),
    }
}
