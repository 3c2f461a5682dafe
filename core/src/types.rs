//! Domain DTOs for the todo API.
//!
//! # Design
//! These types mirror the remote store's schema but are defined
//! independently from the mock-server crate; integration tests catch any
//! schema drift between the two.
//!
//! `TodoId` is opaque: stores in the wild hand out either hex object ids or
//! integers, so it accepts both on the wire and always renders as text in
//! request paths.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier assigned by the remote store. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TodoId {
    fn from(id: &str) -> Self {
        TodoId(id.to_string())
    }
}

impl From<String> for TodoId {
    fn from(id: String) -> Self {
        TodoId(id)
    }
}

impl From<u64> for TodoId {
    fn from(id: u64) -> Self {
        TodoId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for TodoId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => TodoId(id),
            RawId::Number(id) => TodoId(id.to_string()),
        })
    }
}

/// A single todo item returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Request payload for creating a new todo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

impl CreateTodo {
    /// A fresh, not yet completed todo.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed: false,
        }
    }
}

/// Request payload for updating an existing todo. Only the fields present in
/// the JSON are applied; omitted fields remain unchanged on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTodo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl UpdateTodo {
    /// Replace both editable fields.
    pub fn replace(title: impl Into<String>, completed: bool) -> Self {
        Self {
            title: Some(title.into()),
            completed: Some(completed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Body the remote store sends alongside a failure status.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
