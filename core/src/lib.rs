//! Session and list-synchronization core for the todo service.
//!
//! # Overview
//! Two components, coupled only through the session credential:
//!
//! - `SessionManager` owns the bearer credential and the login/logout
//!   transitions, and hands out read-only `SessionWatcher`s.
//! - `TodoSync` owns the local todo list and the single edit draft. It reacts
//!   to credential transitions, issues create/update/delete requests and
//!   reconciles the responses.
//!
//! # Design
//! - The core never touches the network (host-does-IO pattern). `TodoClient`
//!   builds `HttpRequest` values and parses `HttpResponse` values; the host
//!   executes them, either by hand or through a `Transport`.
//! - `TodoClient` is stateless: it holds only `base_url`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod credential;
pub mod error;
pub mod http;
pub mod session;
pub mod sync;
pub mod types;

pub use client::TodoClient;
pub use credential::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ApiError, StoreError, SyncError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use session::{register, SessionManager, SessionWatcher};
pub use sync::{
    CollectionState, Completion, DraftField, EditDraft, ItemState, LocalKey, Pending, TodoCollection, TodoEntry,
    TodoSync, TransientTodo,
};
pub use types::{CreateTodo, LoginRequest, LoginResponse, RegisterRequest, Todo, TodoId, UpdateTodo};
