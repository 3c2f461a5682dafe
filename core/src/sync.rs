//! Todo Synchronizer: the local todo list and its inline edit workflow.
//!
//! # Design
//! Every remote operation is two-phase. `begin_*` checks the guards, applies
//! any optimistic local change and returns a `Pending` holding the request to
//! execute. `complete` is the single completion handler: it reconciles the
//! response into the collection. Nothing else mutates the list, so the host
//! may suspend for as long as it likes between the two calls. The one-shot
//! helpers (`add_todo`, `save_edit`, ...) run both phases through a
//! `Transport` for hosts that block.
//!
//! The synchronizer reads the credential through a `SessionWatcher` and never
//! writes it. `observe_session` is the subscription reaction: absent means
//! drop everything, present means load if nothing is loaded. The collection
//! remembers the session epoch it was loaded under, so a logout followed by
//! a login with the same token still counts as a new session. Each reset
//! bumps a generation counter; a `Pending` issued under an older generation is
//! rejected as `SyncError::Stale` when it completes.
//!
//! A todo added locally is a transient entry keyed by a `LocalKey` until the
//! server answers; it is then replaced by the server's item or removed.

use std::fmt;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::TodoClient;
use crate::credential::Credential;
use crate::error::{ApiError, SyncError, TransportError};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::session::{SessionState, SessionWatcher};
use crate::types::{CreateTodo, Todo, TodoId, UpdateTodo};

/// Client-side key of a todo the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalKey(Uuid);

impl LocalKey {
    fn new() -> Self {
        LocalKey(Uuid::new_v4())
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local:{}", self.0)
    }
}

/// A todo created locally, waiting for its server identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientTodo {
    pub key: LocalKey,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoEntry {
    Persisted(Todo),
    Transient(TransientTodo),
}

impl TodoEntry {
    pub fn title(&self) -> &str {
        match self {
            TodoEntry::Persisted(todo) => &todo.title,
            TodoEntry::Transient(todo) => &todo.title,
        }
    }

    pub fn completed(&self) -> bool {
        match self {
            TodoEntry::Persisted(todo) => todo.completed,
            TodoEntry::Transient(todo) => todo.completed,
        }
    }

    pub fn as_persisted(&self) -> Option<&Todo> {
        match self {
            TodoEntry::Persisted(todo) => Some(todo),
            TodoEntry::Transient(_) => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TodoEntry::Transient(_))
    }
}

/// Ordered todo list, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoCollection {
    entries: Vec<TodoEntry>,
}

impl TodoCollection {
    pub fn from_todos(todos: Vec<Todo>) -> Self {
        Self {
            entries: todos.into_iter().map(TodoEntry::Persisted).collect(),
        }
    }

    pub fn entries(&self) -> &[TodoEntry] {
        &self.entries
    }

    /// Persisted todos in display order, skipping transient entries.
    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.entries.iter().filter_map(TodoEntry::as_persisted)
    }

    pub fn get(&self, id: &TodoId) -> Option<&Todo> {
        self.todos().find(|todo| &todo.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &TodoId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.as_persisted().is_some_and(|todo| &todo.id == id))
    }

    fn position_of_key(&self, key: LocalKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| matches!(entry, TodoEntry::Transient(t) if t.key == key))
    }

    fn push_transient_front(&mut self, title: String) -> LocalKey {
        let key = LocalKey::new();
        self.entries.insert(
            0,
            TodoEntry::Transient(TransientTodo {
                key,
                title,
                completed: false,
            }),
        );
        key
    }

    /// Swap the transient entry for the server's item, keeping its slot.
    fn confirm(&mut self, key: LocalKey, todo: Todo) {
        let slot = self.position_of_key(key);
        if self.position(&todo.id).is_some() {
            // Already present, e.g. a refresh raced the create.
            if let Some(index) = slot {
                self.entries.remove(index);
            }
            return;
        }
        match slot {
            Some(index) => self.entries[index] = TodoEntry::Persisted(todo),
            None => self.entries.insert(0, TodoEntry::Persisted(todo)),
        }
    }

    fn discard(&mut self, key: LocalKey) -> bool {
        match self.position_of_key(key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Overwrite title and completed of the item with `id`.
    fn replace_fields(&mut self, id: &TodoId, title: &str, completed: bool) -> Option<&Todo> {
        let index = self.position(id)?;
        let TodoEntry::Persisted(todo) = &mut self.entries[index] else {
            return None;
        };
        todo.title = title.to_string();
        todo.completed = completed;
        Some(todo)
    }

    fn remove(&mut self, id: &TodoId) -> Option<Todo> {
        let index = self.position(id)?;
        match self.entries.remove(index) {
            TodoEntry::Persisted(todo) => Some(todo),
            TodoEntry::Transient(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionState {
    Unloaded,
    Loading,
    Ready(TodoCollection),
    Error(ApiError),
}

impl CollectionState {
    pub fn collection(&self) -> Option<&TodoCollection> {
        match self {
            CollectionState::Ready(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CollectionState::Ready(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Viewing,
    Editing,
}

/// Working copy of one todo's editable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    id: TodoId,
    title: String,
    completed: bool,
}

impl EditDraft {
    fn seeded_from(todo: &Todo) -> Self {
        Self {
            id: todo.id.clone(),
            title: todo.title.clone(),
            completed: todo.completed,
        }
    }

    pub fn id(&self) -> &TodoId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn completed(&self) -> bool {
        self.completed
    }
}

/// One edit to the active draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftField {
    Title(String),
    Completed(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingOp {
    Load,
    Add(LocalKey),
    Save(TodoId),
    Delete(TodoId),
}

/// A request issued by `TodoSync`, waiting for its response.
#[derive(Debug, Clone)]
#[must_use = "a pending operation has no effect until it is passed to TodoSync::complete"]
pub struct Pending {
    request: HttpRequest,
    op: PendingOp,
    generation: u64,
}

impl Pending {
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Key of the transient entry this request will confirm, for creates.
    pub fn local_key(&self) -> Option<LocalKey> {
        match self.op {
            PendingOp::Add(key) => Some(key),
            _ => None,
        }
    }
}

/// What a successful `complete` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Loaded { count: usize },
    Added(Todo),
    Saved(Todo),
    Deleted(TodoId),
}

/// The session a collection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Owner {
    epoch: u64,
    credential: Credential,
}

impl Owner {
    fn of(session: SessionState) -> Option<Self> {
        let credential = session.credential?;
        Some(Owner {
            epoch: session.epoch,
            credential,
        })
    }
}

pub struct TodoSync {
    client: TodoClient,
    session: SessionWatcher,
    state: CollectionState,
    draft: Option<EditDraft>,
    loaded_for: Option<Owner>,
    generation: u64,
}

impl TodoSync {
    /// Starts `Unloaded`; call `observe_session` to pick up a credential that
    /// is already present.
    pub fn new(client: TodoClient, session: SessionWatcher) -> Self {
        Self {
            client,
            session,
            state: CollectionState::Unloaded,
            draft: None,
            loaded_for: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn collection(&self) -> Option<&TodoCollection> {
        self.state.collection()
    }

    /// Persisted todos in display order; empty unless `Ready`.
    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.collection().into_iter().flat_map(|collection| collection.todos())
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        self.draft.as_ref()
    }

    pub fn item_state(&self, id: &TodoId) -> ItemState {
        match &self.draft {
            Some(draft) if &draft.id == id => ItemState::Editing,
            _ => ItemState::Viewing,
        }
    }

    /// True if the credential moved since the last `observe_session`.
    pub fn session_changed(&self) -> bool {
        self.session.has_changed()
    }

    /// Wait until the credential moves. `false` once the session manager is
    /// gone.
    pub async fn wait_for_session_change(&mut self) -> bool {
        self.session.changed().await
    }

    // --- session reaction ---

    /// React to the current credential. Returns the list request when a load
    /// is due.
    pub fn observe_session(&mut self) -> Option<Pending> {
        let Some(owner) = Owner::of(self.session.mark_seen()) else {
            if self.loaded_for.is_some() || self.state != CollectionState::Unloaded || self.draft.is_some() {
                self.reset();
                info!("session ended; local todos discarded");
            }
            return None;
        };

        if self.loaded_for.as_ref() != Some(&owner) {
            if self.loaded_for.is_some() {
                self.reset();
                info!("session changed; local todos discarded");
            }
            self.loaded_for = Some(owner.clone());
        }

        if self.state != CollectionState::Unloaded {
            return None;
        }
        self.state = CollectionState::Loading;
        debug!("loading todo list");
        Some(self.pending(self.client.build_list_todos(&owner.credential), PendingOp::Load))
    }

    fn reset(&mut self) {
        self.state = CollectionState::Unloaded;
        self.draft = None;
        self.loaded_for = None;
        self.generation += 1;
    }

    /// The credential the current collection belongs to.
    fn credential(&mut self) -> Result<Credential, SyncError> {
        match Owner::of(self.session.snapshot()) {
            Some(owner) if self.loaded_for.as_ref() == Some(&owner) => Ok(owner.credential),
            Some(_) => {
                // Transition not observed yet.
                if self.loaded_for.is_some() {
                    self.reset();
                    info!("session changed; local todos discarded");
                }
                Err(SyncError::NotReady)
            }
            None => {
                if self.loaded_for.is_some() {
                    self.reset();
                    info!("session ended; local todos discarded");
                }
                Err(SyncError::Unauthenticated)
            }
        }
    }

    fn pending(&self, request: HttpRequest, op: PendingOp) -> Pending {
        Pending {
            request,
            op,
            generation: self.generation,
        }
    }

    // --- begin ---

    /// Fetch the list again. From `Ready` the current list stays visible
    /// until the response arrives.
    pub fn begin_reload(&mut self) -> Result<Pending, SyncError> {
        let request = self.prepare_reload()?;
        Ok(self.pending(request, PendingOp::Load))
    }

    pub fn begin_add(&mut self, title: &str) -> Result<Pending, SyncError> {
        let (request, key) = self.prepare_add(title)?;
        Ok(self.pending(request, PendingOp::Add(key)))
    }

    pub fn begin_save(&mut self) -> Result<Pending, SyncError> {
        let (request, id) = self.prepare_save()?;
        Ok(self.pending(request, PendingOp::Save(id)))
    }

    pub fn begin_delete(&mut self, id: &TodoId) -> Result<Pending, SyncError> {
        let request = self.prepare_delete(id)?;
        Ok(self.pending(request, PendingOp::Delete(id.clone())))
    }

    fn prepare_reload(&mut self) -> Result<HttpRequest, SyncError> {
        let credential = self.credential()?;
        if self.state == CollectionState::Loading {
            return Err(SyncError::LoadInFlight);
        }
        if !self.state.is_ready() {
            self.state = CollectionState::Loading;
        }
        debug!("reloading todo list");
        Ok(self.client.build_list_todos(&credential))
    }

    fn prepare_add(&mut self, title: &str) -> Result<(HttpRequest, LocalKey), SyncError> {
        let credential = self.credential()?;
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        let CollectionState::Ready(collection) = &mut self.state else {
            return Err(SyncError::NotReady);
        };
        let input = CreateTodo::new(title);
        let request = self.client.build_create_todo(&credential, &input)?;
        let key = collection.push_transient_front(input.title);
        debug!(%key, "todo added locally, awaiting server");
        Ok((request, key))
    }

    fn prepare_save(&mut self) -> Result<(HttpRequest, TodoId), SyncError> {
        let credential = self.credential()?;
        let draft = self.draft.as_ref().ok_or(SyncError::NoActiveDraft)?;
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }
        let request = self
            .client
            .build_update_todo(&credential, &draft.id, &UpdateTodo::replace(title, draft.completed))?;
        Ok((request, draft.id.clone()))
    }

    fn prepare_delete(&mut self, id: &TodoId) -> Result<HttpRequest, SyncError> {
        let credential = self.credential()?;
        let collection = self.collection().ok_or(SyncError::NotReady)?;
        if collection.get(id).is_none() {
            return Err(SyncError::UnknownTodo(id.clone()));
        }
        Ok(self.client.build_delete_todo(&credential, id))
    }

    // --- local edit state ---

    /// Open the editor on `id`. No-op returning `false` when another edit is
    /// active or `id` is not a persisted todo in a loaded list.
    pub fn start_editing(&mut self, id: &TodoId) -> bool {
        if let Some(active) = &self.draft {
            debug!(active = %active.id, requested = %id, "edit already in progress");
            return false;
        }
        let Some(draft) = self.collection().and_then(|c| c.get(id)).map(EditDraft::seeded_from) else {
            return false;
        };
        debug!(%id, "editing todo");
        self.draft = Some(draft);
        true
    }

    pub fn update_draft(&mut self, field: DraftField) -> Result<(), SyncError> {
        let draft = self.draft.as_mut().ok_or(SyncError::NoActiveDraft)?;
        match field {
            DraftField::Title(title) => draft.title = title,
            DraftField::Completed(completed) => draft.completed = completed,
        }
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        if let Some(draft) = self.draft.take() {
            debug!(id = %draft.id, "edit cancelled");
        }
    }

    // --- complete ---

    /// Reconcile the outcome of `pending` into local state.
    pub fn complete(
        &mut self,
        pending: Pending,
        outcome: Result<HttpResponse, TransportError>,
    ) -> Result<Completion, SyncError> {
        if pending.generation != self.generation {
            debug!("dropping response from a previous session");
            return Err(SyncError::Stale);
        }
        let response = outcome.map_err(ApiError::from);
        match pending.op {
            PendingOp::Load => self.finish_load(response).map(|count| Completion::Loaded { count }),
            PendingOp::Add(key) => self.finish_add(key, response).map(Completion::Added),
            PendingOp::Save(id) => self.finish_save(id, response).map(Completion::Saved),
            PendingOp::Delete(id) => self.finish_delete(&id, response).map(|()| Completion::Deleted(id)),
        }
    }

    fn finish_load(&mut self, response: Result<HttpResponse, ApiError>) -> Result<usize, SyncError> {
        let parsed = response.and_then(|r| self.client.parse_list_todos(r));
        match parsed {
            Ok(todos) => {
                let count = todos.len();
                self.state = CollectionState::Ready(TodoCollection::from_todos(todos));
                let draft_gone = self
                    .draft
                    .as_ref()
                    .is_some_and(|draft| self.state.collection().and_then(|c| c.get(&draft.id)).is_none());
                if draft_gone {
                    self.draft = None;
                }
                info!(count, "todo list loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "todo list failed to load");
                if !self.state.is_ready() {
                    self.state = CollectionState::Error(err.clone());
                }
                Err(err.into())
            }
        }
    }

    fn finish_add(&mut self, key: LocalKey, response: Result<HttpResponse, ApiError>) -> Result<Todo, SyncError> {
        let result = response.and_then(|r| self.client.parse_create_todo(r));
        let CollectionState::Ready(collection) = &mut self.state else {
            return result.map_err(SyncError::from);
        };
        match result {
            Ok(todo) => {
                collection.confirm(key, todo.clone());
                debug!(%key, id = %todo.id, "todo created");
                Ok(todo)
            }
            Err(err) => {
                collection.discard(key);
                warn!(error = %err, "todo create failed");
                Err(err.into())
            }
        }
    }

    fn finish_save(&mut self, id: TodoId, response: Result<HttpResponse, ApiError>) -> Result<Todo, SyncError> {
        let parsed = response.and_then(|r| self.client.parse_update_todo(r));
        let saved = match parsed {
            Ok(saved) => saved,
            Err(err) => {
                warn!(%id, error = %err, "todo update failed; draft kept");
                return Err(err.into());
            }
        };
        let updated = match &mut self.state {
            CollectionState::Ready(collection) => collection
                .replace_fields(&id, &saved.title, saved.completed)
                .cloned(),
            _ => None,
        };
        if self.draft.as_ref().is_some_and(|draft| draft.id == id) {
            self.draft = None;
        }
        debug!(%id, "todo updated");
        Ok(updated.unwrap_or(Todo {
            id,
            title: saved.title,
            completed: saved.completed,
        }))
    }

    fn finish_delete(&mut self, id: &TodoId, response: Result<HttpResponse, ApiError>) -> Result<(), SyncError> {
        if let Err(err) = response.and_then(|r| self.client.parse_delete_todo(r)) {
            warn!(%id, error = %err, "todo delete failed");
            return Err(err.into());
        }
        if let CollectionState::Ready(collection) = &mut self.state {
            collection.remove(id);
        }
        if self.draft.as_ref().is_some_and(|draft| &draft.id == id) {
            self.draft = None;
        }
        debug!(%id, "todo deleted");
        Ok(())
    }

    // --- one-shot helpers ---

    /// Execute `pending` through `transport` and complete it.
    pub fn run(&mut self, transport: &impl Transport, pending: Pending) -> Result<Completion, SyncError> {
        let outcome = transport.execute(pending.request());
        self.complete(pending, outcome)
    }

    /// `observe_session`, running the load it asks for.
    pub fn sync_session(&mut self, transport: &impl Transport) -> Result<Option<Completion>, SyncError> {
        match self.observe_session() {
            Some(pending) => self.run(transport, pending).map(Some),
            None => Ok(None),
        }
    }

    pub fn reload(&mut self, transport: &impl Transport) -> Result<usize, SyncError> {
        let request = self.prepare_reload()?;
        let outcome = execute(transport, &request);
        self.finish_load(outcome)
    }

    pub fn add_todo(&mut self, transport: &impl Transport, title: &str) -> Result<Todo, SyncError> {
        let (request, key) = self.prepare_add(title)?;
        let outcome = execute(transport, &request);
        self.finish_add(key, outcome)
    }

    pub fn save_edit(&mut self, transport: &impl Transport) -> Result<Todo, SyncError> {
        let (request, id) = self.prepare_save()?;
        let outcome = execute(transport, &request);
        self.finish_save(id, outcome)
    }

    pub fn delete_todo(&mut self, transport: &impl Transport, id: &TodoId) -> Result<(), SyncError> {
        let request = self.prepare_delete(id)?;
        let outcome = execute(transport, &request);
        self.finish_delete(id, outcome)
    }
}

fn execute(transport: &impl Transport, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
    transport.execute(request).map_err(ApiError::from)
}
