//! Command implementations for the `todo` binary.
//!
//! Each command runs against a `SessionManager` rehydrated from the token
//! file and a `TodoSync` subscribed to it. A rejected credential on any
//! authenticated command ends the local session.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use todo_sync::{
    register, DraftField, FileCredentialStore, RegisterRequest, SessionManager, SyncError, Todo, TodoClient,
    TodoId, TodoSync, Transport,
};
use tracing::{debug, info};

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub token_file: PathBuf,
}

/// Field changes requested by `todo edit`.
#[derive(Debug, Default, Clone)]
pub struct EditArgs {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

pub struct App<T> {
    client: TodoClient,
    session: SessionManager,
    sync: TodoSync,
    transport: T,
}

impl<T: Transport> App<T> {
    pub fn new(config: &Config, transport: T) -> Self {
        let client = TodoClient::new(&config.server);
        let session = SessionManager::with_store(FileCredentialStore::new(config.token_file.clone()));
        let sync = TodoSync::new(TodoClient::new(&config.server), session.subscribe());
        Self {
            client,
            session,
            sync,
            transport,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn register(&self, username: &str, password: &str, email: &str) -> Result<()> {
        let input = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: email.to_string(),
        };
        register(&self.client, &self.transport, &input).context("registration failed")?;
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        self.session
            .sign_in(&self.client, &self.transport, username, password)
            .context("login failed")?;
        info!(username, "logged in");
        Ok(())
    }

    /// Returns `false` if there was no session to end.
    pub fn logout(&self) -> Result<bool> {
        if !self.session.is_authenticated() {
            return Ok(false);
        }
        self.session
            .sign_out(&self.client, &self.transport)
            .context("server did not acknowledge logout; local session cleared")?;
        Ok(true)
    }

    pub fn list(&mut self) -> Result<Vec<Todo>> {
        self.load()?;
        Ok(self.sync.todos().cloned().collect())
    }

    pub fn add(&mut self, title: &str) -> Result<Todo> {
        self.load()?;
        let result = self.sync.add_todo(&self.transport, title);
        self.check(result)
    }

    pub fn edit(&mut self, id: &TodoId, args: EditArgs) -> Result<Todo> {
        if args.title.is_none() && args.completed.is_none() {
            bail!("nothing to change; pass --title, --done or --undone");
        }
        self.load()?;
        if !self.sync.start_editing(id) {
            bail!("no todo with id {id}");
        }
        if let Some(title) = args.title {
            self.sync.update_draft(DraftField::Title(title))?;
        }
        if let Some(completed) = args.completed {
            self.sync.update_draft(DraftField::Completed(completed))?;
        }
        let result = self.sync.save_edit(&self.transport);
        self.check(result)
    }

    pub fn delete(&mut self, id: &TodoId) -> Result<()> {
        self.load()?;
        let result = self.sync.delete_todo(&self.transport, id);
        self.check(result)
    }

    fn load(&mut self) -> Result<()> {
        if !self.session.is_authenticated() {
            bail!("not logged in; run `todo login` first");
        }
        let result = self.sync.sync_session(&self.transport);
        let completion = self.check(result)?;
        debug!(?completion, "session synchronized");
        Ok(())
    }

    /// Ends the session when the server stopped accepting the credential.
    fn check<R>(&self, result: Result<R, SyncError>) -> Result<R> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if err.is_auth_rejected() => {
                self.session.logout();
                Err(err).context("session expired; run `todo login` again")
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// One line of `todo list` output.
pub fn format_todo(todo: &Todo) -> String {
    let mark = if todo.completed { "x" } else { " " };
    format!("[{mark}] {:>4}  {}", todo.id, todo.title)
}
