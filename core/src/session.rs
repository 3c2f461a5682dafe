//! Session Manager: owner of the bearer credential.
//!
//! # Design
//! The credential lives in a `tokio::sync::watch` channel. `SessionManager`
//! holds the only sender, so it is the sole mutator; consumers such as
//! `TodoSync` receive a `SessionWatcher` at construction and can only read
//! the value and notice that it changed. No runtime is needed for any of
//! this: `watch` works from synchronous code, and `SessionWatcher::changed`
//! is there for hosts that do run one.
//!
//! Every login or logout transition bumps an epoch stored next to the
//! credential. A watcher that missed a logout followed by a login with the
//! same token still sees a different epoch.
//!
//! Persistence is best effort. A failing `CredentialStore` is logged and
//! never prevents `login` or `logout` from taking effect locally.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::TodoClient;
use crate::credential::{Credential, CredentialStore};
use crate::error::{ApiError, TransportError};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::types::{LoginRequest, RegisterRequest};

/// The credential together with the transition that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SessionState {
    pub(crate) epoch: u64,
    pub(crate) credential: Option<Credential>,
}

pub struct SessionManager {
    state: watch::Sender<SessionState>,
    store: Option<Box<dyn CredentialStore>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// A manager with no credential and no durable storage.
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state, store: None }
    }

    /// A manager backed by `store`, rehydrated from whatever it holds.
    pub fn with_store(store: impl CredentialStore + 'static) -> Self {
        let restored = match store.load() {
            Ok(restored) => restored,
            Err(err) => {
                warn!(error = %err, "could not read stored credential");
                None
            }
        };
        if restored.is_some() {
            info!("restored credential from storage");
        }
        let (state, _) = watch::channel(SessionState {
            epoch: 0,
            credential: restored,
        });
        Self {
            state,
            store: Some(Box::new(store)),
        }
    }

    /// Make `token` the session credential. Trusts the caller; no validation.
    pub fn login(&self, token: impl Into<Credential>) {
        let credential = token.into();
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&credential) {
                warn!(error = %err, "could not persist credential");
            }
        }
        let changed = self.state.send_if_modified(|state| {
            if state.credential.as_ref() == Some(&credential) {
                return false;
            }
            state.epoch += 1;
            state.credential = Some(credential);
            true
        });
        if changed {
            info!("session authenticated");
        }
    }

    /// Drop the credential unconditionally.
    pub fn logout(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.clear() {
                warn!(error = %err, "could not clear stored credential");
            }
        }
        let ended = self.state.send_if_modified(|state| {
            if state.credential.take().is_none() {
                return false;
            }
            state.epoch += 1;
            true
        });
        if ended {
            info!("session ended");
        }
    }

    pub fn current_credential(&self) -> Option<Credential> {
        self.state.borrow().credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().credential.is_some()
    }

    /// A read-only view of the credential that notices transitions.
    pub fn subscribe(&self) -> SessionWatcher {
        SessionWatcher {
            state: self.state.subscribe(),
        }
    }

    /// Exchange username and password for a credential and log in with it.
    /// On failure the session is left as it was.
    pub fn sign_in(
        &self,
        client: &TodoClient,
        transport: &impl Transport,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let request = client.build_login(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let credential = client.parse_login(transport.execute(&request)?)?;
        debug!(username, "login accepted");
        self.login(credential);
        Ok(())
    }

    /// The remote logout notification for the current credential, if any.
    pub fn begin_sign_out(&self, client: &TodoClient) -> Option<HttpRequest> {
        self.current_credential().map(|credential| client.build_logout(&credential))
    }

    /// Completion of `begin_sign_out`. The local session is always cleared;
    /// a remote failure is logged and handed back for reporting.
    pub fn finish_sign_out(
        &self,
        client: &TodoClient,
        outcome: Result<HttpResponse, TransportError>,
    ) -> Result<(), ApiError> {
        let remote = outcome
            .map_err(ApiError::from)
            .and_then(|response| client.parse_logout(response));
        if let Err(err) = &remote {
            warn!(error = %err, "remote logout failed; clearing local session anyway");
        }
        self.logout();
        remote
    }

    /// Notify the remote store, then clear the local session regardless.
    pub fn sign_out(&self, client: &TodoClient, transport: &impl Transport) -> Result<(), ApiError> {
        let Some(request) = self.begin_sign_out(client) else {
            self.logout();
            return Ok(());
        };
        let outcome = transport.execute(&request);
        self.finish_sign_out(client, outcome)
    }
}

/// Create an account. Does not touch any session state.
pub fn register(client: &TodoClient, transport: &impl Transport, input: &RegisterRequest) -> Result<(), ApiError> {
    let request = client.build_register(input)?;
    client.parse_register(transport.execute(&request)?)?;
    debug!(username = %input.username, "account registered");
    Ok(())
}

/// Read side of the session credential.
#[derive(Debug, Clone)]
pub struct SessionWatcher {
    state: watch::Receiver<SessionState>,
}

impl SessionWatcher {
    pub fn current(&self) -> Option<Credential> {
        self.state.borrow().credential.clone()
    }

    /// Current credential and epoch, without marking them as seen.
    pub(crate) fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// True if the credential changed since this watcher last looked.
    pub fn has_changed(&self) -> bool {
        self.state.has_changed().unwrap_or(false)
    }

    /// Current value, marking it as seen.
    pub(crate) fn mark_seen(&mut self) -> SessionState {
        self.state.borrow_and_update().clone()
    }

    /// Wait for the next transition. Returns `false` once the
    /// `SessionManager` is gone and no further transitions can happen.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }
}
