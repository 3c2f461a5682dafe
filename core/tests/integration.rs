//! Full session and todo lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `SessionManager` and
//! `TodoSync` over real HTTP using ureq. Validates that request building,
//! response parsing and local reconciliation agree with the actual server.
//!
//! `Ureq` below deliberately duplicates `UreqTransport` from the `todo-cli`
//! crate, which core cannot depend on. Keep the two in step.

use todo_sync::{
    register, ApiError, CollectionState, Completion, DraftField, HttpMethod, HttpRequest, HttpResponse,
    RegisterRequest, SessionManager, SyncError, TodoClient, TodoSync, Transport, TransportError,
};

/// Executes requests with ureq.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`, letting the core
/// client handle status interpretation.
struct Ureq {
    agent: ureq::Agent,
}

impl Ureq {
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for Ureq {
    fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let body = req.body.as_deref();
        let result = match req.method {
            HttpMethod::Get => with_headers(self.agent.get(&req.path), &req.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(&req.path), &req.headers).call(),
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(&req.path), &req.headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(self.agent.put(&req.path), &req.headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = result.map_err(|err| TransportError(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }
}

/// Start the mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn account(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: "hunter2".to_string(),
        email: format!("{username}@example.com"),
    }
}

#[test]
fn session_and_todo_lifecycle() {
    let base_url = start_server();
    let client = TodoClient::new(&base_url);
    let transport = Ureq::new();
    let session = SessionManager::new();
    let mut sync = TodoSync::new(TodoClient::new(&base_url), session.subscribe());

    // Step 1: nothing works before login.
    assert_eq!(
        sync.add_todo(&transport, "Too early").unwrap_err(),
        SyncError::Unauthenticated
    );

    // Step 2: register and sign in.
    register(&client, &transport, &account("ada")).unwrap();
    let err = session.sign_in(&client, &transport, "ada", "wrong").unwrap_err();
    assert!(err.is_auth_rejected(), "got {err:?}");
    assert!(!session.is_authenticated());
    session.sign_in(&client, &transport, "ada", "hunter2").unwrap();
    assert!(session.is_authenticated());

    // Step 3: the list loads for the new credential, empty.
    let loaded = sync.sync_session(&transport).unwrap();
    assert_eq!(loaded, Some(Completion::Loaded { count: 0 }));

    // Step 4: add two todos; newest first, with server ids.
    let walk = sync.add_todo(&transport, "Walk dog").unwrap();
    let milk = sync.add_todo(&transport, "  Buy milk ").unwrap();
    assert_eq!(milk.title, "Buy milk");
    assert!(!milk.completed);
    assert_ne!(walk.id, milk.id);
    let titles: Vec<_> = sync.todos().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Buy milk", "Walk dog"]);

    // Step 5: edit and save.
    assert!(sync.start_editing(&walk.id));
    sync.update_draft(DraftField::Title("Walk cat".to_string())).unwrap();
    sync.update_draft(DraftField::Completed(true)).unwrap();
    let saved = sync.save_edit(&transport).unwrap();
    assert_eq!(saved.id, walk.id);
    assert_eq!(saved.title, "Walk cat");
    assert!(saved.completed);
    assert!(sync.draft().is_none());

    // Step 6: delete.
    sync.delete_todo(&transport, &milk.id).unwrap();
    assert_eq!(sync.todos().count(), 1);

    // Step 7: a fresh load agrees with local state.
    assert_eq!(sync.reload(&transport).unwrap(), 1);
    assert_eq!(sync.todos().next(), Some(&saved));

    // Step 8: the server side of a deleted todo is gone.
    let credential = session.current_credential().unwrap();
    let response = transport.execute(&client.build_get_todo(&credential, &milk.id)).unwrap();
    assert_eq!(client.parse_get_todo(response).unwrap_err(), ApiError::NotFound);

    // Step 9: sign out clears local state and revokes the token remotely.
    session.sign_out(&client, &transport).unwrap();
    assert!(sync.observe_session().is_none());
    assert_eq!(sync.state(), &CollectionState::Unloaded);
    assert_eq!(sync.todos().count(), 0);
    assert_eq!(
        sync.add_todo(&transport, "After logout").unwrap_err(),
        SyncError::Unauthenticated
    );
    let response = transport.execute(&client.build_list_todos(&credential)).unwrap();
    assert!(client.parse_list_todos(response).unwrap_err().is_auth_rejected());
}

#[test]
fn revoked_token_surfaces_as_auth_rejected() {
    let base_url = start_server();
    let client = TodoClient::new(&base_url);
    let transport = Ureq::new();
    let session = SessionManager::new();

    register(&client, &transport, &account("bob")).unwrap();
    session.sign_in(&client, &transport, "bob", "hunter2").unwrap();

    // Revoke server-side without telling the session.
    let credential = session.current_credential().unwrap();
    let response = transport.execute(&client.build_logout(&credential)).unwrap();
    client.parse_logout(response).unwrap();

    let mut sync = TodoSync::new(TodoClient::new(&base_url), session.subscribe());
    let err = sync.sync_session(&transport).unwrap_err();
    assert!(err.is_auth_rejected(), "got {err:?}");
    assert!(matches!(sync.state(), CollectionState::Error(ApiError::AuthRejected(_))));
    assert!(session.is_authenticated());
}

#[test]
fn each_user_sees_only_their_todos() {
    let base_url = start_server();
    let client = TodoClient::new(&base_url);
    let transport = Ureq::new();

    let ada = SessionManager::new();
    register(&client, &transport, &account("ada")).unwrap();
    ada.sign_in(&client, &transport, "ada", "hunter2").unwrap();
    let mut ada_sync = TodoSync::new(TodoClient::new(&base_url), ada.subscribe());
    ada_sync.sync_session(&transport).unwrap();
    ada_sync.add_todo(&transport, "Ada's secret").unwrap();

    let bob = SessionManager::new();
    register(&client, &transport, &account("bob")).unwrap();
    bob.sign_in(&client, &transport, "bob", "hunter2").unwrap();
    let mut bob_sync = TodoSync::new(TodoClient::new(&base_url), bob.subscribe());
    assert_eq!(
        bob_sync.sync_session(&transport).unwrap(),
        Some(Completion::Loaded { count: 0 })
    );
}

#[test]
fn unreachable_server_is_a_network_failure() {
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let session = SessionManager::new();
    session.login("tok");
    let mut sync = TodoSync::new(TodoClient::new(&format!("http://{addr}")), session.subscribe());

    let err = sync.sync_session(&Ureq::new()).unwrap_err();
    assert!(matches!(err, SyncError::Api(ApiError::NetworkFailure(_))), "got {err:?}");
    assert!(matches!(sync.state(), CollectionState::Error(ApiError::NetworkFailure(_))));
}
