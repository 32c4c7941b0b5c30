//! End-to-end tests for the session cache against a live server.
//!
//! Flow Overview:
//! 1) Serve the router over in-memory stores on an ephemeral local port.
//! 2) Drive it through `HttpTransport` (real cookie jar) and `SessionCache`.
//! 3) Check that cache state and subscriber notifications follow the server.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use secrecy::SecretString;
use sessa::{
    api::{
        self,
        handlers::auth::{AuthConfig, types::RegisterRequest},
    },
    client::{ClientError, HttpTransport, MemorySessionStore, SessionCache, SessionPersistence},
    hasher::PasswordHasher,
    model::Profile,
    store::memory::{MemoryLoginLedger, MemoryUserRepository},
    token::TokenService,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};

struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let tokens = TokenService::new(
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            Duration::from_secs(3600),
        )?;
        let state = api::auth_state(
            AuthConfig::new(),
            tokens,
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemoryLoginLedger::new()),
            PasswordHasher::insecure_fast()?,
        );
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr()?;
        let app = api::router(state);

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                eprintln!("test server stopped: {err}");
            }
        });

        Ok(Self { addr, handle })
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn cache(&self) -> Result<SessionCache> {
        let transport = HttpTransport::new(&self.url(), "/auth")?;
        Ok(SessionCache::new(Arc::new(transport)))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn registration(username: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: "s3cretpass".to_string(),
        email: email.to_string(),
        profile: Profile::default(),
    }
}

/// Collects the usernames (or `None`) every notification carried.
fn recorder(cache: &SessionCache) -> Arc<Mutex<Vec<Option<String>>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    cache.subscribe(move |user| sink.lock().push(user.map(|user| user.username.clone())));
    seen
}

#[tokio::test]
async fn session_lifecycle_over_http() -> Result<()> {
    let server = TestServer::start().await?;
    let cache = server.cache()?;
    let seen = recorder(&cache);

    assert_eq!(cache.ready().await, None);

    let registered = cache.register(&registration("alice", "a@x.io")).await?;
    assert_eq!(registered.message, "User registered");
    assert!(!cache.is_authenticated());

    let user = cache.login("alice", "s3cretpass").await?;
    assert_eq!(user.id, registered.user_id);
    assert!(cache.is_authenticated());

    let me = cache.me().await?;
    assert_eq!(me.username, "alice");

    let patch = Profile {
        firstname: Some("Alice".to_string()),
        ..Profile::default()
    };
    let updated = cache.update_profile(&patch).await?;
    assert_eq!(updated.profile.firstname.as_deref(), Some("Alice"));
    assert_eq!(
        cache
            .current_user()
            .and_then(|user| user.profile.firstname),
        Some("Alice".to_string())
    );

    let history = cache.login_history().await?;
    assert_eq!(history.len(), 1);
    assert!(history[0].logged_out_at.is_none());

    cache.logout().await?;
    assert!(!cache.is_authenticated());

    // The jar no longer holds a session.
    let err = cache.me().await.err().context("me succeeded after logout")?;
    assert!(err.is_unauthorized());

    let seen = seen.lock().clone();
    assert_eq!(seen.first(), Some(&None));
    assert_eq!(seen.last(), Some(&None));
    assert!(seen.contains(&Some("alice".to_string())));
    Ok(())
}

#[tokio::test]
async fn ready_restores_existing_session() -> Result<()> {
    let server = TestServer::start().await?;
    let transport = Arc::new(HttpTransport::new(&server.url(), "/auth")?);

    let first = SessionCache::new(transport.clone());
    first.register(&registration("alice", "a@x.io")).await?;
    first.login("alice", "s3cretpass").await?;

    // A second cache sharing the cookie jar picks the session up on init.
    let second = SessionCache::new(transport);
    let user = second.ready().await.context("session was not restored")?;
    assert_eq!(user.username, "alice");
    Ok(())
}

#[tokio::test]
async fn bad_credentials_leave_cache_empty() -> Result<()> {
    let server = TestServer::start().await?;
    let cache = server.cache()?;
    cache.register(&registration("alice", "a@x.io")).await?;

    let err = cache
        .login("alice", "wrong-password")
        .await
        .err()
        .context("login should fail")?;
    assert_eq!(
        err,
        ClientError::Http {
            status: 401,
            message: "Invalid username or password".to_string()
        }
    );
    assert!(!cache.is_authenticated());

    let err = cache
        .register(&registration("alice", "other@x.io"))
        .await
        .err()
        .context("duplicate register should fail")?;
    assert_eq!(err.status(), Some(409));
    Ok(())
}

#[tokio::test]
async fn change_password_requires_fresh_login() -> Result<()> {
    let server = TestServer::start().await?;
    let cache = server.cache()?;
    cache.register(&registration("alice", "a@x.io")).await?;
    cache.login("alice", "s3cretpass").await?;

    cache.change_password("s3cretpass", "n3wpassword").await?;
    assert!(!cache.is_authenticated());

    let err = cache.me().await.err().context("old session still valid")?;
    assert!(err.is_unauthorized());

    cache.login("alice", "n3wpassword").await?;
    assert!(cache.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn deleting_self_ends_the_session() -> Result<()> {
    let server = TestServer::start().await?;
    let store = Arc::new(MemorySessionStore::new());
    let transport = Arc::new(HttpTransport::new(&server.url(), "/auth")?);
    let cache = SessionCache::with_persistence(transport, store.clone());

    let bob = cache.register(&registration("bob", "b@x.io")).await?;
    let alice = cache.register(&registration("alice", "a@x.io")).await?;
    cache.login("alice", "s3cretpass").await?;
    assert!(store.load().is_some());

    let users = cache.list_users().await?;
    assert_eq!(users.len(), 2);

    let err = cache
        .delete_user(bob.user_id)
        .await
        .err()
        .context("deleting someone else should fail")?;
    assert_eq!(err.status(), Some(403));
    assert!(cache.is_authenticated());

    cache.delete_user(alice.user_id).await?;
    assert!(!cache.is_authenticated());
    assert!(store.load().is_none());

    let err = cache
        .login("alice", "s3cretpass")
        .await
        .err()
        .context("deleted user logged in")?;
    assert!(err.is_unauthorized());
    Ok(())
}

#[tokio::test]
async fn unauthorized_response_clears_stale_user() -> Result<()> {
    let server = TestServer::start().await?;
    let first = server.cache()?;
    first.register(&registration("alice", "a@x.io")).await?;
    let user = first.login("alice", "s3cretpass").await?;

    // A persisted user with no cookie behind it: the next request gets a 401.
    let store = Arc::new(MemorySessionStore::with_user(user));
    let transport = Arc::new(HttpTransport::new(&server.url(), "/auth")?);
    let cache = SessionCache::with_persistence(transport, store.clone());
    assert!(cache.is_authenticated());
    let seen = recorder(&cache);

    let err = cache
        .all_login_history()
        .await
        .err()
        .context("history without session")?;
    assert!(err.is_unauthorized());
    assert!(!cache.is_authenticated());
    assert!(store.load().is_none());

    let err = cache.list_users().await.err().context("users without session")?;
    assert!(err.is_unauthorized());
    assert_eq!(*seen.lock(), vec![Some("alice".to_string()), None]);
    Ok(())
}
