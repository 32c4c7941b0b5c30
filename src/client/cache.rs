//! Client-side session cache.
//!
//! Flow Overview:
//! 1) `init()` asks the server "who am I" exactly once, shared by every
//!    concurrent caller; `ready()` waits for that answer.
//! 2) `set_user` is the only mutation point. Each change is persisted (when
//!    persistence is configured) and then pushed to every subscriber in
//!    registration order.
//! 3) Every request goes through [`SessionCache::request`], which drops the
//!    cached user the first time a 401 comes back for it.
//!
//! Subscriber callbacks run with no lock held, so they may subscribe,
//! unsubscribe or read the cache themselves.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    errors::ClientError,
    storage::SessionPersistence,
    transport::{ApiRequest, ApiResponse, Transport},
};
use crate::{
    api::handlers::auth::types::{
        ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest, RegisterResponse,
        UserResponse,
    },
    model::{LoginHistoryEntry, Profile, UserView},
};

type Callback = Arc<dyn Fn(Option<&UserView>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Handle returned by [`SessionCache::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to detach.
#[derive(Clone, Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Detach the callback. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct SessionCache {
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    user: Mutex<Option<UserView>>,
    subscribers: Arc<Mutex<Registry>>,
    initialized: OnceCell<()>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("user", &*self.user.lock())
            .field("persistent", &self.persistence.is_some())
            .field("initialized", &self.initialized.initialized())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    /// A cache that starts empty and keeps nothing across runs.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            persistence: None,
            user: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(Registry::default())),
            initialized: OnceCell::new(),
        }
    }

    /// A cache seeded from `persistence`, writing every change back to it.
    #[must_use]
    pub fn with_persistence(
        transport: Arc<dyn Transport>,
        persistence: Arc<dyn SessionPersistence>,
    ) -> Self {
        let stored = persistence.load();
        Self {
            transport,
            user: Mutex::new(stored),
            persistence: Some(persistence),
            subscribers: Arc::new(Mutex::new(Registry::default())),
            initialized: OnceCell::new(),
        }
    }

    /// Snapshot of the cached user.
    #[must_use]
    pub fn current_user(&self) -> Option<UserView> {
        self.user.lock().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.lock().is_some()
    }

    /// Register `callback` and immediately call it with the current state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&UserView>) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let id = {
            let mut registry = self.subscribers.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::clone(&callback)));
            id
        };

        let current = self.current_user();
        callback(current.as_ref());

        Subscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
        }
    }

    /// Replace the cached user, persist it and notify every subscriber.
    pub(crate) fn set_user(&self, user: Option<UserView>) {
        *self.user.lock() = user.clone();
        self.persist(user.as_ref());
        self.notify(user.as_ref());
    }

    /// Clear the cached user only if one is present, notifying once.
    fn clear_if_present(&self) -> bool {
        let previous = self.user.lock().take();
        if previous.is_none() {
            return false;
        }
        self.persist(None);
        self.notify(None);
        true
    }

    fn persist(&self, user: Option<&UserView>) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let result = match user {
            Some(user) => persistence.save(user),
            None => persistence.clear(),
        };
        if let Err(err) = result {
            warn!("Failed to persist session user: {err:#}");
        }
    }

    fn notify(&self, user: Option<&UserView>) {
        let snapshot: Vec<Callback> = self
            .subscribers
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(user);
        }
    }

    /// Resolve the session with the server once; later calls return at once.
    pub async fn init(&self) {
        self.initialized
            .get_or_init(|| async { self.check_session().await })
            .await;
    }

    /// Wait for [`SessionCache::init`] and return the resulting user.
    pub async fn ready(&self) -> Option<UserView> {
        self.init().await;
        self.current_user()
    }

    async fn check_session(&self) {
        match self.transport.send(ApiRequest::get("/me")).await {
            Ok(response) if response.is_success() => {
                match serde_json::from_value::<UserView>(response.body) {
                    Ok(user) => self.set_user(Some(user)),
                    Err(err) => {
                        warn!("Failed to decode session user: {err}");
                        self.set_user(None);
                    }
                }
            }
            Ok(response) => {
                debug!("No active session ({})", response.status);
                self.set_user(None);
            }
            Err(err) => {
                if self.persistence.is_some() && self.is_authenticated() {
                    // Offline start: trust the persisted user until the server says otherwise.
                    warn!("Session check failed, keeping persisted user: {err}");
                } else {
                    warn!("Session check failed: {err}");
                    self.set_user(None);
                }
            }
        }
    }

    /// Send a request, clearing the cached user on a 401.
    ///
    /// # Errors
    /// Only transport failures are errors; HTTP error statuses are returned
    /// as responses.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let response = self.transport.send(request).await?;
        if response.status == 401 && self.clear_if_present() {
            debug!("Server rejected the session, cleared cached user");
        }
        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        decode(self.request(request).await?)
    }

    /// # Errors
    /// `ClientError::Http` with 409 for a taken username or email, 400 for invalid input.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ClientError> {
        self.request_json(ApiRequest::post("/register").json(request)?)
            .await
    }

    /// Log in and cache the returned user.
    ///
    /// # Errors
    /// `ClientError::Http` with 401 for bad credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserView, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: UserResponse = self
            .request_json(ApiRequest::post("/login").json(&body)?)
            .await?;
        self.set_user(Some(response.user.clone()));
        Ok(response.user)
    }

    /// Log out. The cached user is cleared even if the server is unreachable.
    ///
    /// # Errors
    /// Transport and HTTP failures are returned after the local state is cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self.request(ApiRequest::post("/logout")).await;
        self.set_user(None);
        decode::<MessageResponse>(result?).map(|_| ())
    }

    /// Fetch the current user from the server and refresh the cache.
    ///
    /// # Errors
    /// `ClientError::Http` with 401 when there is no valid session.
    pub async fn me(&self) -> Result<UserView, ClientError> {
        let user: UserView = self.request_json(ApiRequest::get("/me")).await?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    /// # Errors
    /// `ClientError::Http` with 400 when `patch` sets no field.
    pub async fn update_profile(&self, patch: &Profile) -> Result<UserView, ClientError> {
        let response: UserResponse = self
            .request_json(ApiRequest::patch("/me").json(patch)?)
            .await?;
        self.set_user(Some(response.user.clone()));
        Ok(response.user)
    }

    /// Change the password. The server ends the session, so the cached user is
    /// cleared on success.
    ///
    /// # Errors
    /// `ClientError::Http` with 401 if `current_password` is wrong.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let body = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        let _: MessageResponse = self
            .request_json(ApiRequest::patch("/change-password").json(&body)?)
            .await?;
        self.set_user(None);
        Ok(())
    }

    /// # Errors
    /// `ClientError::Http` with 401 when there is no valid session.
    pub async fn list_users(&self) -> Result<Vec<UserView>, ClientError> {
        self.request_json(ApiRequest::get("/users")).await
    }

    /// Delete a user; deleting yourself clears the cached user.
    ///
    /// # Errors
    /// `ClientError::Http` with 403 when `user_id` is not the caller.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), ClientError> {
        let _: MessageResponse = self
            .request_json(ApiRequest::delete(&format!("/user/{user_id}")))
            .await?;
        let is_self = self
            .current_user()
            .is_some_and(|user| user.id == user_id);
        if is_self {
            self.set_user(None);
        }
        Ok(())
    }

    /// # Errors
    /// `ClientError::Http` with 401 when there is no valid session.
    pub async fn login_history(&self) -> Result<Vec<LoginHistoryEntry>, ClientError> {
        self.request_json(ApiRequest::get("/login-history")).await
    }

    /// # Errors
    /// `ClientError::Http` with 401 when there is no valid session.
    pub async fn all_login_history(&self) -> Result<Vec<LoginHistoryEntry>, ClientError> {
        self.request_json(ApiRequest::get("/login-history/all"))
            .await
    }
}

fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T, ClientError> {
    if response.is_success() {
        serde_json::from_value(response.body)
            .map_err(|err| ClientError::Parse(format!("Failed to decode response: {err}")))
    } else {
        Err(ClientError::from_response(response.status, &response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemorySessionStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use time::OffsetDateTime;

    type Reply = Result<ApiResponse, ClientError>;

    /// Replays scripted replies in order and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<ApiRequest>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            })
        }

        fn delayed(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                delay: Some(delay),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .map(|request| format!("{} {}", request.method, request.path))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Reply {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Network("no scripted reply".to_string())))
        }
    }

    fn ok(status: u16, body: Value) -> Reply {
        Ok(ApiResponse { status, body })
    }

    fn user(name: &str) -> UserView {
        UserView {
            id: Uuid::new_v4(),
            username: name.to_string(),
            email: format!("{name}@x.com"),
            profile: Profile::default(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn to_json(user: &UserView) -> Value {
        serde_json::to_value(user).unwrap_or(Value::Null)
    }

    /// Subscriber that records the username (or "-") of every notification.
    fn recorder(cache: &SessionCache) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = cache.subscribe(move |user| {
            sink.lock()
                .push(user.map_or_else(|| "-".to_string(), |u| u.username.clone()));
        });
        (seen, subscription)
    }

    #[test]
    fn subscribe_invokes_immediately_with_current_state() {
        let cache = SessionCache::new(ScriptedTransport::new(vec![]));
        let (seen, _sub) = recorder(&cache);
        assert_eq!(*seen.lock(), vec!["-"]);

        cache.set_user(Some(user("alice")));
        let (late, _late_sub) = recorder(&cache);
        assert_eq!(*late.lock(), vec!["alice"]);
    }

    #[test]
    fn subscribers_notified_in_registration_order() {
        let cache = SessionCache::new(ScriptedTransport::new(vec![]));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for index in 0..3 {
            let order = Arc::clone(&order);
            subs.push(cache.subscribe(move |_| order.lock().push(index)));
        }
        order.lock().clear();

        cache.set_user(Some(user("alice")));
        cache.set_user(None);
        assert_eq!(*order.lock(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let cache = SessionCache::new(ScriptedTransport::new(vec![]));
        let (seen, sub) = recorder(&cache);
        cache.set_user(Some(user("alice")));
        sub.unsubscribe();
        sub.unsubscribe();
        cache.set_user(None);
        assert_eq!(*seen.lock(), vec!["-", "alice"]);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let cache = Arc::new(SessionCache::new(ScriptedTransport::new(vec![])));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));

        let slot_in = Arc::clone(&slot);
        let count_in = Arc::clone(&count);
        let sub = cache.subscribe(move |user| {
            count_in.fetch_add(1, Ordering::SeqCst);
            if user.is_some() {
                if let Some(sub) = slot_in.lock().as_ref() {
                    sub.unsubscribe();
                }
            }
        });
        *slot.lock() = Some(sub);

        let (others, _other) = recorder(&cache);
        cache.set_user(Some(user("alice")));
        cache.set_user(None);

        // immediate call + the transition that triggered the unsubscribe
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(*others.lock(), vec!["-", "alice", "-"]);
    }

    #[tokio::test]
    async fn concurrent_init_makes_one_request() {
        let alice = user("alice");
        let transport =
            ScriptedTransport::delayed(vec![ok(200, to_json(&alice))], Duration::from_millis(20));
        let cache = SessionCache::new(transport.clone());
        let (seen, _sub) = recorder(&cache);

        let (first, second) = tokio::join!(cache.ready(), cache.ready());
        assert_eq!(first, Some(alice.clone()));
        assert_eq!(second, Some(alice));
        assert_eq!(transport.calls(), 1);

        cache.init().await;
        assert_eq!(transport.calls(), 1);
        assert_eq!(*seen.lock(), vec!["-", "alice"]);
    }

    #[tokio::test]
    async fn init_without_session_caches_none() {
        let transport = ScriptedTransport::new(vec![ok(401, json!({"message": "Not authenticated"}))]);
        let cache = SessionCache::new(transport);
        assert_eq!(cache.ready().await, None);
    }

    #[tokio::test]
    async fn init_network_error_clears_without_persistence() {
        let cache = SessionCache::new(ScriptedTransport::new(vec![Err(ClientError::Network(
            "down".to_string(),
        ))]));
        cache.set_user(Some(user("alice")));
        assert_eq!(cache.ready().await, None);
    }

    #[tokio::test]
    async fn init_network_error_keeps_persisted_user() {
        let alice = user("alice");
        let persistence = Arc::new(MemorySessionStore::with_user(alice.clone()));
        let cache = SessionCache::with_persistence(
            ScriptedTransport::new(vec![Err(ClientError::Network("down".to_string()))]),
            persistence.clone(),
        );
        assert_eq!(cache.current_user(), Some(alice.clone()));
        assert_eq!(cache.ready().await, Some(alice.clone()));
        assert_eq!(persistence.load(), Some(alice));
    }

    #[tokio::test]
    async fn init_rejection_clears_persisted_user() {
        let persistence = Arc::new(MemorySessionStore::with_user(user("alice")));
        let cache = SessionCache::with_persistence(
            ScriptedTransport::new(vec![ok(401, json!({"message": "Not authenticated"}))]),
            persistence.clone(),
        );
        assert_eq!(cache.ready().await, None);
        assert!(persistence.load().is_none());
    }

    #[tokio::test]
    async fn unauthorized_response_clears_user_once() -> Result<()> {
        let unauthorized = json!({"message": "Not authenticated"});
        let transport = ScriptedTransport::new(vec![
            ok(401, unauthorized.clone()),
            ok(401, unauthorized),
        ]);
        let cache = SessionCache::new(transport);
        cache.set_user(Some(user("alice")));
        let (seen, _sub) = recorder(&cache);

        let first = cache.list_users().await;
        assert!(first.is_err_and(|err| err.is_unauthorized()));
        let second = cache.list_users().await;
        assert!(second.is_err());

        assert_eq!(*seen.lock(), vec!["alice", "-"]);
        assert!(!cache.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn login_sets_user_and_logout_clears_it() -> Result<()> {
        let alice = user("alice");
        let transport = ScriptedTransport::new(vec![
            ok(200, json!({"message": "Logged in", "user": to_json(&alice)})),
            ok(200, json!({"message": "Logged out"})),
        ]);
        let cache = SessionCache::new(transport.clone());
        let (seen, _sub) = recorder(&cache);

        assert_eq!(cache.login("alice", "longpass1").await?, alice);
        assert!(cache.is_authenticated());
        cache.logout().await?;
        assert!(!cache.is_authenticated());

        assert_eq!(*seen.lock(), vec!["-", "alice", "-"]);
        assert_eq!(transport.paths(), vec!["POST /login", "POST /logout"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_login_leaves_state_alone() {
        let transport = ScriptedTransport::new(vec![ok(
            401,
            json!({"message": "Invalid username or password"}),
        )]);
        let cache = SessionCache::new(transport);
        let (seen, _sub) = recorder(&cache);

        let err = cache.login("alice", "wrong").await;
        assert_eq!(
            err,
            Err(ClientError::Http {
                status: 401,
                message: "Invalid username or password".to_string()
            })
        );
        assert_eq!(*seen.lock(), vec!["-"]);
    }

    #[tokio::test]
    async fn logout_clears_user_even_when_offline() {
        let cache = SessionCache::new(ScriptedTransport::new(vec![Err(ClientError::Network(
            "down".to_string(),
        ))]));
        cache.set_user(Some(user("alice")));
        assert!(cache.logout().await.is_err());
        assert!(!cache.is_authenticated());
    }

    #[tokio::test]
    async fn delete_self_clears_session() -> Result<()> {
        let alice = user("alice");
        let transport = ScriptedTransport::new(vec![ok(200, json!({"message": "User deleted"}))]);
        let cache = SessionCache::new(transport.clone());
        cache.set_user(Some(alice.clone()));
        let (seen, _sub) = recorder(&cache);

        cache.delete_user(alice.id).await?;
        assert!(!cache.is_authenticated());
        assert_eq!(*seen.lock(), vec!["alice", "-"]);
        assert_eq!(transport.paths(), vec![format!("DELETE /user/{}", alice.id)]);
        Ok(())
    }

    #[tokio::test]
    async fn delete_other_is_forbidden_and_keeps_session() {
        let transport = ScriptedTransport::new(vec![ok(
            403,
            json!({"message": "Not allowed to perform this action"}),
        )]);
        let cache = SessionCache::new(transport);
        cache.set_user(Some(user("alice")));

        let err = cache.delete_user(Uuid::new_v4()).await;
        assert!(err.is_err_and(|err| err.status() == Some(403)));
        assert!(cache.is_authenticated());
    }

    #[tokio::test]
    async fn change_password_clears_session() -> Result<()> {
        let transport = ScriptedTransport::new(vec![ok(
            200,
            json!({"message": "Password changed, please log in again"}),
        )]);
        let cache = SessionCache::new(transport);
        cache.set_user(Some(user("alice")));

        cache.change_password("longpass1", "newpass99").await?;
        assert!(!cache.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn profile_update_refreshes_cached_user() -> Result<()> {
        let mut updated = user("alice");
        updated.profile.firstname = Some("Alice".to_string());
        let transport = ScriptedTransport::new(vec![ok(
            200,
            json!({"message": "Profile updated", "user": to_json(&updated)}),
        )]);
        let cache = SessionCache::new(transport);
        cache.set_user(Some(user("alice")));

        let patch = Profile {
            firstname: Some("Alice".to_string()),
            ..Profile::default()
        };
        cache.update_profile(&patch).await?;
        assert_eq!(
            cache.current_user().and_then(|u| u.profile.firstname),
            Some("Alice".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn set_user_persists_changes() {
        let persistence = Arc::new(MemorySessionStore::new());
        let cache =
            SessionCache::with_persistence(ScriptedTransport::new(vec![]), persistence.clone());
        let alice = user("alice");
        cache.set_user(Some(alice.clone()));
        assert_eq!(persistence.load(), Some(alice));
        cache.set_user(None);
        assert!(persistence.load().is_none());
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_parse_error() {
        let transport = ScriptedTransport::new(vec![ok(200, json!({"unexpected": true}))]);
        let cache = SessionCache::new(transport);
        let result = cache.list_users().await;
        assert!(matches!(result, Err(ClientError::Parse(_))));
    }
}
