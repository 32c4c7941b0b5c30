use crate::{
    api::handlers::{
        auth::{AuthConfig, AuthState, require_session, session},
        health, history, me, user_login, user_register, users,
    },
    hasher::PasswordHasher,
    store::{
        CredentialStore, LoginLedger, UserRepository,
        memory::{MemoryLoginLedger, MemoryUserRepository},
        postgres::{self, PgLoginLedger, PgUserRepository},
    },
    token::TokenService,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{delete, get, patch, post},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the application router.
///
/// Public routes are register, login and logout; every other auth route runs
/// behind [`require_session`]. Auth routes are mounted under the configured
/// prefix while `/health` always sits at the root.
#[must_use]
pub fn router(auth_state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route("/me", get(me::get_me).patch(me::patch_me))
        .route("/change-password", patch(me::change_password))
        .route("/users", get(users::list_users))
        .route("/user/:id", delete(users::delete_user))
        .route("/login-history", get(history::own_history))
        .route("/login-history/all", get(history::all_history))
        .route_layer(middleware::from_fn(require_session));

    let auth_routes = Router::new()
        .route("/register", post(user_register::register))
        .route("/login", post(user_login::login))
        .route("/logout", post(session::logout))
        .merge(protected);

    // axum refuses to nest at the root, so an empty prefix merges instead.
    let prefix = auth_state.config().prefix();
    let app = if prefix.is_empty() {
        Router::new().merge(auth_routes)
    } else {
        Router::new().nest(prefix, auth_routes)
    };

    app.route("/health", get(health::health))
        .layer(Extension(auth_state))
}

/// Wire stores, hasher and token service into an [`AuthState`].
#[must_use]
pub fn auth_state(
    config: AuthConfig,
    tokens: TokenService,
    users: Arc<dyn UserRepository>,
    ledger: Arc<dyn LoginLedger>,
    hasher: PasswordHasher,
) -> Arc<AuthState> {
    Arc::new(AuthState::new(
        config,
        tokens,
        CredentialStore::new(users, hasher),
        ledger,
    ))
}

/// Start the server
/// # Errors
/// Return error if the database or the listener cannot be set up
pub async fn new(
    port: u16,
    dsn: Option<SecretString>,
    auth_config: AuthConfig,
    tokens: TokenService,
) -> Result<()> {
    let (users, ledger): (Arc<dyn UserRepository>, Arc<dyn LoginLedger>) = match dsn {
        Some(dsn) => {
            // Connect to database
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;

            postgres::apply_schema(&pool).await?;

            (
                Arc::new(PgUserRepository::new(pool.clone())),
                Arc::new(PgLoginLedger::new(pool)),
            )
        }
        None => {
            warn!("No DSN configured, users and login history are kept in memory");
            (
                Arc::new(MemoryUserRepository::new()),
                Arc::new(MemoryLoginLedger::new()),
            )
        }
    };

    let state = auth_state(auth_config, tokens, users, ledger, PasswordHasher::default());
    info!("Auth routes mounted at '{}'", state.config().prefix());

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
