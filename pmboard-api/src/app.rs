/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use pmboard_api::{app::{self, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let mailer = app::mailer_from_config(&config)?;
/// let state = AppState::new(pool, config, mailer);
/// let app = app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::security::SecurityHeadersLayer,
    routes,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::{delete, get, patch, post, put},
    Router,
};
use pmboard_shared::{
    auth::{ephemeral::TokenPurpose, middleware::authenticate},
    mail::{HttpMailer, LogMailer, MailError, MailMessage, Mailer},
    models::user::User,
};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned into every handler through Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Delivers ephemeral tokens
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            mailer,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Emails an ephemeral token
    ///
    /// Delivery failures are logged and reported as `false`; the token stays
    /// valid either way.
    pub async fn send_token(&self, to: &str, purpose: TokenPurpose, token: &str) -> bool {
        let message = MailMessage::ephemeral_token(to, purpose, token);

        match self.mailer.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, purpose = ?purpose, "Failed to send token email");
                false
            }
        }
    }
}

/// Picks the mailer for the configured provider
///
/// Falls back to [`LogMailer`] when no provider URL and key are set.
pub fn mailer_from_config(config: &Config) -> Result<Arc<dyn Mailer>, MailError> {
    match config.mail.provider() {
        Some((url, key)) => Ok(Arc::new(HttpMailer::new(url, key, config.mail.from.as_str())?)),
        None => {
            tracing::warn!("No mail provider configured; token emails will only be logged");
            Ok(Arc::new(LogMailer::new(config.mail.from.as_str())))
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET /health
/// └── /v1
///     ├── /auth/refresh                      public
///     ├── /users/{signup,signin,...}         public
///     ├── /users/me/...                      bearer
///     ├── /mfa/{email-token,verify}          bearer
///     └── /projects/...                      bearer + per-project guard
/// ```
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, compression, tracing, then the
/// bearer layer on protected groups.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new().route("/refresh", post(routes::auth::refresh));

    let public_user_routes = Router::new()
        .route("/signup", post(routes::users::sign_up))
        .route("/signin", post(routes::users::sign_in))
        .route("/request-token", post(routes::users::request_token))
        .route("/activate", post(routes::users::activate))
        .route("/deactivate", post(routes::users::deactivate))
        .route("/reset-password", post(routes::users::reset_password))
        .route("/delete", post(routes::users::delete_account));

    let me_routes = Router::new()
        .route("/me", get(routes::users::me))
        .route("/me/settings", patch(routes::users::update_settings))
        .route(
            "/me/membership",
            get(routes::users::get_membership).put(routes::users::set_membership),
        )
        .route(
            "/me/membership/reconcile",
            post(routes::users::reconcile_membership),
        )
        .route(
            "/me/next-membership",
            put(routes::users::schedule_next_membership)
                .delete(routes::users::cancel_next_membership),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let mfa_routes = Router::new()
        .route("/email-token", post(routes::mfa::email_token))
        .route("/verify", post(routes::mfa::verify))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let project_routes = Router::new()
        .route("/", post(routes::projects::create_project))
        .route(
            "/:project_id",
            get(routes::projects::get_project).delete(routes::projects::delete_project),
        )
        .route(
            "/:project_id/description",
            patch(routes::projects::update_description),
        )
        .route("/:project_id/status", patch(routes::projects::update_status))
        .route(
            "/:project_id/members",
            get(routes::members::list_members).post(routes::members::add_member),
        )
        .route(
            "/:project_id/members/:member_id",
            delete(routes::members::remove_member),
        )
        .route(
            "/:project_id/members/:member_id/role",
            patch(routes::members::update_role),
        )
        .route(
            "/:project_id/members/:member_id/status",
            patch(routes::members::update_status),
        )
        .route("/:project_id/features", post(routes::features::add_feature))
        .route(
            "/:project_id/features/:feature_id",
            delete(routes::features::delete_feature),
        )
        .route(
            "/:project_id/tickets",
            get(routes::tickets::list_tickets).post(routes::tickets::create_ticket),
        )
        .route(
            "/:project_id/tickets/:ticket_id",
            get(routes::tickets::get_ticket)
                .patch(routes::tickets::update_ticket)
                .delete(routes::tickets::delete_ticket),
        )
        .route(
            "/:project_id/tickets/:ticket_id/timelog",
            get(routes::tickets::get_time_log)
                .put(routes::tickets::set_time_log)
                .delete(routes::tickets::clear_time_log),
        )
        .route(
            "/:project_id/tickets/:ticket_id/assignees",
            post(routes::tickets::add_assignee),
        )
        .route(
            "/:project_id/tickets/:ticket_id/assignees/:user_id",
            delete(routes::tickets::remove_assignee),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", public_user_routes.merge(me_routes))
        .nest("/mfa", mfa_routes)
        .nest("/projects", project_routes);

    let cors = if state.config.cors_allows_any() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

/// Bearer authentication layer
///
/// Validates the access token, then checks that its user still exists
/// before injecting [`AuthContext`](pmboard_shared::auth::middleware::AuthContext)
/// into the request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(req.headers(), state.jwt_secret())?;

    if User::find_by_id(&state.db, auth.user_id).await?.is_none() {
        tracing::debug!(user_id = %auth.user_id, "Token for a deleted user");
        return Err(ApiError::Unauthorized("User no longer exists".to_string()));
    }

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
            Err(MailError::Rejected { status: 503 })
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<MailMessage>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn config(mail: &[(&str, &str)]) -> Config {
        Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgresql://localhost/pmboard".to_string()),
            "JWT_SECRET" => Some("test-secret-key-at-least-32-characters-long".to_string()),
            _ => mail
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string()),
        })
        .unwrap()
    }

    fn state(mailer: Arc<dyn Mailer>) -> AppState {
        let pool = PgPool::connect_lazy("postgresql://localhost/pmboard").unwrap();
        AppState::new(pool, config(&[]), mailer)
    }

    #[tokio::test]
    async fn test_send_token_reports_delivery() {
        let recorder = Arc::new(RecordingMailer::default());
        let state = state(recorder.clone());

        assert!(state.send_token("ada@example.com", TokenPurpose::Activate, "TOKEN").await);

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].text.contains("TOKEN"));
    }

    #[tokio::test]
    async fn test_send_token_swallows_failures() {
        let state = state(Arc::new(FailingMailer));

        assert!(!state.send_token("ada@example.com", TokenPurpose::Mfa, "TOKEN").await);
    }

    #[tokio::test]
    async fn test_mailer_from_config() {
        assert!(mailer_from_config(&config(&[])).is_ok());
        assert!(mailer_from_config(&config(&[
            ("MAIL_API_URL", "https://mail.example.com/send"),
            ("MAIL_API_KEY", "key"),
        ]))
        .is_ok());
    }
}
