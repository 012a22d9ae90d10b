use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::repositories::{
    DispatchRepository, EventRepository, IdentityRepository, InMemoryStore,
    InvitationRepository, NotificationRepository,
};
use domain::services::{
    DispatchQueue, InvitationManager, JoinRequestHandler, MessageTemplates, TemplateStyle,
};
use persistence::repositories::{
    PgDispatchRepository, PgEventRepository, PgIdentityRepository, PgInvitationRepository,
    PgNotificationRepository,
};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, EmailConfig, JwtAuthConfig};
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{events, health, invitations, join_requests, notifications};

/// Storage backends behind the domain's repository traits.
#[derive(Clone)]
pub struct Repositories {
    pub events: Arc<dyn EventRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub dispatch: Arc<dyn DispatchRepository>,
}

impl Repositories {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            events: Arc::new(PgEventRepository::new(pool.clone())),
            identities: Arc::new(PgIdentityRepository::new(pool.clone())),
            invitations: Arc::new(PgInvitationRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            dispatch: Arc::new(PgDispatchRepository::new(pool.clone())),
        }
    }

    /// All repositories share one store, so cross-table writes stay atomic.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            events: store.clone(),
            identities: store.clone(),
            invitations: store.clone(),
            notifications: store.clone(),
            dispatch: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when running on the in-memory store.
    pub pool: Option<PgPool>,
    pub jwt: Arc<JwtConfig>,
    pub events: Arc<dyn EventRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub dispatch: Arc<dyn DispatchRepository>,
    pub invitations: Arc<InvitationManager>,
    pub join_requests: Arc<JoinRequestHandler>,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: Option<PgPool>,
        repos: &Repositories,
        queue: Arc<dyn DispatchQueue>,
    ) -> Result<Self, JwtError> {
        let jwt = build_jwt(&config.jwt)?;

        let invitations = InvitationManager::new(
            repos.events.clone(),
            repos.identities.clone(),
            repos.invitations.clone(),
            queue.clone(),
        )
        .with_span(tracing::info_span!("invitations"));

        let join_requests = JoinRequestHandler::new(
            repos.events.clone(),
            repos.notifications.clone(),
            queue,
            templates(&config.email),
        )
        .with_span(tracing::info_span!("join_requests"));

        Ok(Self {
            config: Arc::new(config),
            pool,
            jwt: Arc::new(jwt),
            events: repos.events.clone(),
            identities: repos.identities.clone(),
            notifications: repos.notifications.clone(),
            dispatch: repos.dispatch.clone(),
            invitations: Arc::new(invitations),
            join_requests: Arc::new(join_requests),
        })
    }
}

/// Builds the token verifier. An RSA public key takes precedence over the
/// shared secret.
pub fn build_jwt(config: &JwtAuthConfig) -> Result<JwtConfig, JwtError> {
    let jwt = if !config.public_key.is_empty() {
        JwtConfig::from_rsa_public_key(&config.public_key, config.leeway_secs)?
    } else {
        JwtConfig::from_secret(&config.shared_secret, config.leeway_secs)?
    };
    Ok(jwt.with_issuer(config.issuer.clone()))
}

/// Message templates for the configured sender and links.
pub fn templates(config: &EmailConfig) -> MessageTemplates {
    let style = config
        .template_style
        .parse::<TemplateStyle>()
        .unwrap_or_default();
    MessageTemplates::new(config.sender_name.clone(), config.base_url.clone(), style)
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.server.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Authenticated routes; handlers take the `UserAuth` extractor
    let api_routes = Router::new()
        .route("/api/v1/events", post(events::create_event))
        .route("/api/v1/events/:event_id", get(events::get_event))
        .route(
            "/api/v1/events/:event_id/invitations",
            post(invitations::create_invitation),
        )
        .route(
            "/api/v1/events/:event_id/join-request",
            post(join_requests::request_to_join),
        )
        .route("/api/v1/invitations", get(invitations::list_invitations))
        .route(
            "/api/v1/invitations/:invitation_id/rsvp",
            put(invitations::respond_to_invitation),
        )
        .route(
            "/api/v1/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            put(notifications::mark_notification_read),
        );

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
