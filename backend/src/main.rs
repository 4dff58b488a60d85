//! Ticket Tracker Backend
//!
//! Multi-tenant ticket tracking over SQLite, with scoped authorization, a
//! ticket lifecycle engine and Tantivy full-text search.

mod api;
mod assignment;
mod auth;
mod config;
mod db;
mod errors;
mod events;
mod identity;
mod lifecycle;
mod models;
mod notifications;
mod policy;
mod saga;
mod search;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{Repository, SqliteAuditRecorder};
use events::EffectDispatcher;
use lifecycle::{ActivityService, OrganizationService, ProjectService, TicketEngine, UserService};
use notifications::SessionRegistry;
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub organizations: OrganizationService,
    pub users: UserService,
    pub projects: ProjectService,
    pub tickets: TicketEngine,
    pub activities: ActivityService,
}

impl AppState {
    /// Wire services over an initialized pool and search index.
    pub fn new(config: Config, pool: SqlitePool, search: SearchIndex) -> Self {
        let repo = Repository::new(pool.clone());
        let registry = Arc::new(SessionRegistry::new());
        let effects = EffectDispatcher::new(
            Arc::new(SqliteAuditRecorder::new(pool)),
            registry.clone(),
        );

        Self {
            organizations: OrganizationService::new(repo.clone(), config.role_variant),
            users: UserService::new(repo.clone(), config.role_variant),
            projects: ProjectService::new(repo.clone(), effects.clone()),
            tickets: TicketEngine::new(repo.clone(), effects, config.ticket_scope),
            activities: ActivityService::new(repo.clone()),
            repo: Arc::new(repo),
            search: Arc::new(search),
            config: Arc::new(config),
            registry,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ticket Tracker Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        role_variant = ?config.role_variant,
        ticket_scope = ?config.ticket_scope,
        "Deployment variant"
    );

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    // Initialize search index
    let search = SearchIndex::open(&config.index_path)?;

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, pool, search);

    if let Some(email) = state.config.superadmin_email.as_deref() {
        state
            .users
            .ensure_superadmin(email, &state.config.superadmin_name)
            .await?;
    } else {
        tracing::warn!("TRACKER_SUPERADMIN_EMAIL not set; no platform account is bootstrapped");
    }

    // Build initial search index from database
    tracing::info!("Building search index...");
    let tickets = state.repo.all_tickets().await?;
    state.search.rebuild(&tickets).await?;

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Organizations
        .route("/organizations", get(api::list_organizations))
        .route("/organizations", post(api::create_organization))
        .route(
            "/organizations/with-admin",
            post(api::create_organization_with_admin),
        )
        .route("/organizations/{id}", get(api::get_organization))
        .route("/organizations/{id}", put(api::update_organization))
        .route("/organizations/{id}", delete(api::delete_organization))
        .route("/organizations/{id}/stats", get(api::organization_stats))
        // Users
        .route("/users", get(api::list_users))
        .route("/users", post(api::create_user))
        .route("/users/me", get(api::current_user))
        .route("/users/{id}", get(api::get_user))
        .route("/users/{id}", put(api::update_user))
        .route("/users/{id}", delete(api::delete_user))
        .route("/users/{id}/toggle-status", patch(api::toggle_user_status))
        .route("/users/{id}/preferences", get(api::get_preferences))
        .route("/users/{id}/preferences", put(api::update_preferences))
        .route("/users/{id}/activities", get(api::user_activities))
        // Projects
        .route("/projects", get(api::list_projects))
        .route("/projects", post(api::create_project))
        .route("/projects/{id}", get(api::get_project))
        .route("/projects/{id}", put(api::update_project))
        .route("/projects/{id}", delete(api::delete_project))
        .route("/projects/{id}/members", post(api::add_project_member))
        .route(
            "/projects/{id}/members/{user_id}",
            delete(api::remove_project_member),
        )
        // Tickets
        .route("/tickets", get(api::list_tickets))
        .route("/tickets", post(api::create_ticket))
        .route("/tickets/{id}", get(api::get_ticket))
        .route("/tickets/{id}", put(api::update_ticket))
        .route("/tickets/{id}", delete(api::delete_ticket))
        .route("/tickets/{id}/assign", patch(api::assign_ticket))
        .route("/tickets/{id}/status", patch(api::update_ticket_status))
        .route("/tickets/{id}/comments", get(api::list_comments))
        .route("/tickets/{id}/comments", post(api::add_comment))
        .route(
            "/tickets/{id}/comments/{comment_id}",
            delete(api::delete_comment),
        )
        .route("/tickets/{id}/activities", get(api::ticket_history))
        // Activity feed
        .route("/activities", get(api::activity_feed))
        // Search
        .route("/search", get(api::search_tickets))
        // Live notifications
        .route("/notifications/ws", get(api::notifications_ws))
        // Bearer-token identity
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
