use std::net::SocketAddr;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisory_backend::{
    config::Config,
    db::connection::create_pool,
    docs, handlers,
    middleware::{auth as auth_middleware, logging, request_id},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "advisory_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; refuses to start without a signing secret.
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        jwt_secret = %mask_secret(&config.jwt_secret),
        access_token_ttl_minutes = config.access_token_ttl_minutes,
        refresh_token_ttl_days = config.refresh_token_ttl_days,
        session_retention_days = config.session_retention_days,
        cleanup_interval_seconds = config.cleanup_interval_seconds,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&*pool).await?;

    let state = AppState::new(pool, config.clone());

    // Background expiry sweep
    let _cleanup_task = state.cleanup.clone().spawn();

    // Build public routes (no auth)
    let public_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/health", get(handlers::health::health))
        .route("/api/docs/openapi.json", get(docs::openapi_json));

    // Build user-protected routes (auth required)
    let user_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::current_session))
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/{id}",
            delete(handlers::sessions::revoke_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth,
        ));

    // Build admin-protected routes (auth + admin role)
    let admin_routes = Router::new()
        .route(
            "/api/admin/users/{user_id}/sessions",
            get(handlers::admin::sessions::list_user_sessions)
                .delete(handlers::admin::sessions::revoke_user_sessions),
        )
        .route(
            "/api/admin/devices/{device_id}/sessions",
            get(handlers::admin::sessions::list_device_sessions)
                .delete(handlers::admin::sessions::revoke_device_sessions),
        )
        .route(
            "/api/admin/sessions/stats",
            get(handlers::admin::sessions::session_stats),
        )
        .route(
            "/api/admin/sessions/cleanup",
            post(handlers::admin::sessions::force_cleanup),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_admin,
        ));

    let cors_origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(axum_middleware::from_fn(request_id::request_id))
        .layer(axum_middleware::from_fn(logging::log_error_responses))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
