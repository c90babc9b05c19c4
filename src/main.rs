use axum::{
    Router,
    routing::{get, post, put},
    middleware::{from_fn, from_fn_with_state},
};

use http::{Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod mailer;
mod crypto {
    pub mod cipher;
    pub mod jwt;
}

mod models {
    pub mod user;
    pub mod session;
}

mod repositories {
    pub mod user;
    pub mod session;
}

mod services {
    pub mod auth;
    pub mod sessions;
}

mod handlers {
    pub mod auth;
    pub mod profile;
    pub mod sessions;
}

mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
    pub mod role;
}

mod validation {
    pub mod auth;
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
            "http://[::1]:3000".parse().unwrap(),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10_000)
            .burst_size(50_000)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let register_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_register,
        ))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/verify-otp", post(handlers::auth::verify_otp))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_login,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/api/auth/whoami", get(handlers::profile::whoami))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::optional_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/api/profile",
            get(handlers::profile::me).put(handlers::profile::update_profile),
        )
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/sessions/end-others",
            post(handlers::sessions::end_other_sessions),
        )
        .route(
            "/api/users/{user_id}/sessions",
            get(handlers::sessions::list_user_sessions),
        )
        .layer(tower_governor::GovernorLayer::new(
            protected_governor_conf.clone(),
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/api/admin/sessions/{session_id}/end",
            post(handlers::sessions::admin_end_session),
        )
        .route(
            "/api/admin/users/{user_id}/role",
            put(handlers::sessions::admin_set_role),
        )
        .route_layer(from_fn(middleware_layer::role::require_admin))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(register_routes)
        .merge(login_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors);

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            tracing::debug!("🧹 Running scheduled cleanup of expired sessions and lockouts...");

            match repositories::session::sweep_expired(&cleanup_state.db).await {
                Ok(swept) if swept > 0 => {
                    tracing::info!("✅ Cleanup marked {} sessions as timed out", swept);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("❌ Session cleanup failed: {}", e);
                }
            }

            match repositories::user::clear_elapsed_lockouts(&cleanup_state.db).await {
                Ok(cleared) if cleared > 0 => {
                    tracing::info!("✅ Cleanup cleared {} elapsed lockouts", cleared);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("❌ Lockout cleanup failed: {}", e);
                }
            }
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Background cleanup job started (runs every 5 minutes)");
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
