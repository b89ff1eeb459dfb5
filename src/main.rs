use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mni_mtom_client::config::Config;
use mni_mtom_client::handlers::{self, AppState};
use mni_mtom_client::mni_client::MniClient;

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, binds the MNI client to the
/// configured environment and starts the Axum server.
///
/// # Returns
///
/// * `anyhow::Result<()>` - Ok if the server runs successfully, or an error if initialization fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mni_mtom_client=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let client = MniClient::new(config.mni_settings())?;
    tracing::info!(
        "✓ MNI client bound to {} (MNI {}, {}/{})",
        config.mni_endpoint_url,
        config.mni_version,
        config.mni_system,
        config.mni_environment
    );

    let app_state = Arc::new(AppState::new(config.clone(), client));

    let api_routes = Router::new()
        .route(
            "/api/v1/documents/content",
            post(handlers::get_document_content),
        )
        .route("/api/v1/petitions", post(handlers::submit_petition))
        .route("/api/v1/filings", post(handlers::submit_filing))
        .route("/api/v1/environment", put(handlers::switch_environment))
        .layer(
            // Petitions carry whole documents as base64
            ServiceBuilder::new().layer(RequestBodyLimitLayer::new(50 * 1024 * 1024)),
        );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
