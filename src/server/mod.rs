//! Annotation web server

pub mod http;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    response::Html,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::annotation::AnnotationService;
use crate::config::Config;
use crate::images::{ImageResolver, LOCAL_IMAGE_ROUTE};
use crate::store;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub service: AnnotationService,
}

impl ServerState {
    pub fn new(config: Config, service: AnnotationService) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }
}

/// Build the application router
pub fn build_router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.body_limit_bytes;
    let image_root = state.config.ingest.image_root.clone();

    let api = Router::new()
        .route("/", get(index_page))
        .route("/api/tasks", get(http::tasks_handler))
        .route("/api/examples", get(http::next_example_handler))
        .route("/api/submit", post(http::submit_handler))
        .route("/api/question", post(http::question_handler))
        .route("/api/options", post(http::options_handler))
        .route("/api/stats", get(http::stats_handler))
        .route("/api/export", get(http::export_handler))
        .route("/api/export/completed.zip", get(http::export_zip_handler))
        .route("/api/status", get(http::status_handler));

    api.nest_service(LOCAL_IMAGE_ROUTE, ServeDir::new(image_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server
pub async fn start(
    config: Config,
    host: &str,
    port: u16,
    https: bool,
    cert: Option<String>,
    key: Option<String>,
) -> Result<()> {
    let store = store::open(&config).await?;
    let tasks = store.list_tasks().await?;
    let images = ImageResolver::new(&config.storage);
    let service = AnnotationService::new(store, images.clone(), config.aliases.clone());
    let state = ServerState::new(config, service);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;
    let app = build_router(state.clone());

    // Print startup message
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     ChartQA Annotate Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Server binding to: {}", addr);
    println!(
        "✓ Record store: {} ({} tasks)",
        state.service.store().backend_name(),
        tasks.len()
    );
    if images.is_remote() {
        println!("✓ Images: object storage");
    } else {
        println!(
            "✓ Images: {} from {}",
            LOCAL_IMAGE_ROUTE,
            state.config.ingest.image_root.display()
        );
    }
    if https {
        println!("✓ HTTPS enabled");
    } else {
        println!("⚠ HTTPS disabled");
    }
    println!();
    println!("🚀 Listening on http{}://{}", if https { "s" } else { "" }, addr);
    println!();
    info!("Serving {} tasks on {}", tasks.len(), addr);

    // HTTPS mode
    if https {
        if let (Some(cert_path), Some(key_path)) = (cert, key) {
            let cert_data = tokio::fs::read(&cert_path)
                .await
                .context("Failed to read certificate file")?;
            let key_data = tokio::fs::read(&key_path)
                .await
                .context("Failed to read key file")?;

            let tls = axum_server::tls_rustls::RustlsConfig::from_pem(cert_data, key_data).await?;
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
            return Ok(());
        }
        anyhow::bail!("--https requires --cert and --key");
    }

    // HTTP mode
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}

/// Handler for the index page
async fn index_page() -> Html<&'static str> {
    Html(r#"<!DOCTYPE html>
<html>
<head>
    <title>ChartQA Annotate</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            background: #1a1a1a;
            color: #e0e0e0;
        }
        h1 { color: #4CAF50; }
        .endpoint {
            background: #333;
            padding: 10px;
            margin: 10px 0;
            border-radius: 4px;
            font-family: monospace;
        }
    </style>
</head>
<body>
    <h1>ChartQA Annotate</h1>
    <p>Annotation server is running.</p>
    <h2>API Endpoints:</h2>
    <div class="endpoint">GET /api/tasks - Known tasks</div>
    <div class="endpoint">GET /api/examples?task=&amp;after= - Next pending example</div>
    <div class="endpoint">POST /api/submit - Answer or mark missing information</div>
    <div class="endpoint">POST /api/question - Edit the question</div>
    <div class="endpoint">POST /api/options - Edit the options</div>
    <div class="endpoint">GET /api/stats?task= - Progress counts</div>
    <div class="endpoint">GET /api/export?task=&amp;completed=1 - Download a task</div>
    <div class="endpoint">GET /api/export/completed.zip - Completed records of all tasks</div>
    <div class="endpoint">GET /api/status - Server status</div>
</body>
</html>"#)
}
