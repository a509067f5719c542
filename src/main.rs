//! ChartQA Annotate - human annotation server for chart QA datasets

use chartqa_annotate::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install Rustls crypto provider for HTTPS support
    // This is required for Rustls 0.23+
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install Rustls crypto provider"))?;

    // Initialize logging (crate at INFO by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chartqa_annotate=info".parse::<tracing_subscriber::filter::Directive>()?),
        )
        .init();

    // Run CLI
    cli::run().await
}
