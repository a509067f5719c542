//! CLI interface for chartqa-annotate

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::annotation::export::{archive_file_name, export_file_name};
use crate::annotation::AnnotationService;
use crate::config::{self, Config};
use crate::images::ImageResolver;
use crate::ingest::{write_failures, Ingestor, ObjectStorageClient};
use crate::store::{self, SqliteRecordStore};
use crate::types::normalize_task;

#[derive(Parser)]
#[command(name = "chartqa-annotate")]
#[command(about = "Human annotation server for chart question-answering datasets", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the annotation server
    Serve {
        /// Host to bind to (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (default from config)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
        /// Enable HTTPS
        #[arg(long)]
        https: bool,
        /// Path to TLS certificate
        #[arg(long)]
        cert: Option<String>,
        /// Path to TLS private key
        #[arg(long)]
        key: Option<String>,
    },
    /// Load task documents, upload chart images and upsert rows
    Ingest {
        /// Directory of task documents (default: store.data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Root of local chart images (default: ingest.image_root)
        #[arg(long)]
        image_root: Option<PathBuf>,
        /// Skip object storage uploads even when configured
        #[arg(long)]
        no_upload: bool,
        /// Where to write the failure log (default: ingest.failures_file)
        #[arg(long)]
        failures: Option<PathBuf>,
    },
    /// List known tasks
    Tasks,
    /// Show progress counts for a task
    Stats {
        task: String,
    },
    /// Export a task, or the completed records of every task as a ZIP
    Export {
        /// Task to export
        #[arg(required_unless_present = "all_completed")]
        task: Option<String>,
        /// Only answered or missing-information records
        #[arg(long)]
        completed: bool,
        /// ZIP of completed records across all tasks
        #[arg(long, conflicts_with = "task")]
        all_completed: bool,
        /// Output file (default: the download name in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };

    match cli.command {
        Commands::Serve { host, port, https, cert, key } => {
            let config = Config::load_from(&config_path)?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(config, &host, port, https, cert, key).await?;
        }
        Commands::Ingest { data_dir, image_root, no_upload, failures } => {
            let mut config = Config::load_from(&config_path)?;
            if let Some(root) = image_root {
                config.ingest.image_root = root;
            }
            let data_dir = data_dir.unwrap_or_else(|| config.store.data_dir.clone());
            let failures = failures.unwrap_or_else(|| config.ingest.failures_file.clone());
            run_ingest(config, &data_dir, no_upload, &failures).await?;
        }
        Commands::Tasks => {
            let service = open_service(&Config::load_from(&config_path)?).await?;
            let tasks = service.list_tasks().await?;
            if tasks.is_empty() {
                println!("No tasks found.");
            }
            for task in tasks {
                let stats = service.stats(&task).await?;
                println!("{:<32} {:>6} / {:<6} done", task, stats.total - stats.remaining, stats.total);
            }
        }
        Commands::Stats { task } => {
            let service = open_service(&Config::load_from(&config_path)?).await?;
            let stats = service.stats(&task).await?;
            println!("Task:      {}", normalize_task(&task));
            println!("Total:     {}", stats.total);
            println!("Answered:  {}", stats.answered);
            println!("Missing:   {}", stats.missing);
            println!("Remaining: {}", stats.remaining);
        }
        Commands::Export { task, completed, all_completed, out } => {
            let service = open_service(&Config::load_from(&config_path)?).await?;
            if all_completed {
                let bytes = service.export_completed_zip(None).await?;
                let out = out.unwrap_or_else(|| PathBuf::from(archive_file_name()));
                write_output(&out, &bytes).await?;
            } else {
                let task = task.context("task required")?;
                let docs = service.export(&task, completed).await?;
                let out = out.unwrap_or_else(|| {
                    PathBuf::from(export_file_name(&normalize_task(&task), completed))
                });
                let body = serde_json::to_vec_pretty(&serde_json::Value::Object(docs))?;
                write_output(&out, &body).await?;
            }
        }
        Commands::Config { show, reset, path } => {
            if path {
                println!("{}", config_path.display());
            }
            if reset {
                Config::default().save_to(&config_path)?;
                println!("✓ Configuration reset: {}", config_path.display());
            }
            if show || !(path || reset) {
                let config = Config::load_from(&config_path)?;
                config::show_config(&config, &config_path)?;
            }
        }
    }

    Ok(())
}

async fn open_service(config: &Config) -> Result<AnnotationService> {
    let store = store::open(config).await?;
    Ok(AnnotationService::new(
        store,
        ImageResolver::new(&config.storage),
        config.aliases.clone(),
    ))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

async fn run_ingest(config: Config, data_dir: &Path, no_upload: bool, failures_file: &Path) -> Result<()> {
    let db_path = config.store.database_path()?;
    let store = SqliteRecordStore::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let uploader = if no_upload {
        None
    } else {
        ObjectStorageClient::from_config(&config.storage, &config.ingest)?
    };
    if !no_upload && config.storage.endpoint.is_some() && uploader.is_none() {
        bail!("Object storage endpoint set but no service key; set STORAGE_SERVICE_KEY or pass --no-upload");
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     ChartQA Annotate Ingestion");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📁 Documents: {}", data_dir.display());
    println!("🖼  Images:    {}", config.ingest.image_root.display());
    println!("🗄  Database:  {}", db_path.display());
    println!(
        "☁  Uploads:   {}",
        if uploader.is_some() { "object storage" } else { "disabled" }
    );
    println!();

    let ingestor = Ingestor::new(
        Arc::new(store),
        config.aliases.clone(),
        config.ingest.clone(),
        &config.storage.prefix,
        ImageResolver::new(&config.storage),
        uploader,
    );
    let report = ingestor.run(data_dir).await?;

    println!();
    println!("✓ Tasks:          {}", report.tasks.join(", "));
    println!("✓ Records:        {}", report.records);
    println!("✓ Uploaded:       {}", report.uploaded);
    println!("  Without image:  {}", report.without_image);
    if write_failures(failures_file, &report.failures).await? {
        println!(
            "⚠ Failed {} items. See {}",
            report.failures.len(),
            failures_file.display()
        );
    }
    println!("All done.");
    Ok(())
}
