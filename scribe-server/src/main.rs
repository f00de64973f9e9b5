use std::sync::Arc;

use clap::Parser;
use scribe_core::{AnthropicClient, AnthropicConfig, CaptureStore, PgCaptureStore, ScribeConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use scribe_server::subsystems::pipeline::{Pipeline, PipelineSettings};
use scribe_server::subsystems::runner::{InProcessLocks, JobRunner};
use scribe_server::subsystems::scheduler::BackoffScheduler;
use scribe_server::subsystems::worker;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "scribe.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Process a single capture in the foreground and exit.
    #[arg(long, value_name = "CAPTURE_ID")]
    process: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match ScribeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let pool = match scribe_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match scribe_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Scribe DB health check passed");
        return Ok(());
    }

    let generator = AnthropicClient::new({
        let mut generation = AnthropicConfig::new(None, config.generation.model.clone())
            .with_base_url(&config.generation.base_url);
        generation.timeout_seconds = config.generation.timeout_seconds;
        generation
    })?;
    tracing::info!(model = generator.model(), "Generation client ready");

    let store: Arc<dyn CaptureStore> = Arc::new(PgCaptureStore::new(pool.clone()));
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        Arc::new(generator),
        PipelineSettings::from(&config),
    ));

    if let Some(capture_id) = args.process {
        let note = pipeline.process(capture_id).await?;
        println!("✅ Published {} -> {}", note.title, note.file_path);
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let (queue_tx, queue_rx) = worker::invocation_queue();
    let runner = Arc::new(JobRunner::new(
        pipeline,
        Arc::new(BackoffScheduler::from_config(queue_tx.clone(), &config.worker)),
        Arc::new(InProcessLocks::new()),
        config.worker.max_attempts,
    ));

    if config.http.enabled {
        let http_pool = pool.clone();
        let http_config = config.clone();
        let http_queue = queue_tx.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = scribe_server::http::start_http_server(
                http_pool,
                http_config,
                http_queue,
                http_shutdown,
            )
            .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let mut shutdown = tx.subscribe();
    worker::run_worker(
        store,
        runner,
        config.worker.clone(),
        queue_rx,
        tx.subscribe(),
    )
    .await;

    // A disabled worker returns at once; keep serving HTTP until shutdown.
    if !config.worker.enabled {
        let _ = shutdown.recv().await;
    }

    Ok(())
}
