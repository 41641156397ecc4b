use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use bulk_studio::api::{self, AppState};
use bulk_studio::config::AppConfig;
use bulk_studio::generation::GenerationProcessor;
use bulk_studio::prompts::PromptClassifier;
use bulk_studio::queue::QueueManager;
use bulk_studio::storage::ImageStore;
use bulk_studio::store::{GenerationStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Log to stdout and a daily-rolling file; keep the guard alive for
    // the life of the process so buffered lines get flushed.
    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "bulk-studio.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stdout))
        .with_target(false)
        .init();

    eprintln!("🎨 Bulk Studio v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);
    eprintln!("   Output: {}", config.output_dir.display());
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Workers: {}\n", config.queue.concurrency);

    std::fs::create_dir_all(&config.output_dir)?;

    let store: Arc<dyn GenerationStore> =
        Arc::new(LibSqlStore::new_local(&config.db_path).await?);
    let images = Arc::new(ImageStore::new(&config.output_dir));

    let processor = Arc::new(GenerationProcessor::new(
        config.generation.clone(),
        Arc::clone(&images),
        Arc::clone(&store),
    ));
    let queue = Arc::new(QueueManager::with_handler(config.queue.clone(), processor));
    queue.start(config.queue.concurrency).await?;

    let state = AppState {
        queue: Arc::clone(&queue),
        store,
        generation: config.generation.clone(),
        classifier: Arc::new(PromptClassifier::new()),
    };
    let app = api::routes(state).layer(cors_layer(&config.cors_origins)?);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "HTTP server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight generation jobs finish before exiting.
    queue.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}
