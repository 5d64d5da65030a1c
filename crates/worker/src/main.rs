use genq_pipeline::{DiskImageSaver, HttpGenerator, PipelineLock};
use genq_worker::config::WorkerConfig;
use genq_worker::QueueWorker;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genq_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        inference_url = %config.inference_url,
        results_dir = %config.results_dir.display(),
        image_format = %config.image_format,
        inference_timeout_secs = config.inference_timeout.as_secs_f64(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = genq_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    genq_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    genq_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Pipeline ---
    let generator = HttpGenerator::new(
        config.inference_url.clone(),
        config.image_format,
        config.inference_timeout,
    )
    .expect("Failed to build inference HTTP client");
    let saver = DiskImageSaver::new(config.results_dir.clone());
    let worker = QueueWorker::new(pool, PipelineLock::new(generator), saver, config.queue);

    // --- Shutdown ---
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested; finishing current job");
        signal_token.cancel();
    });

    if let Err(e) = worker.run(shutdown).await {
        tracing::error!(error = %e, "Queue worker stopped");
        std::process::exit(1);
    }

    tracing::info!("Worker stopped");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
