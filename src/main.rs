use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;

use lex_accuracy::classifier::IntentClassifier;
use lex_accuracy::config::{ClassifierBackend, Config, HttpConfig, LogFormat, RunConfig, StorageMode};
use lex_accuracy::dataset::{DatasetStore, DiskStore, MemoryStore};
use lex_accuracy::http_classifier::{HttpClassifier, HttpClassifierConfig};
use lex_accuracy::lex_classifier::{LexClassifier, LexConfig};
use lex_accuracy::runner::TestRunner;
use lex_accuracy::{AppState, build_router};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,lex_accuracy=debug".into());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    tracing::info!("Starting lex accuracy server with config: {:?}", config);

    config.validate()?;

    let classifier: Arc<dyn IntentClassifier> = match config.backend {
        ClassifierBackend::Lex => Arc::new(LexClassifier::new(LexConfig::from(&config)).await?),
        ClassifierBackend::Http => {
            Arc::new(HttpClassifier::new(HttpClassifierConfig::from_config(&config)?)?)
        }
    };
    tracing::info!(backend = ?config.backend, "Classifier ready");

    let store: Arc<dyn DatasetStore> = match config.storage {
        StorageMode::Memory => Arc::new(MemoryStore::new()),
        StorageMode::Disk => Arc::new(DiskStore::open(&config.upload_dir).await?),
    };

    let run_config = RunConfig::from(&config);
    let runner = TestRunner::new(run_config.clone(), classifier);
    let state = AppState::new(store, runner, HttpConfig::from(&config));

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = build_router(state)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let listener = TcpListener::bind(&config.server_address()).await?;
    tracing::info!("Server running on http://{}", config.server_address());
    tracing::info!(
        "Workers: {}, request timeout: {:?}",
        run_config.max_workers,
        run_config.request_timeout
    );

    axum::serve(listener, app).await?;
    Ok(())
}
