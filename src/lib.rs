//! Batch accuracy testing for chatbot intent recognition.
//!
//! Labeled utterance datasets are uploaded as CSV files, every utterance is
//! sent to an intent classifier over a bounded worker pool, and the results
//! are aggregated into accuracy, a confusion matrix and a per-label report.

pub mod api;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod http_classifier;
pub mod lex_classifier;
pub mod report;
pub mod runner;
pub mod types;
pub mod ui;
pub mod ws;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::HttpConfig;
use dataset::DatasetStore;
use error::ApiResult;
use report::TestReport;
use runner::TestRunner;
use types::{Selection, TestResult, UtteranceRecord};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DatasetStore>,
    runner: Arc<TestRunner>,
    http: Arc<HttpConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn DatasetStore>, runner: TestRunner, http: HttpConfig) -> Self {
        Self {
            store,
            runner: Arc::new(runner),
            http: Arc::new(http),
        }
    }

    pub fn store(&self) -> &dyn DatasetStore {
        self.store.as_ref()
    }

    pub fn http_config(&self) -> &HttpConfig {
        &self.http
    }

    /// Rows of the selected datasets, ready to be tested.
    pub async fn load_records(&self, selection: &Selection) -> ApiResult<Vec<UtteranceRecord>> {
        let datasets = self.store.load(selection).await?;
        let names: Vec<&str> = datasets.iter().map(|d| d.name.as_str()).collect();
        tracing::info!(datasets = ?names, "Loaded datasets for test run");

        let records = dataset::flatten(datasets);
        if records.is_empty() {
            return Err(error::ApiError::BadRequest(
                "Selected datasets contain no utterances".to_string(),
            ));
        }
        Ok(records)
    }

    /// Run every record through the classifier and aggregate the results.
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub async fn execute(
        &self,
        records: Vec<UtteranceRecord>,
        progress: Option<flume::Sender<TestResult>>,
    ) -> TestReport {
        counter!("test_runs_total").increment(1);
        let started = Instant::now();

        let results = self.runner.run(records, progress).await;
        let report = TestReport::from_results(&results);

        let elapsed = started.elapsed();
        histogram!("test_run_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            report_id = %report.id,
            total = report.total,
            errors = report.errors,
            accuracy = report.accuracy,
            elapsed_ms = elapsed.as_millis(),
            "Test run finished"
        );

        report
    }

    pub async fn run_test(&self, selection: &Selection) -> ApiResult<TestReport> {
        let records = self.load_records(selection).await?;
        Ok(self.execute(records, None).await)
    }
}

fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(api::upload))
        .route("/start_test", post(api::start_test))
        .route("/datasets", get(api::list_datasets))
}

/// Build the application router. Test routes are served both at the root and
/// under `/api`; unmatched GET paths fall back to the frontend's index page and
/// other methods on unmatched paths get 405.
pub fn build_router(state: AppState) -> Router {
    let static_dir = ServeDir::new(&state.http.static_dir);
    let upload_limit = state.http.max_upload_bytes;

    Router::new()
        .merge(test_routes())
        .nest("/api", test_routes())
        .route("/health", get(api::health))
        .route("/ws/start_test", get(ws::start_test_socket))
        .route("/", get(ui::serve_index))
        .route("/index.html", get(ui::serve_index))
        .nest_service("/static", static_dir)
        .fallback(get(ui::serve_index))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
