use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::classifier::IntentClassifier;
use crate::config::RunConfig;
use crate::types::{TestResult, UtteranceRecord};

/// Fans utterances out to a fixed pool of workers that share one classifier.
pub struct TestRunner {
    classifier: Arc<dyn IntentClassifier>,
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig, classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier, config }
    }

    /// Classify every record and return one result per record, in completion
    /// order. Failed calls are recorded as `ERROR` results. When `progress` is
    /// given, each result is also sent there as soon as it completes.
    #[tracing::instrument(skip_all, fields(records = records.len(), workers = self.config.max_workers))]
    pub async fn run(
        &self,
        records: Vec<UtteranceRecord>,
        progress: Option<flume::Sender<TestResult>>,
    ) -> Vec<TestResult> {
        let total = records.len();
        let worker_count = self.config.max_workers.max(1).min(total.max(1));

        let (job_tx, job_rx) = flume::bounded::<UtteranceRecord>(worker_count);
        let (result_tx, result_rx) = flume::unbounded::<TestResult>();

        let workers: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker_id| {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let classifier = Arc::clone(&self.classifier);
                let timeout = self.config.request_timeout;
                tokio::spawn(async move {
                    while let Ok(record) = job_rx.recv_async().await {
                        let result = test_utterance(classifier.as_ref(), record, timeout).await;
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                    tracing::trace!(worker_id, "Worker finished");
                })
            })
            .collect();
        drop(job_rx);
        drop(result_tx);

        let feeder = tokio::spawn(async move {
            for record in records {
                if job_tx.send_async(record).await.is_err() {
                    tracing::warn!("All workers exited before the queue was drained");
                    break;
                }
            }
        });

        let mut results = Vec::with_capacity(total);
        while let Ok(result) = result_rx.recv_async().await {
            if let Some(progress) = &progress {
                // A gone listener must not stop the run.
                let _ = progress.send_async(result.clone()).await;
            }
            results.push(result);
        }

        if let Err(e) = feeder.await {
            tracing::error!("Feeder task failed: {}", e);
        }
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        if results.len() != total {
            tracing::error!(
                expected = total,
                collected = results.len(),
                "Some utterances produced no result"
            );
        }

        results
    }
}

async fn test_utterance(
    classifier: &dyn IntentClassifier,
    record: UtteranceRecord,
    timeout: Duration,
) -> TestResult {
    counter!("utterances_tested_total").increment(1);

    match tokio::time::timeout(timeout, classifier.recognize(&record.utterance)).await {
        Ok(Ok(recognition)) => {
            tracing::debug!(
                utterance = %record.utterance,
                detected = ?recognition.intent_name,
                confidence = recognition.confidence,
                "Utterance classified"
            );
            TestResult::recognized(record, recognition)
        }
        Ok(Err(e)) => {
            counter!("classification_errors_total").increment(1);
            tracing::error!(utterance = %record.utterance, error = %e, "Error processing utterance");
            TestResult::failed(record)
        }
        Err(_) => {
            counter!("classification_errors_total").increment(1);
            tracing::error!(
                utterance = %record.utterance,
                timeout_ms = timeout.as_millis(),
                "Classification timed out"
            );
            TestResult::failed(record)
        }
    }
}
