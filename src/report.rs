//! Accuracy, confusion matrix and per-label classification report over
//! expected vs. detected intents.
//!
//! The report layout follows scikit-learn's `classification_report(...,
//! output_dict=True)`: one entry per label, then `accuracy`, `macro avg` and
//! `weighted avg`. Metrics with a zero denominator are reported as 0.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::types::TestResult;

/// Fraction of results whose detected intent equals the expected one.
pub fn accuracy(results: &[TestResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let correct = results.iter().filter(|r| r.is_correct()).count();
    correct as f64 / results.len() as f64
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Rows are expected labels, columns detected labels, both in `labels` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn from_results(results: &[TestResult]) -> Self {
        let labels: Vec<String> = results
            .iter()
            .flat_map(|r| [r.expected_intent.as_str(), r.detected_intent.as_str()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let index: BTreeMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), i))
            .collect();

        let mut counts = vec![vec![0u64; labels.len()]; labels.len()];
        for result in results {
            let row = index[result.expected_intent.as_str()];
            let col = index[result.detected_intent.as_str()];
            counts[row][col] += 1;
        }

        Self { labels, counts }
    }

    /// Number of rows expected to be each label.
    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Number of rows detected as each label.
    pub fn column_totals(&self) -> Vec<u64> {
        (0..self.labels.len())
            .map(|col| self.counts.iter().map(|row| row[col]).sum())
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn correct(&self) -> u64 {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: u64,
}

impl LabelMetrics {
    fn new(precision: f64, recall: f64, support: u64) -> Self {
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            precision,
            recall,
            f1_score,
            support,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(flatten)]
    pub labels: BTreeMap<String, LabelMetrics>,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: LabelMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: LabelMetrics,
}

impl ClassificationReport {
    pub fn from_matrix(matrix: &ConfusionMatrix) -> Self {
        let row_totals = matrix.row_totals();
        let column_totals = matrix.column_totals();
        let total = matrix.total();

        let per_label: Vec<(String, LabelMetrics)> = matrix
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let hits = matrix.counts[i][i];
                let metrics = LabelMetrics::new(
                    ratio(hits, column_totals[i]),
                    ratio(hits, row_totals[i]),
                    row_totals[i],
                );
                (label.clone(), metrics)
            })
            .collect();

        let label_count = per_label.len().max(1) as f64;
        let weight = |support: u64| if total == 0 { 0.0 } else { support as f64 / total as f64 };

        let mut macro_avg = LabelMetrics {
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            support: total,
        };
        let mut weighted_avg = macro_avg.clone();
        for (_, metrics) in &per_label {
            macro_avg.precision += metrics.precision / label_count;
            macro_avg.recall += metrics.recall / label_count;
            macro_avg.f1_score += metrics.f1_score / label_count;

            let w = weight(metrics.support);
            weighted_avg.precision += metrics.precision * w;
            weighted_avg.recall += metrics.recall * w;
            weighted_avg.f1_score += metrics.f1_score * w;
        }

        Self {
            labels: per_label.into_iter().collect(),
            accuracy: ratio(matrix.correct(), total),
            macro_avg,
            weighted_avg,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub id: String,
    pub created: i64,
    /// Percentage of correct rows, rounded to two decimals.
    pub accuracy: f64,
    pub total: usize,
    pub errors: usize,
    pub labels: Vec<String>,
    pub confusion_matrix: Vec<Vec<u64>>,
    pub classification_report: ClassificationReport,
}

impl TestReport {
    pub fn from_results(results: &[TestResult]) -> Self {
        let matrix = ConfusionMatrix::from_results(results);
        let classification_report = ClassificationReport::from_matrix(&matrix);
        let errors = results
            .iter()
            .filter(|r| r.detected_intent == crate::types::ERROR_INTENT)
            .count();

        Self {
            id: format!("test-{}", Uuid::new_v4().simple()),
            created: Utc::now().timestamp(),
            accuracy: (accuracy(results) * 10_000.0).round() / 100.0,
            total: results.len(),
            errors,
            labels: matrix.labels,
            confusion_matrix: matrix.counts,
            classification_report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ERROR_INTENT;

    fn result(expected: &str, detected: &str) -> TestResult {
        TestResult {
            utterance: format!("{expected} -> {detected}"),
            expected_intent: expected.to_string(),
            detected_intent: detected.to_string(),
            confidence: 0.5,
        }
    }

    fn sample() -> Vec<TestResult> {
        vec![
            result("Greeting", "Greeting"),
            result("Greeting", "Greeting"),
            result("Greeting", "Goodbye"),
            result("Goodbye", "Goodbye"),
            result("Goodbye", ERROR_INTENT),
            result("Cancel", "Cancel"),
        ]
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn accuracy_is_fraction_of_matches() {
        assert!(close(accuracy(&sample()), 4.0 / 6.0));
        assert_eq!(accuracy(&[]), 0.0);
    }

    #[test]
    fn matrix_labels_are_sorted_union() {
        let matrix = ConfusionMatrix::from_results(&sample());
        assert_eq!(matrix.labels, ["Cancel", "ERROR", "Goodbye", "Greeting"]);
        assert_eq!(
            matrix.counts,
            vec![
                vec![1, 0, 0, 0],
                vec![0, 0, 0, 0],
                vec![0, 1, 1, 0],
                vec![0, 0, 1, 2],
            ]
        );
    }

    #[test]
    fn matrix_totals_match_label_counts() {
        let results = sample();
        let matrix = ConfusionMatrix::from_results(&results);

        for (i, label) in matrix.labels.iter().enumerate() {
            let expected = results.iter().filter(|r| &r.expected_intent == label).count() as u64;
            let detected = results.iter().filter(|r| &r.detected_intent == label).count() as u64;
            assert_eq!(matrix.row_totals()[i], expected, "row total for {label}");
            assert_eq!(matrix.column_totals()[i], detected, "column total for {label}");
        }
        assert_eq!(matrix.total(), results.len() as u64);
    }

    #[test]
    fn per_label_precision_and_recall() {
        let matrix = ConfusionMatrix::from_results(&sample());
        let report = ClassificationReport::from_matrix(&matrix);

        let greeting = &report.labels["Greeting"];
        assert!(close(greeting.precision, 1.0));
        assert!(close(greeting.recall, 2.0 / 3.0));
        assert!(close(greeting.f1_score, 0.8));
        assert_eq!(greeting.support, 3);

        let goodbye = &report.labels["Goodbye"];
        assert!(close(goodbye.precision, 0.5));
        assert!(close(goodbye.recall, 0.5));
        assert_eq!(goodbye.support, 2);

        let error = &report.labels[ERROR_INTENT];
        assert_eq!(error.precision, 0.0);
        assert_eq!(error.recall, 0.0);
        assert_eq!(error.f1_score, 0.0);
        assert_eq!(error.support, 0);

        assert!(close(report.accuracy, 4.0 / 6.0));
        assert_eq!(report.macro_avg.support, 6);
        assert!(close(report.macro_avg.precision, (1.0 + 0.0 + 0.5 + 1.0) / 4.0));
        assert!(close(
            report.weighted_avg.recall,
            (1.0 * 1.0 + 0.5 * 2.0 + (2.0 / 3.0) * 3.0) / 6.0
        ));
    }

    #[test]
    fn report_serializes_in_sklearn_layout() {
        let report = TestReport::from_results(&sample());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["accuracy"], 66.67);
        assert_eq!(json["total"], 6);
        assert_eq!(json["errors"], 1);
        assert_eq!(json["confusion_matrix"][3][3], 2);
        assert_eq!(json["classification_report"]["Greeting"]["support"], 3);
        assert!(json["classification_report"]["Greeting"]["f1-score"].is_number());
        assert!(json["classification_report"]["macro avg"]["precision"].is_number());
        assert!(json["classification_report"]["weighted avg"]["recall"].is_number());
        assert!(json["classification_report"]["accuracy"].is_number());
    }

    #[test]
    fn empty_results_give_empty_report() {
        let report = TestReport::from_results(&[]);
        assert_eq!(report.accuracy, 0.0);
        assert!(report.labels.is_empty());
        assert!(report.confusion_matrix.is_empty());
        assert!(report.classification_report.labels.is_empty());
    }
}
