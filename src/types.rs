use serde::{Deserialize, Serialize};

/// Detected intent recorded when the classifier call failed.
pub const ERROR_INTENT: &str = "ERROR";

/// Detected intent recorded when the classifier matched nothing.
pub const NO_INTENT: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtteranceRecord {
    pub utterance: String,
    pub expected_intent: String,
}

/// What the classifier returned for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub intent_name: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub utterance: String,
    pub expected_intent: String,
    pub detected_intent: String,
    pub confidence: f64,
}

impl TestResult {
    pub fn recognized(record: UtteranceRecord, recognition: Recognition) -> Self {
        Self {
            utterance: record.utterance,
            expected_intent: record.expected_intent,
            detected_intent: recognition
                .intent_name
                .unwrap_or_else(|| NO_INTENT.to_string()),
            confidence: recognition.confidence,
        }
    }

    pub fn failed(record: UtteranceRecord) -> Self {
        Self {
            utterance: record.utterance,
            expected_intent: record.expected_intent,
            detected_intent: ERROR_INTENT.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_correct(&self) -> bool {
        self.expected_intent == self.detected_intent
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTestRequest {
    #[serde(default)]
    pub datasets: Option<Vec<String>>,
    #[serde(default)]
    pub use_all: bool,
}

/// Which uploaded datasets a test run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Named(Vec<String>),
}

impl StartTestRequest {
    pub fn selection(self) -> Selection {
        match self.datasets {
            Some(names) if !self.use_all && !names.is_empty() => Selection::Named(names),
            _ => Selection::All,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetList {
    pub datasets: Vec<String>,
}
