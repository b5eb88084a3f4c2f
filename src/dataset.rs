//! Uploaded utterance datasets.
//!
//! A dataset is one CSV file with an `utterance` column. The file's base name
//! is the expected intent for every row in it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::{Selection, UtteranceRecord};

const UTTERANCE_COLUMN: &str = "utterance";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("No files uploaded")]
    NothingUploaded,

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("{file}: missing 'utterance' column")]
    MissingColumn { file: String },

    #[error("{file}: not valid UTF-8")]
    Encoding { file: String },

    #[error("{file}: invalid dataset name")]
    InvalidName { file: String },

    #[error("{file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub records: Vec<UtteranceRecord>,
}

/// Derive the intent label from an uploaded file name: directory parts and
/// the last extension are dropped.
pub fn intent_name_from_file(file_name: &str) -> &str {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

impl Dataset {
    pub fn from_csv(file_name: &str, bytes: &[u8]) -> Result<Self, DatasetError> {
        let name = intent_name_from_file(file_name).trim();
        if name.is_empty() || name.starts_with('.') {
            return Err(DatasetError::InvalidName {
                file: file_name.to_string(),
            });
        }

        let text = std::str::from_utf8(bytes).map_err(|_| DatasetError::Encoding {
            file: file_name.to_string(),
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let csv_error = |source| DatasetError::Csv {
            file: file_name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let column = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .position(|header| header == UTTERANCE_COLUMN)
            .ok_or_else(|| DatasetError::MissingColumn {
                file: file_name.to_string(),
            })?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(csv_error)?;
            match row.get(column) {
                Some(utterance) if !utterance.is_empty() => records.push(UtteranceRecord {
                    utterance: utterance.to_string(),
                    expected_intent: name.to_string(),
                }),
                _ => continue,
            }
        }

        Ok(Self {
            name: name.to_string(),
            records,
        })
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, DatasetError> {
        let csv_error = |source| DatasetError::Csv {
            file: self.name.clone(),
            source,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([UTTERANCE_COLUMN]).map_err(csv_error)?;
        for record in &self.records {
            writer
                .write_record([record.utterance.as_str()])
                .map_err(csv_error)?;
        }
        writer
            .into_inner()
            .map_err(|e| DatasetError::Io(e.into_error()))
    }
}

/// Flatten datasets into one list of rows, in dataset order.
pub fn flatten(datasets: Vec<Dataset>) -> Vec<UtteranceRecord> {
    datasets
        .into_iter()
        .flat_map(|dataset| dataset.records)
        .collect()
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Keep the given datasets and return the names they were stored under.
    async fn store(&self, datasets: Vec<Dataset>) -> Result<Vec<String>, DatasetError>;

    async fn names(&self) -> Result<Vec<String>, DatasetError>;

    async fn load(&self, selection: &Selection) -> Result<Vec<Dataset>, DatasetError>;
}

/// Process-local store. Every upload replaces whatever was uploaded before.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<BTreeMap<String, Dataset>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatasetStore for MemoryStore {
    async fn store(&self, datasets: Vec<Dataset>) -> Result<Vec<String>, DatasetError> {
        let mut stored = self.datasets.write().await;
        stored.clear();

        let mut names = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            if !names.contains(&dataset.name) {
                names.push(dataset.name.clone());
            }
            stored.insert(dataset.name.clone(), dataset);
        }
        Ok(names)
    }

    async fn names(&self) -> Result<Vec<String>, DatasetError> {
        Ok(self.datasets.read().await.keys().cloned().collect())
    }

    async fn load(&self, selection: &Selection) -> Result<Vec<Dataset>, DatasetError> {
        let stored = self.datasets.read().await;
        if stored.is_empty() {
            return Err(DatasetError::NothingUploaded);
        }

        match selection {
            Selection::All => Ok(stored.values().cloned().collect()),
            Selection::Named(names) => names
                .iter()
                .map(|name| {
                    stored
                        .get(name)
                        .cloned()
                        .ok_or_else(|| DatasetError::UnknownDataset(name.clone()))
                })
                .collect(),
        }
    }
}

/// Keeps each dataset as `<dir>/<name>.csv`. Uploads accumulate and files are
/// never removed.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "Storing uploaded datasets on disk");
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    async fn read(&self, name: &str) -> Result<Dataset, DatasetError> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(DatasetError::UnknownDataset(name.to_string()));
        }
        let file_name = format!("{name}.csv");
        let bytes = match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::UnknownDataset(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Dataset::from_csv(&file_name, &bytes)
    }
}

fn dataset_name(path: &Path) -> Option<String> {
    if path.extension()? != "csv" {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

#[async_trait]
impl DatasetStore for DiskStore {
    async fn store(&self, datasets: Vec<Dataset>) -> Result<Vec<String>, DatasetError> {
        let mut names = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let path = self.path_for(&dataset.name);
            tokio::fs::write(&path, dataset.to_csv()?).await?;
            tracing::debug!(path = %path.display(), rows = dataset.records.len(), "Dataset written");
            if !names.contains(&dataset.name) {
                names.push(dataset.name);
            }
        }
        Ok(names)
    }

    async fn names(&self) -> Result<Vec<String>, DatasetError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = dataset_name(&entry.path()) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load(&self, selection: &Selection) -> Result<Vec<Dataset>, DatasetError> {
        let names = match selection {
            Selection::All => {
                let names = self.names().await?;
                if names.is_empty() {
                    return Err(DatasetError::NothingUploaded);
                }
                names
            }
            Selection::Named(names) => names.clone(),
        };

        let mut datasets = Vec::with_capacity(names.len());
        for name in &names {
            datasets.push(self.read(name).await?);
        }
        Ok(datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_name_strips_last_extension() {
        assert_eq!(intent_name_from_file("greeting.csv"), "greeting");
        assert_eq!(intent_name_from_file("order.pizza.csv"), "order.pizza");
        assert_eq!(intent_name_from_file("faq"), "faq");
        assert_eq!(intent_name_from_file("data/cancel.csv"), "cancel");
        assert_eq!(intent_name_from_file("C:\\exports\\refund.csv"), "refund");
        assert_eq!(intent_name_from_file(".hidden"), ".hidden");
    }

    #[test]
    fn parses_rows_and_labels_them() {
        let csv = "utterance,notes\nhello there,x\n  hi  ,\n,empty\ngood morning,y\n";
        let dataset = Dataset::from_csv("Greeting.csv", csv.as_bytes()).unwrap();
        assert_eq!(dataset.name, "Greeting");
        let utterances: Vec<_> = dataset
            .records
            .iter()
            .map(|r| r.utterance.as_str())
            .collect();
        assert_eq!(utterances, ["hello there", "hi", "good morning"]);
        assert!(dataset.records.iter().all(|r| r.expected_intent == "Greeting"));
    }

    #[test]
    fn utterance_column_need_not_be_first() {
        let csv = "id,utterance\n1,\"cancel my order, please\"\n";
        let dataset = Dataset::from_csv("Cancel.csv", csv.as_bytes()).unwrap();
        assert_eq!(dataset.records[0].utterance, "cancel my order, please");
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let csv = "\u{feff}utterance\nhello\n";
        let dataset = Dataset::from_csv("Greeting.csv", csv.as_bytes()).unwrap();
        assert_eq!(dataset.records.len(), 1);
    }

    #[test]
    fn missing_column_is_rejected() {
        let err = Dataset::from_csv("Greeting.csv", b"text\nhello\n").unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { .. }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = Dataset::from_csv("Greeting.csv", &[b'u', 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, DatasetError::Encoding { .. }));
    }

    #[test]
    fn csv_round_trip_keeps_quoting() {
        let dataset = Dataset::from_csv("Order.csv", b"utterance\n\"one, two\"\nthree\n").unwrap();
        let bytes = dataset.to_csv().unwrap();
        let reparsed = Dataset::from_csv("Order.csv", &bytes).unwrap();
        assert_eq!(reparsed, dataset);
    }

    fn dataset(name: &str, utterances: &[&str]) -> Dataset {
        Dataset {
            name: name.to_string(),
            records: utterances
                .iter()
                .map(|u| UtteranceRecord {
                    utterance: u.to_string(),
                    expected_intent: name.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn memory_store_replaces_previous_upload() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load(&Selection::All).await,
            Err(DatasetError::NothingUploaded)
        ));

        store
            .store(vec![dataset("Greeting", &["hi"]), dataset("Goodbye", &["bye"])])
            .await
            .unwrap();
        let names = store.store(vec![dataset("Cancel", &["stop"])]).await.unwrap();
        assert_eq!(names, ["Cancel"]);
        assert_eq!(store.names().await.unwrap(), ["Cancel"]);
    }

    #[tokio::test]
    async fn memory_store_selects_by_name() {
        let store = MemoryStore::new();
        store
            .store(vec![dataset("Greeting", &["hi"]), dataset("Goodbye", &["bye", "see ya"])])
            .await
            .unwrap();

        let loaded = store
            .load(&Selection::Named(vec!["Goodbye".to_string()]))
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(flatten(loaded).len(), 2);

        let err = store
            .load(&Selection::Named(vec!["Missing".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::UnknownDataset(name) if name == "Missing"));
    }

    #[tokio::test]
    async fn disk_store_accumulates_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path().join("uploads")).await.unwrap();
        assert!(matches!(
            store.load(&Selection::All).await,
            Err(DatasetError::NothingUploaded)
        ));

        store.store(vec![dataset("Greeting", &["hi"])]).await.unwrap();
        store
            .store(vec![dataset("Goodbye", &["bye", "later"])])
            .await
            .unwrap();
        std::fs::write(dir.path().join("uploads/notes.txt"), "ignored").unwrap();

        assert_eq!(store.names().await.unwrap(), ["Goodbye", "Greeting"]);

        let all = store.load(&Selection::All).await.unwrap();
        assert_eq!(all[0], dataset("Goodbye", &["bye", "later"]));
        assert_eq!(flatten(all).len(), 3);

        let err = store
            .load(&Selection::Named(vec!["Cancel".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::UnknownDataset(_)));
    }
}
