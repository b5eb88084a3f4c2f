use crate::types::Recognition;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn recognize(&self, utterance: &str) -> Result<Recognition>;
}
