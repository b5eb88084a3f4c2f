//! Classifier backend for HTTP endpoints that accept the Lex `PostText`
//! request body as JSON and answer with the `PostText` response shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::IntentClassifier;
use crate::config::{BotIdentity, Config};
use crate::types::Recognition;

const USER_AGENT: &str = concat!("lex-accuracy/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostTextRequest<'a> {
    bot_name: &'a str,
    bot_alias: &'a str,
    user_id: &'a str,
    input_text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostTextResponse {
    intent_name: Option<String>,
    nlu_intent_confidence: Option<IntentConfidence>,
}

#[derive(Debug, Deserialize)]
struct IntentConfidence {
    score: Option<f64>,
}

impl From<PostTextResponse> for Recognition {
    fn from(response: PostTextResponse) -> Self {
        Self {
            intent_name: response.intent_name,
            confidence: response
                .nlu_intent_confidence
                .and_then(|confidence| confidence.score)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    pub url: String,
    pub bot: BotIdentity,
    pub timeout: Duration,
}

impl HttpClassifierConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .classifier_url
            .clone()
            .context("--classifier-url is required for the http backend")?;
        Ok(Self {
            url,
            bot: BotIdentity::from(config),
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }
}

pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    bot: BotIdentity,
}

impl HttpClassifier {
    pub fn new(config: HttpClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        tracing::info!(url = %config.url, "HTTP classifier configured");

        Ok(Self {
            client,
            url: config.url,
            bot: config.bot,
        })
    }
}

#[async_trait]
impl IntentClassifier for HttpClassifier {
    #[tracing::instrument(skip(self))]
    async fn recognize(&self, utterance: &str) -> Result<Recognition> {
        let request = PostTextRequest {
            bot_name: &self.bot.bot_name,
            bot_alias: &self.bot.bot_alias,
            user_id: &self.bot.user_id,
            input_text: utterance,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Classifier request failed")?
            .error_for_status()
            .context("Classifier returned an error status")?;

        let body: PostTextResponse = response
            .json()
            .await
            .context("Failed to parse classifier response")?;

        Ok(body.into())
    }
}
