use anyhow::Result;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_lexruntime::Client;
use aws_sdk_lexruntime::error::DisplayErrorContext;

use crate::classifier::IntentClassifier;
use crate::config::{BotIdentity, Config};
use crate::types::Recognition;

pub struct LexClassifier {
    client: Client,
    bot: BotIdentity,
}

#[derive(Debug, Clone)]
pub struct LexConfig {
    pub bot: BotIdentity,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl From<&Config> for LexConfig {
    fn from(config: &Config) -> Self {
        Self {
            bot: BotIdentity::from(config),
            region: config.aws_region.clone(),
            endpoint_url: config.lex_endpoint_url.clone(),
        }
    }
}

impl LexClassifier {
    #[tracing::instrument(skip(config), fields(bot = %config.bot.bot_name, alias = %config.bot.bot_alias))]
    pub async fn new(config: LexConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint_url) = config.endpoint_url {
            tracing::info!(%endpoint_url, "Using custom Lex endpoint");
            loader = loader.endpoint_url(endpoint_url);
        }

        let sdk_config = loader.load().await;
        match sdk_config.region() {
            Some(region) => tracing::info!(%region, "Lex runtime client configured"),
            None => tracing::warn!("No AWS region resolved; Lex calls will fail until one is set"),
        }

        Ok(Self {
            client: Client::new(&sdk_config),
            bot: config.bot,
        })
    }
}

#[async_trait]
impl IntentClassifier for LexClassifier {
    #[tracing::instrument(skip(self))]
    async fn recognize(&self, utterance: &str) -> Result<Recognition> {
        let output = self
            .client
            .post_text()
            .bot_name(&self.bot.bot_name)
            .bot_alias(&self.bot.bot_alias)
            .user_id(&self.bot.user_id)
            .input_text(utterance)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Lex PostText failed: {}", DisplayErrorContext(&e)))?;

        Ok(Recognition {
            intent_name: output.intent_name().map(str::to_string),
            confidence: output
                .nlu_intent_confidence()
                .map(|confidence| confidence.score())
                .unwrap_or(0.0),
        })
    }
}
