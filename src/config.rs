use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierBackend {
    /// AWS Lex runtime PostText
    Lex,
    /// Any HTTP endpoint speaking the PostText JSON shape
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageMode {
    /// Keep the latest upload in memory; each upload replaces the previous set
    Memory,
    /// Write uploads to a local folder; uploads accumulate
    Disk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Lex bot name
    #[arg(long, env = "BOT_NAME")]
    pub bot_name: String,

    /// Lex bot alias
    #[arg(long, env = "BOT_ALIAS")]
    pub bot_alias: String,

    /// User id sent with every classification request
    #[arg(long, env = "USER_ID", default_value = "test_user")]
    pub user_id: String,

    /// Which classifier to send utterances to
    #[arg(long, env = "CLASSIFIER_BACKEND", value_enum, default_value = "lex")]
    pub backend: ClassifierBackend,

    /// AWS region override for the Lex client
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Endpoint override for the Lex client
    #[arg(long, env = "LEX_ENDPOINT_URL")]
    pub lex_endpoint_url: Option<String>,

    /// URL of the HTTP classifier (required with --backend http)
    #[arg(long, env = "CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    /// Number of concurrent classification workers per test run
    #[arg(long, env = "MAX_WORKERS", default_value = "10")]
    pub max_workers: usize,

    /// Timeout for a single classification call in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Where uploaded datasets are kept
    #[arg(long, env = "STORAGE", value_enum, default_value = "memory")]
    pub storage: StorageMode,

    /// Folder for uploaded datasets when --storage disk
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Frontend folder containing index.html and static/
    #[arg(long, env = "UI_DIR", default_value = "ui")]
    pub ui_dir: PathBuf,

    /// Maximum accepted upload body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "16777216")]
    pub max_upload_bytes: usize,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Identity sent with every classification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub bot_name: String,
    pub bot_alias: String,
    pub user_id: String,
}

impl From<&Config> for BotIdentity {
    fn from(config: &Config) -> Self {
        Self {
            bot_name: config.bot_name.clone(),
            bot_alias: config.bot_alias.clone(),
            user_id: config.user_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_workers: usize,
    pub request_timeout: Duration,
}

impl From<&Config> for RunConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub index_file: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl From<&Config> for HttpConfig {
    fn from(config: &Config) -> Self {
        Self {
            index_file: config.ui_dir.join("index.html"),
            static_dir: config.ui_dir.join("static"),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("--max-workers must be at least 1");
        }
        if self.backend == ClassifierBackend::Http && self.classifier_url.is_none() {
            anyhow::bail!("--classifier-url must be provided with --backend http");
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["lex-accuracy", "--bot-name", "OrderBot", "--bot-alias", "prod"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn defaults_match_original_tool() {
        let config = parse(&[]);
        assert_eq!(config.user_id, "test_user");
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.backend, ClassifierBackend::Lex);
        assert_eq!(config.storage, StorageMode::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bot_name_is_required() {
        let result = Config::try_parse_from(["lex-accuracy", "--bot-alias", "prod"]);
        assert!(result.is_err());
    }

    #[test]
    fn http_backend_needs_url() {
        let config = parse(&["--backend", "http"]);
        assert!(config.validate().is_err());

        let config = parse(&["--backend", "http", "--classifier-url", "http://localhost:9000/text"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = parse(&["--max-workers", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_configs() {
        let config = parse(&[
            "--request-timeout-ms",
            "250",
            "--ui-dir",
            "/srv/ui",
            "--host",
            "127.0.0.1",
            "--port",
            "8000",
        ]);
        let run = RunConfig::from(&config);
        assert_eq!(run.request_timeout, Duration::from_millis(250));

        let http = HttpConfig::from(&config);
        assert_eq!(http.index_file, PathBuf::from("/srv/ui/index.html"));
        assert_eq!(http.static_dir, PathBuf::from("/srv/ui/static"));

        let bot = BotIdentity::from(&config);
        assert_eq!(bot.bot_name, "OrderBot");
        assert_eq!(bot.bot_alias, "prod");
        assert_eq!(config.server_address(), "127.0.0.1:8000");
    }
}
