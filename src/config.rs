//! Layered runtime configuration shared by the pipeline daemons.
//!
//! Precedence, lowest to highest: built-in defaults, the JSON config file
//! (`--config` flag or `EMBERWATCH_CONFIG`), then `EMBERWATCH_*` environment
//! variables. Validation runs after the merge so a bad value is rejected no
//! matter which layer supplied it.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SOURCE_URL: &str = "stub://scene";
const DEFAULT_CAPTURE_INTERVAL_SECS: u64 = 5;
const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:7870";
const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_TOPIC_PREFIX: &str = "emberwatch";
const DEFAULT_STORE_PATH: &str = "emberwatch.db";
const DEFAULT_MODEL: &str = "fixed:0.0";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    source: Option<SourceConfigFile>,
    capture: Option<CaptureConfigFile>,
    broker: Option<BrokerConfigFile>,
    store: Option<StoreConfigFile>,
    inference: Option<InferenceConfigFile>,
    telegram: Option<TelegramConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    interval_secs: Option<u64>,
    control_addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct BrokerConfigFile {
    addr: Option<String>,
    username: Option<String>,
    password: Option<String>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StoreConfigFile {
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    model: Option<String>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    chat_id: Option<String>,
    bot_token: Option<String>,
    api_base: Option<String>,
    max_delivery_attempts: Option<u32>,
}

/// Resolved configuration for all three daemons. Each binary reads the
/// slice it needs and ignores the rest.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_url: String,
    pub capture_interval_secs: u64,
    pub control_addr: String,
    pub broker_addr: String,
    pub broker_username: Option<String>,
    pub broker_password: Option<String>,
    pub topic_prefix: String,
    pub store_path: String,
    pub model: String,
    pub model_input_size: u32,
    pub chat_id: String,
    pub bot_token: String,
    pub telegram_api_base: String,
    pub max_delivery_attempts: u32,
}

impl Default for PipelineConfig {
    /// Built-in defaults with no file or environment layer applied.
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Load configuration. `explicit_path` (the `--config` flag) wins over
    /// the `EMBERWATCH_CONFIG` environment variable; with neither set the
    /// defaults apply and only the environment overrides remain.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("EMBERWATCH_CONFIG").ok();
        let file_cfg = match explicit_path {
            Some(path) => Some(read_config_file(path)?),
            None => match env_path.as_deref() {
                Some(path) => Some(read_config_file(Path::new(path))?),
                None => None,
            },
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let source_url = file
            .source
            .and_then(|source| source.url)
            .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let capture_interval_secs = file
            .capture
            .as_ref()
            .and_then(|capture| capture.interval_secs)
            .unwrap_or(DEFAULT_CAPTURE_INTERVAL_SECS);
        let control_addr = file
            .capture
            .and_then(|capture| capture.control_addr)
            .unwrap_or_else(|| DEFAULT_CONTROL_ADDR.to_string());
        let broker_addr = file
            .broker
            .as_ref()
            .and_then(|broker| broker.addr.clone())
            .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string());
        let broker_username = file.broker.as_ref().and_then(|broker| broker.username.clone());
        let broker_password = file.broker.as_ref().and_then(|broker| broker.password.clone());
        let topic_prefix = file
            .broker
            .and_then(|broker| broker.topic_prefix)
            .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());
        let store_path = file
            .store
            .and_then(|store| store.path)
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());
        let model = file
            .inference
            .as_ref()
            .and_then(|inference| inference.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model_input_size = file
            .inference
            .and_then(|inference| inference.input_size)
            .unwrap_or(DEFAULT_MODEL_INPUT);
        let chat_id = file
            .telegram
            .as_ref()
            .and_then(|telegram| telegram.chat_id.clone())
            .unwrap_or_default();
        let bot_token = file
            .telegram
            .as_ref()
            .and_then(|telegram| telegram.bot_token.clone())
            .unwrap_or_default();
        let telegram_api_base = file
            .telegram
            .as_ref()
            .and_then(|telegram| telegram.api_base.clone())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());
        let max_delivery_attempts = file
            .telegram
            .and_then(|telegram| telegram.max_delivery_attempts)
            .unwrap_or(DEFAULT_MAX_DELIVERY_ATTEMPTS);
        Self {
            source_url,
            capture_interval_secs,
            control_addr,
            broker_addr,
            broker_username,
            broker_password,
            topic_prefix,
            store_path,
            model,
            model_input_size,
            chat_id,
            bot_token,
            telegram_api_base,
            max_delivery_attempts,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("EMBERWATCH_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source_url = url;
            }
        }
        if let Ok(interval) = std::env::var("EMBERWATCH_CAPTURE_INTERVAL_SECS") {
            self.capture_interval_secs = interval.parse().map_err(|_| {
                anyhow!("EMBERWATCH_CAPTURE_INTERVAL_SECS must be a whole number of seconds")
            })?;
        }
        if let Ok(addr) = std::env::var("EMBERWATCH_CONTROL_ADDR") {
            if !addr.trim().is_empty() {
                self.control_addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("EMBERWATCH_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                self.broker_addr = addr;
            }
        }
        if let Ok(user) = std::env::var("EMBERWATCH_BROKER_USERNAME") {
            if !user.trim().is_empty() {
                self.broker_username = Some(user);
            }
        }
        if let Ok(pass) = std::env::var("EMBERWATCH_BROKER_PASSWORD") {
            if !pass.is_empty() {
                self.broker_password = Some(pass);
            }
        }
        if let Ok(prefix) = std::env::var("EMBERWATCH_TOPIC_PREFIX") {
            if !prefix.trim().is_empty() {
                self.topic_prefix = prefix;
            }
        }
        if let Ok(path) = std::env::var("EMBERWATCH_STORE_PATH") {
            if !path.trim().is_empty() {
                self.store_path = path;
            }
        }
        if let Ok(model) = std::env::var("EMBERWATCH_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        if let Ok(size) = std::env::var("EMBERWATCH_MODEL_INPUT_SIZE") {
            self.model_input_size = size
                .parse()
                .map_err(|_| anyhow!("EMBERWATCH_MODEL_INPUT_SIZE must be a pixel count"))?;
        }
        if let Ok(chat_id) = std::env::var("EMBERWATCH_CHAT_ID") {
            if !chat_id.trim().is_empty() {
                self.chat_id = chat_id;
            }
        }
        if let Ok(token) = std::env::var("EMBERWATCH_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.bot_token = token;
            }
        }
        if let Ok(base) = std::env::var("EMBERWATCH_TELEGRAM_API_BASE") {
            if !base.trim().is_empty() {
                self.telegram_api_base = base;
            }
        }
        if let Ok(attempts) = std::env::var("EMBERWATCH_MAX_DELIVERY_ATTEMPTS") {
            self.max_delivery_attempts = attempts
                .parse()
                .map_err(|_| anyhow!("EMBERWATCH_MAX_DELIVERY_ATTEMPTS must be a count"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture_interval_secs == 0 {
            return Err(anyhow!("capture interval must be at least one second"));
        }
        if self.topic_prefix.is_empty() {
            return Err(anyhow!("topic prefix must not be empty"));
        }
        if self
            .topic_prefix
            .chars()
            .any(|c| c == '#' || c == '+' || c == '/' || c.is_whitespace())
        {
            return Err(anyhow!(
                "topic prefix '{}' must not contain wildcards, slashes, or whitespace",
                self.topic_prefix
            ));
        }
        if self.max_delivery_attempts == 0 {
            return Err(anyhow!("max delivery attempts must be at least one"));
        }
        if self.model_input_size == 0 {
            return Err(anyhow!("model input size must be at least one pixel"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
