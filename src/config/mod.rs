//! Configuration for the categorization agent
//!
//! Contains the TOML-backed runtime settings plus the static data the agent
//! works from: system prompts ([`prompts`]), Gmail label definitions
//! ([`labels`]) and summary templates ([`templates`]).

pub mod labels;
pub mod prompts;
pub mod templates;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};
use crate::models::SummaryPeriod;
use labels::{LabelDefinition, LabelSet};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub categorization: CategorizationConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_max_messages")]
    pub max_messages_per_run: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Extra Gmail search clause appended to the inbox query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_query: Option<String>,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            max_messages_per_run: default_max_messages(),
            max_concurrent_requests: default_max_concurrent(),
            extra_query: None,
        }
    }
}

/// Which engine decides the label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CategorizationMode {
    Rules,
    Model,
    Hybrid,
}

impl CategorizationMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "model" | "llm" => Ok(Self::Model),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(AgentError::ConfigError(format!(
                "Invalid categorization.mode: '{}'. Must be 'rules', 'model', or 'hybrid'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationConfig {
    #[serde(default = "default_mode")]
    pub mode: CategorizationMode,
    /// Rule confidence below this asks the model in hybrid mode
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub archive_enabled: bool,
}

impl Default for CategorizationConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            confidence_threshold: default_confidence_threshold(),
            archive_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Label keys whose messages leave the inbox when archiving is enabled
    #[serde(default = "default_archive_categories")]
    pub archive_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<LabelDefinition>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            archive_categories: default_archive_categories(),
            custom: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_concurrency")]
    pub max_concurrent: usize,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            max_concurrent: default_llm_concurrency(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Where summaries go
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryDelivery {
    Stdout,
    Email,
    File,
}

impl SummaryDelivery {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "email" => Ok(Self::Email),
            "file" => Ok(Self::File),
            other => Err(AgentError::ConfigError(format!(
                "Invalid summary delivery: '{}'. Must be 'stdout', 'email', or 'file'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_period")]
    pub period: SummaryPeriod,
    #[serde(default = "default_delivery")]
    pub delivery: SummaryDelivery,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_items")]
    pub max_items_per_label: usize,
    /// Defaults to the authenticated account's own address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period: default_period(),
            delivery: default_delivery(),
            output_dir: default_output_dir(),
            max_items_per_label: default_max_items(),
            recipient: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub history_retention_days: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            history_retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_lookback_hours() -> u32 {
    24
}

fn default_max_messages() -> usize {
    100
}

fn default_max_concurrent() -> usize {
    10
}

fn default_mode() -> CategorizationMode {
    CategorizationMode::Hybrid
}

fn default_confidence_threshold() -> f32 {
    0.6
}

fn default_prefix() -> String {
    "AI".to_string()
}

fn default_archive_categories() -> Vec<String> {
    vec!["promotions".to_string(), "newsletters".to_string()]
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u16 {
    512
}

fn default_llm_concurrency() -> usize {
    4
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_period() -> SummaryPeriod {
    SummaryPeriod::Daily
}

fn default_delivery() -> SummaryDelivery {
    SummaryDelivery::Stdout
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".gmail-categorizer/summaries")
}

fn default_max_items() -> usize {
    5
}

fn default_poll_interval() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    30
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AgentError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AgentError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| AgentError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply `GMAIL_CATEGORIZER_*` environment overrides, then re-validate
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("GMAIL_CATEGORIZER_MODE") {
            self.categorization.mode = CategorizationMode::parse(&mode)?;
        }
        if let Ok(model) = std::env::var("GMAIL_CATEGORIZER_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model.trim().to_string();
            }
        }
        if let Ok(dry_run) = std::env::var("GMAIL_CATEGORIZER_DRY_RUN") {
            self.execution.dry_run = matches!(
                dry_run.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self.validate()
    }

    /// Default labels merged with `[[labels.custom]]` entries
    pub fn label_set(&self) -> Result<LabelSet> {
        LabelSet::defaults().merge(&self.labels.custom)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gmail.lookback_hours == 0 || self.gmail.lookback_hours > 720 {
            return Err(AgentError::ConfigError(
                "gmail.lookback_hours must be between 1 and 720 (30 days)".to_string(),
            ));
        }
        if self.gmail.max_messages_per_run == 0 || self.gmail.max_messages_per_run > 500 {
            return Err(AgentError::ConfigError(
                "gmail.max_messages_per_run must be between 1 and 500".to_string(),
            ));
        }
        if self.gmail.max_concurrent_requests == 0 {
            return Err(AgentError::ConfigError(
                "gmail.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_concurrent_requests > 50 {
            return Err(AgentError::ConfigError(
                "gmail.max_concurrent_requests cannot exceed 50 (to stay under Gmail API rate limits)".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.categorization.confidence_threshold) {
            return Err(AgentError::ConfigError(
                "categorization.confidence_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.labels.prefix.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "labels.prefix cannot be empty".to_string(),
            ));
        }
        if self.labels.prefix.contains('/') {
            return Err(AgentError::ConfigError(
                "labels.prefix cannot contain '/' character".to_string(),
            ));
        }

        let label_set = self.label_set()?;
        for key in &self.labels.archive_categories {
            if !label_set.contains(key) {
                return Err(AgentError::ConfigError(format!(
                    "labels.archive_categories references unknown label '{}'",
                    key
                )));
            }
        }

        if self.llm.provider != "openai" {
            return Err(AgentError::ConfigError(format!(
                "Invalid llm.provider: '{}'. Must be 'openai'",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::ConfigError("llm.model cannot be empty".to_string()));
        }
        if self.llm.max_tokens == 0 {
            return Err(AgentError::ConfigError(
                "llm.max_tokens must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgentError::ConfigError(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.llm.max_concurrent == 0 {
            return Err(AgentError::ConfigError(
                "llm.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(AgentError::ConfigError(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.summary.max_items_per_label == 0 {
            return Err(AgentError::ConfigError(
                "summary.max_items_per_label must be at least 1".to_string(),
            ));
        }

        if self.agent.poll_interval_secs < 30 {
            return Err(AgentError::ConfigError(
                "agent.poll_interval_secs must be at least 30".to_string(),
            ));
        }
        if self.agent.history_retention_days < 7 {
            return Err(AgentError::ConfigError(
                "agent.history_retention_days must be at least 7 (one weekly summary)".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
