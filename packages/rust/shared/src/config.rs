//! Application configuration for LeadPipe.
//!
//! User config lives at `~/.leadpipe/leadpipe.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored here: sink sections name the environment
//! variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LeadPipeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadpipe";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "leadpipe.db";

// ---------------------------------------------------------------------------
// Config structs (matching leadpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Queue, retry and delivery settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Backup store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery sinks. A sink is enabled when its section is present.
    #[serde(default)]
    pub sinks: SinksConfig,

    /// Lead scoring weights and keyword lists.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Delivery passes per lead before it is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before a retried lead re-enters the queue.
    /// Doubles per retry; 0 retries immediately.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single sink attempt.
    #[serde(default = "default_sink_timeout_secs")]
    pub sink_timeout_secs: u64,

    /// Conversation turns transmitted to sinks.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Terminal leads kept in the local backup log.
    #[serde(default = "default_backup_capacity")]
    pub backup_capacity: usize,

    /// Leads allowed to wait in the queue at once.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Source label attached to webhook payloads.
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sink_timeout_secs: default_sink_timeout_secs(),
            history_limit: default_history_limit(),
            backup_capacity: default_backup_capacity(),
            queue_capacity: default_queue_capacity(),
            source_label: default_source_label(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_sink_timeout_secs() -> u64 {
    15
}
fn default_history_limit() -> usize {
    5
}
fn default_backup_capacity() -> usize {
    50
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_source_label() -> String {
    "Website Chatbot".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path. Defaults to `~/.leadpipe/leadpipe.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// `[sinks]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crm: Option<CrmConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,
}

impl SinksConfig {
    /// Number of sink sections present.
    pub fn enabled_count(&self) -> usize {
        usize::from(self.webhook.is_some())
            + usize::from(self.crm.is_some())
            + usize::from(self.notification.is_some())
    }
}

/// `[sinks.webhook]`: generic JSON webhook (Zapier, Make, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Url,
}

/// `[sinks.crm]`: CRM contact-creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    pub url: Url,

    /// Name of the env var holding the CRM bearer token.
    #[serde(default = "default_crm_api_key_env")]
    pub api_key_env: String,
}

fn default_crm_api_key_env() -> String {
    "LEADPIPE_CRM_API_KEY".into()
}

/// `[sinks.notification]`: email-dispatch API for the team notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub url: Url,

    /// Address that receives new-lead notifications.
    pub recipient: String,

    /// Name of the env var holding the email API token, if the API needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_base_score")]
    pub base_score: u32,

    /// Points per conversation message.
    #[serde(default = "default_per_message")]
    pub per_message: u32,

    /// Cap on the engagement bonus.
    #[serde(default = "default_engagement_cap")]
    pub engagement_cap: u32,

    /// Points per distinct high-intent keyword found.
    #[serde(default = "default_keyword_bonus")]
    pub keyword_bonus: u32,

    /// Bonus for a known business email domain.
    #[serde(default = "default_business_domain_bonus")]
    pub business_domain_bonus: u32,

    /// Bonus for any domain that is not a known personal webmail domain.
    #[serde(default = "default_custom_domain_bonus")]
    pub custom_domain_bonus: u32,

    #[serde(default = "default_high_intent_keywords")]
    pub high_intent_keywords: Vec<String>,

    /// Matched as domain suffixes.
    #[serde(default = "default_business_domains")]
    pub business_domains: Vec<String>,

    /// Matched exactly.
    #[serde(default = "default_personal_domains")]
    pub personal_domains: Vec<String>,

    /// Added to every lead.
    #[serde(default = "default_base_tag")]
    pub base_tag: String,

    #[serde(default = "default_topic_tags")]
    pub topic_tags: Vec<TopicTagRule>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            per_message: default_per_message(),
            engagement_cap: default_engagement_cap(),
            keyword_bonus: default_keyword_bonus(),
            business_domain_bonus: default_business_domain_bonus(),
            custom_domain_bonus: default_custom_domain_bonus(),
            high_intent_keywords: default_high_intent_keywords(),
            business_domains: default_business_domains(),
            personal_domains: default_personal_domains(),
            base_tag: default_base_tag(),
            topic_tags: default_topic_tags(),
        }
    }
}

/// `[[scoring.topic_tags]]`: add `tag` when any keyword appears in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTagRule {
    pub tag: String,
    pub keywords: Vec<String>,
}

impl TopicTagRule {
    fn new(tag: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.into(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

fn default_base_score() -> u32 {
    50
}
fn default_per_message() -> u32 {
    5
}
fn default_engagement_cap() -> u32 {
    30
}
fn default_keyword_bonus() -> u32 {
    5
}
fn default_business_domain_bonus() -> u32 {
    15
}
fn default_custom_domain_bonus() -> u32 {
    10
}
fn default_high_intent_keywords() -> Vec<String> {
    [
        "investment",
        "business",
        "partnership",
        "collaboration",
        "real estate",
        "opportunity",
        "meeting",
        "contact",
    ]
    .iter()
    .map(|k| (*k).to_string())
    .collect()
}
fn default_business_domains() -> Vec<String> {
    ["company.com", "corp.com", "group.com"]
        .iter()
        .map(|d| (*d).to_string())
        .collect()
}
fn default_personal_domains() -> Vec<String> {
    ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "icloud.com"]
        .iter()
        .map(|d| (*d).to_string())
        .collect()
}
fn default_base_tag() -> String {
    "web-lead".into()
}
fn default_topic_tags() -> Vec<TopicTagRule> {
    vec![
        TopicTagRule::new("investment-interest", &["investment"]),
        TopicTagRule::new("real-estate-interest", &["real estate"]),
        TopicTagRule::new("business-interest", &["business"]),
        TopicTagRule::new("un-interest", &["united nations", "peace"]),
        TopicTagRule::new("icafe-interest", &["icafe"]),
    ]
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub sink_timeout: Duration,
    pub history_limit: usize,
    pub backup_capacity: usize,
    pub queue_capacity: usize,
    pub source_label: String,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            max_retries: p.max_retries,
            retry_backoff: Duration::from_millis(p.retry_backoff_ms),
            sink_timeout: Duration::from_secs(p.sink_timeout_secs),
            history_limit: p.history_limit,
            backup_capacity: p.backup_capacity,
            queue_capacity: p.queue_capacity,
            source_label: p.source_label.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl PipelineConfig {
    /// Reject settings that would break the retry or capacity bounds.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(LeadPipeError::config("pipeline.max_retries must be at least 1"));
        }
        if self.backup_capacity == 0 {
            return Err(LeadPipeError::config(
                "pipeline.backup_capacity must be at least 1",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(LeadPipeError::config(
                "pipeline.queue_capacity must be at least 1",
            ));
        }
        if self.sink_timeout.is_zero() {
            return Err(LeadPipeError::config(
                "pipeline.sink_timeout_secs must be at least 1",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadpipe/leadpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadPipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadPipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadPipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadPipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadPipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the backup database path, expanding a leading `~/`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    match config.storage.db_path.as_deref() {
        Some(p) => match p.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir()
                    .ok_or_else(|| LeadPipeError::config("could not determine home directory"))?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(p)),
        },
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Read a secret from the named environment variable; it must be set and non-empty.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LeadPipeError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_retries"));
        assert!(toml_str.contains("web-lead"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.max_retries, 3);
        assert_eq!(parsed.pipeline.backup_capacity, 50);
        assert_eq!(parsed.scoring.high_intent_keywords.len(), 8);
        assert_eq!(parsed.sinks.enabled_count(), 0);
    }

    #[test]
    fn config_with_sinks() {
        let toml_str = r#"
[pipeline]
retry_backoff_ms = 0

[sinks.webhook]
url = "https://hooks.example.com/catch/123"

[sinks.crm]
url = "https://crm.example.com/api/leads"

[sinks.notification]
url = "https://mail.example.com/send"
recipient = "team@example.com"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.sinks.enabled_count(), 3);
        assert_eq!(config.pipeline.retry_backoff_ms, 0);
        assert_eq!(config.pipeline.max_retries, 3);
        let crm = config.sinks.crm.expect("crm section");
        assert_eq!(crm.api_key_env, "LEADPIPE_CRM_API_KEY");
        assert!(config.sinks.notification.expect("notification").api_key_env.is_none());
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.max_retries, 3);
        assert_eq!(pipeline.history_limit, 5);
        assert_eq!(pipeline.retry_backoff, Duration::from_millis(1000));
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let mut pipeline = PipelineConfig::default();
        pipeline.max_retries = 0;
        let err = pipeline.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn db_path_override() {
        let mut config = AppConfig::default();
        config.storage.db_path = Some("/tmp/leads.db".into());
        assert_eq!(resolve_db_path(&config).unwrap(), PathBuf::from("/tmp/leads.db"));
    }

    #[test]
    fn missing_secret() {
        // Use a unique env var name to avoid interfering with other tests
        let result = resolve_secret("LP_TEST_NONEXISTENT_SECRET_12345");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("LP_TEST_NONEXISTENT_SECRET_12345"));
    }
}
