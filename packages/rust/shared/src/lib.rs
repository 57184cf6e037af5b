//! Shared types, error model, and configuration for LeadPipe.
//!
//! This crate is the foundation depended on by all other LeadPipe crates.
//! It provides:
//! - [`LeadPipeError`]: the unified error type
//! - Domain types ([`RawLead`], [`LeadRecord`], [`LeadAssessment`], [`LeadId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrmConfig, NotificationConfig, PipelineConfig, PipelineSection, ScoringConfig,
    SinksConfig, StorageConfig, TopicTagRule, WebhookConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_db_path, resolve_secret,
};
pub use error::{LeadPipeError, Result};
pub use types::{
    Ack, ConversationMessage, LeadAssessment, LeadContext, LeadId, LeadRecord, LeadStatus,
    Priority, RawLead, Role,
};
