//! Core domain types for LeadPipe leads.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LeadPipeError, Result};

/// Prefix of the rendered lead identifier.
const LEAD_ID_PREFIX: &str = "lead_";

/// Loose shape check: non-empty local part, `@`, dotted domain, no whitespace.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable), rendered as `lead_<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{LEAD_ID_PREFIX}{}", self.0.simple())
    }
}

impl std::str::FromStr for LeadId {
    type Err = LeadPipeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = s.strip_prefix(LEAD_ID_PREFIX).unwrap_or(s);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| LeadPipeError::validation(format!("invalid lead id '{s}': {e}")))
    }
}

impl TryFrom<String> for LeadId {
    type Error = LeadPipeError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LeadId> for String {
    fn from(id: LeadId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Who sent a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One turn of the chat transcript attached to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// A user turn stamped now.
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// A bot turn stamped now.
    pub fn bot(message: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Visitor context forwarded to the CRM as custom fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

// ---------------------------------------------------------------------------
// RawLead
// ---------------------------------------------------------------------------

/// Lead fields as captured by the chat UI or contact form, before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLead {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    #[serde(default)]
    pub context: LeadContext,
}

fn default_source() -> String {
    "chatbot".into()
}
fn default_language() -> String {
    "en".into()
}

impl RawLead {
    /// Start a raw lead with the required fields and defaults for the rest.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            source: default_source(),
            language: default_language(),
            conversation_history: Vec::new(),
            context: LeadContext::default(),
        }
    }

    /// Reject leads missing a name or a usable email address.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LeadPipeError::validation("lead name is required"));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(LeadPipeError::validation("lead email is required"));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(LeadPipeError::validation(format!(
                "lead email '{email}' is not a valid address"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LeadRecord
// ---------------------------------------------------------------------------

/// Pipeline status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Pending,
    Processed,
    Failed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Follow-up priority tier derived from the lead score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// `>= 80` is high, `>= 60` is medium, anything else is low.
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => Self::High,
            60.. => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score, tier and tags computed for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAssessment {
    /// Heuristic score in `[0, 100]`.
    pub score: u32,
    pub priority: Priority,
    pub tags: Vec<String>,
}

/// A submitted lead, owned by the pipeline until it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub source: String,
    pub language: String,
    /// Full transcript; sinks only transmit the most recent turns.
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    #[serde(default)]
    pub context: LeadContext,
    /// When the lead was submitted.
    pub timestamp: DateTime<Utc>,
    pub status: LeadStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<LeadAssessment>,
    /// Summary of the most recent total delivery failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LeadRecord {
    /// Stamp a validated raw lead with an id, timestamp and `pending` status.
    pub fn from_raw(raw: RawLead) -> Self {
        Self {
            id: LeadId::new(),
            name: raw.name.trim().to_string(),
            email: raw.email.trim().to_string(),
            phone: raw.phone,
            source: raw.source,
            language: raw.language,
            conversation_history: raw.conversation_history,
            context: raw.context,
            timestamp: Utc::now(),
            status: LeadStatus::Pending,
            retry_count: 0,
            assessment: None,
            last_error: None,
        }
    }

    /// The last `limit` turns of the transcript.
    pub fn recent_history(&self, limit: usize) -> &[ConversationMessage] {
        let start = self.conversation_history.len().saturating_sub(limit);
        &self.conversation_history[start..]
    }

    /// Lowercased domain part of the email, if any.
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().to_lowercase())
            .filter(|d| !d.is_empty())
    }
}

/// Acknowledgment that a lead was accepted for processing (not delivered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub lead_id: LeadId,
    pub status: LeadStatus,
    pub accepted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_id_roundtrip() {
        let id = LeadId::new();
        let s = id.to_string();
        assert!(s.starts_with("lead_"));
        let parsed: LeadId = s.parse().expect("parse LeadId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn lead_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| LeadId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn lead_id_serializes_as_rendered_string() {
        let id = LeadId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
        let back: LeadId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn raw_lead_validation() {
        assert!(RawLead::new("Ada", "ada@acme-group.com").validate().is_ok());

        let err = RawLead::new("  ", "ada@acme-group.com").validate().unwrap_err();
        assert!(err.to_string().contains("name is required"));

        let err = RawLead::new("Ada", "").validate().unwrap_err();
        assert!(err.to_string().contains("email is required"));

        let err = RawLead::new("Ada", "not-an-email").validate().unwrap_err();
        assert!(err.to_string().contains("not a valid address"));
    }

    #[test]
    fn raw_lead_defaults_from_json() {
        let raw: RawLead = serde_json::from_str(
            r#"{"name": "Bob", "email": "bob@gmail.com",
                "conversation_history": [{"role": "user", "message": "hi"}]}"#,
        )
        .expect("parse raw lead");
        assert_eq!(raw.source, "chatbot");
        assert_eq!(raw.language, "en");
        assert_eq!(raw.conversation_history[0].role, Role::User);
    }

    #[test]
    fn priority_tiers() {
        assert_eq!(Priority::from_score(100), Priority::High);
        assert_eq!(Priority::from_score(80), Priority::High);
        assert_eq!(Priority::from_score(79), Priority::Medium);
        assert_eq!(Priority::from_score(60), Priority::Medium);
        assert_eq!(Priority::from_score(59), Priority::Low);
        assert_eq!(Priority::from_score(0), Priority::Low);
    }

    #[test]
    fn record_from_raw_starts_pending() {
        let record = LeadRecord::from_raw(RawLead::new(" Ada ", "ada@acme-group.com"));
        assert_eq!(record.status, LeadStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.name, "Ada");
        assert_eq!(record.email_domain().as_deref(), Some("acme-group.com"));
    }

    #[test]
    fn recent_history_keeps_tail() {
        let mut raw = RawLead::new("Ada", "ada@example.org");
        raw.conversation_history = (0..8)
            .map(|i| ConversationMessage::user(format!("msg {i}")))
            .collect();
        let record = LeadRecord::from_raw(raw);

        let recent = record.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].message, "msg 3");
        assert_eq!(record.recent_history(50).len(), 8);
    }
}
