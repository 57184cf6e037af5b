//! Lead scoring, priority tiers and tagging.
//!
//! Everything here is a pure function of a [`LeadRecord`] and a
//! [`ScoringConfig`]: the same record always gets the same score and tags.
//! The score is a heuristic for ordering follow-ups, not a quality verdict.

use leadpipe_shared::{LeadAssessment, LeadRecord, Priority, ScoringConfig};

/// Upper bound of the score range.
pub const MAX_SCORE: u32 = 100;

/// Tag added for Arabic-speaking visitors.
const ARABIC_TAG: &str = "arabic-speaker";

/// Scores and tags leads with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct LeadScorer {
    config: ScoringConfig,
}

impl LeadScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score, priority tier and tags in one pass over the transcript.
    pub fn assess(&self, record: &LeadRecord) -> LeadAssessment {
        let transcript = transcript_text(record);
        let score = score_with_transcript(record, &transcript, &self.config);
        LeadAssessment {
            score,
            priority: Priority::from_score(score),
            tags: tags_with_transcript(record, &transcript, &self.config),
        }
    }

    pub fn score(&self, record: &LeadRecord) -> u32 {
        calculate_lead_score(record, &self.config)
    }
}

/// Compute the lead score in `[0, 100]`.
///
/// - base score
/// - engagement: `per_message` per transcript message, capped at `engagement_cap`
/// - `keyword_bonus` per distinct high-intent keyword present (not per occurrence)
/// - email domain: business suffix, else any non-personal domain, else nothing
pub fn calculate_lead_score(record: &LeadRecord, config: &ScoringConfig) -> u32 {
    score_with_transcript(record, &transcript_text(record), config)
}

/// Tags for a lead: the base tag, a language tag, and topic tags from the transcript.
pub fn generate_tags(record: &LeadRecord, config: &ScoringConfig) -> Vec<String> {
    tags_with_transcript(record, &transcript_text(record), config)
}

/// Lowercased transcript, messages joined by a single space.
fn transcript_text(record: &LeadRecord) -> String {
    record
        .conversation_history
        .iter()
        .map(|msg| msg.message.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn score_with_transcript(record: &LeadRecord, transcript: &str, config: &ScoringConfig) -> u32 {
    let message_count = u32::try_from(record.conversation_history.len()).unwrap_or(u32::MAX);
    let engagement = message_count
        .saturating_mul(config.per_message)
        .min(config.engagement_cap);

    let keywords = config
        .high_intent_keywords
        .iter()
        .filter(|keyword| !keyword.is_empty() && transcript.contains(&keyword.to_lowercase()))
        .count();
    let keyword_bonus = u32::try_from(keywords)
        .unwrap_or(u32::MAX)
        .saturating_mul(config.keyword_bonus);

    config
        .base_score
        .saturating_add(engagement)
        .saturating_add(keyword_bonus)
        .saturating_add(domain_bonus(record, config))
        .min(MAX_SCORE)
}

fn domain_bonus(record: &LeadRecord, config: &ScoringConfig) -> u32 {
    let Some(domain) = record.email_domain() else {
        return 0;
    };

    let is_business = config
        .business_domains
        .iter()
        .any(|d| !d.is_empty() && domain.ends_with(&d.to_lowercase()));
    if is_business {
        return config.business_domain_bonus;
    }

    let is_personal = config
        .personal_domains
        .iter()
        .any(|d| d.eq_ignore_ascii_case(&domain));
    if is_personal {
        0
    } else {
        config.custom_domain_bonus
    }
}

fn tags_with_transcript(
    record: &LeadRecord,
    transcript: &str,
    config: &ScoringConfig,
) -> Vec<String> {
    let mut tags = vec![config.base_tag.clone()];

    if record.language.eq_ignore_ascii_case("ar") {
        tags.push(ARABIC_TAG.to_string());
    }

    for rule in &config.topic_tags {
        let matched = rule
            .keywords
            .iter()
            .any(|k| !k.is_empty() && transcript.contains(&k.to_lowercase()));
        if matched && !tags.contains(&rule.tag) {
            tags.push(rule.tag.clone());
        }
    }

    tags
}
