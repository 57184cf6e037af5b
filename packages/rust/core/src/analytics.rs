//! Summary statistics over the backup log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use leadpipe_shared::{LeadId, LeadRecord, LeadStatus, Priority};
use serde::Serialize;

use crate::scoring::LeadScorer;

/// Leads listed in [`LeadAnalytics::recent`].
pub const RECENT_LEADS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadAnalytics {
    pub total_leads: usize,
    /// Mean score rounded to one decimal; `0.0` for an empty log.
    pub average_score: f64,
    pub language_breakdown: BTreeMap<String, usize>,
    pub source_breakdown: BTreeMap<String, usize>,
    pub status_breakdown: BTreeMap<String, usize>,
    /// Newest first.
    pub recent: Vec<LeadSummary>,
}

/// One row of the recent-leads listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadSummary {
    pub id: LeadId,
    pub name: String,
    pub email: String,
    pub score: u32,
    pub priority: Priority,
    pub status: LeadStatus,
    pub timestamp: DateTime<Utc>,
}

/// Summarize backup-log entries (oldest first, as stored).
///
/// Records without a stored assessment are scored with `scorer`.
pub fn summarize(records: &[LeadRecord], scorer: &LeadScorer) -> LeadAnalytics {
    let mut language_breakdown = BTreeMap::new();
    let mut source_breakdown = BTreeMap::new();
    let mut status_breakdown = BTreeMap::new();
    let mut score_total: u64 = 0;

    let scores: Vec<u32> = records
        .iter()
        .map(|r| match &r.assessment {
            Some(a) => a.score,
            None => scorer.score(r),
        })
        .collect();

    for (record, score) in records.iter().zip(&scores) {
        *language_breakdown.entry(record.language.clone()).or_insert(0) += 1;
        *source_breakdown.entry(record.source.clone()).or_insert(0) += 1;
        *status_breakdown
            .entry(record.status.as_str().to_string())
            .or_insert(0) += 1;
        score_total += u64::from(*score);
    }

    let average_score = if records.is_empty() {
        0.0
    } else {
        let mean = score_total as f64 / records.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    let recent = records
        .iter()
        .zip(&scores)
        .rev()
        .take(RECENT_LEADS)
        .map(|(record, &score)| LeadSummary {
            id: record.id.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
            score,
            priority: Priority::from_score(score),
            status: record.status,
            timestamp: record.timestamp,
        })
        .collect();

    LeadAnalytics {
        total_leads: records.len(),
        average_score,
        language_breakdown,
        source_breakdown,
        status_breakdown,
        recent,
    }
}
