//! Core domain logic for LeadPipe.
//!
//! - [`scoring`]: lead score, priority tier and tags
//! - [`pipeline`]: queueing, concurrent fan-out to sinks, bounded retry
//! - [`capture`]: when to ask a chat visitor for contact details
//! - [`analytics`]: summaries over the backup log

pub mod analytics;
pub mod capture;
pub mod pipeline;
pub mod scoring;

pub use analytics::{LeadAnalytics, LeadSummary, summarize};
pub use capture::CaptureGate;
pub use pipeline::{DeliveryReport, DrainReport, LeadPipeline, SinkOutcome};
pub use scoring::{LeadScorer, calculate_lead_score, generate_tags};
