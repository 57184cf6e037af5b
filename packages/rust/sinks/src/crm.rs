//! CRM contact-creation sink (bearer-token authenticated).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadpipe_shared::{
    ConversationMessage, LeadAssessment, LeadContext, LeadRecord, Priority, Result,
};
use reqwest::Client;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::{LeadSink, post_json};

/// Creates a contact plus an interaction record in the CRM.
pub struct CrmSink {
    client: Client,
    url: Url,
    token: String,
    history_limit: usize,
}

impl CrmSink {
    pub fn new(client: Client, url: Url, token: String, history_limit: usize) -> Self {
        Self {
            client,
            url,
            token,
            history_limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct CrmPayload<'a> {
    contact: Contact<'a>,
    interaction: Interaction<'a>,
    custom_fields: CustomFields<'a>,
}

#[derive(Debug, Serialize)]
struct Contact<'a> {
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    source: &'a str,
    language: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Serialize)]
struct Interaction<'a> {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    conversation_history: &'a [ConversationMessage],
    lead_score: u32,
    priority: Priority,
}

#[derive(Debug, Serialize)]
struct CustomFields<'a> {
    lead_id: String,
    #[serde(flatten)]
    context: &'a LeadContext,
}

/// `chatbot` leads are conversations; other surfaces are form submissions.
fn interaction_kind(source: &str) -> String {
    match source {
        "chatbot" => "chatbot_conversation".into(),
        other => format!("{other}_submission"),
    }
}

#[async_trait]
impl LeadSink for CrmSink {
    fn name(&self) -> &str {
        "crm"
    }

    #[instrument(skip_all, fields(lead_id = %record.id))]
    async fn deliver(&self, record: &LeadRecord, assessment: &LeadAssessment) -> Result<()> {
        let payload = CrmPayload {
            contact: Contact {
                name: &record.name,
                email: &record.email,
                phone: record.phone.as_deref().unwrap_or(""),
                source: &record.source,
                language: &record.language,
                tags: &assessment.tags,
            },
            interaction: Interaction {
                kind: interaction_kind(&record.source),
                timestamp: record.timestamp,
                conversation_history: record.recent_history(self.history_limit),
                lead_score: assessment.score,
                priority: assessment.priority,
            },
            custom_fields: CustomFields {
                lead_id: record.id.to_string(),
                context: &record.context,
            },
        };

        post_json(
            &self.client,
            self.name(),
            &self.url,
            Some(&self.token),
            &payload,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_lead;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_for(server: &MockServer) -> CrmSink {
        let url = Url::parse(&format!("{}/api/crm-lead", server.uri())).unwrap();
        CrmSink::new(Client::new(), url, "test-token".into(), 5)
    }

    #[tokio::test]
    async fn posts_contact_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/crm-lead"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "contact": {
                    "name": "Ada Lovelace",
                    "phone": "+971 50 000 0000",
                    "tags": ["web-lead", "real-estate-interest"],
                },
                "interaction": {
                    "type": "chatbot_conversation",
                    "lead_score": 90,
                },
                "custom_fields": {
                    "session_id": "session_42",
                    "page_url": "https://example.com/contact",
                },
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let (record, assessment) = sample_lead();
        sink_for(&server)
            .deliver(&record, &assessment)
            .await
            .expect("delivery succeeds");
    }

    #[tokio::test]
    async fn unauthorized_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (record, assessment) = sample_lead();
        let err = sink_for(&server).deliver(&record, &assessment).await.unwrap_err();
        assert!(err.to_string().contains("delivery to crm failed"));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn interaction_kind_by_source() {
        assert_eq!(interaction_kind("chatbot"), "chatbot_conversation");
        assert_eq!(interaction_kind("contact_form"), "contact_form_submission");
    }
}
