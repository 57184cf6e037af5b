//! Generic JSON webhook sink (Zapier, Make, n8n, ...).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadpipe_shared::{ConversationMessage, LeadAssessment, LeadRecord, Priority, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::{LeadSink, post_json};

/// Posts the lead plus its assessment to a webhook URL.
pub struct WebhookSink {
    client: Client,
    url: Url,
    source_label: String,
    history_limit: usize,
}

impl WebhookSink {
    pub fn new(client: Client, url: Url, source_label: String, history_limit: usize) -> Self {
        Self {
            client,
            url,
            source_label,
            history_limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: String,
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    source: &'a str,
    source_label: &'a str,
    language: &'a str,
    timestamp: DateTime<Utc>,
    conversation_history: &'a [ConversationMessage],
    lead_score: u32,
    priority: Priority,
    tags: &'a [String],
}

#[async_trait]
impl LeadSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(lead_id = %record.id))]
    async fn deliver(&self, record: &LeadRecord, assessment: &LeadAssessment) -> Result<()> {
        let payload = WebhookPayload {
            id: record.id.to_string(),
            name: &record.name,
            email: &record.email,
            phone: record.phone.as_deref(),
            source: &record.source,
            source_label: &self.source_label,
            language: &record.language,
            timestamp: record.timestamp,
            conversation_history: record.recent_history(self.history_limit),
            lead_score: assessment.score,
            priority: assessment.priority,
            tags: &assessment.tags,
        };

        post_json(&self.client, self.name(), &self.url, None, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_lead;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_for(server: &MockServer) -> WebhookSink {
        let url = Url::parse(&format!("{}/hooks/catch", server.uri())).unwrap();
        WebhookSink::new(Client::new(), url, "Website Chatbot".into(), 5)
    }

    #[tokio::test]
    async fn posts_lead_with_assessment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/catch"))
            .and(body_partial_json(serde_json::json!({
                "name": "Ada Lovelace",
                "email": "ada@acme-group.com",
                "source_label": "Website Chatbot",
                "lead_score": 90,
                "priority": "high",
                "tags": ["web-lead", "real-estate-interest"],
            })))
            .respond_with(ResponseTemplate::new(200))
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
    async fn transmits_only_recent_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (record, assessment) = sample_lead();
        sink_for(&server).deliver(&record, &assessment).await.unwrap();

        let requests = server.received_requests().await.expect("recording enabled");
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let history = body["conversation_history"].as_array().expect("history array");
        assert_eq!(history.len(), 5);
        assert_eq!(history[4]["message"], "question 6 about real estate");
    }

    #[tokio::test]
    async fn server_error_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (record, assessment) = sample_lead();
        let err = sink_for(&server).deliver(&record, &assessment).await.unwrap_err();
        assert!(err.to_string().contains("delivery to webhook failed"));
        assert!(err.to_string().contains("500"));
    }
}
