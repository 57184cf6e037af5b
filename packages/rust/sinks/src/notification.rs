//! Team notification sink: a short HTML email sent through an email-dispatch API.

use std::fmt::Write as _;

use async_trait::async_trait;
use leadpipe_shared::{LeadAssessment, LeadRecord, Result, Role};
use reqwest::Client;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::{LeadSink, post_json};

/// Posts `{to, subject, html}` to an email API.
pub struct NotificationSink {
    client: Client,
    url: Url,
    recipient: String,
    token: Option<String>,
    source_label: String,
    history_limit: usize,
}

impl NotificationSink {
    pub fn new(
        client: Client,
        url: Url,
        recipient: String,
        token: Option<String>,
        source_label: String,
        history_limit: usize,
    ) -> Self {
        Self {
            client,
            url,
            recipient,
            token,
            source_label,
            history_limit,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    subject: String,
    html: String,
}

#[async_trait]
impl LeadSink for NotificationSink {
    fn name(&self) -> &str {
        "notification"
    }

    #[instrument(skip_all, fields(lead_id = %record.id))]
    async fn deliver(&self, record: &LeadRecord, assessment: &LeadAssessment) -> Result<()> {
        let email = EmailRequest {
            to: &self.recipient,
            subject: format!("New lead from {}: {}", self.source_label, record.name),
            html: render_notification_html(record, assessment, self.history_limit),
        };

        post_json(
            &self.client,
            self.name(),
            &self.url,
            self.token.as_deref(),
            &email,
        )
        .await
    }
}

/// Render the notification body, quoting the last `history_limit` turns.
/// All lead-supplied text is HTML-escaped.
pub fn render_notification_html(
    record: &LeadRecord,
    assessment: &LeadAssessment,
    history_limit: usize,
) -> String {
    let language = match record.language.as_str() {
        "ar" => "Arabic",
        "en" => "English",
        other => other,
    };

    let mut html = String::from("<div style=\"font-family: Arial, sans-serif;\">\n");
    html.push_str("<h2>New lead</h2>\n");
    // Writing into a String cannot fail.
    let _ = writeln!(html, "<p><strong>Name:</strong> {}</p>", escape(&record.name));
    let _ = writeln!(html, "<p><strong>Email:</strong> {}</p>", escape(&record.email));
    if let Some(phone) = &record.phone {
        let _ = writeln!(html, "<p><strong>Phone:</strong> {}</p>", escape(phone));
    }
    let _ = writeln!(html, "<p><strong>Language:</strong> {}</p>", escape(language));
    let _ = writeln!(html, "<p><strong>Source:</strong> {}</p>", escape(&record.source));
    let _ = writeln!(
        html,
        "<p><strong>Submitted:</strong> {}</p>",
        record.timestamp.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(
        html,
        "<p><strong>Lead score:</strong> {}/100 ({})</p>",
        assessment.score, assessment.priority
    );
    let _ = writeln!(
        html,
        "<p><strong>Tags:</strong> {}</p>",
        escape(&assessment.tags.join(", "))
    );

    let recent = record.recent_history(history_limit);
    if !recent.is_empty() {
        html.push_str("<h3>Recent conversation</h3>\n");
        for msg in recent {
            let who = match msg.role {
                Role::User => "Visitor",
                Role::Bot => "Assistant",
            };
            let _ = writeln!(html, "<p><strong>{who}:</strong> {}</p>", escape(&msg.message));
        }
    }

    html.push_str("</div>\n");
    html
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_lead;
    use leadpipe_shared::ConversationMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_email_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_partial_json(serde_json::json!({
                "to": "team@example.com",
                "subject": "New lead from Website Chatbot: Ada Lovelace",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/send", server.uri())).unwrap();
        let sink = NotificationSink::new(
            Client::new(),
            url,
            "team@example.com".into(),
            None,
            "Website Chatbot".into(),
            5,
        );

        let (record, assessment) = sample_lead();
        sink.deliver(&record, &assessment).await.expect("delivery succeeds");
    }

    #[test]
    fn html_escapes_visitor_text() {
        let (mut record, assessment) = sample_lead();
        record.name = "<script>alert(1)</script>".into();
        record
            .conversation_history
            .push(ConversationMessage::user("Tom & Jerry's \"deal\""));

        let html = render_notification_html(&record, &assessment, 5);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Tom &amp; Jerry&#39;s &quot;deal&quot;"));
        assert!(html.contains("90/100 (high)"));
    }

    #[test]
    fn html_quotes_recent_turns_only() {
        let (record, assessment) = sample_lead();
        let html = render_notification_html(&record, &assessment, 5);
        assert!(!html.contains("question 0 about"));
        assert!(html.contains("question 6 about real estate"));
        assert!(html.contains("<strong>Assistant:</strong> answer 5"));
    }

    #[test]
    fn html_honors_history_limit() {
        let (record, assessment) = sample_lead();

        let short = render_notification_html(&record, &assessment, 1);
        assert!(short.contains("question 6 about real estate"));
        assert!(!short.contains("answer 5"));

        let none = render_notification_html(&record, &assessment, 0);
        assert!(!none.contains("Recent conversation"));
    }
}
