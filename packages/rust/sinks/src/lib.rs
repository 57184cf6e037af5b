//! Delivery sinks for scored leads.
//!
//! Each sink is an HTTP endpoint taking a JSON payload over POST. A sink
//! reports success or a [`LeadPipeError::Delivery`] and never retries on its
//! own; retries are scheduled by the caller.

mod crm;
mod notification;
#[cfg(test)]
mod testing;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{
    LeadAssessment, LeadPipeError, LeadRecord, PipelineConfig, Result, SinksConfig,
    resolve_secret,
};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

pub use crm::CrmSink;
pub use notification::{NotificationSink, render_notification_html};
pub use webhook::WebhookSink;

/// User-Agent string for delivery requests.
const USER_AGENT: &str = concat!("LeadPipe/", env!("CARGO_PKG_VERSION"));

/// A destination a scored lead is delivered to.
#[async_trait]
pub trait LeadSink: Send + Sync {
    /// Short stable name used in logs and delivery reports.
    fn name(&self) -> &str;

    /// Deliver one lead. Errors are reported per sink and never retried here.
    async fn deliver(&self, record: &LeadRecord, assessment: &LeadAssessment) -> Result<()>;
}

/// Build a reqwest client for sink delivery.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .timeout(timeout)
        .build()
        .map_err(|e| LeadPipeError::Network(format!("failed to build HTTP client: {e}")))
}

/// Build every sink with a section in `config`. Secrets are read from the environment.
pub fn build_sinks(
    config: &SinksConfig,
    pipeline: &PipelineConfig,
) -> Result<Vec<Arc<dyn LeadSink>>> {
    let client = build_client(pipeline.sink_timeout)?;
    let mut sinks: Vec<Arc<dyn LeadSink>> = Vec::new();

    if let Some(webhook) = &config.webhook {
        sinks.push(Arc::new(WebhookSink::new(
            client.clone(),
            webhook.url.clone(),
            pipeline.source_label.clone(),
            pipeline.history_limit,
        )));
    }

    if let Some(crm) = &config.crm {
        let token = resolve_secret(&crm.api_key_env)?;
        sinks.push(Arc::new(CrmSink::new(
            client.clone(),
            crm.url.clone(),
            token,
            pipeline.history_limit,
        )));
    }

    if let Some(notification) = &config.notification {
        let token = notification
            .api_key_env
            .as_deref()
            .map(resolve_secret)
            .transpose()?;
        sinks.push(Arc::new(NotificationSink::new(
            client,
            notification.url.clone(),
            notification.recipient.clone(),
            token,
            pipeline.source_label.clone(),
            pipeline.history_limit,
        )));
    }

    info!(
        sinks = sinks.len(),
        names = ?sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "delivery sinks configured"
    );
    Ok(sinks)
}

/// POST `body` as JSON and map transport failures and non-2xx statuses to a delivery error.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    sink: &str,
    url: &Url,
    bearer: Option<&str>,
    body: &T,
) -> Result<()> {
    let mut request = client.post(url.as_str()).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LeadPipeError::delivery(sink, format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LeadPipeError::delivery(sink, format!("{url}: HTTP {status}")));
    }

    debug!(sink, %status, "delivery accepted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadpipe_shared::{CrmConfig, WebhookConfig};

    #[test]
    fn no_sections_builds_no_sinks() {
        let sinks = build_sinks(&SinksConfig::default(), &PipelineConfig::default())
            .expect("build sinks");
        assert!(sinks.is_empty());
    }

    #[test]
    fn webhook_section_builds_webhook_sink() {
        let config = SinksConfig {
            webhook: Some(WebhookConfig {
                url: Url::parse("https://hooks.example.com/catch/1").unwrap(),
            }),
            ..Default::default()
        };
        let sinks = build_sinks(&config, &PipelineConfig::default()).expect("build sinks");
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "webhook");
    }

    #[test]
    fn crm_without_secret_fails() {
        let config = SinksConfig {
            crm: Some(CrmConfig {
                url: Url::parse("https://crm.example.com/api/leads").unwrap(),
                api_key_env: "LP_TEST_NONEXISTENT_CRM_KEY_12345".into(),
            }),
            ..Default::default()
        };
        let result = build_sinks(&config, &PipelineConfig::default());
        let err = result.err().expect("missing secret must fail");
        assert!(err.to_string().contains("LP_TEST_NONEXISTENT_CRM_KEY_12345"));
    }
}
