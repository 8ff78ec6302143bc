use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config;
use crate::model::ContactForm;
use crate::notify::Notifier;

pub const CONTACT_FORM_EVENT: &str = "contact_form_submission";
pub const TEST_SOURCE: &str = "webhook-test";

#[derive(Clone)]
pub struct WebhookClient {
    http: Client,
    url: Url,
    secret: Option<String>,
    timeout: Duration,
    source: String,
}

impl fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookClient")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WebhookClient {
    pub fn new(
        url: Url,
        secret: Option<String>,
        timeout: Duration,
        source: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("clinic-site/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            http,
            url,
            secret: secret.filter(|s| !s.trim().is_empty()),
            timeout,
            source: source.into(),
        })
    }

    pub fn from_config(cfg: &config::Webhook) -> Result<Self> {
        let url = Url::parse(&cfg.url).context("invalid webhook URL")?;
        Self::new(url, cfg.secret.clone(), cfg.timeout(), cfg.source.clone())
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .post(self.url.clone())
            .header("Content-Type", "application/json");
        if let Some(secret) = &self.secret {
            builder = builder.header("Authorization", format!("Bearer {secret}"));
        }
        builder
            .json(body)
            .build()
            .context("failed to build webhook request")
    }

    /// POST an envelope. The whole exchange is abandoned once the timeout elapses.
    #[instrument(skip_all)]
    pub async fn post_envelope(&self, body: &Value) -> Result<Option<String>> {
        let request = self.build_request(body)?;
        debug!(url = %request.url(), "posting webhook envelope");
        let exchange = async {
            let res = self
                .http
                .execute(request)
                .await
                .context("failed to reach webhook")?;
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            Ok::<_, anyhow::Error>((status, text))
        };
        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| anyhow!("webhook timed out after {}s", self.timeout.as_secs_f32()))??;

        if !status.is_success() {
            warn!(%status, "webhook rejected envelope");
            return Err(anyhow!("webhook error {}: {}", status, text));
        }
        // Any 2xx counts; a JSON body may carry a delivery id.
        let id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        info!(?id, "webhook accepted envelope");
        Ok(id)
    }

    /// Send a canned submission tagged with the test source.
    pub async fn send_test(&self, now: DateTime<Utc>) -> Result<Option<String>> {
        let form = ContactForm {
            name: "Test User".into(),
            email: "test@example.com".into(),
            phone: Some("+677 123456".into()),
            service: Some("General Inquiry".into()),
            message: "This is a test message to verify the webhook functionality is working correctly."
                .into(),
        };
        self.post_envelope(&build_envelope(&form, now, TEST_SOURCE))
            .await
    }
}

#[async_trait]
impl Notifier for WebhookClient {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn notify(
        &self,
        form: &ContactForm,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.post_envelope(&build_envelope(form, submitted_at, &self.source))
            .await
    }
}

pub fn build_envelope(form: &ContactForm, timestamp: DateTime<Utc>, source: &str) -> Value {
    json!({
        "type": CONTACT_FORM_EVENT,
        "data": form,
        "timestamp": timestamp.to_rfc3339(),
        "source": source,
    })
}
