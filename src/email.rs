use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{info, instrument, warn};

use crate::config;
use crate::model::ContactForm;
use crate::notify::Notifier;

const SENDER_NAME: &str = "eCall Health Center";
/// Solomon Islands time, UTC+11 with no daylight saving.
const CLINIC_UTC_OFFSET_SECS: i32 = 11 * 3600;

#[derive(Clone)]
pub struct ResendClient {
    http: Client,
    base_url: Url,
    api_key: String,
    from: String,
    to: String,
}

impl fmt::Debug for ResendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendClient")
            .field("base_url", &self.base_url)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl ResendClient {
    pub fn new(api_key: String, from: String, to: String, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("clinic-site/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            from,
            to,
        })
    }

    pub fn from_config(cfg: &config::Email) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url).context("invalid email base URL")?;
        Self::new(
            cfg.api_key.clone(),
            cfg.from.clone(),
            cfg.to.clone(),
            base_url,
        )
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("emails")
            .context("invalid email base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build email request")
    }

    /// Send a rendered email and return the provider's delivery id.
    #[instrument(skip_all)]
    pub async fn send_email(&self, email: &RenderedEmail, reply_to: &str) -> Result<String> {
        let body = build_email_request(&self.from, &self.to, reply_to, email);
        let request = self.build_request(&body)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach email API")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "email API rejected message");
            return Err(anyhow!("email API error {}: {}", status, body));
        }

        let payload: SendEmailResponse = res.json().await.context("invalid email API response")?;
        if payload.id.trim().is_empty() {
            return Err(anyhow!("email API returned an empty delivery id"));
        }
        info!(id = %payload.id, "email sent");
        Ok(payload.id)
    }
}

#[async_trait]
impl Notifier for ResendClient {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn notify(
        &self,
        form: &ContactForm,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let email = render_contact_email(form, submitted_at);
        self.send_email(&email, &form.email).await.map(Some)
    }
}

pub fn build_email_request(from: &str, to: &str, reply_to: &str, email: &RenderedEmail) -> Value {
    json!({
        "from": format!("{SENDER_NAME} <{from}>"),
        "to": [to],
        "reply_to": reply_to,
        "subject": email.subject,
        "text": email.text,
        "html": email.html,
    })
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn clinic_local_time(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(CLINIC_UTC_OFFSET_SECS) {
        Some(tz) => at
            .with_timezone(&tz)
            .format("%B %-d, %Y, %-I:%M %p")
            .to_string(),
        None => at.to_rfc2822(),
    }
}

pub fn render_contact_email(form: &ContactForm, submitted_at: DateTime<Utc>) -> RenderedEmail {
    let submitted = clinic_local_time(submitted_at);
    let name = escape_html(&form.name);
    let email = escape_html(&form.email);

    let mut contact_html = format!(
        "<p><strong>Name:</strong> {name}</p>\n\
         <p><strong>Email:</strong> <a href=\"mailto:{email}\">{email}</a></p>\n"
    );
    let mut contact_text = format!("Name: {}\nEmail: {}\n", form.name, form.email);
    if let Some(phone) = form.phone.as_deref().filter(|p| !p.is_empty()) {
        let phone_html = escape_html(phone);
        contact_html.push_str(&format!(
            "<p><strong>Phone:</strong> <a href=\"tel:{phone_html}\">{phone_html}</a></p>\n"
        ));
        contact_text.push_str(&format!("Phone: {phone}\n"));
    }
    if let Some(service) = form.service.as_deref().filter(|s| !s.is_empty()) {
        contact_html.push_str(&format!(
            "<p><strong>Service of Interest:</strong> {}</p>\n",
            escape_html(service)
        ));
        contact_text.push_str(&format!("Service of Interest: {service}\n"));
    }

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #0ea5e9; border-bottom: 2px solid #0ea5e9; padding-bottom: 10px;">New Contact Form Submission</h2>
  <div style="background-color: #f8fafc; padding: 20px; border-radius: 8px; margin: 20px 0;">
    <h3 style="margin-top: 0; color: #334155;">Contact Information</h3>
{contact_html}  </div>
  <div style="background-color: #fff; padding: 20px; border: 1px solid #e2e8f0; border-radius: 8px;">
    <h3 style="margin-top: 0; color: #334155;">Message</h3>
    <p style="white-space: pre-wrap; line-height: 1.6;">{message}</p>
  </div>
  <div style="margin-top: 20px; padding: 15px; background-color: #dbeafe; border-radius: 8px;">
    <p style="margin: 0; font-size: 14px; color: #1e40af;"><strong>Next Steps:</strong> Please respond to this inquiry within 24 hours by replying directly to {email}</p>
  </div>
  <hr style="margin: 30px 0; border: none; border-top: 1px solid #e2e8f0;">
  <p style="font-size: 12px; color: #64748b; text-align: center;">This message was sent from the eCall Health Center website contact form.<br>Submitted on {submitted} (Solomon Islands time)</p>
</div>
"#,
        message = escape_html(&form.message),
    );

    let text = format!(
        "New Contact Form Submission\n\n\
         Contact Information:\n{contact_text}\n\
         Message:\n{message}\n\n\
         Please respond to this inquiry within 24 hours by replying directly to {reply}\n\n\
         Submitted on {submitted} (Solomon Islands time)",
        message = form.message,
        reply = form.email,
    );

    RenderedEmail {
        subject: format!("New Contact Form Message from {}", form.name),
        html,
        text,
    }
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}
