//! Contact-form submission pipeline.
//!
//! validate -> log -> direct channel -> webhook (only if direct did not
//! deliver) -> status patch. Only validation and logging failures reach the
//! visitor; everything after a successful log is recorded on the row.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::clock::Clock;
use crate::model::{ContactForm, NewSubmission, Provenance, SubmissionStatus, SubmitResponse};
use crate::notify::{DeliveryOutcome, Notifier};
use crate::submissions::SubmissionLog;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

pub const SUCCESS_MESSAGE: &str =
    "Thank you for your message! We've received your inquiry and will respond within 24 hours.";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid email format")]
    InvalidEmail,
}

impl ValidationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ValidationError::MissingFields => "Please fill in all required fields.",
            ValidationError::InvalidEmail => "Please enter a valid email address.",
        }
    }
}

/// Check required fields and email shape; returns the trimmed form.
pub fn validate(form: &ContactForm) -> Result<ContactForm, ValidationError> {
    let form = form.trimmed();
    if form.name.is_empty() || form.email.is_empty() || form.message.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if !EMAIL_RE.is_match(&form.email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(form)
}

/// Channel results for one submission and the status they resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub direct: DeliveryOutcome,
    pub fallback: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn status(&self) -> SubmissionStatus {
        if self.direct.is_delivered() || self.fallback.is_delivered() {
            SubmissionStatus::Sent
        } else {
            SubmissionStatus::Received
        }
    }

    /// Text stored in `error_message`; `None` when nothing went wrong.
    pub fn diagnostic(&self) -> Option<String> {
        let mut notes: Vec<String> = [&self.direct, &self.fallback]
            .into_iter()
            .filter_map(|outcome| match outcome {
                DeliveryOutcome::Failed { channel, reason } => Some(format!("{channel}: {reason}")),
                _ => None,
            })
            .collect();
        if notes.is_empty()
            && self.direct == DeliveryOutcome::Skipped
            && self.fallback == DeliveryOutcome::Skipped
        {
            notes.push("no notification channel configured".to_string());
        }
        if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        }
    }
}

pub struct ContactPipeline {
    log: Arc<SubmissionLog>,
    direct: Option<Arc<dyn Notifier>>,
    fallback: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    contact_address: String,
}

impl ContactPipeline {
    pub fn new(log: Arc<SubmissionLog>, clock: Arc<dyn Clock>, contact_address: impl Into<String>) -> Self {
        Self {
            log,
            direct: None,
            fallback: None,
            clock,
            contact_address: contact_address.into(),
        }
    }

    pub fn with_direct(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.direct = Some(notifier);
        self
    }

    pub fn with_fallback(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.fallback = Some(notifier);
        self
    }

    pub async fn submit(&self, form: &ContactForm) -> SubmitResponse {
        self.submit_from(form, &Provenance::default()).await
    }

    #[instrument(skip_all)]
    pub async fn submit_from(&self, form: &ContactForm, provenance: &Provenance) -> SubmitResponse {
        let form = match validate(form) {
            Ok(form) => form,
            Err(err) => {
                info!(error = %err, "rejected contact form");
                return SubmitResponse {
                    success: false,
                    message: err.user_message().to_string(),
                    error: Some(err.to_string()),
                };
            }
        };

        let submission = NewSubmission::from_form(&form, provenance);
        let id = match self.log.log_submission(&submission).await {
            Ok(id) => id,
            Err(err) => {
                error!(error = %err, "could not record contact submission");
                return SubmitResponse {
                    success: false,
                    message: format!(
                        "We're experiencing technical difficulties. Please contact us directly at {}.",
                        self.contact_address
                    ),
                    error: Some(err.to_string()),
                };
            }
        };

        let report = self.notify(&form).await;
        let status = report.status();
        let diagnostic = report.diagnostic();
        info!(id = %id, %status, ?diagnostic, "notification attempts finished");

        if !self
            .log
            .update_submission_status(&id, status, diagnostic.as_deref())
            .await
        {
            warn!(id = %id, %status, "status patch failed; submission stays pending");
        }

        SubmitResponse {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            error: None,
        }
    }

    async fn notify(&self, form: &ContactForm) -> DeliveryReport {
        let submitted_at = self.clock.now();
        let direct = DeliveryOutcome::attempt(self.direct.as_deref(), form, submitted_at).await;
        if let DeliveryOutcome::Failed { channel, reason } = &direct {
            warn!(channel, reason = %reason, "direct channel failed; trying fallback");
        }
        let fallback = if direct.is_delivered() {
            DeliveryOutcome::Skipped
        } else {
            DeliveryOutcome::attempt(self.fallback.as_deref(), form, submitted_at).await
        };
        DeliveryReport { direct, fallback }
    }
}
