//! Notification channels tried after a submission has been logged.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::ContactForm;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel label used in logs and stored diagnostics.
    fn channel(&self) -> &'static str;

    /// Deliver one submission. `Ok` carries the delivery id when the channel reports one.
    async fn notify(&self, form: &ContactForm, submitted_at: DateTime<Utc>)
        -> Result<Option<String>>;
}

/// What happened on one channel for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { id: Option<String> },
    /// Channel not configured, or not needed because an earlier one delivered.
    Skipped,
    Failed { channel: &'static str, reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub async fn attempt(
        notifier: Option<&dyn Notifier>,
        form: &ContactForm,
        submitted_at: DateTime<Utc>,
    ) -> DeliveryOutcome {
        let Some(notifier) = notifier else {
            return DeliveryOutcome::Skipped;
        };
        match notifier.notify(form, submitted_at).await {
            Ok(id) => DeliveryOutcome::Delivered { id },
            Err(err) => DeliveryOutcome::Failed {
                channel: notifier.channel(),
                reason: format!("{err:#}"),
            },
        }
    }
}
