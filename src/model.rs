use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored when the submitter's address cannot be collected.
pub const UNKNOWN_IP: &str = "Unknown";
/// Placeholder stored when no user agent accompanies a submission.
pub const DEFAULT_USER_AGENT: &str = "Web Client";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Received,
    Sent,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Received => "received",
            SubmissionStatus::Sent => "sent",
            SubmissionStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "received" => Some(SubmissionStatus::Received),
            "sent" => Some(SubmissionStatus::Sent),
            "failed" => Some(SubmissionStatus::Failed),
            _ => None,
        }
    }

    /// Statuses a submission may be patched to once notification has run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact form as submitted by a website visitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub message: String,
}

impl ContactForm {
    /// Copy of the form with every field trimmed; blank optional fields become `None`.
    pub fn trimmed(&self) -> ContactForm {
        ContactForm {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: non_blank(self.phone.as_deref()),
            service: non_blank(self.service.as_deref()),
            message: self.message.trim().to_string(),
        }
    }
}

/// Best-effort request provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Row about to be written to `contact_submissions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: String,
    pub ip_address: String,
    pub user_agent: String,
}

impl NewSubmission {
    pub fn from_form(form: &ContactForm, provenance: &Provenance) -> Self {
        let form = form.trimmed();
        Self {
            name: form.name,
            email: form.email,
            phone: form.phone,
            service: form.service,
            message: form.message,
            ip_address: non_blank(provenance.ip_address.as_deref())
                .unwrap_or_else(|| UNKNOWN_IP.to_string()),
            user_agent: non_blank(provenance.user_agent.as_deref())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactSubmission {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub message: String,
    pub status: SubmissionStatus,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dashboard counters over `contact_submissions`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
    pub total: i64,
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
    pub success_rate: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyAnalytics {
    pub submission_date: NaiveDate,
    pub total_submissions: i64,
    pub successful_submissions: i64,
    pub failed_submissions: i64,
    pub success_rate: i64,
}

/// Outcome handed back to the contact form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which optional columns the `posts` table carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostColumns {
    #[serde(default)]
    pub slug: bool,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub category: bool,
    #[serde(default)]
    pub author: bool,
}

impl PostColumns {
    pub fn all() -> Self {
        Self {
            slug: true,
            published: true,
            category: true,
            author: true,
        }
    }

    pub fn none() -> Self {
        Self {
            slug: false,
            published: false,
            category: false,
            author: false,
        }
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cols = Self::none();
        for name in names {
            match name {
                "slug" => cols.slug = true,
                "published" => cols.published = true,
                "category" => cols.category = true,
                "author" => cols.author = true,
                _ => {}
            }
        }
        cols
    }
}

/// A `posts` row as read from the store; absent columns are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub published: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Normalized post shape served to listing pages and the admin table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub category: String,
    pub image: Option<String>,
    pub author: String,
    pub published: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
