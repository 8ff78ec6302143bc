//! Store abstraction consumed by the submission log and the posts query layer.
//!
//! Implementations decide at this boundary whether a failure means the schema
//! has not been provisioned yet (`StoreError::SchemaMissing`) or something
//! else went wrong; consumers match on the variant, never on message text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContactSubmission, NewSubmission, PostColumns, PostRecord, SubmissionStatus};

pub const SUBMISSIONS_TABLE: &str = "contact_submissions";
pub const POSTS_TABLE: &str = "posts";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("relation \"{0}\" does not exist")]
    SchemaMissing(&'static str),
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, StoreError::SchemaMissing(_))
    }
}

/// Count queries needed by the dashboard statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionCount {
    All,
    CreatedSince(DateTime<Utc>),
    WithStatus(SubmissionStatus),
}

/// Creation time and status of one submission, used for per-day analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionActivity {
    pub created_at: DateTime<Utc>,
    pub status: SubmissionStatus,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create the tables this store needs. Safe to run repeatedly.
    async fn provision(&self) -> Result<(), StoreError>;

    /// Insert a `pending` row and return its generated id.
    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError>;

    /// Returns `false` when no row has the given id.
    async fn update_submission_status(
        &self,
        id: &str,
        status: SubmissionStatus,
        error_message: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn recent_submissions(&self, limit: i64) -> Result<Vec<ContactSubmission>, StoreError>;

    async fn count_submissions(&self, count: SubmissionCount) -> Result<i64, StoreError>;

    async fn submission_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SubmissionActivity>, StoreError>;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostOrder {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

impl PostOrder {
    pub fn column(&self) -> &'static str {
        match self {
            PostOrder::CreatedAt => "created_at",
            PostOrder::UpdatedAt => "updated_at",
            PostOrder::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Fully resolved listing query. Filters here are already reduced to the
/// columns the table actually has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub published: Option<bool>,
    pub order_by: PostOrder,
    pub direction: SortDirection,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    pub records: Vec<PostRecord>,
    pub total_count: i64,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Report which optional columns `posts` has.
    async fn post_columns(&self) -> Result<PostColumns, StoreError>;

    async fn query_posts(
        &self,
        filter: &PostFilter,
        columns: &PostColumns,
    ) -> Result<PostPage, StoreError>;

    /// Look a post up by slug (when `by_slug` and the column exists) or id.
    async fn find_post(
        &self,
        key: &str,
        by_slug: bool,
        columns: &PostColumns,
    ) -> Result<Option<PostRecord>, StoreError>;

    async fn related_posts(
        &self,
        category: &str,
        exclude_id: &str,
        limit: i64,
        columns: &PostColumns,
    ) -> Result<Vec<PostRecord>, StoreError>;
}
