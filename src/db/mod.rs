//! Database module: SQLite-backed implementation of the store traits.
//!
//! - `model`: row mapping from SQLite rows into domain types.
//! - `repo`: SQL-only functions over a pool.
//!
//! `SqliteStore` wraps a pool and implements `SubmissionStore` and
//! `PostStore` so the submission log and posts query layer can take it as an
//! injected dependency.

pub mod model;
pub mod repo;

pub use repo::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{ContactSubmission, NewSubmission, PostColumns, PostRecord, SubmissionStatus};
use crate::store::{
    PostFilter, PostPage, PostStore, StoreError, SubmissionActivity, SubmissionCount,
    SubmissionStore,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for SqliteStore {
    async fn provision(&self) -> Result<(), StoreError> {
        repo::run_migrations(&self.pool).await
    }

    async fn insert_submission(
        &self,
        submission: &NewSubmission,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        repo::insert_submission(&self.pool, submission, created_at).await
    }

    async fn update_submission_status(
        &self,
        id: &str,
        status: SubmissionStatus,
        error_message: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        repo::update_submission_status(&self.pool, id, status, error_message, updated_at).await
    }

    async fn recent_submissions(&self, limit: i64) -> Result<Vec<ContactSubmission>, StoreError> {
        repo::recent_submissions(&self.pool, limit).await
    }

    async fn count_submissions(&self, count: SubmissionCount) -> Result<i64, StoreError> {
        repo::count_submissions(&self.pool, count).await
    }

    async fn submission_activity_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SubmissionActivity>, StoreError> {
        repo::submission_activity_since(&self.pool, since).await
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn post_columns(&self) -> Result<PostColumns, StoreError> {
        repo::post_columns(&self.pool).await
    }

    async fn query_posts(
        &self,
        filter: &PostFilter,
        columns: &PostColumns,
    ) -> Result<PostPage, StoreError> {
        repo::query_posts(&self.pool, filter, columns).await
    }

    async fn find_post(
        &self,
        key: &str,
        by_slug: bool,
        columns: &PostColumns,
    ) -> Result<Option<PostRecord>, StoreError> {
        repo::find_post(&self.pool, key, by_slug, columns).await
    }

    async fn related_posts(
        &self,
        category: &str,
        exclude_id: &str,
        limit: i64,
        columns: &PostColumns,
    ) -> Result<Vec<PostRecord>, StoreError> {
        repo::related_posts(&self.pool, category, exclude_id, limit, columns).await
    }
}
