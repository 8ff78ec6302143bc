//! Paginated, filtered and cached reads over the `posts` table.
//!
//! The table may lack some optional columns, so every query first resolves a
//! [`PostColumns`] descriptor: from configuration when one was supplied,
//! otherwise from a one-time column lookup against the store. Filters on absent columns
//! are dropped and rows are normalized to the fixed [`Post`] shape.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::{CachedPage, PostsCache};
use crate::model::{Post, PostColumns, PostRecord};
use crate::slug::is_valid_slug;
use crate::store::{PostFilter, PostOrder, PostStore, SortDirection, StoreError};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_AUTHOR: &str = "ECall Health Center";
pub const POST_NOT_FOUND: &str = "Post not found";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostQueryOptions {
    pub limit: i64,
    pub offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default)]
    pub order_by: PostOrder,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Default for PostQueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            category: None,
            search_query: None,
            published: None,
            order_by: PostOrder::default(),
            direction: SortDirection::default(),
        }
    }
}

impl PostQueryOptions {
    /// Cache key: the serialized filter, sort and paging options.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Rows per page; non-positive limits fall back to one row.
    pub fn page_size(&self) -> i64 {
        self.limit.max(1)
    }

    /// Reduce the options to a store filter for the page starting at `offset`.
    pub fn to_filter(&self, offset: i64, columns: &PostColumns) -> PostFilter {
        PostFilter {
            category: self.category.clone().filter(|_| columns.category),
            search: self
                .search_query
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            published: self.published.filter(|_| columns.published),
            order_by: self.order_by,
            direction: self.direction,
            offset: offset.max(0),
            limit: self.page_size(),
        }
    }
}

/// Map a raw row to the fixed post shape, filling defaults for absent columns.
pub fn normalize(record: PostRecord) -> Post {
    let PostRecord {
        id,
        slug,
        title,
        excerpt,
        content,
        category,
        image,
        author,
        published,
        created_at,
        updated_at,
    } = record;
    Post {
        slug: present(slug).unwrap_or_else(|| id.clone()),
        id,
        title: present(title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        excerpt: excerpt.unwrap_or_default(),
        content: content.unwrap_or_default(),
        category: present(category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        image: present(image),
        author: present(author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        published: published.unwrap_or(true),
        created_at,
        updated_at,
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn resolve_columns(
    store: &dyn PostStore,
    configured: Option<PostColumns>,
) -> Result<PostColumns, StoreError> {
    match configured {
        Some(columns) => Ok(columns),
        None => store.post_columns().await,
    }
}

/// Stateful listing over `posts`: one instance per list view.
pub struct PostsQuery {
    store: Arc<dyn PostStore>,
    cache: Arc<PostsCache>,
    options: PostQueryOptions,
    configured_columns: Option<PostColumns>,
    detected_columns: Option<PostColumns>,
    posts: Vec<Post>,
    loading: bool,
    error: Option<String>,
    total_count: i64,
    current_offset: i64,
}

impl PostsQuery {
    pub fn new(store: Arc<dyn PostStore>, cache: Arc<PostsCache>, options: PostQueryOptions) -> Self {
        Self {
            store,
            cache,
            current_offset: options.offset.max(0),
            options,
            configured_columns: None,
            detected_columns: None,
            posts: Vec::new(),
            loading: false,
            error: None,
            total_count: 0,
        }
    }

    /// Skip column detection and trust this descriptor.
    pub fn with_columns(mut self, columns: Option<PostColumns>) -> Self {
        self.configured_columns = columns;
        self
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    pub fn has_more(&self) -> bool {
        self.current_offset < self.total_count
    }

    async fn columns(&mut self) -> Result<PostColumns, StoreError> {
        if let Some(columns) = self.configured_columns.or(self.detected_columns) {
            return Ok(columns);
        }
        let columns = self.store.post_columns().await?;
        debug!(?columns, "detected posts columns");
        self.detected_columns = Some(columns);
        Ok(columns)
    }

    async fn load_page(&mut self, offset: i64) -> Result<CachedPage, StoreError> {
        let columns = self.columns().await?;
        let filter = self.options.to_filter(offset, &columns);
        let page = self.store.query_posts(&filter, &columns).await?;
        Ok(CachedPage {
            posts: page.records.into_iter().map(normalize).collect(),
            total_count: page.total_count,
        })
    }

    /// Fresh fetch of the first page; served from the cache when possible.
    #[instrument(skip_all)]
    pub async fn fetch(&mut self) {
        let key = self.options.cache_key();
        if let Some(page) = self.cache.get(&key) {
            self.apply_first_page(page);
            return;
        }

        self.loading = true;
        let result = self.load_page(self.options.offset).await;
        self.loading = false;
        match result {
            Ok(page) => {
                self.cache.put(key, page.clone());
                self.apply_first_page(page);
            }
            Err(err) => self.record_failure(err),
        }
    }

    /// Append the next page. No-op while a fetch is running or nothing is left.
    #[instrument(skip_all)]
    pub async fn load_more(&mut self) {
        if self.loading || self.current_offset >= self.total_count {
            return;
        }
        self.loading = true;
        let result = self.load_page(self.current_offset).await;
        self.loading = false;
        match result {
            Ok(page) => {
                let returned = page.posts.len() as i64;
                self.posts.extend(page.posts);
                self.total_count = page.total_count;
                // An empty page means the table shrank under us; stop paging.
                self.current_offset = if returned == 0 {
                    self.total_count
                } else {
                    self.current_offset + returned
                };
                self.error = None;
            }
            Err(err) => self.record_failure(err),
        }
    }

    /// Drop the cached entry and descriptor, then fetch again.
    pub async fn refresh(&mut self) {
        self.cache.invalidate(&self.options.cache_key());
        self.detected_columns = None;
        self.fetch().await;
    }

    fn apply_first_page(&mut self, page: CachedPage) {
        self.current_offset = self.options.offset.max(0) + page.posts.len() as i64;
        self.posts = page.posts;
        self.total_count = page.total_count;
        self.error = None;
    }

    fn record_failure(&mut self, err: StoreError) {
        if err.is_schema_missing() {
            debug!(error = %err, "posts table not provisioned");
        } else {
            warn!(error = %err, "posts query failed");
        }
        self.error = Some(err.to_string());
    }
}

/// Result of a single-post lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostState {
    pub post: Option<Post>,
    pub error: Option<String>,
}

impl PostState {
    fn found(post: Post) -> Self {
        Self {
            post: Some(post),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            post: None,
            error: Some(error.into()),
        }
    }
}

/// Look one post up by slug or id.
#[instrument(skip(store, cache, columns))]
pub async fn load_post(
    store: &dyn PostStore,
    cache: &PostsCache,
    columns: Option<PostColumns>,
    slug_or_id: &str,
) -> PostState {
    let key = slug_or_id.trim();
    if key.is_empty() {
        return PostState::failed(POST_NOT_FOUND);
    }
    let cache_key = format!("post:{key}");
    if let Some(post) = cache.get(&cache_key).and_then(|p| p.posts.into_iter().next()) {
        return PostState::found(post);
    }

    let columns = match resolve_columns(store, columns).await {
        Ok(columns) => columns,
        Err(err) => return PostState::failed(err.to_string()),
    };
    match store.find_post(key, is_valid_slug(key), &columns).await {
        Ok(Some(record)) => {
            let post = normalize(record);
            cache.put(
                cache_key,
                CachedPage {
                    posts: vec![post.clone()],
                    total_count: 1,
                },
            );
            PostState::found(post)
        }
        Ok(None) => PostState::failed(POST_NOT_FOUND),
        Err(err) => {
            warn!(error = %err, "post lookup failed");
            PostState::failed(err.to_string())
        }
    }
}

/// Newest posts sharing `category`, excluding `exclude_id`. Empty on any failure.
pub async fn related_posts(
    store: &dyn PostStore,
    columns: Option<PostColumns>,
    category: &str,
    exclude_id: &str,
    limit: i64,
) -> Vec<Post> {
    let result = async {
        let columns = resolve_columns(store, columns).await?;
        store.related_posts(category, exclude_id, limit, &columns).await
    }
    .await;
    match result {
        Ok(records) => records.into_iter().map(normalize).collect(),
        Err(err) => {
            warn!(error = %err, "related posts lookup failed");
            Vec::new()
        }
    }
}
