use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clinic_site::cache::PostsCache;
use clinic_site::clock::ManualClock;
use clinic_site::db::SqliteStore;
use clinic_site::model::{PostColumns, PostRecord};
use clinic_site::posts::{self, PostQueryOptions, PostsQuery, POST_NOT_FOUND};
use clinic_site::store::{PostFilter, PostPage, PostStore, StoreError};

async fn bare_pool() -> sqlx::SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = bare_pool().await;
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Older deployments created `posts` without the optional columns.
async fn legacy_pool() -> sqlx::SqlitePool {
    let pool = bare_pool().await;
    sqlx::query(
        "CREATE TABLE posts (id TEXT PRIMARY KEY, title TEXT NOT NULL, excerpt TEXT, \
         content TEXT, image TEXT, created_at TEXT, updated_at TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();
    for (i, title) in ["Clinic hours", "Dental checkups", "Vaccination drive"].iter().enumerate() {
        sqlx::query("INSERT INTO posts (id, title, excerpt, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(format!("legacy-{i}"))
            .bind(*title)
            .bind("excerpt")
            .bind("content")
            .bind(base_time() + Duration::hours(i as i64))
            .bind(base_time() + Duration::hours(i as i64))
            .execute(&pool)
            .await
            .unwrap();
    }
    pool
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

struct Seed<'a> {
    id: &'a str,
    slug: &'a str,
    title: &'a str,
    content: &'a str,
    category: &'a str,
    published: bool,
}

async fn insert_post(pool: &sqlx::SqlitePool, seed: &Seed<'_>, at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO posts (id, slug, title, excerpt, content, category, author, published, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(seed.id)
    .bind(seed.slug)
    .bind(seed.title)
    .bind("")
    .bind(seed.content)
    .bind(seed.category)
    .bind("Dr. Kema")
    .bind(seed.published)
    .bind(at)
    .bind(at)
    .execute(pool)
    .await
    .unwrap();
}

async fn seeded_pool(count: usize) -> sqlx::SqlitePool {
    let pool = setup_pool().await;
    for i in 0..count {
        let id = format!("post-{i:02}");
        let slug = format!("health-tip-{i}");
        let title = format!("Health tip {i}");
        let category = if i % 2 == 0 { "Dental Services" } else { "General Medicine" };
        insert_post(
            &pool,
            &Seed {
                id: &id,
                slug: &slug,
                title: &title,
                content: "Stay hydrated.",
                category,
                published: i % 5 != 0,
            },
            base_time() + Duration::hours(i as i64),
        )
        .await;
    }
    pool
}

#[derive(Clone)]
struct CountingStore {
    inner: SqliteStore,
    fail: Arc<AtomicBool>,
    column_lookups: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
    finds: Arc<AtomicUsize>,
}

impl CountingStore {
    fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            inner: SqliteStore::new(pool),
            fail: Arc::new(AtomicBool::new(false)),
            column_lookups: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(AtomicUsize::new(0)),
            finds: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl PostStore for CountingStore {
    async fn post_columns(&self) -> Result<PostColumns, StoreError> {
        self.column_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.post_columns().await
    }

    async fn query_posts(&self, filter: &PostFilter, columns: &PostColumns) -> Result<PostPage, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.query_posts(filter, columns).await
    }

    async fn find_post(
        &self,
        key: &str,
        by_slug: bool,
        columns: &PostColumns,
    ) -> Result<Option<PostRecord>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_post(key, by_slug, columns).await
    }

    async fn related_posts(
        &self,
        category: &str,
        exclude_id: &str,
        limit: i64,
        columns: &PostColumns,
    ) -> Result<Vec<PostRecord>, StoreError> {
        self.check()?;
        self.inner.related_posts(category, exclude_id, limit, columns).await
    }
}

fn cache_with_clock() -> (Arc<PostsCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(base_time()));
    let cache = Arc::new(PostsCache::new(std::time::Duration::from_secs(300), clock.clone()));
    (cache, clock)
}

#[tokio::test]
async fn missing_optional_columns_are_defaulted_and_filters_skipped() {
    let store = Arc::new(SqliteStore::new(legacy_pool().await));
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(
        store,
        cache,
        PostQueryOptions {
            category: Some("Dental Services".into()),
            published: Some(true),
            ..Default::default()
        },
    );
    query.fetch().await;

    assert_eq!(query.error(), None);
    assert_eq!(query.total_count(), 3);
    assert_eq!(query.posts().len(), 3);
    for post in query.posts() {
        assert_eq!(post.slug, post.id);
        assert_eq!(post.category, "General");
        assert_eq!(post.author, "ECall Health Center");
        assert!(post.published);
    }
    // Newest first by default.
    assert_eq!(query.posts()[0].title, "Vaccination drive");
}

#[tokio::test]
async fn filters_on_category_published_and_search() {
    let pool = seeded_pool(10).await;
    insert_post(
        &pool,
        &Seed {
            id: "malaria",
            slug: "malaria-prevention",
            title: "Malaria Prevention",
            content: "Sleep under a net.",
            category: "Public Health",
            published: true,
        },
        base_time(),
    )
    .await;
    insert_post(
        &pool,
        &Seed {
            id: "nets",
            slug: "free-nets",
            title: "Free bed nets",
            content: "Nets reduce MALARIA cases; 100% of households qualify.",
            category: "Public Health",
            published: true,
        },
        base_time(),
    )
    .await;
    let store = Arc::new(SqliteStore::new(pool));
    let (cache, _) = cache_with_clock();

    let mut dental = PostsQuery::new(
        store.clone(),
        cache.clone(),
        PostQueryOptions {
            category: Some("Dental Services".into()),
            ..Default::default()
        },
    );
    dental.fetch().await;
    assert_eq!(dental.total_count(), 5);
    assert!(dental.posts().iter().all(|p| p.category == "Dental Services"));

    let mut published_dental = PostsQuery::new(
        store.clone(),
        cache.clone(),
        PostQueryOptions {
            category: Some("Dental Services".into()),
            published: Some(true),
            ..Default::default()
        },
    );
    published_dental.fetch().await;
    // Posts 0 and 5 are unpublished; only 0 is dental.
    assert_eq!(published_dental.total_count(), 4);

    let mut search = PostsQuery::new(
        store.clone(),
        cache.clone(),
        PostQueryOptions {
            search_query: Some("malaria".into()),
            ..Default::default()
        },
    );
    search.fetch().await;
    let mut ids: Vec<_> = search.posts().iter().map(|p| p.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, ["malaria", "nets"]);

    let mut literal = PostsQuery::new(
        store,
        cache,
        PostQueryOptions {
            search_query: Some("100%".into()),
            ..Default::default()
        },
    );
    literal.fetch().await;
    assert_eq!(literal.total_count(), 1);
    assert_eq!(literal.posts()[0].id, "nets");
}

#[tokio::test]
async fn load_more_appends_until_total_reached() {
    let store = CountingStore::new(seeded_pool(25).await);
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(Arc::new(store.clone()), cache, PostQueryOptions::default());

    query.fetch().await;
    assert_eq!(query.posts().len(), 10);
    assert_eq!(query.total_count(), 25);
    assert!(query.has_more());
    assert!(!query.loading());

    query.load_more().await;
    assert_eq!(query.posts().len(), 20);
    assert!(query.has_more());
    query.load_more().await;
    assert_eq!(query.posts().len(), 25);
    assert!(!query.has_more());

    let before = store.queries.load(Ordering::SeqCst);
    query.load_more().await;
    assert_eq!(store.queries.load(Ordering::SeqCst), before);
    assert_eq!(query.posts().len(), 25);

    let mut ids: Vec<_> = query.posts().iter().map(|p| p.id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 25);
    assert_eq!(ids[0], "post-24");
    // Column detection runs once per query instance.
    assert_eq!(store.column_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn paging_terminates_for_non_positive_limits() {
    for limit in [0, -1] {
        let store = Arc::new(SqliteStore::new(seeded_pool(3).await));
        let (cache, _) = cache_with_clock();
        let mut query = PostsQuery::new(
            store,
            cache,
            PostQueryOptions {
                limit,
                ..Default::default()
            },
        );
        query.fetch().await;
        assert_eq!(query.posts().len(), 1, "limit {limit}");

        let mut rounds = 0;
        while query.has_more() && rounds < 10 {
            query.load_more().await;
            rounds += 1;
        }
        assert!(!query.has_more(), "limit {limit}");
        assert_eq!(rounds, 2, "limit {limit}");
        assert_eq!(query.posts().len(), 3, "limit {limit}");
        assert_eq!(query.total_count(), 3);
    }
}

#[tokio::test]
async fn shrinking_table_stops_paging() {
    let pool = seeded_pool(4).await;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(
        store,
        cache,
        PostQueryOptions {
            limit: 2,
            ..Default::default()
        },
    );
    query.fetch().await;
    assert!(query.has_more());

    sqlx::query("DELETE FROM posts").execute(&pool).await.unwrap();
    query.load_more().await;
    assert!(!query.has_more());
    assert_eq!(query.posts().len(), 2);
}

#[tokio::test]
async fn fresh_fetch_is_served_from_cache_until_refresh_or_expiry() {
    let store = CountingStore::new(seeded_pool(3).await);
    let (cache, clock) = cache_with_clock();
    let options = PostQueryOptions::default();

    let mut first = PostsQuery::new(Arc::new(store.clone()), cache.clone(), options.clone());
    first.fetch().await;
    assert_eq!(store.queries.load(Ordering::SeqCst), 1);

    let mut second = PostsQuery::new(Arc::new(store.clone()), cache.clone(), options.clone());
    second.fetch().await;
    assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    assert_eq!(second.posts(), first.posts());
    assert_eq!(second.total_count(), 3);

    second.refresh().await;
    assert_eq!(store.queries.load(Ordering::SeqCst), 2);

    clock.advance(Duration::seconds(301));
    let mut third = PostsQuery::new(Arc::new(store.clone()), cache, options);
    third.fetch().await;
    assert_eq!(store.queries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_query_keeps_last_good_posts() {
    let store = CountingStore::new(seeded_pool(3).await);
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(Arc::new(store.clone()), cache, PostQueryOptions::default());
    query.fetch().await;
    assert_eq!(query.posts().len(), 3);

    store.fail.store(true, Ordering::SeqCst);
    query.refresh().await;
    assert!(query.error().unwrap().starts_with("database error: pool timed out"));
    assert_eq!(query.posts().len(), 3);
    assert_eq!(query.total_count(), 3);

    store.fail.store(false, Ordering::SeqCst);
    query.refresh().await;
    assert_eq!(query.error(), None);
}

#[tokio::test]
async fn missing_posts_table_reports_relation_error() {
    let store = Arc::new(SqliteStore::new(bare_pool().await));
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(store, cache, PostQueryOptions::default());
    query.fetch().await;
    let err = query.error().unwrap();
    assert!(err.contains("does not exist"));
    assert!(query.posts().is_empty());
    assert!(!query.has_more());
}

#[tokio::test]
async fn configured_columns_skip_detection() {
    let store = CountingStore::new(legacy_pool().await);
    let (cache, _) = cache_with_clock();
    let mut query = PostsQuery::new(Arc::new(store.clone()), cache, PostQueryOptions::default())
        .with_columns(Some(PostColumns::none()));
    query.fetch().await;
    assert_eq!(query.total_count(), 3);
    assert_eq!(store.column_lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn load_post_by_slug_or_id_and_caches_hits() {
    let store = CountingStore::new(seeded_pool(4).await);
    let (cache, _) = cache_with_clock();

    let state = posts::load_post(&store, &cache, None, "health-tip-2").await;
    assert_eq!(state.error, None);
    let post = state.post.unwrap();
    assert_eq!(post.id, "post-02");
    assert_eq!(post.author, "Dr. Kema");

    let again = posts::load_post(&store, &cache, None, "health-tip-2").await;
    assert_eq!(again.post.unwrap().id, "post-02");
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);

    let by_id = posts::load_post(&store, &cache, None, "post-03").await;
    assert_eq!(by_id.post.unwrap().slug, "health-tip-3");

    let missing = posts::load_post(&store, &cache, None, "no-such-post").await;
    assert_eq!(missing.post, None);
    assert_eq!(missing.error.as_deref(), Some(POST_NOT_FOUND));
}

#[tokio::test]
async fn load_post_on_legacy_table_matches_id() {
    let store = SqliteStore::new(legacy_pool().await);
    let (cache, _) = cache_with_clock();
    let state = posts::load_post(&store, &cache, None, "legacy-1").await;
    let post = state.post.unwrap();
    assert_eq!(post.slug, "legacy-1");
    assert_eq!(post.title, "Dental checkups");
}

#[tokio::test]
async fn related_posts_share_category_and_exclude_current() {
    let store = SqliteStore::new(seeded_pool(8).await);
    let related = posts::related_posts(&store, None, "Dental Services", "post-06", 3).await;
    let ids: Vec<_> = related.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["post-04", "post-02", "post-00"]);

    let legacy = SqliteStore::new(legacy_pool().await);
    assert!(posts::related_posts(&legacy, None, "General", "legacy-0", 3).await.is_empty());
}
