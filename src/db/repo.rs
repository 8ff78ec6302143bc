use super::model::{map_activity_row, map_post_row, map_submission_row, post_select_list};
use crate::model::{ContactSubmission, NewSubmission, PostColumns, PostRecord, SubmissionStatus};
use crate::store::{
    PostFilter, PostPage, StoreError, SubmissionActivity, SubmissionCount, POSTS_TABLE,
    SUBMISSIONS_TABLE,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure its parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Map "no such table" into `SchemaMissing`; everything else stays a database error.
fn classify(err: sqlx::Error, table: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.message().contains("no such table") {
            return StoreError::SchemaMissing(table);
        }
    }
    StoreError::Database(err)
}

#[instrument(skip_all)]
pub async fn insert_submission(
    pool: &Pool,
    submission: &NewSubmission,
    created_at: DateTime<Utc>,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    let rec = sqlx::query(
        "INSERT INTO contact_submissions \
         (id, name, email, phone, service, message, status, ip_address, user_agent, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&id)
    .bind(&submission.name)
    .bind(&submission.email)
    .bind(submission.phone.as_deref())
    .bind(submission.service.as_deref())
    .bind(&submission.message)
    .bind(SubmissionStatus::Pending.as_str())
    .bind(&submission.ip_address)
    .bind(&submission.user_agent)
    .bind(created_at)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .map_err(|e| classify(e, SUBMISSIONS_TABLE))?;
    Ok(rec.try_get::<String, _>("id")?)
}

#[instrument(skip_all)]
pub async fn update_submission_status(
    pool: &Pool,
    id: &str,
    status: SubmissionStatus,
    error_message: Option<&str>,
    updated_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let res = sqlx::query(
        "UPDATE contact_submissions SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(error_message)
    .bind(updated_at)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| classify(e, SUBMISSIONS_TABLE))?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn fetch_submission(pool: &Pool, id: &str) -> Result<ContactSubmission, StoreError> {
    let row = sqlx::query("SELECT * FROM contact_submissions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| classify(e, SUBMISSIONS_TABLE))?
        .ok_or(StoreError::NotFound)?;
    Ok(map_submission_row(&row)?)
}

#[instrument(skip_all)]
pub async fn recent_submissions(
    pool: &Pool,
    limit: i64,
) -> Result<Vec<ContactSubmission>, StoreError> {
    let rows = sqlx::query("SELECT * FROM contact_submissions ORDER BY created_at DESC LIMIT ?")
        .bind(limit.max(0))
        .fetch_all(pool)
        .await
        .map_err(|e| classify(e, SUBMISSIONS_TABLE))?;
    let subs = rows
        .iter()
        .map(map_submission_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subs)
}

#[instrument(skip_all)]
pub async fn count_submissions(pool: &Pool, count: SubmissionCount) -> Result<i64, StoreError> {
    let query = match count {
        SubmissionCount::All => {
            sqlx::query_scalar::<Sqlite, i64>("SELECT COUNT(*) FROM contact_submissions")
        }
        SubmissionCount::CreatedSince(since) => sqlx::query_scalar::<Sqlite, i64>(
            "SELECT COUNT(*) FROM contact_submissions WHERE datetime(created_at) >= datetime(?)",
        )
        .bind(since),
        SubmissionCount::WithStatus(status) => {
            sqlx::query_scalar::<Sqlite, i64>(
                "SELECT COUNT(*) FROM contact_submissions WHERE status = ?",
            )
            .bind(status.as_str())
        }
    };
    let n = query
        .fetch_one(pool)
        .await
        .map_err(|e| classify(e, SUBMISSIONS_TABLE))?;
    Ok(n)
}

#[instrument(skip_all)]
pub async fn submission_activity_since(
    pool: &Pool,
    since: DateTime<Utc>,
) -> Result<Vec<SubmissionActivity>, StoreError> {
    let rows = sqlx::query(
        "SELECT created_at, status FROM contact_submissions \
         WHERE datetime(created_at) >= datetime(?) ORDER BY created_at ASC",
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(|e| classify(e, SUBMISSIONS_TABLE))?;
    let activity = rows
        .iter()
        .map(map_activity_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(activity)
}

#[instrument(skip_all)]
pub async fn post_columns(pool: &Pool) -> Result<PostColumns, StoreError> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('posts')")
        .fetch_all(pool)
        .await
        .map_err(|e| classify(e, POSTS_TABLE))?;
    if names.is_empty() {
        return Err(StoreError::SchemaMissing(POSTS_TABLE));
    }
    Ok(PostColumns::from_names(names.iter().map(String::as_str)))
}

fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn push_post_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(published) = filter.published {
        qb.push(" AND published = ").push_bind(published);
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR excerpt LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR content LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[instrument(skip_all)]
pub async fn query_posts(
    pool: &Pool,
    filter: &PostFilter,
    columns: &PostColumns,
) -> Result<PostPage, StoreError> {
    let mut count_q = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
    push_post_filters(&mut count_q, filter);
    let total_count: i64 = count_q
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(|e| classify(e, POSTS_TABLE))?;

    let mut page_q =
        QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts", post_select_list(columns)));
    push_post_filters(&mut page_q, filter);
    page_q.push(format!(
        " ORDER BY {} {}",
        filter.order_by.column(),
        filter.direction.as_sql()
    ));
    page_q
        .push(" LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);
    let rows = page_q
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| classify(e, POSTS_TABLE))?;
    let records = rows
        .iter()
        .map(|row| map_post_row(row, columns))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PostPage {
        records,
        total_count,
    })
}

#[instrument(skip_all)]
pub async fn find_post(
    pool: &Pool,
    key: &str,
    by_slug: bool,
    columns: &PostColumns,
) -> Result<Option<PostRecord>, StoreError> {
    let select = post_select_list(columns);
    let by_slug = by_slug && columns.slug;
    let sql = if by_slug {
        format!("SELECT {select} FROM posts WHERE slug = ? OR id = ? LIMIT 1")
    } else {
        format!("SELECT {select} FROM posts WHERE id = ? LIMIT 1")
    };
    let mut query = sqlx::query(&sql).bind(key);
    if by_slug {
        query = query.bind(key);
    }
    let row = query
        .fetch_optional(pool)
        .await
        .map_err(|e| classify(e, POSTS_TABLE))?;
    match row {
        Some(row) => Ok(Some(map_post_row(&row, columns)?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn related_posts(
    pool: &Pool,
    category: &str,
    exclude_id: &str,
    limit: i64,
    columns: &PostColumns,
) -> Result<Vec<PostRecord>, StoreError> {
    if !columns.category {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE category = ? AND id <> ? ORDER BY created_at DESC LIMIT ?",
        post_select_list(columns)
    ))
    .bind(category)
    .bind(exclude_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| classify(e, POSTS_TABLE))?;
    let records = rows
        .iter()
        .map(|row| map_post_row(row, columns))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}
