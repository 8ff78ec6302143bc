//! Row mapping for the repository queries.
//!
//! Keep these functions focused on turning SQLite rows into domain types.
//! Defaults and normalization belong to higher layers.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::model::{ContactSubmission, PostColumns, PostRecord, SubmissionStatus};
use crate::store::SubmissionActivity;

/// Columns selected for every post query, before optional ones are added.
pub const POST_BASE_COLUMNS: &[&str] = &[
    "id",
    "title",
    "excerpt",
    "content",
    "image",
    "created_at",
    "updated_at",
];

pub fn post_select_list(columns: &PostColumns) -> String {
    let mut names: Vec<&str> = POST_BASE_COLUMNS.to_vec();
    if columns.slug {
        names.push("slug");
    }
    if columns.published {
        names.push("published");
    }
    if columns.category {
        names.push("category");
    }
    if columns.author {
        names.push("author");
    }
    names.join(", ")
}

pub fn map_post_row(row: &SqliteRow, columns: &PostColumns) -> Result<PostRecord, sqlx::Error> {
    Ok(PostRecord {
        id: row.try_get("id")?,
        slug: if columns.slug { row.try_get("slug")? } else { None },
        title: row.try_get("title")?,
        excerpt: row.try_get("excerpt")?,
        content: row.try_get("content")?,
        category: if columns.category {
            row.try_get("category")?
        } else {
            None
        },
        image: row.try_get("image")?,
        author: if columns.author {
            row.try_get("author")?
        } else {
            None
        },
        published: if columns.published {
            row.try_get("published")?
        } else {
            None
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn map_submission_row(row: &SqliteRow) -> Result<ContactSubmission, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(ContactSubmission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        service: row.try_get("service")?,
        message: row.try_get("message")?,
        status: parse_status_column(&status)?,
        error_message: row.try_get("error_message")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn map_activity_row(row: &SqliteRow) -> Result<SubmissionActivity, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(SubmissionActivity {
        created_at: row.try_get("created_at")?,
        status: parse_status_column(&status)?,
    })
}

fn parse_status_column(raw: &str) -> Result<SubmissionStatus, sqlx::Error> {
    SubmissionStatus::parse_status(raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: format!("unknown submission status '{raw}'").into(),
    })
}
