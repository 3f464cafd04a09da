//! Typed accessors over the `reviews`, `review_events`, `review_files` and
//! `review_comments` tables (spec §6 "Persistent state layout").
//!
//! Raw `sql_query` rather than Diesel's `table!`/`Queryable` derive macros,
//! the same style `leynos-frankie::persistence::pr_metadata_cache` uses —
//! avoids depending on `diesel print-schema` having run against a live
//! database at build time.

use diesel::OptionalExtension;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{Bool, Integer, Nullable, Text};

use crate::error::{PersistenceError, Result};
use crate::pool::PooledConn;

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ReviewRow {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = Text)]
    pub org_id: String,
    #[diesel(sql_type = Text)]
    pub initiator: String,
    #[diesel(sql_type = Text)]
    pub source_kind: String,
    #[diesel(sql_type = Text)]
    pub target_ref: String,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Text)]
    pub friendly_name: String,
    #[diesel(sql_type = Text)]
    pub summary: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_summary: Option<String>,
    #[diesel(sql_type = Text)]
    pub created_at: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub completed_at: Option<String>,
}

pub struct NewReview<'a> {
    pub id: &'a str,
    pub org_id: &'a str,
    pub initiator: &'a str,
    pub source_kind: &'a str,
    pub target_ref: &'a str,
    pub status: &'a str,
    pub friendly_name: &'a str,
    pub created_at: &'a str,
}

pub fn insert_review(conn: &mut PooledConn, row: NewReview<'_>) -> Result<()> {
    sql_query(
        "INSERT INTO reviews (id, org_id, initiator, source_kind, target_ref, status, \
         friendly_name, summary, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, '', ?)",
    )
    .bind::<Text, _>(row.id)
    .bind::<Text, _>(row.org_id)
    .bind::<Text, _>(row.initiator)
    .bind::<Text, _>(row.source_kind)
    .bind::<Text, _>(row.target_ref)
    .bind::<Text, _>(row.status)
    .bind::<Text, _>(row.friendly_name)
    .bind::<Text, _>(row.created_at)
    .execute(conn)?;
    Ok(())
}

pub fn update_review_state(
    conn: &mut PooledConn,
    id: &str,
    status: &str,
    summary: &str,
    error_summary: Option<&str>,
    completed_at: Option<&str>,
) -> Result<()> {
    sql_query(
        "UPDATE reviews SET status = ?, summary = ?, error_summary = ?, completed_at = ? \
         WHERE id = ?",
    )
    .bind::<Text, _>(status)
    .bind::<Text, _>(summary)
    .bind::<Nullable<Text>, _>(error_summary)
    .bind::<Nullable<Text>, _>(completed_at)
    .bind::<Text, _>(id)
    .execute(conn)?;
    Ok(())
}

pub fn get_review(conn: &mut PooledConn, id: &str) -> Result<ReviewRow> {
    sql_query("SELECT * FROM reviews WHERE id = ?")
        .bind::<Text, _>(id)
        .get_result(conn)
        .optional()?
        .ok_or_else(|| PersistenceError::NotFound(format!("review {id}")))
}

/// Most recently created non-terminal review for an org, for the
/// dashboard-facing `GET /review` summary.
pub fn most_recent_in_flight(conn: &mut PooledConn, org_id: &str) -> Result<Option<ReviewRow>> {
    Ok(sql_query(
        "SELECT * FROM reviews WHERE org_id = ? AND status IN ('queued', 'in_progress') \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind::<Text, _>(org_id)
    .get_result(conn)
    .optional()?)
}

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ReviewEventRow {
    #[diesel(sql_type = Text)]
    pub review_id: String,
    #[diesel(sql_type = Integer)]
    pub seq: i32,
    #[diesel(sql_type = Text)]
    pub timestamp: String,
    #[diesel(sql_type = Text)]
    pub kind: String,
    #[diesel(sql_type = Text)]
    pub payload: String,
}

pub fn append_event(
    conn: &mut PooledConn,
    review_id: &str,
    seq: i32,
    timestamp: &str,
    kind: &str,
    payload: &str,
) -> Result<()> {
    sql_query(
        "INSERT INTO review_events (review_id, seq, timestamp, kind, payload) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind::<Text, _>(review_id)
    .bind::<Integer, _>(seq)
    .bind::<Text, _>(timestamp)
    .bind::<Text, _>(kind)
    .bind::<Text, _>(payload)
    .execute(conn)?;
    Ok(())
}

/// Events with `seq > since_seq`, ascending, capped at `limit` (spec §4.1
/// `get_events`).
pub fn events_since(
    conn: &mut PooledConn,
    review_id: &str,
    since_seq: i32,
    limit: i64,
) -> Result<Vec<ReviewEventRow>> {
    Ok(sql_query(
        "SELECT * FROM review_events WHERE review_id = ? AND seq > ? ORDER BY seq ASC LIMIT ?",
    )
    .bind::<Text, _>(review_id)
    .bind::<Integer, _>(since_seq)
    .bind::<diesel::sql_types::BigInt, _>(limit)
    .load(conn)?)
}

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ReviewCommentRow {
    #[diesel(sql_type = Text)]
    pub review_id: String,
    #[diesel(sql_type = Text)]
    pub path: String,
    #[diesel(sql_type = Integer)]
    pub line: i32,
    #[diesel(sql_type = Text)]
    pub side: String,
    #[diesel(sql_type = Text)]
    pub severity: String,
    #[diesel(sql_type = Text)]
    pub category: String,
    #[diesel(sql_type = Text)]
    pub body: String,
    #[diesel(sql_type = Text)]
    pub suggestions: String,
    #[diesel(sql_type = Bool)]
    pub internal: bool,
}

pub struct NewComment<'a> {
    pub review_id: &'a str,
    pub path: &'a str,
    pub line: i32,
    pub side: &'a str,
    pub severity: &'a str,
    pub category: &'a str,
    pub body: &'a str,
    pub suggestions_json: &'a str,
    pub internal: bool,
}

pub fn insert_comment(conn: &mut PooledConn, row: NewComment<'_>) -> Result<()> {
    sql_query(
        "INSERT INTO review_comments (review_id, path, line, side, severity, category, body, \
         suggestions, internal) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind::<Text, _>(row.review_id)
    .bind::<Text, _>(row.path)
    .bind::<Integer, _>(row.line)
    .bind::<Text, _>(row.side)
    .bind::<Text, _>(row.severity)
    .bind::<Text, _>(row.category)
    .bind::<Text, _>(row.body)
    .bind::<Text, _>(row.suggestions_json)
    .bind::<Bool, _>(row.internal)
    .execute(conn)?;
    Ok(())
}

pub fn comments_for_review(conn: &mut PooledConn, review_id: &str) -> Result<Vec<ReviewCommentRow>> {
    Ok(
        sql_query("SELECT * FROM review_comments WHERE review_id = ? ORDER BY path, line")
            .bind::<Text, _>(review_id)
            .load(conn)?,
    )
}

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ReviewFileRow {
    #[diesel(sql_type = Text)]
    pub review_id: String,
    #[diesel(sql_type = Integer)]
    pub idx: i32,
    #[diesel(sql_type = Text)]
    pub path: String,
    #[diesel(sql_type = Bool)]
    pub is_new: bool,
    #[diesel(sql_type = Bool)]
    pub is_deleted: bool,
    #[diesel(sql_type = Bool)]
    pub is_renamed: bool,
    #[diesel(sql_type = Bool)]
    pub is_binary: bool,
    /// Serialized `provider_adapters::FileChange` (hunks and all); this
    /// crate has no dependency on `provider-adapters`, so the caller
    /// serializes/deserializes the JSON payload itself.
    #[diesel(sql_type = Text)]
    pub data: String,
}

pub struct NewFile<'a> {
    pub review_id: &'a str,
    pub idx: i32,
    pub path: &'a str,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub is_binary: bool,
    pub data_json: &'a str,
}

pub fn insert_file(conn: &mut PooledConn, row: NewFile<'_>) -> Result<()> {
    sql_query(
        "INSERT INTO review_files (review_id, idx, path, is_new, is_deleted, is_renamed, \
         is_binary, data) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind::<Text, _>(row.review_id)
    .bind::<Integer, _>(row.idx)
    .bind::<Text, _>(row.path)
    .bind::<Bool, _>(row.is_new)
    .bind::<Bool, _>(row.is_deleted)
    .bind::<Bool, _>(row.is_renamed)
    .bind::<Bool, _>(row.is_binary)
    .bind::<Text, _>(row.data_json)
    .execute(conn)?;
    Ok(())
}

pub fn files_for_review(conn: &mut PooledConn, review_id: &str) -> Result<Vec<ReviewFileRow>> {
    Ok(
        sql_query("SELECT * FROM review_files WHERE review_id = ? ORDER BY idx")
            .bind::<Text, _>(review_id)
            .load(conn)?,
    )
}
