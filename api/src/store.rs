//! Diesel-backed [`orchestrator::store::ReviewStore`] over the
//! `persistence` crate's raw-SQL accessors. Lives here rather than in
//! either `orchestrator` or `persistence` — the trait belongs to one crate
//! and the pool type to the other, so the impl sits in the crate that
//! depends on both, same as Rust's orphan rule requires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use orchestrator::batch::CancelToken;
use orchestrator::errors::{Error, Result};
use orchestrator::review::{
    Comment, CommentSide, EventKind, EventPayload, Review, ReviewEvent, ReviewId, ReviewStatus,
    SourceKind, Severity,
};
use persistence::{reviews, SqlitePool};
use provider_adapters::FileChange;

#[derive(Clone)]
pub struct PersistedReviewStore {
    pool: SqlitePool,
    tokens: Arc<Mutex<HashMap<ReviewId, CancelToken>>>,
}

impl PersistedReviewStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, tokens: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn conn(&self) -> Result<persistence::PooledConn> {
        self.pool.get().map_err(|e| Error::Internal(format!("db pool: {e}")))
    }
}

fn source_kind_str(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Mr => "mr",
        SourceKind::Pr => "pr",
        SourceKind::Diff => "diff",
    }
}

fn parse_source_kind(s: &str) -> Result<SourceKind> {
    match s {
        "mr" => Ok(SourceKind::Mr),
        "pr" => Ok(SourceKind::Pr),
        "diff" => Ok(SourceKind::Diff),
        other => Err(Error::Internal(format!("unknown source_kind {other}"))),
    }
}

fn status_str(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::Queued => "queued",
        ReviewStatus::InProgress => "in_progress",
        ReviewStatus::Completed => "completed",
        ReviewStatus::Failed => "failed",
        ReviewStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> Result<ReviewStatus> {
    match s {
        "queued" => Ok(ReviewStatus::Queued),
        "in_progress" => Ok(ReviewStatus::InProgress),
        "completed" => Ok(ReviewStatus::Completed),
        "failed" => Ok(ReviewStatus::Failed),
        "cancelled" => Ok(ReviewStatus::Cancelled),
        other => Err(Error::Internal(format!("unknown status {other}"))),
    }
}

fn side_str(side: CommentSide) -> &'static str {
    match side {
        CommentSide::New => "new",
        CommentSide::Old => "old",
    }
}

fn parse_side(s: &str) -> Result<CommentSide> {
    match s {
        "new" => Ok(CommentSide::New),
        "old" => Ok(CommentSide::Old),
        other => Err(Error::Internal(format!("unknown comment side {other}"))),
    }
}

fn severity_str(sev: Severity) -> &'static str {
    match sev {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

fn parse_severity(s: &str) -> Result<Severity> {
    match s {
        "info" => Ok(Severity::Info),
        "warning" => Ok(Severity::Warning),
        "critical" => Ok(Severity::Critical),
        other => Err(Error::Internal(format!("unknown severity {other}"))),
    }
}

fn event_kind_str(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Queued => "queued",
        EventKind::BatchStarted => "batch_started",
        EventKind::BatchCompleted => "batch_completed",
        EventKind::CommentProduced => "comment_produced",
        EventKind::SummaryProduced => "summary_produced",
        EventKind::PostStarted => "post_started",
        EventKind::PostCompleted => "post_completed",
        EventKind::PostFailed => "post_failed",
        EventKind::Error => "error",
    }
}

fn parse_event_kind(s: &str) -> Result<EventKind> {
    Ok(match s {
        "queued" => EventKind::Queued,
        "batch_started" => EventKind::BatchStarted,
        "batch_completed" => EventKind::BatchCompleted,
        "comment_produced" => EventKind::CommentProduced,
        "summary_produced" => EventKind::SummaryProduced,
        "post_started" => EventKind::PostStarted,
        "post_completed" => EventKind::PostCompleted,
        "post_failed" => EventKind::PostFailed,
        "error" => EventKind::Error,
        other => return Err(Error::Internal(format!("unknown event kind {other}"))),
    })
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {s}: {e}")))
}

fn write_review(conn: &mut persistence::PooledConn, review: &Review, insert: bool) -> Result<()> {
    let id = review.id.to_string();
    if insert {
        reviews::insert_review(
            conn,
            reviews::NewReview {
                id: &id,
                org_id: &review.org_id,
                initiator: &review.initiator,
                source_kind: source_kind_str(review.source_kind),
                target_ref: &review.target_ref,
                status: status_str(review.status),
                friendly_name: &review.friendly_name,
                created_at: &review.created_at.to_rfc3339(),
            },
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        for (idx, file) in review.files.iter().enumerate() {
            let data_json = serde_json::to_string(file).map_err(|e| Error::Internal(e.to_string()))?;
            reviews::insert_file(
                conn,
                reviews::NewFile {
                    review_id: &id,
                    idx: idx as i32,
                    path: file.display_path(),
                    is_new: file.is_new,
                    is_deleted: file.is_deleted,
                    is_renamed: file.is_renamed,
                    is_binary: file.is_binary,
                    data_json: &data_json,
                },
            )
            .map_err(|e| Error::Internal(e.to_string()))?;
        }
    } else {
        reviews::update_review_state(
            conn,
            &id,
            status_str(review.status),
            &review.summary,
            review.error_summary.as_deref(),
            review.completed_at.map(|t| t.to_rfc3339()).as_deref(),
        )
        .map_err(|e| Error::Internal(e.to_string()))?;
    }

    // Events and comments are append-mostly; re-synced wholesale here is
    // simpler than diffing against what is already stored and this path
    // is not hot (one call per status transition, not per batch).
    sync_events_and_comments(conn, review)
}

fn sync_events_and_comments(conn: &mut persistence::PooledConn, review: &Review) -> Result<()> {
    let id = review.id.to_string();
    let existing_events = reviews::events_since(conn, &id, -1, i64::MAX)
        .map_err(|e| Error::Internal(e.to_string()))?;
    for event in review.events.iter().skip(existing_events.len()) {
        reviews::append_event(
            conn,
            &id,
            event.seq as i32,
            &event.timestamp.to_rfc3339(),
            event_kind_str(event.kind),
            &event.payload.to_string(),
        )
        .map_err(|e| Error::Internal(e.to_string()))?;
    }

    let existing_comments = reviews::comments_for_review(conn, &id)
        .map_err(|e| Error::Internal(e.to_string()))?;
    for comment in review.comments.iter().skip(existing_comments.len()) {
        let suggestions_json =
            serde_json::to_string(&comment.suggestions).map_err(|e| Error::Internal(e.to_string()))?;
        reviews::insert_comment(
            conn,
            reviews::NewComment {
                review_id: &id,
                path: &comment.path,
                line: comment.line as i32,
                side: side_str(comment.side),
                severity: severity_str(comment.severity),
                category: &comment.category,
                body: &comment.body,
                suggestions_json: &suggestions_json,
                internal: comment.internal,
            },
        )
        .map_err(|e| Error::Internal(e.to_string()))?;
    }

    Ok(())
}

fn read_review(conn: &mut persistence::PooledConn, id: ReviewId) -> Result<Option<Review>> {
    let id_str = id.to_string();
    let row = match reviews::get_review(conn, &id_str) {
        Ok(row) => row,
        Err(persistence::PersistenceError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(Error::Internal(e.to_string())),
    };

    let file_rows =
        reviews::files_for_review(conn, &id_str).map_err(|e| Error::Internal(e.to_string()))?;
    let files = file_rows
        .iter()
        .map(|r| serde_json::from_str::<FileChange>(&r.data).map_err(|e| Error::Internal(e.to_string())))
        .collect::<Result<Vec<_>>>()?;

    let comment_rows = reviews::comments_for_review(conn, &id_str)
        .map_err(|e| Error::Internal(e.to_string()))?;
    let comments = comment_rows
        .into_iter()
        .map(|r| {
            Ok(Comment {
                review_id: id,
                path: r.path,
                line: r.line as u32,
                side: parse_side(&r.side)?,
                severity: parse_severity(&r.severity)?,
                category: r.category,
                body: r.body,
                suggestions: serde_json::from_str(&r.suggestions).map_err(|e| Error::Internal(e.to_string()))?,
                internal: r.internal,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let event_rows = reviews::events_since(conn, &id_str, -1, i64::MAX)
        .map_err(|e| Error::Internal(e.to_string()))?;
    let mut events = Vec::with_capacity(event_rows.len());
    let mut next_seq = 0u64;
    for r in event_rows {
        let seq = r.seq as u64;
        next_seq = next_seq.max(seq + 1);
        events.push(ReviewEvent {
            review_id: id,
            seq,
            timestamp: parse_dt(&r.timestamp)?,
            kind: parse_event_kind(&r.kind)?,
            payload: serde_json::from_str::<EventPayload>(&r.payload)
                .map_err(|e| Error::Internal(e.to_string()))?,
        });
    }

    Ok(Some(Review::from_parts(
        id,
        row.org_id,
        row.initiator,
        parse_source_kind(&row.source_kind)?,
        row.target_ref,
        parse_status(&row.status)?,
        row.friendly_name,
        parse_dt(&row.created_at)?,
        row.completed_at.as_deref().map(parse_dt).transpose()?,
        row.summary,
        row.error_summary,
        files,
        comments,
        events,
        next_seq,
    )))
}

impl orchestrator::store::ReviewStore for PersistedReviewStore {
    async fn insert(&self, review: Review) -> Result<()> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.conn()?;
            write_review(&mut conn, &review, true)
        })
        .await
        .map_err(|e| Error::Internal(format!("blocking task join: {e}")))?
    }

    async fn update(&self, review: Review) -> Result<()> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.conn()?;
            write_review(&mut conn, &review, false)
        })
        .await
        .map_err(|e| Error::Internal(format!("blocking task join: {e}")))?
    }

    async fn get(&self, id: ReviewId) -> Result<Option<Review>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.conn()?;
            read_review(&mut conn, id)
        })
        .await
        .map_err(|e| Error::Internal(format!("blocking task join: {e}")))?
    }

    fn cancel_token(&self, id: ReviewId) -> CancelToken {
        let mut guard = self.tokens.lock().expect("cancel token map poisoned");
        guard.entry(id).or_insert_with(CancelToken::new).clone()
    }
}
