//! Review aggregate: state machine, child records, and the per-review event
//! log (spec §3, §4.1, §4.6).
//!
//! A [`Review`] owns its [`FileChange`]s, [`Comment`]s and [`ReviewEvent`]s;
//! in-memory structures hold plain values, never back-references, per
//! spec §9 "Cyclic ownership".

use chrono::{DateTime, Utc};
use provider_adapters::FileChange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ReviewId = Uuid;

/// Where a review's diff originated (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Mr,
    Pr,
    Diff,
}

/// Review lifecycle state (spec §4.1 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ReviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReviewStatus::Completed | ReviewStatus::Failed | ReviewStatus::Cancelled
        )
    }

    /// Checks whether `self → next` is one of the transitions spec §4.1
    /// allows: `queued→in_progress`, `in_progress→{completed,failed,cancelled}`,
    /// `queued→cancelled`.
    pub fn can_transition_to(self, next: ReviewStatus) -> bool {
        use ReviewStatus::*;
        matches!(
            (self, next),
            (Queued, InProgress)
                | (Queued, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }
}

/// Which side of the diff a comment's line number resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSide {
    New,
    Old,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A single review finding (spec §3 Comment).
///
/// Invariant enforced by construction: `(path, line)` must resolve to a
/// changed or context line within some hunk of the owning Review — callers
/// get there via [`crate::batch::validate_and_build_comments`], never by
/// constructing a `Comment` directly from unchecked model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub review_id: ReviewId,
    pub path: String,
    pub line: u32,
    pub side: CommentSide,
    pub severity: Severity,
    pub category: String,
    pub body: String,
    pub suggestions: Vec<String>,
    /// Internal comments are retained on the Review but never posted to the
    /// forge (spec §3).
    pub internal: bool,
}

impl Comment {
    /// Dedup key used within a Review (spec §4.1 step 2: "deduplicated by
    /// `(path, line, body-hash)`").
    pub fn dedup_key(&self) -> (String, u32, u64) {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.body.hash(&mut hasher);
        (self.path.clone(), self.line, hasher.finish())
    }
}

/// Opaque per-event payload; kinds are enumerated, payload shape is kind-specific.
pub type EventPayload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Queued,
    BatchStarted,
    BatchCompleted,
    CommentProduced,
    SummaryProduced,
    PostStarted,
    PostCompleted,
    PostFailed,
    Error,
}

/// A single append-only event in a Review's event stream (spec §3, §4.6).
///
/// `seq` is dense and gap-free within a Review: events are only ever
/// appended through [`Review::push_event`], which assigns the next seq.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub review_id: ReviewId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: EventPayload,
}

/// The Review aggregate root: status, child records, and the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub org_id: String,
    pub initiator: String,
    pub source_kind: SourceKind,
    pub target_ref: String,
    pub status: ReviewStatus,
    pub friendly_name: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub error_summary: Option<String>,
    pub files: Vec<FileChange>,
    pub comments: Vec<Comment>,
    pub events: Vec<ReviewEvent>,
    next_seq: u64,
}

impl Review {
    pub fn new(
        org_id: impl Into<String>,
        initiator: impl Into<String>,
        source_kind: SourceKind,
        target_ref: impl Into<String>,
        friendly_name: impl Into<String>,
        files: Vec<FileChange>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            initiator: initiator.into(),
            source_kind,
            target_ref: target_ref.into(),
            status: ReviewStatus::Queued,
            friendly_name: friendly_name.into(),
            created_at: Utc::now(),
            completed_at: None,
            summary: String::new(),
            error_summary: None,
            files,
            comments: Vec::new(),
            events: Vec::new(),
            next_seq: 0,
        }
    }

    /// Appends an event with a freshly assigned, dense `seq`.
    pub fn push_event(&mut self, kind: EventKind, payload: EventPayload) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(ReviewEvent {
            review_id: self.id,
            seq,
            timestamp: Utc::now(),
            kind,
            payload,
        });
        seq
    }

    /// Events with `seq > since_seq`, ascending (spec §4.1 `get_events`).
    pub fn events_since(&self, since_seq: u64, limit: usize) -> Vec<ReviewEvent> {
        self.events
            .iter()
            .filter(|e| e.seq > since_seq)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Attempts `status → next`, rejecting transitions spec §4.1 forbids.
    pub fn transition(&mut self, next: ReviewStatus) -> crate::errors::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::errors::Error::Conflict(format!(
                "invalid transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Rebuilds a Review from persisted rows. `next_seq` is derived by the
    /// caller (one past the highest stored event `seq`) since the field
    /// itself is private to this module.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ReviewId,
        org_id: String,
        initiator: String,
        source_kind: SourceKind,
        target_ref: String,
        status: ReviewStatus,
        friendly_name: String,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        summary: String,
        error_summary: Option<String>,
        files: Vec<FileChange>,
        comments: Vec<Comment>,
        events: Vec<ReviewEvent>,
        next_seq: u64,
    ) -> Self {
        Self {
            id,
            org_id,
            initiator,
            source_kind,
            target_ref,
            status,
            friendly_name,
            created_at,
            completed_at,
            summary,
            error_summary,
            files,
            comments,
            events,
            next_seq,
        }
    }

    /// Appends a comment unless an equal-key comment is already present
    /// (spec §4.1 step 2 dedup).
    pub fn add_comment_deduped(&mut self, comment: Comment) -> bool {
        let key = comment.dedup_key();
        if self.comments.iter().any(|c| c.dedup_key() == key) {
            return false;
        }
        self.comments.push(comment);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_review() -> Review {
        Review::new("org", "tester", SourceKind::Diff, "group/repo!1", "repo!1", Vec::new())
    }

    fn comment(review_id: ReviewId, path: &str, line: u32, body: &str) -> Comment {
        Comment {
            review_id,
            path: path.into(),
            line,
            side: CommentSide::New,
            severity: Severity::Info,
            category: "style".into(),
            body: body.into(),
            suggestions: Vec::new(),
            internal: false,
        }
    }

    #[test]
    fn event_seq_is_dense_and_ascending() {
        let mut review = new_review();
        let a = review.push_event(EventKind::Queued, serde_json::json!({}));
        let b = review.push_event(EventKind::BatchStarted, serde_json::json!({}));
        let c = review.push_event(EventKind::SummaryProduced, serde_json::json!({}));
        assert_eq!((a, b, c), (0, 1, 2));
        let since_a = review.events_since(a, 10);
        assert_eq!(since_a.len(), 2);
        assert!(since_a.iter().all(|e| e.seq > a));
    }

    #[test]
    fn events_since_respects_limit() {
        let mut review = new_review();
        for _ in 0..5 {
            review.push_event(EventKind::BatchCompleted, serde_json::json!({}));
        }
        assert_eq!(review.events_since(0, 2).len(), 2);
    }

    #[test]
    fn queued_can_go_in_progress_or_cancelled_only() {
        let mut review = new_review();
        assert!(review.status.can_transition_to(ReviewStatus::InProgress));
        assert!(review.status.can_transition_to(ReviewStatus::Cancelled));
        assert!(!review.status.can_transition_to(ReviewStatus::Completed));
        review.transition(ReviewStatus::InProgress).unwrap();
        assert_eq!(review.status, ReviewStatus::InProgress);
    }

    #[test]
    fn terminal_transition_sets_completed_at() {
        let mut review = new_review();
        review.transition(ReviewStatus::InProgress).unwrap();
        assert!(review.completed_at.is_none());
        review.transition(ReviewStatus::Completed).unwrap();
        assert!(review.completed_at.is_some());
        assert!(review.status.is_terminal());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut review = new_review();
        review.transition(ReviewStatus::InProgress).unwrap();
        review.transition(ReviewStatus::Completed).unwrap();
        assert!(review.transition(ReviewStatus::InProgress).is_err());
    }

    #[test]
    fn duplicate_comment_by_dedup_key_is_dropped() {
        let mut review = new_review();
        let c1 = comment(review.id, "src/lib.rs", 10, "consider renaming");
        let c2 = comment(review.id, "src/lib.rs", 10, "consider renaming");
        assert!(review.add_comment_deduped(c1));
        assert!(!review.add_comment_deduped(c2));
        assert_eq!(review.comments.len(), 1);
    }

    #[test]
    fn comment_differing_only_in_body_is_not_a_duplicate() {
        let mut review = new_review();
        let c1 = comment(review.id, "src/lib.rs", 10, "consider renaming");
        let c2 = comment(review.id, "src/lib.rs", 10, "add a test");
        assert!(review.add_comment_deduped(c1));
        assert!(review.add_comment_deduped(c2));
        assert_eq!(review.comments.len(), 2);
    }
}
