//! Comment poster: step 5 of the pipeline, dispatching non-internal Comments
//! through a provider adapter and recording per-attempt events (spec §4.1
//! step 4, §5 ordering guarantees).

use provider_adapters::{
    ChangeRequest, CommentLineKind, CommentLocation, CommentSide as ProviderSide,
    InlineCommentDraft, ProviderClient,
};
use serde_json::json;
use tracing::info;

use crate::review::{Comment, CommentSide, Review};

#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// If true, compute what would be posted but make no network calls.
    pub dry_run: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dry_run: env_bool("LIVEREVIEW_PUBLISH_DRY_RUN", false),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn to_draft(meta: &ChangeRequest, comment: &Comment) -> InlineCommentDraft {
    let side = match comment.side {
        CommentSide::New => ProviderSide::Right,
        CommentSide::Old => ProviderSide::Left,
    };
    let line_kind = match comment.side {
        CommentSide::New => CommentLineKind::Added,
        CommentSide::Old => CommentLineKind::Removed,
    };
    InlineCommentDraft {
        location: CommentLocation {
            file_path: comment.path.clone(),
            line: comment.line,
            line_kind,
            side,
            diff_refs: meta.diff_refs.clone(),
        },
        body: comment.body.clone(),
        fallback_body: Some(format!(
            "**{}** ({:?}) — {}\n\n{}",
            comment.category, comment.severity, comment.path, comment.body
        )),
    }
}

/// Posts every non-internal comment on `review`, in ascending line order
/// within a file and file order as they appear on the Review (spec §5
/// "Comments within a file are posted in ascending line order; across files
/// in input order"). Emits `post_started`/`post_completed`/`post_failed`
/// events on the Review for each attempt.
///
/// A single comment's post failure does not stop the rest, matching the
/// provider adapter's own `post_inline_comments` semantics (404 falls back
/// to a general comment where supported, 422 is logged and dropped).
pub async fn publish_comments(
    client: &ProviderClient,
    meta: &ChangeRequest,
    review: &mut Review,
    cfg: &PublishConfig,
) {
    let mut ordered: Vec<&Comment> = review.comments.iter().filter(|c| !c.internal).collect();
    ordered.sort_by(|a, b| (a.path.clone(), a.line).cmp(&(b.path.clone(), b.line)));
    let drafts: Vec<(Comment, InlineCommentDraft)> = ordered
        .into_iter()
        .map(|c| (c.clone(), to_draft(meta, c)))
        .collect();

    info!(
        review_id = %review.id,
        count = drafts.len(),
        dry_run = cfg.dry_run,
        "publish: posting comments"
    );

    for (comment, draft) in drafts {
        review.push_event(
            crate::review::EventKind::PostStarted,
            json!({ "path": comment.path, "line": comment.line }),
        );

        if cfg.dry_run {
            review.push_event(
                crate::review::EventKind::PostCompleted,
                json!({ "path": comment.path, "line": comment.line, "dry_run": true }),
            );
            continue;
        }

        match client.post_inline_comments(meta, std::slice::from_ref(&draft)).await {
            Ok(()) => {
                review.push_event(
                    crate::review::EventKind::PostCompleted,
                    json!({ "path": comment.path, "line": comment.line }),
                );
            }
            Err(e) => {
                review.push_event(
                    crate::review::EventKind::PostFailed,
                    json!({ "path": comment.path, "line": comment.line, "error": e.to_string() }),
                );
            }
        }
    }
}
