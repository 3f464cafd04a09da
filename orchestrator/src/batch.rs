//! Batch processor: token-aware packing, bounded worker pool, deterministic
//! merge, and retry/classification (spec §4.2).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use provider_adapters::{DiffHunk, DiffLine, FileChange};
use serde::Deserialize;
use tokio::sync::{Mutex, Notify, Semaphore, mpsc};
use tracing::{debug, warn};

use crate::errors::BatchErrorKind;
use crate::review::{Comment, CommentSide, Severity};

/// Minimum context-line overlap kept between two halves of a split hunk
/// (spec §4.2 "small overlap (≥3 context lines)").
const MIN_OVERLAP_LINES: usize = 3;

/// Cooperative cancellation signal shared between the orchestrator and the
/// workers it spawns (spec §5 "Cancellation").
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A slice of one file's hunks destined for a single batch. Line numbers in
/// `hunks` are the original absolute `old_line`/`new_line`s from the parsed
/// diff, so no remapping is needed when a file is split across batches —
/// only the grouping into units changes (spec §4.2 "remapped to the
/// original file path").
#[derive(Debug, Clone)]
pub struct PackedUnit {
    pub path: String,
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub index: usize,
    pub units: Vec<PackedUnit>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_batch_tokens: usize,
    /// Fixed overhead charged per file beyond its rendered diff (message
    /// framing, path header, …).
    pub per_file_overhead: usize,
    /// Tokens charged once per batch for the shared prompt prefix.
    pub prompt_prefix_tokens: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_batch_tokens: 6000,
            per_file_overhead: 32,
            prompt_prefix_tokens: 200,
        }
    }
}

/// Coarse token estimate (~4 bytes/token), the same heuristic ratio widely
/// used for English-ish source text without a tokenizer dependency.
fn estimate_tokens(s: &str) -> usize {
    (s.len() + 3) / 4
}

fn render_line(line: &DiffLine) -> String {
    match line {
        DiffLine::Added { content, .. } => format!("+{content}"),
        DiffLine::Removed { content, .. } => format!("-{content}"),
        DiffLine::Context { content, .. } => format!(" {content}"),
    }
}

fn render_hunk(h: &DiffHunk) -> String {
    let mut out = String::with_capacity(h.header.len() + h.lines.len() * 40);
    out.push_str(&h.header);
    out.push('\n');
    for l in &h.lines {
        out.push_str(&render_line(l));
        out.push('\n');
    }
    out
}

fn render_unit(path: &str, hunks: &[DiffHunk]) -> String {
    let mut out = format!("--- {path}\n");
    for h in hunks {
        out.push_str(&render_hunk(h));
    }
    out
}

fn unit_tokens(path: &str, hunks: &[DiffHunk], budget: &TokenBudget) -> usize {
    estimate_tokens(&render_unit(path, hunks)) + budget.per_file_overhead
}

/// Splits a single oversize hunk along line boundaries, keeping at least
/// [`MIN_OVERLAP_LINES`] trailing lines of one chunk as the leading lines of
/// the next so the model retains continuity across the cut.
fn split_hunk_by_lines(h: &DiffHunk, budget: &TokenBudget) -> Vec<DiffHunk> {
    let max_lines_per_chunk = {
        let avg_line_tokens = estimate_tokens(&h.lines.iter().map(render_line).collect::<String>())
            .max(1)
            / h.lines.len().max(1);
        (budget.max_batch_tokens / avg_line_tokens.max(1)).max(MIN_OVERLAP_LINES + 1)
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < h.lines.len() {
        let end = (start + max_lines_per_chunk).min(h.lines.len());
        let slice = &h.lines[start..end];
        let old_start = slice
            .iter()
            .find_map(|l| match l {
                DiffLine::Removed { old_line, .. } | DiffLine::Context { old_line, .. } => {
                    Some(*old_line)
                }
                DiffLine::Added { .. } => None,
            })
            .unwrap_or(h.old_start);
        let new_start = slice
            .iter()
            .find_map(|l| match l {
                DiffLine::Added { new_line, .. } | DiffLine::Context { new_line, .. } => {
                    Some(*new_line)
                }
                DiffLine::Removed { .. } => None,
            })
            .unwrap_or(h.new_start);
        let old_count = slice
            .iter()
            .filter(|l| matches!(l, DiffLine::Removed { .. } | DiffLine::Context { .. }))
            .count() as u32;
        let new_count = slice
            .iter()
            .filter(|l| matches!(l, DiffLine::Added { .. } | DiffLine::Context { .. }))
            .count() as u32;
        chunks.push(DiffHunk {
            old_start,
            old_lines: old_count,
            new_start,
            new_lines: new_count,
            lines: slice.to_vec(),
            header: format!("@@ -{old_start},{old_count} +{new_start},{new_count} @@"),
        });
        if end == h.lines.len() {
            break;
        }
        start = end.saturating_sub(MIN_OVERLAP_LINES);
    }
    chunks
}

/// Packs files into token-bounded batches using greedy first-fit, splitting
/// along hunk then line boundaries when a single file or hunk exceeds the
/// budget (spec §4.2 "Packing algorithm").
pub fn pack_files(files: &[FileChange], budget: TokenBudget) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = budget.prompt_prefix_tokens;

    let mut push_unit = |unit: PackedUnit,
                          tokens: usize,
                          current: &mut Vec<PackedUnit>,
                          current_tokens: &mut usize,
                          batches: &mut Vec<Batch>| {
        if !current.is_empty() && *current_tokens + tokens > budget.max_batch_tokens {
            batches.push(Batch {
                index: batches.len(),
                units: std::mem::take(current),
            });
            *current_tokens = budget.prompt_prefix_tokens;
        }
        *current_tokens += tokens;
        current.push(unit);
    };

    for file in files {
        let path = file.display_path().to_string();
        let whole_tokens = unit_tokens(&path, &file.hunks, &budget);

        if whole_tokens <= budget.max_batch_tokens {
            push_unit(
                PackedUnit {
                    path,
                    hunks: file.hunks.clone(),
                },
                whole_tokens,
                &mut current,
                &mut current_tokens,
                &mut batches,
            );
            continue;
        }

        debug!(path = %path, tokens = whole_tokens, "batch: file exceeds budget, splitting by hunk");
        for hunk in &file.hunks {
            let hunk_tokens = unit_tokens(&path, std::slice::from_ref(hunk), &budget);
            if hunk_tokens <= budget.max_batch_tokens {
                push_unit(
                    PackedUnit {
                        path: path.clone(),
                        hunks: vec![hunk.clone()],
                    },
                    hunk_tokens,
                    &mut current,
                    &mut current_tokens,
                    &mut batches,
                );
                continue;
            }

            debug!(path = %path, "batch: hunk exceeds budget, splitting by line");
            for sub in split_hunk_by_lines(hunk, &budget) {
                let sub_tokens = unit_tokens(&path, std::slice::from_ref(&sub), &budget);
                push_unit(
                    PackedUnit {
                        path: path.clone(),
                        hunks: vec![sub],
                    },
                    sub_tokens,
                    &mut current,
                    &mut current_tokens,
                    &mut batches,
                );
            }
        }
    }

    if !current.is_empty() {
        batches.push(Batch {
            index: batches.len(),
            units: current,
        });
    }
    batches
}

#[derive(Debug, Deserialize)]
struct LlmComment {
    path: String,
    line: u32,
    side: String,
    severity: String,
    category: String,
    body: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    internal: bool,
}

#[derive(Debug, Deserialize)]
struct LlmFileSummary {
    path: String,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct LlmBatchResponse {
    #[serde(default)]
    comments: Vec<LlmComment>,
    #[serde(default)]
    file_summaries: Vec<LlmFileSummary>,
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub path: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub path: Option<String>,
    pub message: String,
    pub kind: BatchErrorKind,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub index: usize,
    pub comments: Vec<Comment>,
    pub file_summaries: Vec<FileSummary>,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the batch's failure must fail the whole Review (spec §4.2
    /// `InvariantViolation`), not merely this batch.
    pub fatal: bool,
}

fn parse_side(s: &str) -> CommentSide {
    if s.eq_ignore_ascii_case("old") {
        CommentSide::Old
    } else {
        CommentSide::New
    }
}

fn parse_severity(s: &str) -> Severity {
    match s.to_ascii_lowercase().as_str() {
        "critical" => Severity::Critical,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

/// The set of `(path, line)` pairs a comment is allowed to anchor to: every
/// changed or context line across a unit's hunks (spec §8 "Comment line
/// validity").
fn known_lines(units: &[PackedUnit]) -> std::collections::HashSet<(String, u32)> {
    let mut set = std::collections::HashSet::new();
    for unit in units {
        for h in &unit.hunks {
            for l in &h.lines {
                match l {
                    DiffLine::Added { new_line, .. } => {
                        set.insert((unit.path.clone(), *new_line));
                    }
                    DiffLine::Removed { old_line, .. } => {
                        set.insert((unit.path.clone(), *old_line));
                    }
                    DiffLine::Context {
                        old_line, new_line, ..
                    } => {
                        set.insert((unit.path.clone(), *old_line));
                        set.insert((unit.path.clone(), *new_line));
                    }
                }
            }
        }
    }
    set
}

/// Validates raw LLM comments against the batch's known lines, splitting
/// them into comments safe to persist and invariant-violating ones.
fn validate_and_build_comments(
    review_id: crate::review::ReviewId,
    raw: Vec<LlmComment>,
    units: &[PackedUnit],
) -> (Vec<Comment>, Vec<Diagnostic>) {
    let known = known_lines(units);
    let mut comments = Vec::new();
    let mut diagnostics = Vec::new();
    for c in raw {
        if !known.contains(&(c.path.clone(), c.line)) {
            diagnostics.push(Diagnostic {
                path: Some(c.path.clone()),
                message: format!("comment at {}:{} is outside known diff lines", c.path, c.line),
                kind: BatchErrorKind::InvariantViolation,
            });
            continue;
        }
        comments.push(Comment {
            review_id,
            path: c.path,
            line: c.line,
            side: parse_side(&c.side),
            severity: parse_severity(&c.severity),
            category: c.category,
            body: c.body,
            suggestions: c.suggestions,
            internal: c.internal,
        });
    }
    (comments, diagnostics)
}

fn build_prompt(system_prompt: &str, units: &[PackedUnit], reinforced: bool) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt);
    if reinforced {
        prompt.push_str(
            "\n\nReturn ONLY a single JSON object matching the schema. \
             No prose, no markdown fences, no trailing text.",
        );
    }
    prompt.push_str("\n\n# Diff\n");
    for unit in units {
        prompt.push_str(&render_unit(&unit.path, &unit.hunks));
    }
    prompt
}

/// Runs one batch against the fast LLM profile, retrying transient failures
/// up to `retry_cap` and a malformed response exactly once with a reinforced
/// instruction (spec §4.1 failure semantics, §4.2 retry classification).
pub async fn run_one_batch(
    review_id: crate::review::ReviewId,
    batch: Batch,
    system_prompt: &str,
    profiles: &llm_client::LlmServiceProfiles,
    retry_cap: u32,
    cancel: &CancelToken,
) -> BatchResult {
    let mut attempt = 0u32;
    let mut reinforced = false;

    loop {
        if cancel.is_cancelled() {
            return BatchResult {
                index: batch.index,
                diagnostics: vec![Diagnostic {
                    path: None,
                    message: "cancelled".into(),
                    kind: BatchErrorKind::Transient,
                }],
                ..Default::default()
            };
        }

        let prompt = build_prompt(system_prompt, &batch.units, reinforced);
        match profiles.generate_fast(&prompt, None).await {
            Ok(raw) => match serde_json::from_str::<LlmBatchResponse>(&raw) {
                Ok(parsed) => {
                    let (comments, mut diagnostics) =
                        validate_and_build_comments(review_id, parsed.comments, &batch.units);
                    let fatal = diagnostics
                        .iter()
                        .any(|d| d.kind == BatchErrorKind::InvariantViolation);
                    let file_summaries = parsed
                        .file_summaries
                        .into_iter()
                        .map(|s| FileSummary {
                            path: s.path,
                            summary: s.summary,
                        })
                        .collect();
                    diagnostics.sort_by(|a, b| a.path.cmp(&b.path));
                    return BatchResult {
                        index: batch.index,
                        comments,
                        file_summaries,
                        diagnostics,
                        fatal,
                    };
                }
                Err(e) => {
                    if !reinforced {
                        warn!(batch = batch.index, error = %e, "batch: parse error, retrying once with reinforced instruction");
                        reinforced = true;
                        continue;
                    }
                    return BatchResult {
                        index: batch.index,
                        diagnostics: vec![Diagnostic {
                            path: None,
                            message: format!("parse error after reinforced retry: {e}"),
                            kind: BatchErrorKind::ParseError,
                        }],
                        ..Default::default()
                    };
                }
            },
            Err(e) => {
                let kind = BatchErrorKind::classify(&e);
                if kind == BatchErrorKind::Transient && attempt < retry_cap {
                    attempt += 1;
                    let backoff = std::time::Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(batch = batch.index, attempt, error = %e, "batch: transient error, retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                return BatchResult {
                    index: batch.index,
                    diagnostics: vec![Diagnostic {
                        path: None,
                        message: e.to_string(),
                        kind,
                    }],
                    fatal: kind == BatchErrorKind::Fatal,
                    ..Default::default()
                };
            }
        }
    }
}

/// Drives all batches through a bounded worker pool of size `workers`,
/// honouring `cancel`, and returns results ordered by batch index regardless
/// of completion order (spec §4.2 "merger preserves deterministic
/// ordering", spec §8 "Batch determinism").
pub async fn run_batches(
    review_id: crate::review::ReviewId,
    batches: Vec<Batch>,
    system_prompt: String,
    profiles: Arc<llm_client::LlmServiceProfiles>,
    workers: usize,
    retry_cap: u32,
    cancel: CancelToken,
) -> Vec<BatchResult> {
    let total = batches.len();
    let slots = Arc::new(Semaphore::new(workers.max(1)));
    // Bounded FIFO of pending work; capacity 2W gives producers backpressure
    // (spec §4.2 "queue depth is bounded to 2W").
    let (tx, rx) = mpsc::channel::<Batch>(2 * workers.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let producer_cancel = cancel.clone();
    let producer = tokio::spawn(async move {
        for batch in batches {
            if producer_cancel.is_cancelled() {
                break;
            }
            if tx.send(batch).await.is_err() {
                break;
            }
        }
    });

    let results = Arc::new(Mutex::new(vec![None; total]));
    let mut handles = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let rx = rx.clone();
        let results = results.clone();
        let slots = slots.clone();
        let cancel = cancel.clone();
        let profiles = profiles.clone();
        let system_prompt = system_prompt.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let batch = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(batch) = batch else { break };
                let _permit = slots.acquire().await.expect("semaphore not closed");
                let index = batch.index;
                let result =
                    run_one_batch(review_id, batch, &system_prompt, &profiles, retry_cap, &cancel)
                        .await;
                results.lock().await[index] = Some(result);
            }
        }));
    }

    let _ = producer.await;
    for h in handles {
        let _ = h.await;
    }

    let collected = results.lock().await.clone();
    collected
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            r.unwrap_or_else(|| BatchResult {
                index: i,
                diagnostics: vec![Diagnostic {
                    path: None,
                    message: "batch dropped before completion".into(),
                    kind: BatchErrorKind::Transient,
                }],
                ..Default::default()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_adapters::FileChange;

    fn added_line(new_line: u32, content: &str) -> DiffLine {
        DiffLine::Added { new_line, content: content.into() }
    }

    fn context_line(old_line: u32, new_line: u32, content: &str) -> DiffLine {
        DiffLine::Context { old_line, new_line, content: content.into() }
    }

    fn hunk(old_start: u32, new_start: u32, lines: Vec<DiffLine>) -> DiffHunk {
        let old_lines = lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Removed { .. } | DiffLine::Context { .. }))
            .count() as u32;
        let new_lines = lines
            .iter()
            .filter(|l| matches!(l, DiffLine::Added { .. } | DiffLine::Context { .. }))
            .count() as u32;
        DiffHunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            header: format!("@@ -{old_start},{old_lines} +{new_start},{new_lines} @@"),
            lines,
        }
    }

    fn file(path: &str, hunks: Vec<DiffHunk>) -> FileChange {
        FileChange {
            old_path: Some(path.into()),
            new_path: Some(path.into()),
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            is_binary: false,
            hunks,
            raw_unidiff: None,
        }
    }

    #[test]
    fn pack_files_keeps_small_files_in_one_batch() {
        let files = vec![
            file("a.rs", vec![hunk(1, 1, vec![added_line(1, "fn a() {}")])]),
            file("b.rs", vec![hunk(1, 1, vec![added_line(1, "fn b() {}")])]),
        ];
        let batches = pack_files(&files, TokenBudget::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].units.len(), 2);
        assert_eq!(batches[0].index, 0);
    }

    #[test]
    fn pack_files_splits_when_budget_is_small() {
        let files = vec![
            file("a.rs", vec![hunk(1, 1, vec![added_line(1, "fn a() {}")])]),
            file("b.rs", vec![hunk(1, 1, vec![added_line(1, "fn b() {}")])]),
        ];
        let tiny_budget = TokenBudget {
            max_batch_tokens: 20,
            per_file_overhead: 5,
            prompt_prefix_tokens: 5,
        };
        let batches = pack_files(&files, tiny_budget);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].index, 0);
        assert_eq!(batches[1].index, 1);
    }

    #[test]
    fn pack_files_is_deterministic() {
        let files = vec![
            file("a.rs", vec![hunk(1, 1, vec![added_line(1, "one")])]),
            file("b.rs", vec![hunk(1, 1, vec![added_line(1, "two")])]),
            file("c.rs", vec![hunk(1, 1, vec![added_line(1, "three")])]),
        ];
        let budget = TokenBudget::default();
        let first = pack_files(&files, budget);
        let second = pack_files(&files, budget);
        let paths = |batches: &[Batch]| {
            batches
                .iter()
                .flat_map(|b| b.units.iter().map(|u| u.path.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(paths(&first), paths(&second));
    }

    #[test]
    fn comment_on_known_line_is_accepted() {
        let review_id = crate::review::ReviewId::new_v4();
        let units = vec![PackedUnit {
            path: "a.rs".into(),
            hunks: vec![hunk(1, 1, vec![context_line(1, 1, "fn a() {}"), added_line(2, "let x = 1;")])],
        }];
        let raw = vec![LlmComment {
            path: "a.rs".into(),
            line: 2,
            side: "new".into(),
            severity: "warning".into(),
            category: "style".into(),
            body: "unused variable".into(),
            suggestions: Vec::new(),
            internal: false,
        }];
        let (comments, diagnostics) = validate_and_build_comments(review_id, raw, &units);
        assert_eq!(comments.len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn comment_outside_known_lines_is_an_invariant_violation() {
        let review_id = crate::review::ReviewId::new_v4();
        let units = vec![PackedUnit {
            path: "a.rs".into(),
            hunks: vec![hunk(1, 1, vec![added_line(2, "let x = 1;")])],
        }];
        let raw = vec![LlmComment {
            path: "a.rs".into(),
            line: 99,
            side: "new".into(),
            severity: "info".into(),
            category: "style".into(),
            body: "hallucinated line".into(),
            suggestions: Vec::new(),
            internal: false,
        }];
        let (comments, diagnostics) = validate_and_build_comments(review_id, raw, &units);
        assert!(comments.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, BatchErrorKind::InvariantViolation);
    }

    #[tokio::test]
    async fn run_batches_returns_results_in_index_order_even_when_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let batches = vec![
            Batch { index: 0, units: vec![] },
            Batch { index: 1, units: vec![] },
            Batch { index: 2, units: vec![] },
        ];
        let cfg = llm_client::LlmModelConfig {
            provider: llm_client::LlmProvider::Ollama,
            model: "test".into(),
            endpoint: "http://127.0.0.1:1".into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(1),
        };
        let profiles = Arc::new(llm_client::LlmServiceProfiles::new(cfg.clone(), Some(cfg), None).unwrap());
        let results = run_batches(
            crate::review::ReviewId::new_v4(),
            batches,
            "system".into(),
            profiles,
            2,
            0,
            cancel,
        )
        .await;
        assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
