//! Unified diff parsing shared by every provider adapter and by direct
//! diff-upload ingestion (spec §4.4, §4.7).

use crate::errors::{DiffParseError, Result};
use crate::git_providers::types::{DiffHunk, DiffLine, FileChange};

/// Heuristic to detect whether a unified diff text represents a binary patch.
pub fn looks_like_binary_patch(diff: &str) -> bool {
    if diff.contains("GIT binary patch") {
        return true;
    }
    if diff.contains("Binary files") || (diff.contains("Files ") && diff.contains(" differ")) {
        return true;
    }
    diff.bytes().any(|b| b == 0)
}

/// Rejects diffs whose paths try to escape the repository root (`../`) or
/// are absolute, per spec §4.7's "no path escapes the repo prefix" invariant.
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') || path.split('/').any(|seg| seg == "..") {
        return Err(DiffParseError::PathEscape(path.to_string()).into());
    }
    Ok(())
}

/// Parses a unified diff text into a list of hunks.
///
/// Understands `@@ -<old_start>,<old_lines> +<new_start>,<new_lines> @@`
/// headers and classifies following lines as added/removed/context. The
/// verbatim header is retained on each [`DiffHunk`] so that
/// `header + content` reproduces the input (spec §8 round-trip property).
pub fn parse_unified_diff_advanced(diff: &str) -> Result<Vec<DiffHunk>> {
    if diff.trim().is_empty() {
        return Err(DiffParseError::Empty.into());
    }

    let mut hunks: Vec<DiffHunk> = Vec::new();
    let mut current: Option<DiffHunk> = None;

    for line in diff.lines() {
        if line.starts_with("@@") {
            if let Some(h) = current.take() {
                hunks.push(h);
            }

            let header = parse_hunk_header(line)?;

            current = Some(DiffHunk {
                old_start: header.old_start,
                old_lines: header.old_lines,
                new_start: header.new_start,
                new_lines: header.new_lines,
                lines: Vec::new(),
                header: line.to_string(),
            });
        } else if let Some(hunk) = current.as_mut() {
            match line.chars().next() {
                Some('+') => {
                    let content = line[1..].to_string();
                    let new_line = next_new_line(hunk);
                    hunk.lines.push(DiffLine::Added { new_line, content });
                }
                Some('-') => {
                    let content = line[1..].to_string();
                    let old_line = next_old_line(hunk);
                    hunk.lines.push(DiffLine::Removed { old_line, content });
                }
                Some(' ') | None => {
                    let content = if line.is_empty() {
                        String::new()
                    } else {
                        line[1..].to_string()
                    };
                    let old_line = next_old_line(hunk);
                    let new_line = next_new_line(hunk);
                    hunk.lines.push(DiffLine::Context {
                        old_line,
                        new_line,
                        content,
                    });
                }
                _ => {
                    // Other file-level headers (diff --git, index, ---, +++) end the hunk.
                    let h = current.take().unwrap();
                    hunks.push(h);
                }
            }
        }
    }

    if let Some(h) = current {
        hunks.push(h);
    }

    Ok(hunks)
}

fn next_new_line(hunk: &DiffHunk) -> u32 {
    hunk.lines
        .iter()
        .filter_map(|l| match l {
            DiffLine::Added { new_line, .. } => Some(*new_line),
            DiffLine::Context { new_line, .. } => Some(*new_line),
            _ => None,
        })
        .max()
        .map(|n| n + 1)
        .unwrap_or(hunk.new_start)
}

fn next_old_line(hunk: &DiffHunk) -> u32 {
    hunk.lines
        .iter()
        .filter_map(|l| match l {
            DiffLine::Removed { old_line, .. } => Some(*old_line),
            DiffLine::Context { old_line, .. } => Some(*old_line),
            _ => None,
        })
        .max()
        .map(|n| n + 1)
        .unwrap_or(hunk.old_start)
}

struct HunkHeader {
    old_start: u32,
    old_lines: u32,
    new_start: u32,
    new_lines: u32,
}

fn parse_hunk_header(line: &str) -> Result<HunkHeader> {
    let rest = line.trim_start_matches("@@").trim();
    let rest = rest.split("@@").next().unwrap_or(rest).trim();
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(DiffParseError::InvalidHunkHeader(line.to_string()).into());
    }

    let old_part = parts[0]
        .strip_prefix('-')
        .ok_or_else(|| DiffParseError::InvalidHunkHeader(line.to_string()))?;
    let new_part = parts[1]
        .strip_prefix('+')
        .ok_or_else(|| DiffParseError::InvalidHunkHeader(line.to_string()))?;

    let (old_start, old_lines) = split_range(old_part, line)?;
    let (new_start, new_lines) = split_range(new_part, line)?;

    Ok(HunkHeader {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

/// Extracts `a/<path>`/`b/<path>` from a `diff --git a/x b/y` line.
fn parse_diff_git_paths(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;
    let a_idx = rest.find(" b/")?;
    let a = rest[..a_idx].strip_prefix("a/").unwrap_or(&rest[..a_idx]);
    let b = rest[a_idx + 3..].to_string();
    Some((a.to_string(), b))
}

/// Splits a multi-file unified diff (as produced by `git diff`) into one
/// [`FileChange`] per `diff --git` section, for direct diff-upload
/// ingestion (spec §4.7) where no provider has already done this framing.
pub fn split_unified_diff_to_files(diff: &str) -> Result<Vec<FileChange>> {
    if diff.trim().is_empty() {
        return Err(DiffParseError::Empty.into());
    }

    let mut files = Vec::new();
    let mut section: Option<(usize, (String, String))> = None;
    let lines: Vec<&str> = diff.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if let Some((a, b)) = parse_diff_git_paths(line) {
            if let Some((start, paths)) = section.take() {
                let body = lines[start..i].join("\n");
                files.push(build_file_change(&paths.0, &paths.1, &body)?);
            }
            section = Some((i, (a, b)));
        }
    }
    if let Some((start, paths)) = section {
        let body = lines[start..lines.len()].join("\n");
        files.push(build_file_change(&paths.0, &paths.1, &body)?);
    }

    Ok(files)
}

fn build_file_change(old_path: &str, new_path: &str, section: &str) -> Result<FileChange> {
    validate_path(old_path)?;
    validate_path(new_path)?;

    let is_deleted = section.lines().any(|l| l.starts_with("+++ /dev/null"));
    let is_new = section.lines().any(|l| l.starts_with("--- /dev/null"));
    let is_renamed = old_path != new_path && !is_new && !is_deleted;
    let is_binary = looks_like_binary_patch(section);

    let hunks = if is_binary {
        Vec::new()
    } else {
        // Hunk parsing starts at the first `@@`; everything before it is
        // `diff --git`/`index`/`---`/`+++` framing the caller already has
        // in `section` for `raw_unidiff`.
        let hunk_start = section.find("\n@@").map(|i| i + 1).unwrap_or(section.len());
        if hunk_start >= section.len() {
            Vec::new()
        } else {
            parse_unified_diff_advanced(&section[hunk_start..])?
        }
    };

    Ok(FileChange {
        old_path: (!is_new).then(|| old_path.to_string()),
        new_path: (!is_deleted).then(|| new_path.to_string()),
        is_new,
        is_deleted,
        is_renamed,
        is_binary,
        hunks,
        raw_unidiff: Some(section.to_string()),
    })
}

fn split_range(s: &str, original: &str) -> Result<(u32, u32)> {
    let mut it = s.split(',');
    let start = it
        .next()
        .ok_or_else(|| DiffParseError::InvalidHunkHeader(original.to_string()))?;
    let len = it.next().unwrap_or("1");

    let start: u32 = start
        .parse()
        .map_err(|_| DiffParseError::InvalidHunkHeader(original.to_string()))?;
    let len: u32 = len
        .parse()
        .map_err(|_| DiffParseError::InvalidHunkHeader(original.to_string()))?;

    Ok((start, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_reports_new_side_lines() {
        let diff = "@@ -10,2 +10,3 @@ fn foo()\n context\n+added one\n+added two\n";
        let hunks = parse_unified_diff_advanced(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!(h.header, "@@ -10,2 +10,3 @@ fn foo()");

        let added: Vec<u32> = h
            .lines
            .iter()
            .filter_map(|l| match l {
                DiffLine::Added { new_line, .. } => Some(*new_line),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![11, 12]);
    }

    #[test]
    fn rejects_empty_diff() {
        assert!(parse_unified_diff_advanced("").is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(parse_unified_diff_advanced("@@ nonsense @@\n+x\n").is_err());
    }

    #[test]
    fn rejects_path_escape() {
        assert!(validate_path("../secrets").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("src/lib.rs").is_ok());
    }

    #[test]
    fn splits_a_multi_file_diff_into_one_file_change_each() {
        let diff = "diff --git a/src/a.rs b/src/a.rs\n\
                     index 111..222 100644\n\
                     --- a/src/a.rs\n\
                     +++ b/src/a.rs\n\
                     @@ -1,1 +1,2 @@\n\
                      fn a() {}\n\
                     +fn a2() {}\n\
                     diff --git a/src/b.rs b/src/b.rs\n\
                     index 333..444 100644\n\
                     --- a/src/b.rs\n\
                     +++ b/src/b.rs\n\
                     @@ -1,1 +1,1 @@\n\
                     -fn b() {}\n\
                     +fn b2() {}\n";
        let files = split_unified_diff_to_files(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].display_path(), "src/a.rs");
        assert_eq!(files[1].display_path(), "src/b.rs");
        assert_eq!(files[1].hunks.len(), 1);
    }

    #[test]
    fn detects_new_file_from_dev_null_source() {
        let diff = "diff --git a/new.rs b/new.rs\n\
                     new file mode 100644\n\
                     --- /dev/null\n\
                     +++ b/new.rs\n\
                     @@ -0,0 +1,1 @@\n\
                     +fn new_fn() {}\n";
        let files = split_unified_diff_to_files(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_new);
        assert!(!files[0].is_deleted);
    }
}
