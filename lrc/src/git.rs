//! Minimal git access needed by the CLI: locating the repo root, producing
//! diffs for each `diff_source`, and hashing the staged tree for
//! attestation (spec §6 "git-hook attestation file").

use std::io::Write;
use std::path::{Path, PathBuf};

use git2::{DiffOptions, Repository};

use crate::error::{Error, Result};

pub fn find_git_root() -> Result<PathBuf> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let path = repo.path().parent().unwrap_or_else(|| repo.path()).to_path_buf();
    Ok(path)
}

fn diff_to_string(diff: &git2::Diff) -> Result<String> {
    let mut out = Vec::new();
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            '+' | '-' | ' ' => {
                let _ = out.write_all(&[line.origin() as u8]);
            }
            _ => {}
        }
        let _ = out.write_all(line.content());
        true
    })?;
    Ok(String::from_utf8_lossy(&out).to_string())
}

pub fn staged_diff() -> Result<String> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let index = repo.index()?;
    let mut opts = DiffOptions::new();

    let diff = match repo.head() {
        Ok(head) => {
            let tree = head.peel_to_tree()?;
            repo.diff_tree_to_index(Some(&tree), Some(&index), Some(&mut opts))?
        }
        Err(_) => repo.diff_tree_to_index(None, Some(&index), Some(&mut opts))?,
    };

    let body = diff_to_string(&diff)?;
    if body.trim().is_empty() {
        return Err(Error::NoStagedChanges);
    }
    Ok(body)
}

pub fn working_diff() -> Result<String> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let mut opts = DiffOptions::new();
    let diff = repo.diff_index_to_workdir(None, Some(&mut opts))?;
    diff_to_string(&diff)
}

pub fn range_diff(range: &str) -> Result<String> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let (from, to) = range
        .split_once("..")
        .ok_or_else(|| Error::Git(git2::Error::from_str("expected FROM..TO")))?;

    let from_obj = repo.revparse_single(from)?.peel_to_tree()?;
    let to_obj = repo.revparse_single(to)?.peel_to_tree()?;
    let mut opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(Some(&from_obj), Some(&to_obj), Some(&mut opts))?;
    diff_to_string(&diff)
}

pub fn diff_file(path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

pub fn repo_name() -> Result<String> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let root = find_git_root()?;
    let name = repo
        .path()
        .parent()
        .and_then(Path::file_name)
        .or_else(|| root.file_name())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Ok(name)
}

/// Hex-encoded SHA-256 of the staged tree's OID, used as the attestation
/// key (spec §6's `{tree_hash, action, at}` document).
pub fn staged_tree_hash() -> Result<String> {
    let repo = Repository::discover(".").map_err(|_| Error::NotAGitRepo)?;
    let mut index = repo.index()?;
    let oid = index.write_tree()?;
    Ok(oid.to_string())
}
