//! Attestation file read/write: `.git/lrc/attestations/<tree_hash>.json`
//! (spec §6). CI invocations of the hook refuse to commit without one
//! recorded for the staged tree hash.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Reviewed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub tree_hash: String,
    pub action: Action,
    pub at: chrono::DateTime<chrono::Utc>,
}

fn attestation_path(git_root: &std::path::Path, tree_hash: &str) -> PathBuf {
    git_root.join(".git").join("lrc").join("attestations").join(format!("{tree_hash}.json"))
}

pub fn record(git_root: &std::path::Path, tree_hash: &str, action: Action) -> Result<()> {
    let path = attestation_path(git_root, tree_hash);
    std::fs::create_dir_all(path.parent().expect("attestation path has a parent"))?;
    let doc = Attestation { tree_hash: tree_hash.to_string(), action, at: chrono::Utc::now() };
    std::fs::write(path, serde_json::to_vec_pretty(&doc)?)?;
    Ok(())
}

pub fn exists(git_root: &std::path::Path, tree_hash: &str) -> bool {
    attestation_path(git_root, tree_hash).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_finds_an_attestation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!exists(dir.path(), "abc123"));
        record(dir.path(), "abc123", Action::Reviewed).unwrap();
        assert!(exists(dir.path(), "abc123"));
    }
}
