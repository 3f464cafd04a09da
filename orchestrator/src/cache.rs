//! File-based cache for large diffs (JSON on disk).
//!
//! Why cache?
//! - Large MRs consume provider API limits and take time to parse.
//! - Re-running ingestion on the same `head_sha` should be O(1).
//!
//! Key (stable across re-runs): SHA256("{provider}:{project}:{iid}:{head_sha}")
//! Layout: $LIVEREVIEW_CACHE_DIR/<provider>/<project_sanitized>/<iid>-<hash12>.json
//! Default cache dir: "code_data/diff_cache".

use std::path::{Path, PathBuf};

use provider_adapters::{ChangeRequestId, CrBundle, ProviderKind};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::errors::{Error, Result};

fn cache_root() -> PathBuf {
    std::env::var("LIVEREVIEW_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("code_data/diff_cache"))
}

fn sanitize(s: &str) -> String {
    s.replace('/', "_")
}

fn provider_dir(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::GitLab => "gitlab",
        ProviderKind::GitHub => "github",
        ProviderKind::Gitea => "gitea",
    }
}

fn key_path(kind: ProviderKind, id: &ChangeRequestId, head_sha: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}:{}:{}:{}", kind, id.project, id.iid, head_sha));
    let digest = format!("{:x}", hasher.finalize());
    cache_root()
        .join(provider_dir(kind))
        .join(sanitize(&id.project))
        .join(format!("{}-{}.json", id.iid, &digest[..12]))
}

/// Loads a cached bundle if present.
pub async fn load_bundle(
    kind: ProviderKind,
    id: &ChangeRequestId,
    head_sha: &str,
) -> Result<Option<CrBundle>> {
    let path = key_path(kind, id, head_sha);
    if !Path::new(&path).exists() {
        return Ok(None);
    }
    let data = fs::read(&path)
        .await
        .map_err(|e| Error::Internal(format!("cache read {}: {e}", path.display())))?;
    let bundle: CrBundle = serde_json::from_slice(&data)
        .map_err(|e| Error::Internal(format!("cache decode {}: {e}", path.display())))?;
    Ok(Some(bundle))
}

/// Stores a bundle if considered "large" (many files, big raw diff, or the
/// provider itself reported truncation).
pub async fn maybe_store_bundle(
    kind: ProviderKind,
    id: &ChangeRequestId,
    head_sha: &str,
    bundle: &CrBundle,
) -> Result<()> {
    let files = bundle.changes.files.len();
    let bytes: usize = bundle
        .changes
        .files
        .iter()
        .filter_map(|f| f.raw_unidiff.as_ref())
        .map(|s| s.len())
        .sum();
    let is_large = files > 200 || bytes > 5 * 1024 * 1024 || bundle.changes.is_truncated;
    if !is_large {
        return Ok(());
    }

    let path = key_path(kind, id, head_sha);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Internal(format!("cache mkdir {}: {e}", dir.display())))?;
    }
    let json =
        serde_json::to_vec(bundle).map_err(|e| Error::Internal(format!("cache encode: {e}")))?;
    fs::write(&path, json)
        .await
        .map_err(|e| Error::Internal(format!("cache write {}: {e}", path.display())))?;
    Ok(())
}
