//! Bridges `persistence`'s flat `prompt_chunks`/`application_contexts`
//! tables to `prompt-manager`'s [`ChunkResolver`] shape. The two schemas
//! don't line up field-for-field — `persistence` stores one row per
//! `(org_id, name)` with no `app_ctx`/`prompt_key`/`sequence_index`
//! columns, and `application_contexts` keys on a single `match_pattern`
//! string rather than three separate nullable columns — so this adapter
//! packs/unpacks the extra structure into the existing `name` and
//! `match_pattern` text columns rather than adding columns only this
//! crate would read.

use persistence::{application_contexts, prompt_chunks, PooledConn, SqlitePool};
use prompt_manager::chunk_source::{ChunkBody, ChunkResolver};
use prompt_manager::context::ApplicationContext;
use prompt_manager::error::{Error, Result};

/// Joins the `(app_ctx, prompt_key, name, sequence_index)` tuple into the
/// single `name` column `prompt_chunks` actually has, e.g.
/// `"default::review.system::tone::0000"`.
fn encode_chunk_name(app_ctx: &str, prompt_key: &str, name: &str, seq: i32) -> String {
    format!("{app_ctx}::{prompt_key}::{name}::{seq:04}")
}

/// Splits a row's encoded `name` back into `(prefix, sequence_index)`
/// where `prefix` is everything before the trailing `::NNNN`.
fn decode_chunk_name(encoded: &str) -> Option<(&str, i32)> {
    let (prefix, seq_str) = encoded.rsplit_once("::")?;
    let seq = seq_str.parse().ok()?;
    Some((prefix, seq))
}

const WILDCARD: &str = "*";

fn encode_match_pattern(ctx: &ApplicationContext) -> String {
    format!(
        "{}/{}/{}",
        ctx.ai_connector.as_deref().unwrap_or(WILDCARD),
        ctx.integration_token.as_deref().unwrap_or(WILDCARD),
        ctx.repository.as_deref().unwrap_or(WILDCARD),
    )
}

fn decode_match_pattern(id: String, org_id: String, pattern: &str) -> Option<ApplicationContext> {
    let mut parts = pattern.splitn(3, '/');
    let ai_connector = parts.next()?;
    let integration_token = parts.next()?;
    let repository = parts.next()?;
    let opt = |s: &str| (s != WILDCARD).then(|| s.to_string());
    Some(ApplicationContext {
        id,
        org_id,
        ai_connector: opt(ai_connector),
        integration_token: opt(integration_token),
        repository: opt(repository),
    })
}

#[derive(Clone)]
pub struct PersistenceChunkResolver {
    pool: SqlitePool,
}

impl PersistenceChunkResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConn> {
        self.pool.get().map_err(|e| Error::ChunkSource(format!("db pool: {e}")))
    }

    /// Persists one chunk body at `sequence_index` under the encoded key,
    /// used by the chunk-management surface (not part of `ChunkResolver`
    /// itself, which is read-only).
    pub fn put_chunk(
        &self,
        org_id: &str,
        app_ctx: &str,
        prompt_key: &str,
        name: &str,
        sequence_index: i32,
        body: &str,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let encoded = encode_chunk_name(app_ctx, prompt_key, name, sequence_index);
        let id = uuid::Uuid::new_v4().to_string();
        prompt_chunks::upsert(&mut conn, &id, org_id, &encoded, body, &chrono::Utc::now().to_rfc3339())
            .map_err(|e| Error::ChunkSource(e.to_string()))
    }

    /// Renumbers the `sequence_index` of an existing set of chunks under
    /// one `(org_id, app_ctx, prompt_key, name)` key, e.g. after a user
    /// drags a chunk to a new position in the ordering UI. `ordered_ids`
    /// lists the chunks' ids in their new desired order.
    pub fn reorder_chunks(
        &self,
        org_id: &str,
        app_ctx: &str,
        prompt_key: &str,
        name: &str,
        ordered_ids: &[String],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let rows = prompt_chunks::list(&mut conn, org_id).map_err(|e| Error::ChunkSource(e.to_string()))?;
        let prefix = format!("{app_ctx}::{prompt_key}::{name}::");
        let current: std::collections::HashMap<&str, &str> = rows
            .iter()
            .filter(|r| r.name.starts_with(&prefix))
            .map(|r| (r.id.as_str(), r.name.as_str()))
            .collect();

        let renames: Vec<(String, String)> = ordered_ids
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| {
                let old_name = *current.get(id.as_str())?;
                Some((old_name.to_string(), encode_chunk_name(app_ctx, prompt_key, name, seq as i32)))
            })
            .collect();

        if renames.len() != ordered_ids.len() {
            return Err(Error::ChunkSource(format!(
                "reorder_chunks: {} of {} ids not found under {prefix}",
                ordered_ids.len() - renames.len(),
                ordered_ids.len()
            )));
        }

        prompt_chunks::reorder(&mut conn, org_id, &renames).map_err(|e| Error::ChunkSource(e.to_string()))
    }

    pub fn put_application_context(&self, ctx: &ApplicationContext) -> Result<()> {
        let mut conn = self.conn()?;
        let pattern = encode_match_pattern(ctx);
        let specificity = [&ctx.ai_connector, &ctx.integration_token, &ctx.repository]
            .iter()
            .filter(|f| f.is_some())
            .count() as i32;
        application_contexts::insert(&mut conn, &ctx.id, &ctx.org_id, &pattern, specificity, "", "{}")
            .map_err(|e| Error::ChunkSource(e.to_string()))
    }
}

impl ChunkResolver for PersistenceChunkResolver {
    async fn chunks(
        &self,
        org_id: &str,
        app_ctx: &str,
        prompt_key: &str,
        name: &str,
    ) -> Result<Vec<ChunkBody>> {
        let pool = self.pool.clone();
        let org_id = org_id.to_string();
        let prefix = format!("{app_ctx}::{prompt_key}::{name}::");
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| Error::ChunkSource(format!("db pool: {e}")))?;
            let rows = prompt_chunks::list(&mut conn, &org_id)
                .map_err(|e| Error::ChunkSource(e.to_string()))?;
            let mut bodies: Vec<ChunkBody> = rows
                .into_iter()
                .filter(|r| r.name.starts_with(&prefix))
                .filter_map(|r| {
                    let (_, seq) = decode_chunk_name(&r.name)?;
                    Some(ChunkBody { id: r.id, sequence_index: seq, body: r.body })
                })
                .collect();
            bodies.sort_by(|a, b| a.sequence_index.cmp(&b.sequence_index).then(a.id.cmp(&b.id)));
            Ok(bodies)
        })
        .await
        .map_err(|e| Error::ChunkSource(format!("blocking task join: {e}")))?
    }

    async fn application_contexts(&self, org_id: &str) -> Result<Vec<ApplicationContext>> {
        let pool = self.pool.clone();
        let org_id = org_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| Error::ChunkSource(format!("db pool: {e}")))?;
            let rows = application_contexts::list_by_specificity(&mut conn, &org_id)
                .map_err(|e| Error::ChunkSource(e.to_string()))?;
            Ok(rows
                .into_iter()
                .filter_map(|r| decode_match_pattern(r.id, r.org_id, &r.match_pattern))
                .collect())
        })
        .await
        .map_err(|e| Error::ChunkSource(format!("blocking task join: {e}")))?
    }
}
