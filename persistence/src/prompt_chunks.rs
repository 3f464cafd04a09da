//! Prompt-chunk CRUD backing `prompt-manager`'s chunk store (spec §4.3).

use diesel::Connection;
use diesel::OptionalExtension;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::Text;

use crate::error::{PersistenceError, Result};
use crate::pool::PooledConn;

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct PromptChunkRow {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = Text)]
    pub org_id: String,
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = Text)]
    pub body: String,
    #[diesel(sql_type = Text)]
    pub updated_at: String,
}

pub fn upsert(
    conn: &mut PooledConn,
    id: &str,
    org_id: &str,
    name: &str,
    body: &str,
    updated_at: &str,
) -> Result<()> {
    sql_query(
        "INSERT INTO prompt_chunks (id, org_id, name, body, updated_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(org_id, name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
    )
    .bind::<Text, _>(id)
    .bind::<Text, _>(org_id)
    .bind::<Text, _>(name)
    .bind::<Text, _>(body)
    .bind::<Text, _>(updated_at)
    .execute(conn)?;
    Ok(())
}

pub fn get(conn: &mut PooledConn, org_id: &str, name: &str) -> Result<PromptChunkRow> {
    sql_query("SELECT * FROM prompt_chunks WHERE org_id = ? AND name = ?")
        .bind::<Text, _>(org_id)
        .bind::<Text, _>(name)
        .get_result(conn)
        .optional()?
        .ok_or_else(|| PersistenceError::NotFound(format!("prompt chunk {org_id}/{name}")))
}

pub fn list(conn: &mut PooledConn, org_id: &str) -> Result<Vec<PromptChunkRow>> {
    Ok(sql_query("SELECT * FROM prompt_chunks WHERE org_id = ? ORDER BY name")
        .bind::<Text, _>(org_id)
        .load(conn)?)
}

/// Atomically renames a batch of chunk rows within one `org_id`, used to
/// renumber the `sequence_index` packed into `encode_chunk_name`'s trailing
/// `::NNNN` suffix (`api::prompt_store`). Renames route through a unique
/// scratch prefix first so a swap between two indices never collides with
/// `UNIQUE(org_id, name)` mid-transaction.
pub fn reorder(conn: &mut PooledConn, org_id: &str, renames: &[(String, String)]) -> Result<()> {
    conn.transaction(|conn| -> std::result::Result<(), PersistenceError> {
        for (i, (old_name, _)) in renames.iter().enumerate() {
            let scratch = format!("__reorder_scratch__{i}");
            sql_query("UPDATE prompt_chunks SET name = ? WHERE org_id = ? AND name = ?")
                .bind::<Text, _>(&scratch)
                .bind::<Text, _>(org_id)
                .bind::<Text, _>(old_name)
                .execute(conn)?;
        }
        for (i, (_, new_name)) in renames.iter().enumerate() {
            let scratch = format!("__reorder_scratch__{i}");
            sql_query("UPDATE prompt_chunks SET name = ? WHERE org_id = ? AND name = ?")
                .bind::<Text, _>(new_name)
                .bind::<Text, _>(org_id)
                .bind::<Text, _>(&scratch)
                .execute(conn)?;
        }
        Ok(())
    })
}

pub fn delete(conn: &mut PooledConn, org_id: &str, name: &str) -> Result<()> {
    sql_query("DELETE FROM prompt_chunks WHERE org_id = ? AND name = ?")
        .bind::<Text, _>(org_id)
        .bind::<Text, _>(name)
        .execute(conn)?;
    Ok(())
}
