//! Activity log: append-only per-org feed, paginated (spec §4.6, §10.6
//! "Activity log pagination contract").

use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Nullable, Text};

use crate::error::Result;
use crate::pool::PooledConn;

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ActivityRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
    #[diesel(sql_type = Text)]
    pub org_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub review_id: Option<String>,
    #[diesel(sql_type = Text)]
    pub kind: String,
    #[diesel(sql_type = Text)]
    pub message: String,
    #[diesel(sql_type = Text)]
    pub created_at: String,
}

pub fn record(
    conn: &mut PooledConn,
    org_id: &str,
    review_id: Option<&str>,
    kind: &str,
    message: &str,
    created_at: &str,
) -> Result<()> {
    sql_query(
        "INSERT INTO activities (org_id, review_id, kind, message, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind::<Text, _>(org_id)
    .bind::<Nullable<Text>, _>(review_id)
    .bind::<Text, _>(kind)
    .bind::<Text, _>(message)
    .bind::<Text, _>(created_at)
    .execute(conn)?;
    Ok(())
}

#[derive(Debug, Clone, diesel::QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

/// A page of activity entries plus the total count, for the
/// `limit`/`offset`/`total_count`/`has_more` contract.
pub struct ActivityPage {
    pub items: Vec<ActivityRow>,
    pub total_count: i64,
    pub has_more: bool,
}

pub fn list(conn: &mut PooledConn, org_id: &str, limit: i64, offset: i64) -> Result<ActivityPage> {
    let items: Vec<ActivityRow> = sql_query(
        "SELECT * FROM activities WHERE org_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind::<Text, _>(org_id)
    .bind::<BigInt, _>(limit)
    .bind::<BigInt, _>(offset)
    .load(conn)?;

    let total_count = sql_query("SELECT COUNT(*) AS total FROM activities WHERE org_id = ?")
        .bind::<Text, _>(org_id)
        .get_result::<CountRow>(conn)?
        .total;

    let has_more = offset + (items.len() as i64) < total_count;
    Ok(ActivityPage {
        items,
        total_count,
        has_more,
    })
}
