//! Application-context resolution table: most-specific-wins wildcard
//! matching over `(org, repo/path pattern) -> template` (spec §4.3).

use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{Integer, Text};

use crate::error::Result;
use crate::pool::PooledConn;

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct ApplicationContextRow {
    #[diesel(sql_type = Text)]
    pub id: String,
    #[diesel(sql_type = Text)]
    pub org_id: String,
    #[diesel(sql_type = Text)]
    pub match_pattern: String,
    #[diesel(sql_type = Integer)]
    pub specificity: i32,
    #[diesel(sql_type = Text)]
    pub template_id: String,
    #[diesel(sql_type = Text)]
    pub variables: String,
}

pub fn insert(
    conn: &mut PooledConn,
    id: &str,
    org_id: &str,
    match_pattern: &str,
    specificity: i32,
    template_id: &str,
    variables_json: &str,
) -> Result<()> {
    sql_query(
        "INSERT INTO application_contexts (id, org_id, match_pattern, specificity, \
         template_id, variables) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind::<Text, _>(id)
    .bind::<Text, _>(org_id)
    .bind::<Text, _>(match_pattern)
    .bind::<Integer, _>(specificity)
    .bind::<Text, _>(template_id)
    .bind::<Text, _>(variables_json)
    .execute(conn)?;
    Ok(())
}

/// All contexts for an org, most specific first — callers pick the first
/// whose `match_pattern` matches the target.
pub fn list_by_specificity(conn: &mut PooledConn, org_id: &str) -> Result<Vec<ApplicationContextRow>> {
    Ok(sql_query(
        "SELECT * FROM application_contexts WHERE org_id = ? ORDER BY specificity DESC",
    )
    .bind::<Text, _>(org_id)
    .load(conn)?)
}
