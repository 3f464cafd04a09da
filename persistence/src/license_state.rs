//! Singleton licence state row read/written by the `licensing` crate's
//! validation scheduler (spec §4.5).

use diesel::OptionalExtension;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{Integer, Nullable, Text};

use crate::error::Result;
use crate::pool::PooledConn;

#[derive(Debug, Clone, diesel::QueryableByName)]
pub struct LicenseStateRow {
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub subject: Option<String>,
    #[diesel(sql_type = Nullable<Integer>)]
    pub seats: Option<i32>,
    #[diesel(sql_type = Nullable<Text>)]
    pub expires_at: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub last_validated_at: Option<String>,
}

pub fn get(conn: &mut PooledConn) -> Result<Option<LicenseStateRow>> {
    Ok(sql_query("SELECT status, subject, seats, expires_at, last_validated_at FROM license_state WHERE id = 1")
        .get_result(conn)
        .optional()?)
}

#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &mut PooledConn,
    status: &str,
    subject: Option<&str>,
    seats: Option<i32>,
    expires_at: Option<&str>,
    last_validated_at: &str,
) -> Result<()> {
    sql_query(
        "INSERT INTO license_state (id, status, subject, seats, expires_at, last_validated_at) \
         VALUES (1, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET status = excluded.status, subject = excluded.subject, \
         seats = excluded.seats, expires_at = excluded.expires_at, \
         last_validated_at = excluded.last_validated_at",
    )
    .bind::<Text, _>(status)
    .bind::<Nullable<Text>, _>(subject)
    .bind::<Nullable<Integer>, _>(seats)
    .bind::<Nullable<Text>, _>(expires_at)
    .bind::<Text, _>(last_validated_at)
    .execute(conn)?;
    Ok(())
}
