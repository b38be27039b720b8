use crate::{
    error::{
        InvalidChronoDateTimeSnafu, InvalidDateTimeSnafu, MakeQuerySnafu, RmpSerdeDecodeSnafu,
        RmpSerdeEncodeSnafu, SchoolError,
    },
    state::SchoolState,
};
use async_trait::async_trait;
use axum_login::tower_sessions::{
    ExpiredDeletion, SessionStore,
    cookie::time::OffsetDateTime,
    session::{Id, Record},
    session_store::Error as SSError,
};
use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt};
use sqlx::PgConnection;

#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    state: SchoolState,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    data: Vec<u8>,
    expiry_date: DateTime<Utc>,
}

impl PostgresSessionStore {
    pub const fn new(state: SchoolState) -> Self {
        Self { state }
    }
}

fn offset_to_chrono(odt: OffsetDateTime) -> Result<DateTime<Utc>, SchoolError> {
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond()).context(InvalidDateTimeSnafu { odt })
}

fn chrono_to_offset(dt: DateTime<Utc>) -> Result<OffsetDateTime, SchoolError> {
    let timestamp = dt.timestamp();
    OffsetDateTime::from_unix_timestamp(timestamp).context(InvalidChronoDateTimeSnafu { timestamp })
}

impl PostgresSessionStore {
    async fn id_exists(id: Id, conn: &mut PgConnection) -> Result<bool, SchoolError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1)")
            .bind(id.to_string())
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn save_session(record: &Record, conn: &mut PgConnection) -> Result<(), SchoolError> {
        let expiry_date = offset_to_chrono(record.expiry_date)?;
        let serialised_data = rmp_serde::to_vec(&record.data).context(RmpSerdeEncodeSnafu)?;

        sqlx::query("INSERT INTO sessions (id, data, expiry_date) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET data = excluded.data, expiry_date = excluded.expiry_date")
            .bind(record.id.to_string())
            .bind(serialised_data)
            .bind(expiry_date)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;

        Ok(())
    }

    async fn load_session(id: &Id, conn: &mut PgConnection) -> Result<Option<Record>, SchoolError> {
        let Some(row) = sqlx::query_as::<_, SessionRow>(
            "SELECT data, expiry_date FROM sessions WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?
        else {
            return Ok(None);
        };

        Ok(Some(Record {
            id: *id,
            data: rmp_serde::from_slice(&row.data).context(RmpSerdeDecodeSnafu)?,
            expiry_date: chrono_to_offset(row.expiry_date)?,
        }))
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create(&self, session_record: &mut Record) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        while Self::id_exists(session_record.id, &mut connection)
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?
        {
            session_record.id = Id::default();
        }

        Self::save_session(session_record, &mut connection)
            .await
            .map_err(|e| SSError::Encode(e.to_string()))?;

        Ok(())
    }

    async fn save(&self, session_record: &Record) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        Self::save_session(session_record, &mut connection)
            .await
            .map_err(|e| SSError::Encode(e.to_string()))?;

        Ok(())
    }

    async fn load(&self, session_id: &Id) -> Result<Option<Record>, SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        Self::load_session(session_id, &mut connection)
            .await
            .map_err(|e| SSError::Decode(e.to_string()))
    }

    async fn delete(&self, session_id: &Id) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id.to_string())
            .execute(&mut *connection)
            .await
            .context(MakeQuerySnafu)
            .map_err(|e| SSError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for PostgresSessionStore {
    async fn delete_expired(&self) -> Result<(), SSError> {
        let mut connection = self
            .state
            .get_connection()
            .await
            .map_err(|e| SSError::Backend(e.to_string()))?;

        let removed = sqlx::query("DELETE FROM sessions WHERE expiry_date < now()")
            .execute(&mut *connection)
            .await
            .context(MakeQuerySnafu)
            .map_err(|e| SSError::Backend(e.to_string()))?
            .rows_affected();
        debug!(removed, "Removed expired sessions");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_dates_survive_conversion() {
        let odt = OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap();
        let chrono = offset_to_chrono(odt).unwrap();
        assert_eq!(chrono.timestamp(), 1_750_000_000);
        assert_eq!(chrono_to_offset(chrono).unwrap(), odt);
    }
}
