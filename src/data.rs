use crate::error::SchoolResult;
use serde::Deserialize;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

pub mod attendance;
pub mod curriculum;
pub mod gallery;
pub mod grade;
pub mod homework;
pub mod notice;
pub mod school_class;
pub mod student;
pub mod teacher;
pub mod user;

#[derive(Deserialize)]
pub struct IdForm {
    pub id: Uuid,
}

pub trait DataType: Sized {
    type Id;
    type FormForAdding;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection)
    -> SchoolResult<Option<Self>>;
    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>>;
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id>;
    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()>;
}

///trims, and turns an empty string into `None`
pub fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("   ".into()), None);
        assert_eq!(non_empty(" x ".into()).as_deref(), Some("x"));
        assert_eq!(non_empty("abc".into()).as_deref(), Some("abc"));
    }
}
