use crate::{
    data::{DataType, curriculum::ClassNumber},
    error::{MakeQuerySnafu, SchoolResult},
};
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SchoolClass {
    pub id: Uuid,
    pub name: String,
    pub section: String,
}

#[derive(Deserialize)]
pub struct NewSchoolClass {
    pub name: ClassNumber,
    pub section: String,
}

impl<'de> Deserialize<'de> for ClassNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "{raw:?} is not a class between {} and {}",
                Self::MIN,
                Self::MAX
            ))
        })
    }
}

impl DataType for SchoolClass {
    type Id = Uuid;
    type FormForAdding = NewSchoolClass;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT id, name, section FROM classes WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        //names are numeric text, so sort them as numbers
        sqlx::query_as::<_, Self>(
            "SELECT id, name, section FROM classes ORDER BY name::INTEGER, section",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let NewSchoolClass { name, section } = to_be_added;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO classes (name, section) VALUES ($1, $2) ON CONFLICT (name, section) DO UPDATE SET name = excluded.name RETURNING id",
        )
        .bind(name.to_string())
        .bind(section)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl SchoolClass {
    pub async fn find_by_name_and_section(
        name: &str,
        section: &str,
        conn: &mut PgConnection,
    ) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT id, name, section FROM classes WHERE name = $1 AND section = $2",
        )
        .bind(name.trim())
        .bind(section.trim())
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }
}
