use crate::{
    data::{DataType, non_empty},
    error::{MakeQuerySnafu, SchoolResult},
};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GalleryImage {
    pub id: Uuid,
    pub image_url: String,
    pub title: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct GalleryFormError: u8 {
        const EMPTY_URL =   0b0000_0001;
        const EMPTY_TITLE = 0b0000_0010;
    }
}

impl GalleryFormError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::EMPTY_URL => Some("Please provide an image URL"),
            Self::EMPTY_TITLE => Some("Please provide a title"),
            _ => None,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct GalleryForm {
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug)]
pub struct AddGalleryImage {
    pub image_url: String,
    pub title: String,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
}

impl GalleryForm {
    pub fn validate(self, uploaded_by: Uuid) -> Result<AddGalleryImage, GalleryFormError> {
        let mut errors = GalleryFormError::empty();
        let image_url = non_empty(self.image_url);
        if image_url.is_none() {
            errors |= GalleryFormError::EMPTY_URL;
        }
        let title = non_empty(self.title);
        if title.is_none() {
            errors |= GalleryFormError::EMPTY_TITLE;
        }

        match (image_url, title) {
            (Some(image_url), Some(title)) => Ok(AddGalleryImage {
                image_url,
                title,
                description: non_empty(self.description),
                uploaded_by,
            }),
            _ => Err(errors),
        }
    }
}

impl DataType for GalleryImage {
    type Id = Uuid;
    type FormForAdding = AddGalleryImage;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM gallery_images WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM gallery_images ORDER BY display_order, created_at DESC",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddGalleryImage {
            image_url,
            title,
            description,
            uploaded_by,
        } = to_be_added;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO gallery_images (image_url, title, description, display_order, is_active, uploaded_by) VALUES ($1, $2, $3, 0, TRUE, $4) RETURNING id",
        )
        .bind(image_url)
        .bind(title)
        .bind(description)
        .bind(uploaded_by)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, %uploaded_by, "Added gallery image");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM gallery_images WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed gallery image");
        Ok(())
    }
}

impl GalleryImage {
    pub async fn get_active(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM gallery_images WHERE is_active ORDER BY display_order, created_at DESC",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    ///returns the new state, or `None` if no image had that id
    pub async fn toggle_active(id: Uuid, conn: &mut PgConnection) -> SchoolResult<Option<bool>> {
        let now_active: Option<bool> = sqlx::query_scalar(
            "UPDATE gallery_images SET is_active = NOT is_active WHERE id = $1 RETURNING is_active",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?;

        if let Some(now_active) = now_active {
            info!(%id, now_active, "Toggled gallery image");
        }
        Ok(now_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_and_title_are_required() {
        let errors = GalleryForm::default().validate(Uuid::nil()).unwrap_err();
        assert_eq!(errors, GalleryFormError::all());
        assert_eq!(errors.as_nice_list().count(), 2);
    }

    #[test]
    fn blank_description_is_dropped() {
        let image = GalleryForm {
            image_url: "https://example.org/sports-day.jpg".into(),
            title: " Sports Day ".into(),
            description: "  ".into(),
        }
        .validate(Uuid::nil())
        .expect("form is complete");
        assert_eq!(image.title, "Sports Day");
        assert_eq!(image.description, None);
    }
}
