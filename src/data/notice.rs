use crate::{
    data::{DataType, non_empty},
    error::{MakeQuerySnafu, ParseEnumSnafu, SchoolError, SchoolResult},
};
use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub const fn badge_classes(self) -> &'static str {
        match self {
            Self::Low => "bg-green-700 text-green-100",
            Self::Medium => "bg-yellow-600 text-yellow-100",
            Self::High => "bg-red-700 text-red-100",
        }
    }
}

impl FromStr for Priority {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str() == lowered)
            .ok_or_else(|| {
                ParseEnumSnafu {
                    kind: "priority",
                    provided: s,
                }
                .build()
            })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub priority: String,
    pub date: DateTime<Utc>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    ///rows are constrained by the db, but fall back to the default just in case
    pub fn priority(&self) -> Priority {
        self.priority.parse().unwrap_or_default()
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct NoticeFormError: u8 {
        const EMPTY_TITLE =      0b0000_0001;
        const EMPTY_CONTENT =    0b0000_0010;
        const INVALID_PRIORITY = 0b0000_0100;
        const INVALID_DATE =     0b0000_1000;
    }
}

impl NoticeFormError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::EMPTY_TITLE => Some("Please provide a title"),
            Self::EMPTY_CONTENT => Some("Please provide the notice content"),
            Self::INVALID_PRIORITY => Some("Priority must be low, medium or high"),
            Self::INVALID_DATE => Some("Date must look like 2025-06-01"),
            _ => None,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct NoticeForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug)]
pub struct AddNotice {
    pub title: String,
    pub content: String,
    pub priority: Priority,
    pub date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
}

impl NoticeForm {
    pub fn validate(self, created_by: Uuid) -> Result<AddNotice, NoticeFormError> {
        let mut errors = NoticeFormError::empty();

        let title = non_empty(self.title);
        if title.is_none() {
            errors |= NoticeFormError::EMPTY_TITLE;
        }
        let content = non_empty(self.content);
        if content.is_none() {
            errors |= NoticeFormError::EMPTY_CONTENT;
        }

        let priority = match non_empty(self.priority) {
            None => Priority::default(),
            Some(priority) => priority.parse().unwrap_or_else(|_| {
                errors |= NoticeFormError::INVALID_PRIORITY;
                Priority::default()
            }),
        };

        let date = match non_empty(self.date) {
            None => None,
            Some(date) => match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                Ok(date) => Some(date.and_time(chrono::NaiveTime::MIN).and_utc()),
                Err(_) => {
                    errors |= NoticeFormError::INVALID_DATE;
                    None
                }
            },
        };

        match (title, content) {
            (Some(title), Some(content)) if errors.is_empty() => Ok(AddNotice {
                title,
                content,
                priority,
                date,
                created_by,
            }),
            _ => Err(errors),
        }
    }
}

impl DataType for Notice {
    type Id = Uuid;
    type FormForAdding = AddNotice;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM notices WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM notices ORDER BY date DESC, created_at DESC")
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddNotice {
            title,
            content,
            priority,
            date,
            created_by,
        } = to_be_added;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO notices (title, content, priority, date, is_active, created_by) VALUES ($1, $2, $3, COALESCE($4, now()), TRUE, $5) RETURNING id",
        )
        .bind(title)
        .bind(content)
        .bind(priority.as_str())
        .bind(date)
        .bind(created_by)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, %priority, "Added notice");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed notice");
        Ok(())
    }
}

impl Notice {
    pub async fn get_active(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM notices WHERE is_active ORDER BY date DESC, created_at DESC",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn toggle_active(id: Uuid, conn: &mut PgConnection) -> SchoolResult<Option<bool>> {
        let now_active: Option<bool> = sqlx::query_scalar(
            "UPDATE notices SET is_active = NOT is_active WHERE id = $1 RETURNING is_active",
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)?;

        if let Some(now_active) = now_active {
            info!(%id, now_active, "Toggled notice");
        }
        Ok(now_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_defaults_to_medium() {
        let notice = NoticeForm {
            title: "Holiday".into(),
            content: "School is closed on Friday".into(),
            ..NoticeForm::default()
        }
        .validate(Uuid::nil())
        .expect("valid notice");
        assert_eq!(notice.priority, Priority::Medium);
        assert_eq!(notice.date, None);
    }

    #[test]
    fn priority_and_date_are_parsed() {
        let notice = NoticeForm {
            title: "Exams".into(),
            content: "Timetable attached".into(),
            priority: "HIGH".into(),
            date: "2025-03-14".into(),
        }
        .validate(Uuid::nil())
        .expect("valid notice");
        assert_eq!(notice.priority, Priority::High);
        assert_eq!(
            notice.date.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2025, 3, 14)
        );
    }

    #[test]
    fn invalid_notice_reports_everything() {
        let errors = NoticeForm {
            priority: "urgent".into(),
            date: "tomorrow".into(),
            ..NoticeForm::default()
        }
        .validate(Uuid::nil())
        .unwrap_err();
        assert_eq!(errors, NoticeFormError::all());
    }
}
