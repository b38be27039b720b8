use crate::{
    data::{DataType, non_empty, teacher::Teacher},
    error::{
        ClassNotTaughtSnafu, ClassSectionNotTaughtSnafu, EmptyHomeworkTitleSnafu, MakeQuerySnafu, ParseDateSnafu,
        SchoolResult, SectionNotTaughtSnafu, SubjectNotTaughtSnafu,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, ensure};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

pub const TEACHER_RECENT_HOMEWORK: i64 = 8;
pub const STUDENT_RECENT_HOMEWORK: i64 = 5;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Homework {
    pub id: Uuid,
    pub class_name: String,
    pub section: String,
    pub title: String,
    pub subject: String,
    pub description: String,
    pub submission_date: Option<NaiveDate>,
    pub teacher_id: Option<Uuid>,
    pub teacher_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
pub struct HomeworkForm {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub submission_date: String,
}

#[derive(Debug)]
pub struct AddHomework {
    pub class_name: String,
    pub section: String,
    pub title: String,
    pub subject: String,
    pub description: String,
    pub submission_date: Option<NaiveDate>,
    pub teacher_id: Uuid,
    pub teacher_name: String,
}

impl HomeworkForm {
    ///teachers may only set homework for their own classes and sections
    pub fn validate(self, teacher: &Teacher) -> SchoolResult<AddHomework> {
        let title = non_empty(self.title).context(EmptyHomeworkTitleSnafu)?;
        let class_name = self.class_name.trim().to_string();
        let section = self.section.trim().to_uppercase();

        ensure!(
            !class_name.is_empty() && teacher.teaches_class(&class_name),
            ClassNotTaughtSnafu { class_name }
        );
        ensure!(
            !section.is_empty() && teacher.teaches_section(&section),
            SectionNotTaughtSnafu { section }
        );
        ensure!(
            teacher.teaches(&class_name, &section),
            ClassSectionNotTaughtSnafu {
                class_name,
                section
            }
        );

        let subject = match non_empty(self.subject) {
            Some(subject) => {
                ensure!(
                    teacher.teaches_subject(&subject),
                    SubjectNotTaughtSnafu {
                        subject,
                        class_name,
                        section
                    }
                );
                subject
            }
            None => teacher.subjects.first().cloned().unwrap_or_default(),
        };

        let submission_date = match non_empty(self.submission_date) {
            None => None,
            Some(original) => Some(
                NaiveDate::parse_from_str(&original, "%Y-%m-%d")
                    .context(ParseDateSnafu { original })?,
            ),
        };

        Ok(AddHomework {
            class_name,
            section,
            title,
            subject,
            description: self.description.trim().to_string(),
            submission_date,
            teacher_id: teacher.id,
            teacher_name: teacher.name.clone(),
        })
    }
}

impl DataType for Homework {
    type Id = Uuid;
    type FormForAdding = AddHomework;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM homework WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM homework ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddHomework {
            class_name,
            section,
            title,
            subject,
            description,
            submission_date,
            teacher_id,
            teacher_name,
        } = to_be_added;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO homework (class_name, section, title, subject, description, submission_date, teacher_id, teacher_name) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(&class_name)
        .bind(&section)
        .bind(title)
        .bind(subject)
        .bind(description)
        .bind(submission_date)
        .bind(teacher_id)
        .bind(teacher_name)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, %teacher_id, %class_name, %section, "Assigned homework");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM homework WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed homework");
        Ok(())
    }
}

impl Homework {
    pub async fn get_recent_for_teacher(
        teacher_id: Uuid,
        limit: i64,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM homework WHERE teacher_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(teacher_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    ///newest first, a `None` limit returns all of it
    pub async fn get_for_class(
        class_name: &str,
        section: &str,
        limit: Option<i64>,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM homework WHERE class_name = $1 AND upper(section) = upper($2) ORDER BY created_at DESC LIMIT $3",
        )
        .bind(class_name.trim())
        .bind(section.trim())
        .bind(limit)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn count_for_class(
        class_name: &str,
        section: &str,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<i64> {
        sqlx::query_scalar(
            "SELECT count(*) FROM homework WHERE class_name = $1 AND upper(section) = upper($2)",
        )
        .bind(class_name.trim())
        .bind(section.trim())
        .fetch_one(pool)
        .await
        .context(MakeQuerySnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchoolError;

    fn teacher() -> Teacher {
        Teacher {
            id: Uuid::nil(),
            teacher_id: "T-3".into(),
            name: "Anita Rao".into(),
            email: "anita@example.org".into(),
            phone: None,
            classes: vec!["6".into(), "7".into()],
            sections: vec!["A".into(), "B".into()],
            subjects: vec!["Science".into(), "Maths".into()],
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn form(class_name: &str, section: &str) -> HomeworkForm {
        HomeworkForm {
            class_name: class_name.into(),
            section: section.into(),
            title: "Chapter 4 exercises".into(),
            ..HomeworkForm::default()
        }
    }

    #[test]
    fn subject_defaults_to_first_taught() {
        let homework = form("6", "a").validate(&teacher()).expect("teacher teaches 6A");
        assert_eq!(homework.subject, "Science");
        assert_eq!(homework.section, "A");
        assert_eq!(homework.teacher_name, "Anita Rao");
        assert_eq!(homework.submission_date, None);
    }

    #[test]
    fn other_classes_are_refused() {
        let err = form("9", "A").validate(&teacher()).unwrap_err();
        assert_eq!(err.to_string(), "You cannot assign homework to class 9.");

        let err = form("7", "C").validate(&teacher()).unwrap_err();
        assert_eq!(err.to_string(), "You cannot assign homework to section C.");
    }

    #[test]
    fn sections_must_exist_for_the_class() {
        let senior = Teacher {
            classes: vec!["6".into(), "9".into()],
            sections: vec!["A".into(), "NEEV".into()],
            ..teacher()
        };
        let err = form("6", "NEEV").validate(&senior).unwrap_err();
        assert!(matches!(err, SchoolError::ClassSectionNotTaught { .. }));
        assert!(form("9", "neev").validate(&senior).is_ok());
    }

    #[test]
    fn title_is_required() {
        let err = HomeworkForm {
            title: "  ".into(),
            ..form("6", "A")
        }
        .validate(&teacher())
        .unwrap_err();
        assert!(matches!(err, SchoolError::EmptyHomeworkTitle));
    }

    #[test]
    fn subject_and_due_date_are_checked() {
        let err = HomeworkForm {
            subject: "AI".into(),
            ..form("6", "A")
        }
        .validate(&teacher())
        .unwrap_err();
        assert!(matches!(err, SchoolError::SubjectNotTaught { .. }));

        let homework = HomeworkForm {
            subject: "maths".into(),
            submission_date: "2025-07-01".into(),
            ..form("7", "B")
        }
        .validate(&teacher())
        .expect("valid homework");
        assert_eq!(homework.submission_date, NaiveDate::from_ymd_opt(2025, 7, 1));

        let err = HomeworkForm {
            submission_date: "next week".into(),
            ..form("7", "B")
        }
        .validate(&teacher())
        .unwrap_err();
        assert!(matches!(err, SchoolError::ParseDate { .. }));
    }
}
