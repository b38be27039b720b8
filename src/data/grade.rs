//! Marks recorded against students, and the summaries shown on the dashboards.

use crate::{
    data::{DataType, non_empty, student::Student, teacher::Teacher},
    error::{MakeQuerySnafu, SchoolResult, StudentNotTaughtSnafu, SubjectNotTaughtSnafu},
};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use snafu::{ResultExt, ensure};
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Grade {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    pub exam_type: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub comments: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GradeWithStudent {
    #[sqlx(flatten)]
    pub grade: Grade,
    pub student_name: String,
    pub admission_id: String,
}

///rounded to the nearest whole percent, `None` when there is nothing to divide by
#[allow(clippy::cast_possible_truncation)]
pub fn percentage(obtained: f64, total: f64) -> Option<i64> {
    if total <= 0.0 {
        return None;
    }
    Some((obtained / total * 100.0).round() as i64)
}

impl Grade {
    pub fn percentage(&self) -> Option<i64> {
        percentage(self.marks_obtained, self.total_marks)
    }
}

#[derive(Debug, Clone)]
pub struct ExamSummary {
    pub exam_type: String,
    pub grades: Vec<Grade>,
}

impl ExamSummary {
    pub fn obtained(&self) -> f64 {
        self.grades.iter().map(|g| g.marks_obtained).sum()
    }

    pub fn total(&self) -> f64 {
        self.grades.iter().map(|g| g.total_marks).sum()
    }

    pub fn percentage(&self) -> Option<i64> {
        percentage(self.obtained(), self.total())
    }
}

///groups grades by exam type, keeping the order in which each exam type first appears
pub fn summarise_by_exam(grades: &[Grade]) -> Vec<ExamSummary> {
    let mut summaries: Vec<ExamSummary> = vec![];
    for grade in grades {
        match summaries
            .iter_mut()
            .find(|summary| summary.exam_type == grade.exam_type)
        {
            Some(summary) => summary.grades.push(grade.clone()),
            None => summaries.push(ExamSummary {
                exam_type: grade.exam_type.clone(),
                grades: vec![grade.clone()],
            }),
        }
    }
    summaries
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct GradeFormError: u8 {
        const EMPTY_SUBJECT =     0b0000_0001;
        const EMPTY_EXAM_TYPE =   0b0000_0010;
        const INVALID_OBTAINED =  0b0000_0100;
        const INVALID_TOTAL =     0b0000_1000;
        const OBTAINED_TOO_HIGH = 0b0001_0000;
    }
}

impl GradeFormError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::EMPTY_SUBJECT => Some("Please select a subject"),
            Self::EMPTY_EXAM_TYPE => Some("Please provide the exam type"),
            Self::INVALID_OBTAINED => Some("Marks obtained must be a number of at least 0"),
            Self::INVALID_TOTAL => Some("Total marks must be a number above 0"),
            Self::OBTAINED_TOO_HIGH => Some("Marks obtained cannot be more than the total marks"),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
pub struct GradeForm {
    pub student_id: Uuid,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub exam_type: String,
    #[serde(default)]
    pub marks_obtained: String,
    #[serde(default)]
    pub total_marks: String,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug)]
pub struct AddGrade {
    pub student_id: Uuid,
    pub subject: String,
    pub exam_type: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub comments: Option<String>,
    pub recorded_by: Uuid,
}

fn parse_marks(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

impl GradeForm {
    pub fn validate(self, recorded_by: Uuid) -> Result<AddGrade, GradeFormError> {
        let mut errors = GradeFormError::empty();

        let subject = non_empty(self.subject);
        if subject.is_none() {
            errors |= GradeFormError::EMPTY_SUBJECT;
        }
        let exam_type = non_empty(self.exam_type);
        if exam_type.is_none() {
            errors |= GradeFormError::EMPTY_EXAM_TYPE;
        }

        let obtained = parse_marks(&self.marks_obtained).filter(|n| *n >= 0.0);
        if obtained.is_none() {
            errors |= GradeFormError::INVALID_OBTAINED;
        }
        let total = parse_marks(&self.total_marks).filter(|n| *n > 0.0);
        if total.is_none() {
            errors |= GradeFormError::INVALID_TOTAL;
        }
        if let (Some(obtained), Some(total)) = (obtained, total) {
            if obtained > total {
                errors |= GradeFormError::OBTAINED_TOO_HIGH;
            }
        }

        match (subject, exam_type, obtained, total) {
            (Some(subject), Some(exam_type), Some(marks_obtained), Some(total_marks))
                if errors.is_empty() =>
            {
                Ok(AddGrade {
                    student_id: self.student_id,
                    subject,
                    exam_type,
                    marks_obtained,
                    total_marks,
                    comments: non_empty(self.comments),
                    recorded_by,
                })
            }
            _ => Err(errors),
        }
    }
}

impl AddGrade {
    ///teachers can only grade students in their own classes, in subjects they teach
    pub fn ensure_teacher_may_record(&self, teacher: &Teacher, student: &Student) -> SchoolResult<()> {
        ensure!(
            teacher.teaches(&student.class_name, &student.section),
            StudentNotTaughtSnafu {
                student: student.name.clone()
            }
        );
        ensure!(
            teacher.teaches_subject(&self.subject),
            SubjectNotTaughtSnafu {
                subject: self.subject.clone(),
                class_name: student.class_name.clone(),
                section: student.section.clone(),
            }
        );
        Ok(())
    }
}

impl DataType for Grade {
    type Id = Uuid;
    type FormForAdding = AddGrade;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM grades WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM grades ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
            .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddGrade {
            student_id,
            subject,
            exam_type,
            marks_obtained,
            total_marks,
            comments,
            recorded_by,
        } = to_be_added;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO grades (student_id, subject, exam_type, marks_obtained, total_marks, comments, recorded_by) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(student_id)
        .bind(subject)
        .bind(exam_type)
        .bind(marks_obtained)
        .bind(total_marks)
        .bind(comments)
        .bind(recorded_by)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, %student_id, %recorded_by, "Recorded grade");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM grades WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed grade");
        Ok(())
    }
}

impl Grade {
    pub async fn get_for_student(student_id: Uuid, pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM grades WHERE student_id = $1 ORDER BY created_at DESC",
        )
        .bind(student_id)
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_for_class(
        class_name: &str,
        section: &str,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<Vec<GradeWithStudent>> {
        sqlx::query_as::<_, GradeWithStudent>(
            "SELECT g.*, s.name AS student_name, s.admission_id FROM grades g JOIN students s ON s.id = g.student_id WHERE s.class_name = $1 AND upper(s.section) = upper($2) ORDER BY g.created_at DESC",
        )
        .bind(class_name.trim())
        .bind(section.trim())
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    ///percentage over the most recently recorded exam type, worked out by the database
    pub async fn latest_exam_percentage(
        student_id: Uuid,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<Option<i32>> {
        sqlx::query_scalar("SELECT get_latest_exam_percentage($1)")
            .bind(student_id)
            .fetch_one(pool)
            .await
            .context(MakeQuerySnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(exam_type: &str, subject: &str, obtained: f64, total: f64) -> Grade {
        Grade {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            subject: subject.into(),
            exam_type: exam_type.into(),
            marks_obtained: obtained,
            total_marks: total,
            comments: None,
            recorded_by: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn form(obtained: &str, total: &str) -> GradeForm {
        GradeForm {
            student_id: Uuid::nil(),
            subject: "Maths".into(),
            exam_type: "Unit Test 1".into(),
            marks_obtained: obtained.into(),
            total_marks: total.into(),
            comments: String::new(),
        }
    }

    #[test]
    fn percentages_round_to_whole_numbers() {
        assert_eq!(percentage(45.0, 50.0), Some(90));
        assert_eq!(percentage(2.0, 3.0), Some(67));
        assert_eq!(percentage(0.0, 20.0), Some(0));
        assert_eq!(percentage(5.0, 0.0), None);
        assert_eq!(grade("Mid Term", "EVS", 33.0, 40.0).percentage(), Some(83));
    }

    #[test]
    fn exam_summaries_keep_first_seen_order() {
        let grades = vec![
            grade("Final", "Maths", 80.0, 100.0),
            grade("Mid Term", "Maths", 30.0, 50.0),
            grade("Final", "Science", 70.0, 100.0),
        ];
        let summaries = summarise_by_exam(&grades);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].exam_type, "Final");
        assert_eq!(summaries[0].grades.len(), 2);
        assert_eq!(summaries[0].percentage(), Some(75));
        assert_eq!(summaries[1].exam_type, "Mid Term");
        assert_eq!(summaries[1].percentage(), Some(60));
        assert!(summarise_by_exam(&[]).is_empty());
    }

    #[test]
    fn marks_must_be_sensible() {
        assert!(form("18", "20").validate(Uuid::nil()).is_ok());
        assert!(form("20", "20").validate(Uuid::nil()).is_ok());
        assert_eq!(
            form("21", "20").validate(Uuid::nil()).unwrap_err(),
            GradeFormError::OBTAINED_TOO_HIGH
        );
        assert_eq!(
            form("-1", "20").validate(Uuid::nil()).unwrap_err(),
            GradeFormError::INVALID_OBTAINED
        );
        assert_eq!(
            form("5", "0").validate(Uuid::nil()).unwrap_err(),
            GradeFormError::INVALID_TOTAL
        );
        assert_eq!(
            form("five", "NaN").validate(Uuid::nil()).unwrap_err(),
            GradeFormError::INVALID_OBTAINED | GradeFormError::INVALID_TOTAL
        );
    }

    #[test]
    fn teachers_only_grade_their_own_students() {
        let teacher = Teacher {
            id: Uuid::nil(),
            teacher_id: "T-5".into(),
            name: "Sunil".into(),
            email: "sunil@example.org".into(),
            phone: None,
            classes: vec!["8".into()],
            sections: vec!["B".into()],
            subjects: vec!["Maths".into()],
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let mut student = Student {
            id: Uuid::nil(),
            admission_id: "A-1".into(),
            name: "Pooja".into(),
            email: "pooja@example.org".into(),
            phone: None,
            class_name: "8".into(),
            section: "B".into(),
            class_id: None,
            dob: None,
            blood_group: None,
            father_name: None,
            mother_name: None,
            address: None,
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };

        let grade = form("10", "20").validate(Uuid::nil()).expect("valid");
        assert!(grade.ensure_teacher_may_record(&teacher, &student).is_ok());

        student.section = "C".into();
        assert!(grade.ensure_teacher_may_record(&teacher, &student).is_err());

        student.section = "B".into();
        let science = GradeForm {
            subject: "Science".into(),
            ..form("10", "20")
        }
        .validate(Uuid::nil())
        .expect("valid");
        assert!(science.ensure_teacher_may_record(&teacher, &student).is_err());
    }
}
