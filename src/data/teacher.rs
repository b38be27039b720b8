use crate::{
    auth::{NewPassword, PasswordChoice, hash_password, set_password},
    data::{
        DataType,
        curriculum::{ClassNumber, available_sections, available_subjects},
        non_empty,
        user::Role,
    },
    error::{MakeQuerySnafu, SchoolResult},
};
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use maud::Render;
use secrecy::SecretString;
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! teacher_columns {
    () => {
        "id, teacher_id, name, email, phone, classes, sections, subjects, profile_photo, status, created_at"
    };
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Teacher {
    pub id: Uuid,
    pub teacher_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub classes: Vec<String>,
    pub sections: Vec<String>,
    pub subjects: Vec<String>,
    pub profile_photo: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Render for Teacher {
    fn render_to(&self, buffer: &mut String) {
        self.name.render_to(buffer);
    }
}

impl Teacher {
    pub fn teaches_class(&self, class_name: &str) -> bool {
        let class_name = class_name.trim();
        self.classes.iter().any(|class| class.trim() == class_name)
    }

    ///no sections set means every section of their classes
    pub fn teaches_section(&self, section: &str) -> bool {
        self.sections.is_empty()
            || self
                .sections
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(section.trim()))
    }

    ///also false when the class does not run that section
    pub fn teaches(&self, class_name: &str, section: &str) -> bool {
        let section = section.trim().to_uppercase();
        self.teaches_class(class_name)
            && self.teaches_section(&section)
            && ClassNumber::parse(class_name).is_some_and(|class| class.offers_section(&section))
    }

    pub fn teaches_subject(&self, subject: &str) -> bool {
        self.subjects
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(subject.trim()))
    }

    ///every (class, section) pair this teacher covers that the school actually runs
    pub fn class_sections(&self) -> Vec<(String, String)> {
        let mut pairs = vec![];
        for class_name in &self.classes {
            let Some(class) = ClassNumber::parse(class_name) else {
                continue;
            };
            for section in class.sections() {
                if self.teaches_section(section) {
                    pairs.push((class.to_string(), (*section).to_string()));
                }
            }
        }
        pairs
    }

    pub async fn student_count(&self, pool: &Pool<Postgres>) -> SchoolResult<i64> {
        let sections: Vec<String> = self
            .sections
            .iter()
            .map(|section| section.trim().to_uppercase())
            .collect();

        sqlx::query_scalar(
            "SELECT count(*) FROM students WHERE class_name = ANY($1) AND (cardinality($2::TEXT[]) = 0 OR upper(section) = ANY($2))",
        )
        .bind(&self.classes)
        .bind(sections)
        .fetch_one(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_by_teacher_id(
        teacher_id: &str,
        conn: &mut PgConnection,
    ) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            teacher_columns!(),
            " FROM teachers WHERE teacher_id = $1"
        ))
        .bind(teacher_id.trim())
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    ///the teacher id is never changed, and the password only when a new one is given
    pub async fn update_in_database(
        id: Uuid,
        details: TeacherDetails,
        password: Option<NewPassword>,
        conn: &mut PgConnection,
    ) -> SchoolResult<()> {
        sqlx::query(
            "UPDATE teachers SET name = $2, email = $3, phone = $4, classes = $5, sections = $6, subjects = $7, profile_photo = $8 WHERE id = $1",
        )
        .bind(id)
        .bind(details.name)
        .bind(details.email.as_str())
        .bind(details.phone)
        .bind(details.classes)
        .bind(details.sections)
        .bind(details.subjects)
        .bind(details.profile_photo)
        .execute(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        if let Some(NewPassword {
            plaintext,
            is_default,
        }) = password
        {
            set_password(id, Role::Teacher, plaintext, conn, is_default).await?;
        }

        info!(%id, "Updated teacher");
        Ok(())
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct TeacherFormError: u16 {
        const EMPTY_TEACHER_ID =    0b0000_0000_0001;
        const EMPTY_NAME =          0b0000_0000_0010;
        const EMPTY_EMAIL =         0b0000_0000_0100;
        const INVALID_EMAIL =       0b0000_0000_1000;
        const NO_CLASSES =          0b0000_0001_0000;
        const NO_SECTIONS =         0b0000_0010_0000;
        const NO_SUBJECTS =         0b0000_0100_0000;
        const SECTION_NOT_OFFERED = 0b0000_1000_0000;
        const SUBJECT_NOT_OFFERED = 0b0001_0000_0000;
        const EMPTY_PASSWORD =      0b0010_0000_0000;
    }
}

impl TeacherFormError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::EMPTY_TEACHER_ID => Some("Please provide a Teacher ID"),
            Self::EMPTY_NAME => Some("Please provide the teacher's name"),
            Self::EMPTY_EMAIL => Some("Please provide an email address"),
            Self::INVALID_EMAIL => Some("Provided email address was invalid"),
            Self::NO_CLASSES => Some("Please select at least one class"),
            Self::NO_SECTIONS => Some("Please select at least one section"),
            Self::NO_SUBJECTS => Some("Please select at least one subject"),
            Self::SECTION_NOT_OFFERED => Some("A selected section is not offered for the chosen classes"),
            Self::SUBJECT_NOT_OFFERED => Some("A selected subject is not taught in the chosen classes"),
            Self::EMPTY_PASSWORD => Some("Please provide a password, or auto-generate one"),
            _ => None,
        })
    }
}

#[derive(Default, Debug, Clone)]
pub struct TeacherForm {
    pub teacher_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub profile_photo: String,
    pub classes: Vec<String>,
    pub sections: Vec<String>,
    pub subjects: Vec<String>,
    pub password: Option<SecretString>,
    pub generate_password: bool,
}

impl TeacherForm {
    ///url-encoded forms repeat keys for each ticked checkbox, so these come in as pairs
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "teacher_id" => form.teacher_id = value,
                "name" => form.name = value,
                "email" => form.email = value,
                "phone" => form.phone = value,
                "profile_photo" => form.profile_photo = value,
                "classes" => form.classes.push(value),
                "sections" => form.sections.push(value),
                "subjects" => form.subjects.push(value),
                "password" => form.password = Some(SecretString::from(value)),
                "generate_password" => form.generate_password = value == "on",
                _ => {}
            }
        }
        form
    }

    pub fn validate(
        self,
        is_new: bool,
    ) -> Result<(TeacherDetails, PasswordChoice), TeacherFormError> {
        let mut errors = TeacherFormError::empty();

        let teacher_id = non_empty(self.teacher_id);
        if teacher_id.is_none() {
            errors |= TeacherFormError::EMPTY_TEACHER_ID;
        }
        let name = non_empty(self.name);
        if name.is_none() {
            errors |= TeacherFormError::EMPTY_NAME;
        }

        let email = match non_empty(self.email) {
            None => {
                errors |= TeacherFormError::EMPTY_EMAIL;
                None
            }
            Some(email) => {
                let parsed = EmailAddress::from_str(&email).ok();
                if parsed.is_none() {
                    errors |= TeacherFormError::INVALID_EMAIL;
                }
                parsed
            }
        };

        let mut classes: Vec<ClassNumber> = self
            .classes
            .iter()
            .filter_map(|class| ClassNumber::parse(class))
            .collect();
        classes.sort_unstable();
        classes.dedup();
        let classes: Vec<String> = classes.into_iter().map(|class| class.to_string()).collect();
        if classes.is_empty() {
            errors |= TeacherFormError::NO_CLASSES;
        }

        let mut sections: Vec<String> = self
            .sections
            .into_iter()
            .filter_map(non_empty)
            .map(|section| section.to_uppercase())
            .collect();
        sections.sort_unstable();
        sections.dedup();
        if sections.is_empty() {
            errors |= TeacherFormError::NO_SECTIONS;
        }

        let mut subjects: Vec<String> = self.subjects.into_iter().filter_map(non_empty).collect();
        subjects.sort_unstable();
        subjects.dedup();
        if subjects.is_empty() {
            errors |= TeacherFormError::NO_SUBJECTS;
        }

        if !classes.is_empty() {
            let offered_sections = available_sections(&classes);
            if sections
                .iter()
                .any(|section| !offered_sections.contains(&section.as_str()))
            {
                errors |= TeacherFormError::SECTION_NOT_OFFERED;
            }

            let offered_subjects = available_subjects(&classes);
            if subjects.iter().any(|subject| {
                !offered_subjects
                    .iter()
                    .any(|offered| offered.eq_ignore_ascii_case(subject))
            }) {
                errors |= TeacherFormError::SUBJECT_NOT_OFFERED;
            }
        }

        let password = PasswordChoice::from_form(self.password.as_ref(), self.generate_password);
        if is_new && matches!(password, PasswordChoice::Unchanged) {
            errors |= TeacherFormError::EMPTY_PASSWORD;
        }

        match (teacher_id, name, email) {
            (Some(teacher_id), Some(name), Some(email)) if errors.is_empty() => Ok((
                TeacherDetails {
                    teacher_id,
                    name,
                    email,
                    phone: non_empty(self.phone),
                    classes,
                    sections,
                    subjects,
                    profile_photo: non_empty(self.profile_photo),
                },
                password,
            )),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeacherDetails {
    pub teacher_id: String,
    pub name: String,
    pub email: EmailAddress,
    pub phone: Option<String>,
    pub classes: Vec<String>,
    pub sections: Vec<String>,
    pub subjects: Vec<String>,
    pub profile_photo: Option<String>,
}

impl From<&Teacher> for TeacherForm {
    fn from(teacher: &Teacher) -> Self {
        Self {
            teacher_id: teacher.teacher_id.clone(),
            name: teacher.name.clone(),
            email: teacher.email.clone(),
            phone: teacher.phone.clone().unwrap_or_default(),
            profile_photo: teacher.profile_photo.clone().unwrap_or_default(),
            classes: teacher.classes.clone(),
            sections: teacher.sections.clone(),
            subjects: teacher.subjects.clone(),
            password: None,
            generate_password: false,
        }
    }
}

///one entry of the JSON teacher roster, eg. `{"teacherId": "T-12", "classes": [6, "7"], ...}`
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RosterTeacher {
    pub teacher_id: serde_json::Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub classes: Vec<serde_json::Value>,
    #[serde(default)]
    pub sections: Vec<serde_json::Value>,
    #[serde(default)]
    pub subjects: Vec<serde_json::Value>,
    #[serde(default)]
    pub profile_photo: Option<String>,
}

fn json_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl RosterTeacher {
    ///roster teachers always get a generated password
    pub fn into_form(self) -> TeacherForm {
        TeacherForm {
            teacher_id: json_to_string(self.teacher_id),
            name: self.name,
            email: self.email,
            phone: self.phone.unwrap_or_default(),
            profile_photo: self.profile_photo.unwrap_or_default(),
            classes: self.classes.into_iter().map(json_to_string).collect(),
            sections: self.sections.into_iter().map(json_to_string).collect(),
            subjects: self.subjects.into_iter().map(json_to_string).collect(),
            password: None,
            generate_password: true,
        }
    }
}

pub struct AddTeacher {
    pub details: TeacherDetails,
    pub password: Option<NewPassword>,
}

impl DataType for Teacher {
    type Id = Uuid;
    type FormForAdding = AddTeacher;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            teacher_columns!(),
            " FROM teachers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            teacher_columns!(),
            " FROM teachers ORDER BY name"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddTeacher { details, password } = to_be_added;

        let (hashed, is_default) = match password {
            Some(NewPassword {
                plaintext,
                is_default,
            }) => (Some(hash_password(plaintext).await?), is_default),
            None => (None, false),
        };

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO teachers (teacher_id, name, email, phone, classes, sections, subjects, profile_photo, bcrypt_hashed_password, current_password_is_default) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(details.teacher_id)
        .bind(details.name)
        .bind(details.email.as_str())
        .bind(details.phone)
        .bind(details.classes)
        .bind(details.sections)
        .bind(details.subjects)
        .bind(details.profile_photo)
        .bind(hashed)
        .bind(is_default)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, "Added teacher");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM teachers WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed teacher");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn teacher(classes: &[&str], sections: &[&str], subjects: &[&str]) -> Teacher {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(ToString::to_string).collect() };
        Teacher {
            id: Uuid::nil(),
            teacher_id: "T-1".into(),
            name: "Meera Iyer".into(),
            email: "meera@example.org".into(),
            phone: None,
            classes: owned(classes),
            sections: owned(sections),
            subjects: owned(subjects),
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn repeated_keys_become_lists() {
        let form = TeacherForm::from_pairs(pairs(&[
            ("teacher_id", "T-9"),
            ("name", "Ravi"),
            ("classes", "6"),
            ("classes", "7"),
            ("sections", "A"),
            ("subjects", "Maths"),
            ("subjects", "Science"),
            ("generate_password", "on"),
            ("unexpected", "ignored"),
        ]));
        assert_eq!(form.teacher_id, "T-9");
        assert_eq!(form.classes, vec!["6", "7"]);
        assert_eq!(form.subjects, vec!["Maths", "Science"]);
        assert!(form.generate_password);
    }

    #[test]
    fn teacher_needs_a_class_section_and_subject() {
        let form = TeacherForm {
            teacher_id: "T-9".into(),
            name: "Ravi".into(),
            email: "ravi@example.org".into(),
            generate_password: true,
            ..TeacherForm::default()
        };
        let errors = form.validate(true).unwrap_err();
        assert_eq!(
            errors,
            TeacherFormError::NO_CLASSES | TeacherFormError::NO_SECTIONS | TeacherFormError::NO_SUBJECTS
        );
        assert_eq!(
            errors.as_nice_list().collect::<Vec<_>>(),
            vec![
                "Please select at least one class",
                "Please select at least one section",
                "Please select at least one subject"
            ]
        );
    }

    #[test]
    fn valid_teacher_is_normalised() {
        let form = TeacherForm {
            teacher_id: " T-9 ".into(),
            name: "Ravi".into(),
            email: "ravi@example.org".into(),
            classes: vec!["10".into(), "9".into(), "9".into(), "eleven".into()],
            sections: vec!["neev".into(), "A".into()],
            subjects: vec!["AI".into(), "Maths".into()],
            generate_password: true,
            ..TeacherForm::default()
        };
        let (details, password) = form.validate(true).expect("valid teacher");
        assert_eq!(details.teacher_id, "T-9");
        assert_eq!(details.classes, vec!["9", "10"]);
        assert_eq!(details.sections, vec!["A", "NEEV"]);
        assert!(matches!(password, PasswordChoice::Generate));
    }

    #[test]
    fn sections_and_subjects_must_match_the_classes() {
        let form = TeacherForm {
            teacher_id: "T-2".into(),
            name: "Ravi".into(),
            email: "ravi@example.org".into(),
            classes: vec!["3".into()],
            sections: vec!["NEEV".into()],
            subjects: vec!["AI".into()],
            password: Some(SecretString::from("hunter2")),
            ..TeacherForm::default()
        };
        assert_eq!(
            form.validate(true).unwrap_err(),
            TeacherFormError::SECTION_NOT_OFFERED | TeacherFormError::SUBJECT_NOT_OFFERED
        );
    }

    #[test]
    fn teaches_is_case_insensitive_on_sections() {
        let t = teacher(&["7", "8"], &["a", "B"], &["Maths"]);
        assert!(t.teaches("7", "A"));
        assert!(t.teaches(" 8 ", "b"));
        assert!(!t.teaches("9", "A"));
        assert!(!t.teaches("7", "C"));
        assert!(t.teaches_subject("maths"));
        assert!(!t.teaches_subject("EVS"));

        let everywhere = teacher(&["7"], &[], &["Maths"]);
        assert!(everywhere.teaches("7", "C"));

        let mixed = teacher(&["6", "9"], &["A", "NEEV"], &["Maths"]);
        assert!(mixed.teaches("9", "neev"));
        assert!(!mixed.teaches("6", "NEEV"));
    }

    #[test]
    fn class_sections_only_lists_sections_the_class_runs() {
        let t = teacher(&["6", "9"], &["A", "NEEV"], &["Maths"]);
        assert_eq!(
            t.class_sections(),
            vec![
                ("6".to_string(), "A".to_string()),
                ("9".to_string(), "A".to_string()),
                ("9".to_string(), "NEEV".to_string()),
            ]
        );
    }

    #[test]
    fn roster_entries_accept_numbers_and_strings() {
        let roster: Vec<RosterTeacher> = serde_json::from_str(
            r#"[{"teacherId": 42, "name": "Kiran", "email": "kiran@example.org",
                 "classes": [6, "7"], "sections": ["A"], "subjects": ["Maths"],
                 "profilePhoto": "https://example.org/kiran.png"}]"#,
        )
        .expect("roster parses");
        let form = roster.into_iter().next().expect("one entry").into_form();
        assert_eq!(form.teacher_id, "42");
        assert_eq!(form.classes, vec!["6", "7"]);
        assert_eq!(form.profile_photo, "https://example.org/kiran.png");
        assert!(form.generate_password);
        assert!(form.validate(true).is_ok());
    }
}
