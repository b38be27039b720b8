use crate::{
    auth::{NewPassword, PasswordChoice, hash_password, set_password},
    data::{
        DataType,
        curriculum::{BLOOD_GROUPS, ClassNumber},
        non_empty,
        school_class::SchoolClass,
        user::Role,
    },
    error::{MakeQuerySnafu, ParseEnumSnafu, SchoolError, SchoolResult},
};
use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, Utc};
use email_address::EmailAddress;
use maud::Render;
use secrecy::SecretString;
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use std::{fmt, str::FromStr};
use uuid::Uuid;

macro_rules! student_columns {
    () => {
        "id, admission_id, name, email, phone, class_name, section, class_id, dob, blood_group, father_name, mother_name, address, profile_photo, status, created_at"
    };
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Student {
    pub id: Uuid,
    pub admission_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub class_name: String,
    pub section: String,
    pub class_id: Option<Uuid>,
    pub dob: Option<NaiveDate>,
    pub blood_group: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub address: Option<String>,
    pub profile_photo: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Render for Student {
    fn render_to(&self, buffer: &mut String) {
        self.name.render_to(buffer);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BloodGroup {
    APositive,
    ANegative,
    BPositive,
    BNegative,
    OPositive,
    ONegative,
    AbPositive,
    AbNegative,
}

impl BloodGroup {
    pub const ALL: [Self; 8] = [
        Self::APositive,
        Self::ANegative,
        Self::BPositive,
        Self::BNegative,
        Self::OPositive,
        Self::ONegative,
        Self::AbPositive,
        Self::AbNegative,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::APositive => BLOOD_GROUPS[0],
            Self::ANegative => BLOOD_GROUPS[1],
            Self::BPositive => BLOOD_GROUPS[2],
            Self::BNegative => BLOOD_GROUPS[3],
            Self::OPositive => BLOOD_GROUPS[4],
            Self::ONegative => BLOOD_GROUPS[5],
            Self::AbPositive => BLOOD_GROUPS[6],
            Self::AbNegative => BLOOD_GROUPS[7],
        }
    }
}

impl FromStr for BloodGroup {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == trimmed)
            .ok_or_else(|| {
                ParseEnumSnafu {
                    kind: "blood group",
                    provided: s,
                }
                .build()
            })
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct StudentFormError: u16 {
        const EMPTY_ADMISSION_ID =       0b0000_0000_0001;
        const EMPTY_NAME =               0b0000_0000_0010;
        const EMPTY_EMAIL =              0b0000_0000_0100;
        const INVALID_EMAIL =            0b0000_0000_1000;
        const MISSING_CLASS_OR_SECTION = 0b0000_0001_0000;
        const SECTION_NOT_OFFERED =      0b0000_0010_0000;
        const MISSING_DOB =              0b0000_0100_0000;
        const INVALID_DOB =              0b0000_1000_0000;
        const INVALID_BLOOD_GROUP =      0b0001_0000_0000;
        const EMPTY_PASSWORD =           0b0010_0000_0000;
    }
}

impl StudentFormError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::EMPTY_ADMISSION_ID => Some("Please provide an Admission ID"),
            Self::EMPTY_NAME => Some("Please provide the student's name"),
            Self::EMPTY_EMAIL => Some("Please provide an email address"),
            Self::INVALID_EMAIL => Some("Provided email address was invalid"),
            Self::MISSING_CLASS_OR_SECTION => Some("Please select class and section"),
            Self::SECTION_NOT_OFFERED => Some("That section is not offered for the chosen class"),
            Self::MISSING_DOB => Some("Please provide a date of birth"),
            Self::INVALID_DOB => Some("Date of birth must be a date like 2012-04-30"),
            Self::INVALID_BLOOD_GROUP => Some("Blood group must be one of A+, A-, B+, B-, O+, O-, AB+ or AB-"),
            Self::EMPTY_PASSWORD => Some("Please provide a password, or auto-generate one"),
            _ => None,
        })
    }
}

///used both for the add/edit forms and for rows of an imported CSV
#[derive(Deserialize, Default, Debug, Clone)]
pub struct StudentForm {
    #[serde(default)]
    pub admission_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub dob: String,
    #[serde(default)]
    pub blood_group: String,
    #[serde(default)]
    pub father_name: String,
    #[serde(default)]
    pub mother_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub profile_photo: String,
    pub password: Option<SecretString>,
    pub generate_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentDetails {
    pub admission_id: String,
    pub name: String,
    pub email: EmailAddress,
    pub phone: Option<String>,
    pub class_name: ClassNumber,
    pub section: String,
    pub dob: NaiveDate,
    pub blood_group: Option<BloodGroup>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub address: Option<String>,
    pub profile_photo: Option<String>,
}

impl StudentForm {
    pub fn validate(
        self,
        is_new: bool,
    ) -> Result<(StudentDetails, PasswordChoice), StudentFormError> {
        let mut errors = StudentFormError::empty();

        let admission_id = non_empty(self.admission_id);
        if admission_id.is_none() {
            errors |= StudentFormError::EMPTY_ADMISSION_ID;
        }
        let name = non_empty(self.name);
        if name.is_none() {
            errors |= StudentFormError::EMPTY_NAME;
        }

        let email = match non_empty(self.email) {
            None => {
                errors |= StudentFormError::EMPTY_EMAIL;
                None
            }
            Some(email) => {
                let parsed = EmailAddress::from_str(&email).ok();
                if parsed.is_none() {
                    errors |= StudentFormError::INVALID_EMAIL;
                }
                parsed
            }
        };

        let class_name = ClassNumber::parse(&self.class_name);
        let section = non_empty(self.section).map(|section| section.to_uppercase());
        match (class_name, section.as_deref()) {
            (Some(class), Some(section)) => {
                if !class.offers_section(section) {
                    errors |= StudentFormError::SECTION_NOT_OFFERED;
                }
            }
            _ => errors |= StudentFormError::MISSING_CLASS_OR_SECTION,
        }

        let dob = match non_empty(self.dob) {
            None => {
                errors |= StudentFormError::MISSING_DOB;
                None
            }
            Some(dob) => {
                let parsed = NaiveDate::parse_from_str(&dob, "%Y-%m-%d").ok();
                if parsed.is_none() {
                    errors |= StudentFormError::INVALID_DOB;
                }
                parsed
            }
        };

        let blood_group = match non_empty(self.blood_group) {
            None => None,
            Some(group) => {
                let parsed = group.parse::<BloodGroup>().ok();
                if parsed.is_none() {
                    errors |= StudentFormError::INVALID_BLOOD_GROUP;
                }
                parsed
            }
        };

        let password = PasswordChoice::from_form(
            self.password.as_ref(),
            self.generate_password.as_deref() == Some("on"),
        );
        if is_new && matches!(password, PasswordChoice::Unchanged) {
            errors |= StudentFormError::EMPTY_PASSWORD;
        }

        match (admission_id, name, email, class_name, section, dob) {
            (Some(admission_id), Some(name), Some(email), Some(class_name), Some(section), Some(dob))
                if errors.is_empty() =>
            {
                Ok((
                    StudentDetails {
                        admission_id,
                        name,
                        email,
                        phone: non_empty(self.phone),
                        class_name,
                        section,
                        dob,
                        blood_group,
                        father_name: non_empty(self.father_name),
                        mother_name: non_empty(self.mother_name),
                        address: non_empty(self.address),
                        profile_photo: non_empty(self.profile_photo),
                    },
                    password,
                ))
            }
            _ => Err(errors),
        }
    }
}

impl From<&Student> for StudentForm {
    ///prefills the edit form, leaving the password blank so it is kept
    fn from(student: &Student) -> Self {
        Self {
            admission_id: student.admission_id.clone(),
            name: student.name.clone(),
            email: student.email.clone(),
            phone: student.phone.clone().unwrap_or_default(),
            class_name: student.class_name.clone(),
            section: student.section.clone(),
            dob: student
                .dob
                .map(|dob| dob.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            blood_group: student.blood_group.clone().unwrap_or_default(),
            father_name: student.father_name.clone().unwrap_or_default(),
            mother_name: student.mother_name.clone().unwrap_or_default(),
            address: student.address.clone().unwrap_or_default(),
            profile_photo: student.profile_photo.clone().unwrap_or_default(),
            password: None,
            generate_password: None,
        }
    }
}

pub struct AddStudent {
    pub details: StudentDetails,
    pub password: Option<NewPassword>,
}

impl DataType for Student {
    type Id = Uuid;
    type FormForAdding = AddStudent;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            student_columns!(),
            " FROM students WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }

    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            student_columns!(),
            " FROM students ORDER BY name"
        ))
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddStudent { details, password } = to_be_added;

        let class_id = Self::class_id_for(&details, &mut *conn).await?;
        let (hashed, is_default) = match password {
            Some(NewPassword {
                plaintext,
                is_default,
            }) => (Some(hash_password(plaintext).await?), is_default),
            None => (None, false),
        };

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO students (admission_id, name, email, phone, class_name, section, class_id, dob, blood_group, father_name, mother_name, address, profile_photo, bcrypt_hashed_password, current_password_is_default) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) RETURNING id",
        )
        .bind(details.admission_id)
        .bind(details.name)
        .bind(details.email.as_str())
        .bind(details.phone)
        .bind(details.class_name.to_string())
        .bind(details.section)
        .bind(class_id)
        .bind(details.dob)
        .bind(details.blood_group.map(|group| group.as_str()))
        .bind(details.father_name)
        .bind(details.mother_name)
        .bind(details.address)
        .bind(details.profile_photo)
        .bind(hashed)
        .bind(is_default)
        .fetch_one(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, "Added student");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        info!(%id, "Removed student");
        Ok(())
    }
}

impl Student {
    ///null when the class and section have no row in `classes`
    async fn class_id_for(
        details: &StudentDetails,
        conn: &mut PgConnection,
    ) -> SchoolResult<Option<Uuid>> {
        let name = details.class_name.to_string();
        Ok(
            SchoolClass::find_by_name_and_section(&name, &details.section, conn)
                .await?
                .map(|class| class.id),
        )
    }

    ///the admission id is never changed, and the password only when a new one is given
    pub async fn update_in_database(
        id: Uuid,
        details: StudentDetails,
        password: Option<NewPassword>,
        conn: &mut PgConnection,
    ) -> SchoolResult<()> {
        let class_id = Self::class_id_for(&details, &mut *conn).await?;

        sqlx::query(
            "UPDATE students SET name = $2, email = $3, phone = $4, class_name = $5, section = $6, class_id = $7, dob = $8, blood_group = $9, father_name = $10, mother_name = $11, address = $12, profile_photo = $13 WHERE id = $1",
        )
        .bind(id)
        .bind(details.name)
        .bind(details.email.as_str())
        .bind(details.phone)
        .bind(details.class_name.to_string())
        .bind(details.section)
        .bind(class_id)
        .bind(details.dob)
        .bind(details.blood_group.map(|group| group.as_str()))
        .bind(details.father_name)
        .bind(details.mother_name)
        .bind(details.address)
        .bind(details.profile_photo)
        .execute(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

        if let Some(NewPassword {
            plaintext,
            is_default,
        }) = password
        {
            set_password(id, Role::Student, plaintext, conn, is_default).await?;
        }

        info!(%id, "Updated student");
        Ok(())
    }

    pub async fn get_in_class(
        class_name: &str,
        section: &str,
        pool: &Pool<Postgres>,
    ) -> SchoolResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            student_columns!(),
            " FROM students WHERE class_name = $1 AND upper(section) = upper($2) ORDER BY name"
        ))
        .bind(class_name.trim())
        .bind(section.trim())
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)
    }

    pub async fn get_by_admission_id(
        admission_id: &str,
        conn: &mut PgConnection,
    ) -> SchoolResult<Option<Self>> {
        sqlx::query_as::<_, Self>(concat!(
            "SELECT ",
            student_columns!(),
            " FROM students WHERE admission_id = $1"
        ))
        .bind(admission_id.trim())
        .fetch_optional(conn)
        .await
        .context(MakeQuerySnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> StudentForm {
        StudentForm {
            admission_id: "ADM-1042".into(),
            name: "Asha Verma".into(),
            email: "asha@example.org".into(),
            class_name: "9".into(),
            section: "NEEV".into(),
            dob: "2011-08-17".into(),
            blood_group: "b+".into(),
            generate_password: Some("on".into()),
            ..StudentForm::default()
        }
    }

    #[test]
    fn complete_form_validates() {
        let (details, password) = complete_form().validate(true).expect("form is complete");
        assert_eq!(details.class_name.get(), 9);
        assert_eq!(details.section, "NEEV");
        assert_eq!(details.blood_group, Some(BloodGroup::BPositive));
        assert_eq!(details.phone, None);
        assert!(matches!(password, PasswordChoice::Generate));
    }

    #[test]
    fn missing_class_or_section_is_reported_once() {
        let form = StudentForm {
            section: String::new(),
            ..complete_form()
        };
        assert_eq!(
            form.validate(true).unwrap_err(),
            StudentFormError::MISSING_CLASS_OR_SECTION
        );

        let form = StudentForm {
            class_name: String::new(),
            ..complete_form()
        };
        let errors = form.validate(true).unwrap_err();
        assert_eq!(
            errors.as_nice_list().collect::<Vec<_>>(),
            vec!["Please select class and section"]
        );
    }

    #[test]
    fn neev_is_rejected_for_junior_classes() {
        let form = StudentForm {
            class_name: "4".into(),
            ..complete_form()
        };
        assert_eq!(
            form.validate(true).unwrap_err(),
            StudentFormError::SECTION_NOT_OFFERED
        );
    }

    #[test]
    fn empty_form_collects_every_error() {
        let errors = StudentForm::default().validate(true).unwrap_err();
        assert!(errors.contains(StudentFormError::EMPTY_ADMISSION_ID));
        assert!(errors.contains(StudentFormError::EMPTY_NAME));
        assert!(errors.contains(StudentFormError::EMPTY_EMAIL));
        assert!(errors.contains(StudentFormError::MISSING_CLASS_OR_SECTION));
        assert!(errors.contains(StudentFormError::MISSING_DOB));
        assert!(errors.contains(StudentFormError::EMPTY_PASSWORD));
        assert!(!errors.contains(StudentFormError::INVALID_BLOOD_GROUP));
    }

    #[test]
    fn editing_without_password_keeps_the_old_one() {
        let form = StudentForm {
            generate_password: None,
            ..complete_form()
        };
        assert_eq!(
            form.clone().validate(true).unwrap_err(),
            StudentFormError::EMPTY_PASSWORD
        );
        let (_, password) = form.validate(false).expect("password optional when editing");
        assert!(matches!(password, PasswordChoice::Unchanged));
    }

    #[test]
    fn bad_email_dob_and_blood_group() {
        let form = StudentForm {
            email: "not-an-email".into(),
            dob: "17/08/2011".into(),
            blood_group: "C+".into(),
            ..complete_form()
        };
        let errors = form.validate(true).unwrap_err();
        assert_eq!(
            errors,
            StudentFormError::INVALID_EMAIL
                | StudentFormError::INVALID_DOB
                | StudentFormError::INVALID_BLOOD_GROUP
        );
    }

    #[test]
    fn blood_groups_parse_case_insensitively() {
        assert_eq!("ab-".parse::<BloodGroup>().unwrap(), BloodGroup::AbNegative);
        assert_eq!(" O+ ".parse::<BloodGroup>().unwrap(), BloodGroup::OPositive);
        assert!("Z".parse::<BloodGroup>().is_err());
        for group in BloodGroup::ALL {
            assert_eq!(group.to_string().parse::<BloodGroup>().unwrap(), group);
        }
    }
}
