use crate::auth::{PermissionsTarget, backend::SchoolAuthBackend};
use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use axum_login::tower_sessions::cookie::time::OffsetDateTime;
use maud::html;
use snafu::Snafu;
use std::num::ParseIntError;
use uuid::Uuid;

pub type SchoolResult<T> = Result<T, SchoolError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchoolError {
    #[snafu(display("Error opening database"))]
    OpenDatabase { source: sqlx::Error },
    #[snafu(display("Error getting db connection"))]
    GetDatabaseConnection { source: sqlx::Error },
    #[snafu(display("Error making SQL query"))]
    MakeQuery { source: sqlx::Error },
    #[snafu(display("Error commiting SQL transaction"))]
    CommitTransaction { source: sqlx::Error },
    #[snafu(display("Error rolling back SQL transaction"))]
    RollbackTransaction { source: sqlx::Error },
    #[snafu(display("Error migrating DB schema"))]
    MigrateError { source: sqlx::migrate::MigrateError },
    #[snafu(display("Error converting {} to `chrono::DateTime`", odt))]
    InvalidDateTime { odt: OffsetDateTime },
    #[snafu(display("Error converting unix timestamp {} to `time::OffsetDateTime`", timestamp))]
    InvalidChronoDateTime {
        source: axum_login::tower_sessions::cookie::time::error::ComponentRange,
        timestamp: i64,
    },
    #[snafu(display("Error serialising with rmp_serde"))]
    RmpSerdeEncode { source: rmp_serde::encode::Error },
    #[snafu(display("Error deserialising with rmp_serde"))]
    RmpSerdeDecode { source: rmp_serde::decode::Error },
    #[snafu(display("Unable to retrieve env var `{}`", name))]
    BadEnvVar {
        source: dotenvy::Error,
        name: &'static str,
    },
    #[snafu(display("Unable to parse `{}` as a number", name))]
    ParseNumber {
        source: ParseIntError,
        name: &'static str,
    },
    #[snafu(display("Unable to parse date {:?}", original))]
    ParseDate {
        source: chrono::ParseError,
        original: String,
    },
    #[snafu(display("Unable to parse uuid {:?}", original))]
    ParseUuid {
        source: uuid::Error,
        original: String,
    },
    #[snafu(display("{:?} is not a valid {}", provided, kind))]
    ParseEnum {
        kind: &'static str,
        provided: String,
    },
    #[snafu(display("Form was missing the `{}` field", field))]
    MissingFormField { field: &'static str },
    #[snafu(display("Unable to find student with UUID: {}", id))]
    MissingStudent { id: Uuid },
    #[snafu(display("Unable to find teacher with UUID: {}", id))]
    MissingTeacher { id: Uuid },
    #[snafu(display("Unable to find user with UUID: {}", id))]
    MissingUser { id: Uuid },
    #[snafu(display("Unable to find gallery image with UUID: {}", id))]
    MissingGalleryImage { id: Uuid },
    #[snafu(display("Unable to find notice with UUID: {}", id))]
    MissingNotice { id: Uuid },
    #[snafu(display("Unable to find homework with UUID: {}", id))]
    MissingHomework { id: Uuid },
    #[snafu(display("Unable to find grade with UUID: {}", id))]
    MissingGrade { id: Uuid },
    #[snafu(display("Error with hashing/password verification"))]
    Bcrypt { source: bcrypt::BcryptError },
    #[snafu(display("Error joining blocking task"))]
    JoinTask { source: tokio::task::JoinError },
    #[snafu(display("Error with sessions"))]
    TowerSession {
        source: axum_login::tower_sessions::session::Error,
    },
    #[snafu(display(
        "Tried to get user information, found either no user or the incorrect kind of user"
    ))]
    UnableToFindUserInfo,
    #[snafu(display("Tried to {:?}, only had {:?}", needed.iter_names().map(|(name, _)| name).collect::<Vec<_>>(), found.iter_names().map(|(name, _)| name).collect::<Vec<_>>()))]
    IncorrectPermissions {
        needed: PermissionsTarget,
        found: PermissionsTarget,
    },
    #[snafu(display("You cannot assign homework to class {}.", class_name))]
    ClassNotTaught { class_name: String },
    #[snafu(display("You cannot assign homework to section {}.", section))]
    SectionNotTaught { section: String },
    #[snafu(display("You do not teach {} to class {} section {}.", subject, class_name, section))]
    SubjectNotTaught {
        subject: String,
        class_name: String,
        section: String,
    },
    #[snafu(display("You do not teach class {} section {}.", class_name, section))]
    ClassSectionNotTaught { class_name: String, section: String },
    #[snafu(display("Please provide a title for the homework."))]
    EmptyHomeworkTitle,
    #[snafu(display("You do not teach {}'s class.", student))]
    StudentNotTaught { student: String },
    #[snafu(display("Only the teacher who assigned homework can remove it."))]
    NotHomeworkOwner,
    #[snafu(display("Error with multipart form input"))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("Error encoding query string"))]
    UrlEncode { source: serde_urlencoded::ser::Error },
    #[snafu(display("Password length {} is too large", min_len))]
    PasswordLengthTooLarge { min_len: usize },
    #[snafu(display("Error with CSVs"))]
    Csv { source: csv::Error },
    #[snafu(display("Error flushing CSV output"))]
    CsvFlush { source: std::io::Error },
    #[snafu(display("Error parsing JSON roster"))]
    Json { source: serde_json::Error },
}

impl From<axum_login::Error<SchoolAuthBackend>> for SchoolError {
    fn from(value: axum_login::Error<SchoolAuthBackend>) -> Self {
        match value {
            axum_login::Error::Session(source) => Self::TowerSession { source },
            axum_login::Error::Backend(backend) => backend,
        }
    }
}

impl SchoolError {
    pub fn status_code(&self) -> StatusCode {
        const ISE: StatusCode = StatusCode::INTERNAL_SERVER_ERROR; //internal server error
        const NF: StatusCode = StatusCode::NOT_FOUND; //not found
        const NA: StatusCode = StatusCode::FORBIDDEN; //not allowed
        const BI: StatusCode = StatusCode::BAD_REQUEST; //bad input

        #[allow(clippy::match_same_arms)]
        match self {
            Self::OpenDatabase { .. } | Self::GetDatabaseConnection { .. } => ISE,
            Self::MigrateError { .. } => ISE,
            Self::MakeQuery { source } => match source {
                sqlx::Error::RowNotFound => NF,
                sqlx::Error::Database(db) if db.is_unique_violation() => StatusCode::CONFLICT,
                sqlx::Error::Database(db) if db.is_check_violation() => BI,
                _ => ISE,
            },
            Self::CommitTransaction { .. } | Self::RollbackTransaction { .. } => ISE,
            Self::InvalidDateTime { .. } | Self::InvalidChronoDateTime { .. } => ISE,
            Self::RmpSerdeEncode { .. } => ISE,
            Self::RmpSerdeDecode { .. } => BI,
            Self::BadEnvVar { .. } | Self::ParseNumber { .. } => ISE,
            Self::ParseDate { .. } | Self::ParseUuid { .. } | Self::ParseEnum { .. } => BI,
            Self::MissingFormField { .. } => BI,
            Self::MissingStudent { .. }
            | Self::MissingTeacher { .. }
            | Self::MissingUser { .. }
            | Self::MissingGalleryImage { .. }
            | Self::MissingNotice { .. }
            | Self::MissingHomework { .. }
            | Self::MissingGrade { .. } => NF,
            Self::Bcrypt { .. } | Self::JoinTask { .. } => ISE,
            Self::TowerSession { .. } => ISE,
            Self::UnableToFindUserInfo => NF,
            Self::IncorrectPermissions { .. } => NA,
            Self::ClassNotTaught { .. }
            | Self::SectionNotTaught { .. }
            | Self::SubjectNotTaught { .. }
            | Self::ClassSectionNotTaught { .. }
            | Self::StudentNotTaught { .. }
            | Self::NotHomeworkOwner => NA,
            Self::EmptyHomeworkTitle => BI,
            Self::Multipart { source } => source.status(),
            Self::UrlEncode { .. } | Self::PasswordLengthTooLarge { .. } => ISE,
            Self::Csv { .. } | Self::Json { .. } => BI,
            Self::CsvFlush { .. } => ISE,
        }
    }
}

impl IntoResponse for SchoolError {
    fn into_response(self) -> Response {
        let basic_error = |desc| {
            html! {
                div class="bg-red-100 border border-red-400 text-red-700 px-4 py-3 rounded relative mb-4" role="alert" {
                    strong class="font-bold" {"Error: "}
                    span {(desc)}
                }
            }
        };

        let status_code = self.status_code();
        if status_code.is_server_error() {
            error!(?self, "Error!");
        } else {
            warn!(?self, "Request rejected");
        }

        //htmx requests get the alert swapped into the notification area
        (
            status_code,
            [
                (
                    HeaderName::from_static("hx-retarget"),
                    HeaderValue::from_static("#notifications"),
                ),
                (
                    HeaderName::from_static("hx-reswap"),
                    HeaderValue::from_static("innerHTML"),
                ),
            ],
            basic_error(self.to_string()),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homework_messages_name_the_class() {
        let err = SchoolError::ClassNotTaught {
            class_name: "7".into(),
        };
        assert_eq!(err.to_string(), "You cannot assign homework to class 7.");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = SchoolError::SectionNotTaught {
            section: "NEEV".into(),
        };
        assert_eq!(err.to_string(), "You cannot assign homework to section NEEV.");
    }

    #[test]
    fn missing_rows_are_not_found() {
        let id = Uuid::nil();
        assert_eq!(
            SchoolError::MissingNotice { id }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SchoolError::MissingStudent { id }.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn permission_error_lists_flag_names() {
        let err = SchoolError::IncorrectPermissions {
            needed: PermissionsTarget::CRUD_USERS,
            found: PermissionsTarget::VIEW_STUDENT_DASHBOARD,
        };
        let msg = err.to_string();
        assert!(msg.contains("CRUD_USERS"));
        assert!(msg.contains("VIEW_STUDENT_DASHBOARD"));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn error_response_targets_notification_area() {
        let response = SchoolError::EmptyHomeworkTitle.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("hx-retarget").map(HeaderValue::as_bytes),
            Some(b"#notifications".as_slice())
        );
    }
}
