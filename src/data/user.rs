use crate::{
    auth::{PermissionsTarget, hash_password},
    data::{DataType, student::Student, teacher::Teacher},
    error::{MakeQuerySnafu, ParseEnumSnafu, SchoolError, SchoolResult},
};
use axum_login::AuthUser;
use email_address::EmailAddress;
use maud::Render;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::ResultExt;
use sqlx::{PgConnection, Pool, Postgres};
use std::{fmt, str::FromStr, sync::LazyLock};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Admin, Self::Teacher, Self::Student];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    ///what people of this role log in with
    pub const fn identifier_label(self) -> &'static str {
        match self {
            Self::Admin => "Email",
            Self::Teacher => "Teacher ID",
            Self::Student => "Admission ID",
        }
    }

    pub const fn dashboard(self) -> &'static str {
        match self {
            Self::Admin => "/admin",
            Self::Teacher => "/teacher",
            Self::Student => "/student",
        }
    }
}

impl FromStr for Role {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == lowered)
            .ok_or_else(|| {
                ParseEnumSnafu {
                    kind: "role",
                    provided: s,
                }
                .build()
            })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum UserKind {
    Admin,
    Teacher(Teacher),
    Student(Student),
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub bcrypt_hashed_password: Option<SecretString>,
    pub current_password_is_default: bool,
    pub kind: UserKind,
}

#[derive(sqlx::FromRow)]
struct Credentials {
    bcrypt_hashed_password: Option<String>,
    current_password_is_default: bool,
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: Uuid,
    name: String,
    email: String,
    bcrypt_hashed_password: Option<String>,
    current_password_is_default: bool,
}

pub struct AddAdmin {
    pub name: String,
    pub email: EmailAddress,
    pub password: SecretString,
}

impl DataType for User {
    type Id = Uuid;
    type FormForAdding = AddAdmin;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<Option<Self>> {
        if let Some(admin) = sqlx::query_as::<_, AdminRow>(
            "SELECT id, name, email, bcrypt_hashed_password, current_password_is_default FROM admins WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context(MakeQuerySnafu)?
        {
            return Ok(Some(Self {
                id: admin.id,
                name: admin.name,
                email: admin.email,
                bcrypt_hashed_password: admin.bcrypt_hashed_password.map(SecretString::from),
                current_password_is_default: admin.current_password_is_default,
                kind: UserKind::Admin,
            }));
        }

        if let Some(teacher) = Teacher::get_from_db_by_id(id, &mut *conn).await? {
            let credentials = Self::credentials(Role::Teacher, id, conn).await?;
            return Ok(Some(Self {
                id,
                name: teacher.name.clone(),
                email: teacher.email.clone(),
                bcrypt_hashed_password: credentials
                    .bcrypt_hashed_password
                    .map(SecretString::from),
                current_password_is_default: credentials.current_password_is_default,
                kind: UserKind::Teacher(teacher),
            }));
        }

        if let Some(student) = Student::get_from_db_by_id(id, &mut *conn).await? {
            let credentials = Self::credentials(Role::Student, id, conn).await?;
            return Ok(Some(Self {
                id,
                name: student.name.clone(),
                email: student.email.clone(),
                bcrypt_hashed_password: credentials
                    .bcrypt_hashed_password
                    .map(SecretString::from),
                current_password_is_default: credentials.current_password_is_default,
                kind: UserKind::Student(student),
            }));
        }

        Ok(None)
    }

    ///admins only, teachers and students are listed through their own types
    async fn get_all(pool: &Pool<Postgres>) -> SchoolResult<Vec<Self>> {
        let admins = sqlx::query_as::<_, AdminRow>(
            "SELECT id, name, email, bcrypt_hashed_password, current_password_is_default FROM admins ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .context(MakeQuerySnafu)?;

        Ok(admins
            .into_iter()
            .map(|admin| Self {
                id: admin.id,
                name: admin.name,
                email: admin.email,
                bcrypt_hashed_password: admin.bcrypt_hashed_password.map(SecretString::from),
                current_password_is_default: admin.current_password_is_default,
                kind: UserKind::Admin,
            })
            .collect())
    }

    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> SchoolResult<Self::Id> {
        let AddAdmin {
            name,
            email,
            password,
        } = to_be_added;
        let hashed = hash_password(password).await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO admins (name, email, bcrypt_hashed_password, current_password_is_default) VALUES ($1, $2, $3, FALSE) RETURNING id",
        )
        .bind(name)
        .bind(email.as_str().to_lowercase())
        .bind(hashed)
        .fetch_one(conn)
        .await
        .context(MakeQuerySnafu)?;

        info!(%id, "Added admin");
        Ok(id)
    }

    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> SchoolResult<()> {
        sqlx::query("DELETE FROM admins WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .context(MakeQuerySnafu)?;
        Ok(())
    }
}

impl User {
    async fn credentials(role: Role, id: Uuid, conn: &mut PgConnection) -> SchoolResult<Credentials> {
        let query = match role {
            Role::Admin => "SELECT bcrypt_hashed_password, current_password_is_default FROM admins WHERE id = $1",
            Role::Teacher => "SELECT bcrypt_hashed_password, current_password_is_default FROM teachers WHERE id = $1",
            Role::Student => "SELECT bcrypt_hashed_password, current_password_is_default FROM students WHERE id = $1",
        };

        sqlx::query_as::<_, Credentials>(query)
            .bind(id)
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    pub const fn role(&self) -> Role {
        match self.kind {
            UserKind::Admin => Role::Admin,
            UserKind::Teacher(_) => Role::Teacher,
            UserKind::Student(_) => Role::Student,
        }
    }

    pub fn get_permissions(&self) -> PermissionsTarget {
        match self.kind {
            UserKind::Admin => {
                PermissionsTarget::all()
                    - PermissionsTarget::VIEW_TEACHER_DASHBOARD
                    - PermissionsTarget::VIEW_STUDENT_DASHBOARD
                    - PermissionsTarget::TAKE_ATTENDANCE
            }
            UserKind::Teacher(_) => {
                PermissionsTarget::VIEW_TEACHER_DASHBOARD
                    | PermissionsTarget::CRUD_HOMEWORK
                    | PermissionsTarget::CRUD_GRADES
                    | PermissionsTarget::TAKE_ATTENDANCE
            }
            UserKind::Student(_) => PermissionsTarget::VIEW_STUDENT_DASHBOARD,
        }
    }

    pub const fn as_teacher(&self) -> Option<&Teacher> {
        match &self.kind {
            UserKind::Teacher(teacher) => Some(teacher),
            _ => None,
        }
    }

    pub const fn as_student(&self) -> Option<&Student> {
        match &self.kind {
            UserKind::Student(student) => Some(student),
            _ => None,
        }
    }

    pub async fn any_admins_exist(conn: &mut PgConnection) -> SchoolResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM admins)")
            .fetch_one(conn)
            .await
            .context(MakeQuerySnafu)
    }

    ///finds the id behind whatever the role logs in with
    pub async fn find_id_for_login(
        role: Role,
        identifier: &str,
        conn: &mut PgConnection,
    ) -> SchoolResult<Option<Uuid>> {
        let query = match role {
            Role::Admin => "SELECT id FROM admins WHERE lower(email) = lower($1)",
            Role::Teacher => {
                "SELECT id FROM teachers WHERE teacher_id = $1 AND status = 'active'"
            }
            Role::Student => {
                "SELECT id FROM students WHERE admission_id = $1 AND status = 'active'"
            }
        };

        sqlx::query_scalar(query)
            .bind(identifier.trim())
            .fetch_optional(conn)
            .await
            .context(MakeQuerySnafu)
    }
}

impl Render for User {
    fn render_to(&self, buffer: &mut String) {
        self.name.render_to(buffer);
    }
}

impl AuthUser for User {
    type Id = Uuid;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        static EMPTY_SECRET_STRING: LazyLock<SecretString> =
            LazyLock::new(|| SecretString::from(""));

        self.bcrypt_hashed_password
            .as_ref()
            .unwrap_or(&EMPTY_SECRET_STRING)
            .expose_secret()
            .as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PermissionsTarget as P;

    fn user(kind: UserKind) -> User {
        User {
            id: Uuid::nil(),
            name: "Someone".into(),
            email: "someone@example.org".into(),
            bcrypt_hashed_password: None,
            current_password_is_default: false,
            kind,
        }
    }

    #[test]
    fn roles_parse_loosely() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("parent".parse::<Role>().is_err());
        assert_eq!(Role::Student.identifier_label(), "Admission ID");
    }

    #[test]
    fn admins_cannot_use_other_dashboards() {
        let perms = user(UserKind::Admin).get_permissions();
        assert!(perms.contains(P::VIEW_ADMIN_DASHBOARD | P::CRUD_USERS | P::IMPORT_CSVS));
        assert!(!perms.contains(P::VIEW_TEACHER_DASHBOARD));
        assert!(!perms.contains(P::VIEW_STUDENT_DASHBOARD));
        assert!(!perms.contains(P::TAKE_ATTENDANCE));
    }

    #[test]
    fn empty_hash_when_no_password() {
        let admin = user(UserKind::Admin);
        assert!(admin.session_auth_hash().is_empty());
        assert_eq!(admin.role(), Role::Admin);
        assert!(admin.as_teacher().is_none());
    }
}
