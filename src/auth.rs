use crate::{
    auth::backend::SchoolAuthBackend,
    config::auth::AuthConfig,
    data::user::{Role, User},
    error::{BcryptSnafu, IncorrectPermissionsSnafu, JoinTaskSnafu, MakeQuerySnafu, SchoolResult, UnableToFindUserInfoSnafu},
};
use axum_login::AuthSession;
use bcrypt::DEFAULT_COST;
use bitflags::bitflags;
use secrecy::{ExposeSecret, SecretString};
use snafu::{OptionExt, ResultExt};
use sqlx::PgConnection;
use uuid::Uuid;

pub mod backend;
pub mod postgres_store;

pub type SchoolSession = AuthSession<SchoolAuthBackend>;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PermissionsTarget: u16 {
        const VIEW_ADMIN_DASHBOARD =   0b0000_0000_0001;
        const VIEW_TEACHER_DASHBOARD = 0b0000_0000_0010;
        const VIEW_STUDENT_DASHBOARD = 0b0000_0000_0100;

        const CRUD_USERS =             0b0000_0000_1000;
        const CRUD_GALLERY =           0b0000_0001_0000;
        const CRUD_NOTICES =           0b0000_0010_0000;
        const CRUD_HOMEWORK =          0b0000_0100_0000;
        const CRUD_GRADES =            0b0000_1000_0000;
        const TAKE_ATTENDANCE =        0b0001_0000_0000;

        const IMPORT_CSVS =            0b0010_0000_0000;
        const EXPORT_CSVS =            0b0100_0000_0000;
    }
}

pub trait AuthUtilities {
    fn permissions(&self) -> PermissionsTarget;
    fn current_user(&self) -> SchoolResult<&User>;

    fn can(&self, target: PermissionsTarget) -> bool {
        self.permissions().contains(target)
    }

    fn ensure_can(&self, target: PermissionsTarget) -> SchoolResult<()> {
        let found = self.permissions();
        snafu::ensure!(
            found.contains(target),
            IncorrectPermissionsSnafu {
                needed: target,
                found
            }
        );
        Ok(())
    }
}

impl AuthUtilities for SchoolSession {
    fn permissions(&self) -> PermissionsTarget {
        self.user
            .as_ref()
            .map_or_else(PermissionsTarget::empty, User::get_permissions)
    }

    fn current_user(&self) -> SchoolResult<&User> {
        self.user.as_ref().context(UnableToFindUserInfoSnafu)
    }
}

///what to do with the password column when a form is submitted
#[derive(Debug, Clone)]
pub enum PasswordChoice {
    Unchanged,
    Chosen(SecretString),
    Generate,
}

#[derive(Debug, Clone)]
pub struct NewPassword {
    pub plaintext: SecretString,
    pub is_default: bool,
}

impl PasswordChoice {
    pub fn from_form(password: Option<&SecretString>, generate: bool) -> Self {
        if generate {
            return Self::Generate;
        }
        match password {
            Some(password) if !password.expose_secret().trim().is_empty() => {
                Self::Chosen(password.clone())
            }
            _ => Self::Unchanged,
        }
    }

    pub fn resolve(self, auth_config: &AuthConfig) -> Option<NewPassword> {
        match self {
            Self::Unchanged => None,
            Self::Chosen(plaintext) => Some(NewPassword {
                plaintext,
                is_default: false,
            }),
            Self::Generate => Some(NewPassword {
                plaintext: SecretString::from(auth_config.generate()),
                is_default: true,
            }),
        }
    }
}

pub async fn hash_password(password: SecretString) -> SchoolResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password.expose_secret(), DEFAULT_COST))
        .await
        .context(JoinTaskSnafu)?
        .context(BcryptSnafu)
}

pub async fn verify_password(password: SecretString, hash: SecretString) -> SchoolResult<bool> {
    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password.expose_secret(), hash.expose_secret())
    })
    .await
    .context(JoinTaskSnafu)?
    .context(BcryptSnafu)
}

pub async fn set_password(
    id: Uuid,
    role: Role,
    password: SecretString,
    conn: &mut PgConnection,
    is_default: bool,
) -> SchoolResult<()> {
    let hashed = hash_password(password).await?;

    let query = match role {
        Role::Admin => "UPDATE admins SET bcrypt_hashed_password = $2, current_password_is_default = $3 WHERE id = $1",
        Role::Teacher => "UPDATE teachers SET bcrypt_hashed_password = $2, current_password_is_default = $3 WHERE id = $1",
        Role::Student => "UPDATE students SET bcrypt_hashed_password = $2, current_password_is_default = $3 WHERE id = $1",
    };

    sqlx::query(query)
        .bind(id)
        .bind(hashed)
        .bind(is_default)
        .execute(&mut *conn)
        .await
        .context(MakeQuerySnafu)?;

    info!(%id, ?role, is_default, "Updated password");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_passwords_leave_the_current_one() {
        let blank = SecretString::from("   ");
        assert!(matches!(
            PasswordChoice::from_form(Some(&blank), false),
            PasswordChoice::Unchanged
        ));
        assert!(matches!(
            PasswordChoice::from_form(None, false),
            PasswordChoice::Unchanged
        ));
    }

    #[test]
    fn generating_wins_over_a_typed_password() {
        let typed = SecretString::from("typed-in");
        assert!(matches!(
            PasswordChoice::from_form(Some(&typed), true),
            PasswordChoice::Generate
        ));
    }

    #[test]
    fn generated_passwords_are_flagged_as_default() {
        let config = AuthConfig::default();

        let generated = PasswordChoice::Generate
            .resolve(&config)
            .expect("generating always yields a password");
        assert!(generated.is_default);
        assert!(!generated.plaintext.expose_secret().is_empty());

        let chosen = PasswordChoice::Chosen(SecretString::from("letmein"))
            .resolve(&config)
            .expect("chosen passwords are kept");
        assert!(!chosen.is_default);
        assert_eq!(chosen.plaintext.expose_secret(), "letmein");

        assert!(PasswordChoice::Unchanged.resolve(&config).is_none());
    }
}
