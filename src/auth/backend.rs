use crate::{
    auth::verify_password,
    data::{
        DataType,
        user::{Role, User},
    },
    error::{MissingUserSnafu, SchoolError},
    state::SchoolState,
};
use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use secrecy::SecretString;
use snafu::OptionExt;

#[derive(Clone)]
pub struct SchoolAuthBackend {
    state: SchoolState,
}

impl SchoolAuthBackend {
    pub const fn new(state: SchoolState) -> Self {
        Self { state }
    }
}

///admins sign in with their email, teachers with their teacher id and students with their admission id
pub struct SchoolAuthCredentials {
    pub role: Role,
    pub identifier: String,
    pub password: SecretString,
}

#[async_trait]
impl AuthnBackend for SchoolAuthBackend {
    type User = User;
    type Credentials = SchoolAuthCredentials;
    type Error = SchoolError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let SchoolAuthCredentials {
            role,
            identifier,
            password,
        } = creds;
        let mut conn = self.state.get_connection().await?;

        let Some(id) = User::find_id_for_login(role, &identifier, &mut conn).await? else {
            debug!(?role, "No account found for login attempt");
            return Ok(None);
        };
        let user = User::get_from_db_by_id(id, &mut conn)
            .await?
            .context(MissingUserSnafu { id })?;

        let Some(hash) = user.bcrypt_hashed_password.clone() else {
            return Ok(None);
        };

        Ok(if verify_password(password, hash).await? {
            info!(%id, ?role, "Logged in");
            Some(user)
        } else {
            None
        })
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        User::get_from_db_by_id(*user_id, &mut *self.state.get_connection().await?).await
    }
}
