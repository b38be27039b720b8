use crate::{
    auth::SchoolSession,
    data::{
        DataType,
        user::{AddAdmin, User},
    },
    error::{CommitTransactionSnafu, MissingUserSnafu, SchoolResult},
    maud_conveniences::{errors_list, form_submit_button, simple_form_element, supertitle},
    state::SchoolState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use bitflags::bitflags;
use email_address::EmailAddress;
use maud::html;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::str::FromStr;
//flow:
// 1. nobody can log in until an admin exists
// 2. the first visitor creates that admin and is logged in as them

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    struct NewAdminDetailsError: u8 {
        const EMPTY_NAME =        0b0000_0001;
        const INVALID_EMAIL =     0b0000_0010;
        const EMPTY_PASSWORD =    0b0000_0100;
        const MISMATCH_PASSWORD = 0b0000_1000;
    }
}

impl NewAdminDetailsError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|x| match x {
            Self::EMPTY_NAME => Some("Provided name was empty"),
            Self::INVALID_EMAIL => Some("Provided email was invalid"),
            Self::EMPTY_PASSWORD => Some("Provided password was empty"),
            Self::MISMATCH_PASSWORD => Some("Passwords didn't match"),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
pub struct NewAdminCreationQuery {
    errors: Option<u8>,
}

pub async fn get_onboarding(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(NewAdminCreationQuery { errors }): Query<NewAdminCreationQuery>,
) -> SchoolResult<Response<Body>> {
    if User::any_admins_exist(&mut *state.get_connection().await?).await? {
        return Ok(Redirect::to("/").into_response());
    }

    let errors = errors.map_or_else(
        NewAdminDetailsError::empty,
        NewAdminDetailsError::from_bits_truncate,
    );

    Ok(state.render(session, html! {
        div class="flex items-center justify-center" {
            div class="bg-gray-800 p-8 rounded-lg shadow-xl w-full max-w-md" {
                (supertitle("Create the first Admin Account"))

                @if !errors.is_empty() {
                    (errors_list(None, errors.as_nice_list()))
                }

                form method="post" {
                    (simple_form_element("name", "Name", true, None, None))
                    (simple_form_element("email", "Email", true, Some("email"), None))
                    (simple_form_element("password", "Password", true, Some("password"), None))
                    (simple_form_element("confirm_password", "Confirm Password", true, Some("password"), None))
                    (form_submit_button(Some("Create Admin User")))
                }
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct CreateAdminAccountForm {
    name: String,
    email: String,
    password: SecretString,
    confirm_password: SecretString,
}

pub async fn post_onboarding(
    State(state): State<SchoolState>,
    mut session: SchoolSession,
    Form(CreateAdminAccountForm {
        name,
        email,
        password,
        confirm_password,
    }): Form<CreateAdminAccountForm>,
) -> SchoolResult<Redirect> {
    let mut conn = state.get_transaction().await?;

    //double check that nobody beat us to it
    if User::any_admins_exist(&mut conn).await? {
        return Ok(Redirect::to("/"));
    }

    let mut errors = NewAdminDetailsError::empty();
    let name = name.trim().to_string();
    if name.is_empty() {
        errors |= NewAdminDetailsError::EMPTY_NAME;
    }
    let email = EmailAddress::from_str(email.trim()).ok();
    if email.is_none() {
        errors |= NewAdminDetailsError::INVALID_EMAIL;
    }
    if password.expose_secret().trim().is_empty() {
        errors |= NewAdminDetailsError::EMPTY_PASSWORD;
    }
    if password.expose_secret() != confirm_password.expose_secret() {
        errors |= NewAdminDetailsError::MISMATCH_PASSWORD;
    }

    let Some(email) = email.filter(|_| errors.is_empty()) else {
        return Ok(Redirect::to(&format!(
            "/onboarding?errors={}",
            errors.bits()
        )));
    };

    let id = User::insert_into_database(
        AddAdmin {
            name,
            email,
            password,
        },
        &mut conn,
    )
    .await?;

    let user = User::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingUserSnafu { id })?;
    conn.commit().await.context(CommitTransactionSnafu)?;

    session.login(&user).await?;

    Ok(Redirect::to("/admin"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_has_a_message() {
        assert_eq!(
            NewAdminDetailsError::all().as_nice_list().count(),
            NewAdminDetailsError::all().iter().count()
        );
    }
}
