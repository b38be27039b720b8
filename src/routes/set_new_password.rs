use crate::{
    auth::{SchoolSession, set_password, verify_password},
    data::{DataType, user::User},
    error::{MissingUserSnafu, SchoolResult},
    maud_conveniences::{errors_list, form_submit_button, simple_form_element, title},
    routes::login::{local_redirect_target, url_with_query},
    state::SchoolState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use bitflags::bitflags;
use maud::html;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use snafu::OptionExt;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct ReplacePasswordValidationError: u8 {
        const SAME_AS_BEFORE =   0b0000_0001;
        const DIDNT_MATCH =      0b0000_0010;
        const EMPTY =            0b0000_0100;
        const WRONG_CURRENT =    0b0000_1000;
    }
}

impl ReplacePasswordValidationError {
    pub fn as_nice_list(&self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(|e| match e {
            Self::SAME_AS_BEFORE => Some("Provided password was same as the current one"),
            Self::DIDNT_MATCH => Some("Provided passwords didn't match"),
            Self::EMPTY => Some("Provided password was empty"),
            Self::WRONG_CURRENT => Some("Current password was incorrect"),
            _ => None,
        })
    }

    fn check_new(new_password: &SecretString, confirmed_password: &SecretString) -> Self {
        let mut errors = Self::empty();
        if new_password.expose_secret() != confirmed_password.expose_secret() {
            errors |= Self::DIDNT_MATCH;
        }
        if new_password.expose_secret().trim().is_empty() {
            errors |= Self::EMPTY;
        }
        errors
    }
}

async fn matches_current(user: &User, password: &SecretString) -> SchoolResult<bool> {
    match user.bcrypt_hashed_password.clone() {
        Some(hash) => verify_password(password.clone(), hash).await,
        None => Ok(false),
    }
}

///stores the new password, then logs back in so the session matches the new hash
async fn store_new_password(
    state: &SchoolState,
    session: &mut SchoolSession,
    user: &User,
    new_password: SecretString,
) -> SchoolResult<()> {
    let mut conn = state.get_connection().await?;
    set_password(user.id, user.role(), new_password, &mut conn, false).await?;

    let refreshed = User::get_from_db_by_id(user.id, &mut conn)
        .await?
        .context(MissingUserSnafu { id: user.id })?;
    session.login(&refreshed).await?;
    Ok(())
}

fn password_form(
    errors: ReplacePasswordValidationError,
    next: Option<&str>,
    ask_for_current: bool,
) -> maud::Markup {
    html! {
        @if !errors.is_empty() {
            (errors_list(None, errors.as_nice_list()))
        }
        form method="post" {
            @if let Some(next) = next {
                input type="hidden" id="next" name="next" value=(next);
            }
            @if ask_for_current {
                (simple_form_element("current_password", "Current Password", true, Some("password"), None))
            }
            (simple_form_element("new_password", "New Password", true, Some("password"), None))
            (simple_form_element("confirmed_password", "Confirm Password", true, Some("password"), None))
            (form_submit_button(Some("Set New Password")))
        }
    }
}

#[derive(Deserialize)]
pub struct SetPasswordQuery {
    next: Option<String>,
    validation_errors: Option<u8>,
}

pub async fn get_replace_default_password(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(SetPasswordQuery {
        next,
        validation_errors,
    }): Query<SetPasswordQuery>,
) -> Response<Body> {
    if session
        .user
        .as_ref()
        .is_none_or(|user| !user.current_password_is_default)
    {
        return Redirect::to("/").into_response();
    }

    let validation_errors = validation_errors.map_or_else(
        ReplacePasswordValidationError::empty,
        ReplacePasswordValidationError::from_bits_truncate,
    );
    let next = local_redirect_target(next.as_deref()).map(ToString::to_string);

    state.render(session, html!{
        div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-md" {
            (title("Replace Default Password"))
            p class="mb-4 text-gray-300" {"Your account was given a generated password. Please choose your own before continuing."}
            (password_form(validation_errors, next.as_deref(), false))
        }
    }).into_response()
}

#[derive(Deserialize)]
pub struct SetPasswordForm {
    next: Option<String>,
    new_password: SecretString,
    confirmed_password: SecretString,
}

pub async fn post_replace_default_password(
    State(state): State<SchoolState>,
    mut session: SchoolSession,
    Form(SetPasswordForm {
        next,
        new_password,
        confirmed_password,
    }): Form<SetPasswordForm>,
) -> SchoolResult<Redirect> {
    let Some(user) = session.user.clone() else {
        return Ok(Redirect::to("/"));
    };
    if !user.current_password_is_default {
        return Ok(Redirect::to("/"));
    }
    let next = local_redirect_target(next.as_deref())
        .unwrap_or(user.role().dashboard())
        .to_string();

    let mut errors = ReplacePasswordValidationError::check_new(&new_password, &confirmed_password);
    if matches_current(&user, &new_password).await? {
        errors |= ReplacePasswordValidationError::SAME_AS_BEFORE;
    }

    if !errors.is_empty() {
        let bits = errors.bits().to_string();
        return Ok(Redirect::to(&url_with_query(
            "/replace_default_password",
            &[("next", next.as_str()), ("validation_errors", bits.as_str())],
        )?));
    }

    store_new_password(&state, &mut session, &user, new_password).await?;

    Ok(Redirect::to(&next))
}

#[derive(Deserialize)]
pub struct ChangePasswordQuery {
    validation_errors: Option<u8>,
    changed: Option<bool>,
}

pub async fn get_change_password(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(ChangePasswordQuery {
        validation_errors,
        changed,
    }): Query<ChangePasswordQuery>,
) -> Response<Body> {
    if session.user.is_none() {
        return Redirect::to("/login?next=/change_password").into_response();
    }

    let validation_errors = validation_errors.map_or_else(
        ReplacePasswordValidationError::empty,
        ReplacePasswordValidationError::from_bits_truncate,
    );

    state.render(session, html!{
        div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-md" {
            (title("Change Password"))
            @if changed.unwrap_or(false) {
                p class="mb-4 text-green-400" {"Password changed."}
            }
            (password_form(validation_errors, None, true))
        }
    }).into_response()
}

#[derive(Deserialize)]
pub struct ChangePasswordForm {
    current_password: SecretString,
    new_password: SecretString,
    confirmed_password: SecretString,
}

pub async fn post_change_password(
    State(state): State<SchoolState>,
    mut session: SchoolSession,
    Form(ChangePasswordForm {
        current_password,
        new_password,
        confirmed_password,
    }): Form<ChangePasswordForm>,
) -> SchoolResult<Redirect> {
    let Some(user) = session.user.clone() else {
        return Ok(Redirect::to("/login"));
    };

    let mut errors = ReplacePasswordValidationError::check_new(&new_password, &confirmed_password);
    if !matches_current(&user, &current_password).await? {
        errors |= ReplacePasswordValidationError::WRONG_CURRENT;
    }
    if current_password.expose_secret() == new_password.expose_secret() {
        errors |= ReplacePasswordValidationError::SAME_AS_BEFORE;
    }

    if !errors.is_empty() {
        return Ok(Redirect::to(&format!(
            "/change_password?validation_errors={}",
            errors.bits()
        )));
    }

    store_new_password(&state, &mut session, &user, new_password).await?;

    Ok(Redirect::to("/change_password?changed=true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_passwords_must_match_and_not_be_blank() {
        let a = SecretString::from("hunter2");
        let b = SecretString::from("hunter3");
        let blank = SecretString::from("  ");

        assert!(ReplacePasswordValidationError::check_new(&a, &a.clone()).is_empty());
        assert_eq!(
            ReplacePasswordValidationError::check_new(&a, &b),
            ReplacePasswordValidationError::DIDNT_MATCH
        );
        assert_eq!(
            ReplacePasswordValidationError::check_new(&blank, &blank.clone()),
            ReplacePasswordValidationError::EMPTY
        );
    }
}
