use crate::{
    auth::{SchoolSession, backend::SchoolAuthCredentials},
    data::user::{Role, User},
    error::{SchoolResult, UrlEncodeSnafu},
    maud_conveniences::{
        INPUT_CLASSES, form_element, form_submit_button, simple_form_element, title,
    },
    state::SchoolState,
};
use axum::{
    Form,
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::html;
use secrecy::SecretString;
use serde::Deserialize;
use snafu::ResultExt;

#[derive(Deserialize)]
pub struct LoginOptions {
    pub next: Option<String>,
    pub login_failed: Option<bool>,
}

///only ever redirect back into the site
pub fn local_redirect_target(next: Option<&str>) -> Option<&str> {
    next.filter(|next| {
        let mut chars = next.chars();
        chars.next() == Some('/')
            && !matches!(chars.next(), Some('/' | '\\'))
            && !next.chars().any(char::is_control)
    })
}

///`path?key=value&...` with every value percent-encoded
pub fn url_with_query(path: &str, query: &[(&str, &str)]) -> SchoolResult<String> {
    let query = serde_urlencoded::to_string(query).context(UrlEncodeSnafu)?;
    Ok(if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    })
}

///accounts still on a generated password get sent to replace it first
pub fn replace_password_redirect(user: Option<&User>, next: &str) -> SchoolResult<Option<String>> {
    match user {
        Some(user) if user.current_password_is_default => {
            url_with_query("/replace_default_password", &[("next", next)]).map(Some)
        }
        _ => Ok(None),
    }
}

pub async fn get_login(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(LoginOptions { next, login_failed }): Query<LoginOptions>,
) -> SchoolResult<Response<Body>> {
    if !User::any_admins_exist(&mut *state.get_connection().await?).await? {
        return Ok(Redirect::to("/onboarding").into_response());
    }

    if let Some(user) = &session.user {
        return Ok(Redirect::to(user.role().dashboard()).into_response());
    }

    let login_failed = login_failed.unwrap_or(false);
    let next = local_redirect_target(next.as_deref()).map(ToString::to_string);

    Ok(state.render(session, html! {
        div class="bg-gray-800 shadow-md rounded px-8 pt-6 pb-8 mb-4 w-full max-w-sm" {
            (title("Login"))
            @if login_failed {
                div role="alert" class="bg-red-100 border border-red-400 text-red-700 px-4 py-4 rounded relative" {
                    strong class="font-bold" {"Alert!"}
                    br;
                    // avoid giving extra details for security reasons :)
                    span class="block sm:inline" {"Account not found or password incorrect"}
                }
                br;
            }

            form method="post" {
                @if let Some(next) = next {
                    input type="hidden" name="next" value=(next) {}
                }
                (form_element("role", "I am a...", html! {
                    select id="role" name="role" class=(INPUT_CLASSES) {
                        @for role in Role::ALL {
                            option value=(role.as_str()) {(role.to_string())}
                        }
                    }
                }))
                (simple_form_element("identifier", "Email / Teacher ID / Admission ID", true, None, None))
                ul class="mb-4 text-xs text-gray-400" {
                    @for role in Role::ALL {
                        li {"Sign in as " (role.as_str()) " with your " (role.identifier_label())}
                    }
                }
                (simple_form_element("password", "Password", true, Some("password"), None))
                (form_submit_button(Some("Login")))
            }
        }
    }).into_response())
}

#[derive(Deserialize)]
pub struct LoginForm {
    role: Role,
    identifier: String,
    password: SecretString,
    next: Option<String>,
}

pub async fn post_login(
    mut session: SchoolSession,
    Form(LoginForm {
        role,
        identifier,
        password,
        next,
    }): Form<LoginForm>,
) -> SchoolResult<Redirect> {
    let next = local_redirect_target(next.as_deref()).map(ToString::to_string);

    let Some(user) = session
        .authenticate(SchoolAuthCredentials {
            role,
            identifier: identifier.trim().to_string(),
            password,
        })
        .await?
    else {
        let mut query = vec![("login_failed", "true")];
        if let Some(next) = &next {
            query.push(("next", next.as_str()));
        }
        return Ok(Redirect::to(&url_with_query("/login", &query)?));
    };

    session.login(&user).await?;

    let next = next.unwrap_or_else(|| user.role().dashboard().to_string());
    Ok(match replace_password_redirect(Some(&user), &next)? {
        Some(replace) => Redirect::to(&replace),
        None => Redirect::to(&next),
    })
}

pub async fn post_logout(mut session: SchoolSession) -> SchoolResult<Redirect> {
    if let Some(user) = session.logout().await? {
        info!(id = %user.id, "Logged out");
    }
    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::user::UserKind;

    #[test]
    fn only_local_paths_are_followed() {
        assert_eq!(local_redirect_target(Some("/teacher")), Some("/teacher"));
        assert_eq!(local_redirect_target(Some("https://evil.example")), None);
        assert_eq!(local_redirect_target(Some("//evil.example")), None);
        assert_eq!(local_redirect_target(Some("/\\evil.example")), None);
        assert_eq!(local_redirect_target(Some("/teacher\nSet-Cookie: a=b")), None);
        assert_eq!(local_redirect_target(Some("/")), Some("/"));
        assert_eq!(local_redirect_target(None), None);
    }

    #[test]
    fn next_survives_its_own_query_string() {
        assert_eq!(
            url_with_query("/login", &[("login_failed", "true"), ("next", "/teacher?tab=marks&x=1")])
                .unwrap(),
            "/login?login_failed=true&next=%2Fteacher%3Ftab%3Dmarks%26x%3D1"
        );
        assert_eq!(url_with_query("/login", &[]).unwrap(), "/login");
    }

    fn user(current_password_is_default: bool) -> User {
        User {
            id: uuid::Uuid::nil(),
            name: "Asha".into(),
            email: "asha@example.org".into(),
            bcrypt_hashed_password: None,
            current_password_is_default,
            kind: UserKind::Admin,
        }
    }

    #[test]
    fn generated_passwords_must_be_replaced_before_continuing() {
        assert_eq!(
            replace_password_redirect(Some(&user(true)), "/student").unwrap(),
            Some("/replace_default_password?next=%2Fstudent".to_string())
        );
        assert_eq!(replace_password_redirect(Some(&user(false)), "/student").unwrap(), None);
        assert_eq!(replace_password_redirect(None, "/student").unwrap(), None);
    }
}
