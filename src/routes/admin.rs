use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    error::SchoolResult,
    maud_conveniences::{supertitle, tabs},
    routes::login::replace_password_redirect,
    state::SchoolState,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::html;
use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdminTab {
    #[default]
    Users,
    Gallery,
    Notices,
    Marks,
}

impl AdminTab {
    const fn label(self) -> &'static str {
        match self {
            Self::Users => "Manage Users",
            Self::Gallery => "Gallery",
            Self::Notices => "Notices",
            Self::Marks => "Marks",
        }
    }

    const fn fragment(self) -> &'static str {
        match self {
            Self::Users => "/internal/users?kind=students",
            Self::Gallery => "/internal/gallery",
            Self::Notices => "/internal/notices",
            Self::Marks => "/internal/grades",
        }
    }
}

const ADMIN_TABS: [(&str, &str); 5] = [
    ("Manage Users", "/admin?tab=users"),
    ("Gallery", "/admin?tab=gallery"),
    ("Notices", "/admin?tab=notices"),
    ("Marks", "/admin?tab=marks"),
    ("Import/Export", "/import_export"),
];

#[derive(Deserialize)]
pub struct AdminQuery {
    tab: Option<AdminTab>,
}

pub async fn get_admin_dashboard(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(AdminQuery { tab }): Query<AdminQuery>,
) -> SchoolResult<Response<Body>> {
    if !session.can(PermissionsTarget::VIEW_ADMIN_DASHBOARD) {
        return Ok(Redirect::to("/login?next=/admin").into_response());
    }
    if let Some(replace) = replace_password_redirect(session.user.as_ref(), "/admin")? {
        return Ok(Redirect::to(&replace).into_response());
    }

    let tab = tab.unwrap_or_default();

    Ok(state.render(session, html! {
        div class="bg-gray-800 p-8 rounded shadow-md max-w-6xl w-full" {
            (supertitle("Admin Dashboard"))
            (tabs(tab.label(), &ADMIN_TABS))

            div hx-ext="sse" sse-connect="/sse_feed" class="flex flex-col lg:flex-row gap-8" {
                div id="tab_contents" class="flex-1" hx-get=(tab.fragment()) hx-trigger="load" {}
                div id="in_focus" class="lg:w-1/3" {}
            }
        }
    }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tab_has_a_link() {
        for tab in [
            AdminTab::Users,
            AdminTab::Gallery,
            AdminTab::Notices,
            AdminTab::Marks,
        ] {
            assert!(ADMIN_TABS.iter().any(|(label, _)| *label == tab.label()));
            assert!(tab.fragment().starts_with("/internal/"));
        }
    }
}
