use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        DataType, IdForm,
        notice::{Notice, NoticeForm, NoticeFormError, Priority},
    },
    error::{MissingNoticeSnafu, SchoolResult},
    maud_conveniences::{
        INPUT_CLASSES, errors_list, form_element, form_submit_button, select_form_element,
        simple_form_element, title,
    },
    routes::sse::SseEvent,
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use maud::{Markup, html};
use snafu::OptionExt;

fn add_notice_form(errors: NoticeFormError) -> Markup {
    html! {
        div id="notice_form" class="rounded-lg bg-gray-700 p-4 mb-4" {
            @if !errors.is_empty() {
                (errors_list(None, errors.as_nice_list()))
            }
            form hx-put="/internal/notices" hx-target="#notice_form" hx-swap="outerHTML" {
                (simple_form_element("title", "Title", true, None, None))
                (form_element("content", "Content", html! {
                    textarea required id="content" name="content" rows="4" class=(INPUT_CLASSES) {}
                }))
                div class="flex flex-row gap-4" {
                    div class="flex-1" {
                        (select_form_element(
                            "priority",
                            "Priority",
                            "Medium (default)",
                            Priority::ALL.iter().map(|p| (p.as_str(), p.as_str())),
                            None,
                        ))
                    }
                    div class="flex-1" {
                        (simple_form_element("date", "Date (defaults to today)", false, Some("date"), None))
                    }
                }
                (form_submit_button(Some("Publish Notice")))
            }
        }
    }
}

fn notices_list(notices: Vec<Notice>) -> Markup {
    html! {
        @if notices.is_empty() {
            p class="italic text-gray-400" {"No notices yet."}
        }
        div class="flex flex-col space-y-2" {
            @for notice in notices {
                @let id = notice.id.to_string();
                @let priority = notice.priority();
                div class={"rounded-lg p-4 bg-gray-700 " (if notice.is_active { "" } else { "opacity-50" })} {
                    div class="flex flex-row items-center justify-between" {
                        h3 class="font-semibold" {(notice.title)}
                        span class={"text-xs px-2 py-1 rounded " (priority.badge_classes())} {(priority.as_str())}
                    }
                    p class="text-gray-200 whitespace-pre-line" {(notice.content)}
                    div class="flex flex-row items-center justify-between mt-2" {
                        span class="text-xs text-gray-400" {(notice.date.format("%d %b %Y").to_string())}
                        div class="flex flex-row space-x-2" {
                            button class="bg-blue-600 hover:bg-blue-800 text-sm py-1 px-2 rounded" hx-post={"/internal/notices/toggle?id=" (id)} hx-swap="none" {
                                @if notice.is_active { "Deactivate" } @else { "Activate" }
                            }
                            button class="bg-red-600 hover:bg-red-800 text-sm py-1 px-2 rounded" hx-delete={"/internal/notices?id=" (id)} hx-swap="none" hx-confirm={"Delete \"" (notice.title) "\"?"} {"Delete"}
                        }
                    }
                }
            }
        }
    }
}

pub async fn internal_get_notices(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_NOTICES)?;

    let notices = Notice::get_all(&state).await?;

    Ok(html! {
        div class="flex flex-col" {
            (title("Notices"))
            (add_notice_form(NoticeFormError::empty()))
            div hx-get="/internal/notices/list" hx-trigger="sse:crud_notice" hx-swap="innerHTML" {
                (notices_list(notices))
            }
        }
    })
}

pub async fn internal_get_notices_list(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_NOTICES)?;
    Ok(notices_list(Notice::get_all(&state).await?))
}

pub async fn internal_put_notice(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(form): Form<NoticeForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_NOTICES)?;
    let created_by = session.current_user()?.id;

    let notice = match form.validate(created_by) {
        Ok(notice) => notice,
        Err(errors) => return Ok(add_notice_form(errors)),
    };

    Notice::insert_into_database(notice, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudNotice);

    Ok(add_notice_form(NoticeFormError::empty()))
}

pub async fn internal_post_toggle_notice(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_NOTICES)?;

    Notice::toggle_active(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingNoticeSnafu { id })?;
    state.send_sse_event(SseEvent::CrudNotice);

    Ok(html! {})
}

pub async fn delete_notice(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_NOTICES)?;

    Notice::remove_from_database(id, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudNotice);

    Ok(html! {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[test]
    fn inactive_notices_are_dimmed() {
        let notice = Notice {
            id: Uuid::nil(),
            title: "Sports Day".into(),
            content: "Bring water".into(),
            priority: "high".into(),
            date: DateTime::<Utc>::UNIX_EPOCH,
            is_active: false,
            created_by: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };

        let markup = notices_list(vec![notice]).into_string();
        assert!(markup.contains("opacity-50"));
        assert!(markup.contains("Activate"));
        assert!(markup.contains("bg-red-700"));
    }
}
