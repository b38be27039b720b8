use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        DataType, IdForm,
        homework::{Homework, HomeworkForm, TEACHER_RECENT_HOMEWORK},
        teacher::Teacher,
    },
    error::{MissingHomeworkSnafu, NotHomeworkOwnerSnafu, SchoolResult},
    maud_conveniences::{
        INPUT_CLASSES, form_element, form_submit_button, select_form_element,
        simple_form_element, success_message, title,
    },
    routes::{sse::SseEvent, teacher::current_teacher},
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use maud::{Markup, html};
use snafu::{OptionExt, ensure};

fn homework_form(teacher: &Teacher) -> Markup {
    let class_sections = teacher.class_sections();
    let mut sections: Vec<&str> = class_sections
        .iter()
        .map(|(_, section)| section.as_str())
        .collect();
    sections.sort_unstable();
    sections.dedup();

    html! {
        form hx-put="/internal/homework" hx-target="#homework_result" class="rounded-lg bg-gray-700 p-4 mb-4" {
            div class="flex flex-row gap-4" {
                div class="flex-1" {
                    (select_form_element("class_name", "Class", "Choose a class", teacher.classes.iter().map(|c| (c.as_str(), c.as_str())), None))
                }
                div class="flex-1" {
                    (select_form_element("section", "Section", "Choose a section", sections.iter().map(|s| (*s, *s)), None))
                }
                div class="flex-1" {
                    (select_form_element("subject", "Subject", "Choose a subject", teacher.subjects.iter().map(|s| (s.as_str(), s.as_str())), None))
                }
            }
            (simple_form_element("title", "Title", true, None, None))
            (form_element("description", "Description", html! {
                textarea id="description" name="description" rows="3" class=(INPUT_CLASSES) {}
            }))
            (simple_form_element("submission_date", "Submission Date", false, Some("date"), None))
            (form_submit_button(Some("Assign Homework")))
        }
    }
}

fn homework_list(homework: Vec<Homework>) -> Markup {
    html! {
        @if homework.is_empty() {
            p class="italic text-gray-400" {"No homework assigned yet."}
        }
        div class="flex flex-col space-y-2" {
            @for item in homework {
                @let id = item.id.to_string();
                div class="rounded-lg p-4 bg-gray-700" {
                    div class="flex flex-row items-center justify-between" {
                        h3 class="font-semibold" {(item.title)}
                        span class="text-xs text-gray-400" {"Class " (item.class_name) " " (item.section) " | " (item.subject)}
                    }
                    @if !item.description.is_empty() {
                        p class="text-gray-200 whitespace-pre-line" {(item.description)}
                    }
                    div class="flex flex-row items-center justify-between mt-2" {
                        span class="text-xs text-gray-400" {
                            @if let Some(due) = item.submission_date {
                                "Due " (due.format("%d %b %Y").to_string())
                            } @else {
                                "No due date"
                            }
                        }
                        button class="bg-red-600 hover:bg-red-800 text-sm py-1 px-2 rounded" hx-delete={"/internal/homework?id=" (id)} hx-swap="none" hx-confirm={"Remove \"" (item.title) "\"?"} {"Remove"}
                    }
                }
            }
        }
    }
}

pub async fn internal_get_homework(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_HOMEWORK)?;
    let teacher = current_teacher(&session)?;

    let recent =
        Homework::get_recent_for_teacher(teacher.id, TEACHER_RECENT_HOMEWORK, &state).await?;

    Ok(html! {
        div class="flex flex-col" {
            (title("Assign Homework"))
            div id="homework_result" {}
            (homework_form(&teacher))
            (title("Recently Assigned"))
            div hx-get="/internal/homework/list" hx-trigger="sse:crud_homework" hx-swap="innerHTML" {
                (homework_list(recent))
            }
        }
    })
}

pub async fn internal_get_homework_list(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_HOMEWORK)?;
    let teacher = current_teacher(&session)?;

    Ok(homework_list(
        Homework::get_recent_for_teacher(teacher.id, TEACHER_RECENT_HOMEWORK, &state).await?,
    ))
}

pub async fn internal_put_homework(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(form): Form<HomeworkForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_HOMEWORK)?;
    let teacher = current_teacher(&session)?;

    let homework = form.validate(&teacher)?;
    let message = format!(
        "Assigned \"{}\" to class {} {}.",
        homework.title, homework.class_name, homework.section
    );

    Homework::insert_into_database(homework, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudHomework);

    Ok(success_message(message))
}

pub async fn delete_homework(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_HOMEWORK)?;
    let user = session.current_user()?;

    let mut conn = state.get_connection().await?;
    let homework = Homework::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingHomeworkSnafu { id })?;

    if let Some(teacher) = user.as_teacher() {
        ensure!(
            homework.teacher_id == Some(teacher.id),
            NotHomeworkOwnerSnafu
        );
    }

    Homework::remove_from_database(id, &mut conn).await?;
    state.send_sse_event(SseEvent::CrudHomework);

    Ok(html! {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};
    use uuid::Uuid;

    fn homework(submission_date: Option<NaiveDate>) -> Homework {
        Homework {
            id: Uuid::nil(),
            class_name: "7".into(),
            section: "B".into(),
            title: "Fractions worksheet".into(),
            subject: "Maths".into(),
            description: String::new(),
            submission_date,
            teacher_id: None,
            teacher_name: "Meera Iyer".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn due_dates_are_shown_when_set() {
        let markup = homework_list(vec![
            homework(NaiveDate::from_ymd_opt(2024, 3, 9)),
            homework(None),
        ])
        .into_string();

        assert!(markup.contains("Due 09 Mar 2024"));
        assert!(markup.contains("No due date"));
        assert!(markup.contains("Class 7 B | Maths"));
    }
}
