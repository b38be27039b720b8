use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{school_class::SchoolClass, DataType, teacher::Teacher},
    error::{SchoolResult, UnableToFindUserInfoSnafu},
    maud_conveniences::{Email, INPUT_CLASSES, detail_row, stat_card, supertitle, tabs},
    routes::login::replace_password_redirect,
    state::SchoolState,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};
use serde::Deserialize;
use snafu::OptionExt;

#[derive(Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeacherTab {
    #[default]
    Homework,
    Marks,
    Attendance,
}

impl TeacherTab {
    const fn label(self) -> &'static str {
        match self {
            Self::Homework => "Homework",
            Self::Marks => "Marks",
            Self::Attendance => "Attendance",
        }
    }

    const fn fragment(self) -> &'static str {
        match self {
            Self::Homework => "/internal/homework",
            Self::Marks => "/internal/grades",
            Self::Attendance => "/internal/attendance",
        }
    }
}

const TEACHER_TABS: [(&str, &str); 3] = [
    ("Homework", "/teacher?tab=homework"),
    ("Marks", "/teacher?tab=marks"),
    ("Attendance", "/teacher?tab=attendance"),
];

pub fn current_teacher(session: &SchoolSession) -> SchoolResult<Teacher> {
    session
        .current_user()?
        .as_teacher()
        .cloned()
        .context(UnableToFindUserInfoSnafu)
}

///classes a user may pick from: teachers get their own, admins get every class on record
pub async fn selectable_class_sections(
    state: &SchoolState,
    session: &SchoolSession,
) -> SchoolResult<Vec<(String, String)>> {
    match session.current_user()?.as_teacher() {
        Some(teacher) => Ok(teacher.class_sections()),
        None => Ok(SchoolClass::get_all(state)
            .await?
            .into_iter()
            .map(|class| (class.name, class.section))
            .collect()),
    }
}

///picker values look like `7:B`
pub fn split_class_section(raw: &str) -> Option<(String, String)> {
    let (class_name, section) = raw.split_once(':')?;
    let (class_name, section) = (class_name.trim(), section.trim());
    if class_name.is_empty() || section.is_empty() {
        return None;
    }
    Some((class_name.to_string(), section.to_uppercase()))
}

///a select that reloads `url` into `#tab_contents` whenever it changes
pub fn class_section_picker(
    url: &str,
    pairs: &[(String, String)],
    selected: Option<&(String, String)>,
    extra: Markup,
) -> Markup {
    let options: Vec<(String, String, bool)> = pairs
        .iter()
        .map(|(class_name, section)| {
            let is_selected = selected.is_some_and(|(c, s)| c == class_name && s == section);
            (
                format!("{class_name}:{section}"),
                format!("Class {class_name} {section}"),
                is_selected,
            )
        })
        .collect();

    html! {
        form hx-get=(url) hx-target="#tab_contents" hx-trigger="change" class="flex flex-row gap-4 mb-4" {
            select name="class_section" class=(INPUT_CLASSES) {
                option value="" {"Choose a class"}
                @for (value, text, is_selected) in options {
                    option value=(value) selected[is_selected] {(text)}
                }
            }
            (extra)
        }
    }
}

#[derive(Deserialize)]
pub struct TeacherQuery {
    tab: Option<TeacherTab>,
}

pub async fn get_teacher_dashboard(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(TeacherQuery { tab }): Query<TeacherQuery>,
) -> SchoolResult<Response<Body>> {
    if !session.can(PermissionsTarget::VIEW_TEACHER_DASHBOARD) {
        return Ok(Redirect::to("/login?next=/teacher").into_response());
    }
    if let Some(replace) = replace_password_redirect(session.user.as_ref(), "/teacher")? {
        return Ok(Redirect::to(&replace).into_response());
    }

    let teacher = current_teacher(&session)?;
    let student_count = teacher.student_count(&state).await?;
    let tab = tab.unwrap_or_default();

    Ok(state.render(session, html! {
        div class="bg-gray-800 p-8 rounded shadow-md max-w-6xl w-full" {
            (supertitle(format!("Welcome, {}", teacher.name)))

            div class="flex flex-col lg:flex-row gap-8 mb-8" {
                div class="flex flex-row gap-4 items-center" {
                    @if let Some(photo) = &teacher.profile_photo {
                        img src=(photo) alt=(teacher.name) class="h-24 w-24 rounded-full object-cover";
                    }
                    div {
                        (detail_row("Teacher ID", &teacher.teacher_id))
                        (detail_row("Email", Email(&teacher.email)))
                        @if let Some(phone) = &teacher.phone {
                            (detail_row("Phone", phone))
                        }
                        (detail_row("Classes", teacher.classes.join(", ")))
                        (detail_row("Sections", if teacher.sections.is_empty() { "All".to_string() } else { teacher.sections.join(", ") }))
                        (detail_row("Subjects", teacher.subjects.join(", ")))
                    }
                }
                div class="grid grid-cols-2 gap-4 flex-1" {
                    (stat_card("Classes", teacher.classes.len()))
                    (stat_card("Students", student_count))
                }
            }

            (tabs(tab.label(), &TEACHER_TABS))
            div hx-ext="sse" sse-connect="/sse_feed" {
                div id="tab_contents" hx-get=(tab.fragment()) hx-trigger="load" {}
            }
        }
    }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picker_values_split_back_apart() {
        assert_eq!(
            split_class_section("7:b"),
            Some(("7".to_string(), "B".to_string()))
        );
        assert_eq!(split_class_section("7"), None);
        assert_eq!(split_class_section(":A"), None);
    }

    #[test]
    fn picker_marks_the_chosen_class() {
        let pairs = vec![
            ("6".to_string(), "A".to_string()),
            ("9".to_string(), "NEEV".to_string()),
        ];
        let chosen = ("9".to_string(), "NEEV".to_string());
        let markup = class_section_picker("/internal/grades", &pairs, Some(&chosen), html! {})
            .into_string();

        assert!(markup.contains(r#"<option value="9:NEEV" selected>"#));
        assert!(markup.contains(r#"<option value="6:A">"#));
    }

    #[test]
    fn every_tab_has_a_link() {
        for tab in [TeacherTab::Homework, TeacherTab::Marks, TeacherTab::Attendance] {
            assert!(TEACHER_TABS.iter().any(|(label, _)| *label == tab.label()));
        }
    }
}
