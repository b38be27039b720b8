use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        attendance::{AttendanceRecord, AttendanceSheet, AttendanceStatus},
        student::Student,
    },
    error::{ClassSectionNotTaughtSnafu, SchoolResult},
    maud_conveniences::{INPUT_CLASSES, form_submit_button, success_message, table, title},
    routes::{
        sse::SseEvent,
        teacher::{class_section_picker, current_teacher, split_class_section},
    },
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use chrono::{NaiveDate, Utc};
use maud::{Markup, html};
use serde::Deserialize;
use snafu::ensure;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct AttendanceQuery {
    class_section: Option<String>,
    date: Option<String>,
}

fn count(marked: &HashMap<Uuid, AttendanceStatus>, status: AttendanceStatus) -> usize {
    marked.values().filter(|s| **s == status).count()
}

///one row per student, unmarked students default to present
fn register(
    class_name: &str,
    section: &str,
    date: NaiveDate,
    students: &[Student],
    marked: &HashMap<Uuid, AttendanceStatus>,
    message: Option<Markup>,
) -> Markup {
    let date = date.format("%Y-%m-%d").to_string();
    let rows: Vec<[Markup; 2]> = students
        .iter()
        .map(|student| {
            let current = marked
                .get(&student.id)
                .copied()
                .unwrap_or(AttendanceStatus::Present);
            let name = format!("status_{}", student.id);
            [
                html! {
                    p {(student)}
                    p class="text-xs text-gray-400" {(student.admission_id)}
                },
                html! {
                    div class="flex flex-row gap-4" {
                        @for status in AttendanceStatus::ALL {
                            @let id = format!("{name}_{}", status.as_str());
                            label for=(id) class="flex items-center cursor-pointer" {
                                input type="radio" id=(id) name=(name) value=(status.as_str()) checked[status == current] class="mr-1";
                                (status.label())
                            }
                        }
                    }
                },
            ]
        })
        .collect();

    html! {
        div id="attendance_register" {
            @if let Some(message) = message {
                (message)
            }
            @if marked.is_empty() {
                p class="italic text-gray-400 mb-2" {"Not yet marked for this day."}
            } @else {
                p class="text-gray-300 mb-2" {
                    "Present: " (count(marked, AttendanceStatus::Present))
                    ", Absent: " (count(marked, AttendanceStatus::Absent))
                    ", Late: " (count(marked, AttendanceStatus::Late))
                }
            }
            form hx-post="/internal/attendance" hx-target="#attendance_register" hx-swap="outerHTML" {
                input type="hidden" name="class_name" value=(class_name);
                input type="hidden" name="section" value=(section);
                input type="hidden" name="date" value=(date);
                (table(None, ["Student", "Status"], rows))
                div class="mt-4" {
                    (form_submit_button(Some("Save Attendance")))
                }
            }
        }
    }
}

pub async fn internal_get_attendance(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(AttendanceQuery { class_section, date }): Query<AttendanceQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::TAKE_ATTENDANCE)?;
    let teacher = current_teacher(&session)?;

    let pairs = teacher.class_sections();
    let selected = class_section.as_deref().and_then(split_class_section);
    let date = date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive());
    let date_input = html! {
        input type="date" name="date" value=(date.format("%Y-%m-%d").to_string()) class=(INPUT_CLASSES);
    };

    let contents = match &selected {
        None => html! {
            p class="italic text-gray-400" {"Choose a class to take attendance."}
        },
        Some((class_name, section)) => {
            ensure!(
                teacher.teaches(class_name, section),
                ClassSectionNotTaughtSnafu {
                    class_name,
                    section
                }
            );

            let students = Student::get_in_class(class_name, section, &state).await?;
            if students.is_empty() {
                html! { p class="italic text-gray-400" {"No students in this class yet."} }
            } else {
                let marked =
                    AttendanceRecord::get_for_class_on(class_name, section, date, &state).await?;
                register(class_name, section, date, &students, &marked, None)
            }
        }
    };

    Ok(html! {
        div class="flex flex-col" {
            (title("Attendance"))
            (class_section_picker("/internal/attendance", &pairs, selected.as_ref(), date_input))
            (contents)
        }
    })
}

pub async fn internal_post_attendance(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::TAKE_ATTENDANCE)?;
    let teacher = current_teacher(&session)?;

    let mut sheet = AttendanceSheet::from_pairs(pairs)?;
    ensure!(
        teacher.teaches(&sheet.class_name, &sheet.section),
        ClassSectionNotTaughtSnafu {
            class_name: sheet.class_name.clone(),
            section: sheet.section.clone(),
        }
    );

    let students = Student::get_in_class(&sheet.class_name, &sheet.section, &state).await?;
    let in_class: HashSet<Uuid> = students.iter().map(|student| student.id).collect();
    let submitted = sheet.entries.len();
    sheet.entries.retain(|(id, _)| in_class.contains(id));
    if sheet.entries.len() != submitted {
        warn!(
            dropped = submitted - sheet.entries.len(),
            "Ignored attendance for students outside the class"
        );
    }

    let written = AttendanceRecord::mark(&sheet, teacher.id, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudAttendance);

    let marked =
        AttendanceRecord::get_for_class_on(&sheet.class_name, &sheet.section, sheet.date, &state)
            .await?;
    Ok(register(
        &sheet.class_name,
        &sheet.section,
        sheet.date,
        &students,
        &marked,
        Some(success_message(format!(
            "Saved attendance for {written} students on {}.",
            sheet.date.format("%d %b %Y")
        ))),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            admission_id: format!("ADM-{name}"),
            name: name.into(),
            email: format!("{name}@example.org"),
            phone: None,
            class_name: "4".into(),
            section: "A".into(),
            class_id: None,
            dob: None,
            blood_group: None,
            father_name: None,
            mother_name: None,
            address: None,
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn unmarked_students_default_to_present() {
        let asha = student("asha");
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap_or_default();
        let markup = register("4", "A", date, &[asha.clone()], &HashMap::new(), None).into_string();

        assert!(markup.contains("Not yet marked for this day."));
        assert!(markup.contains(&format!(
            r#"name="status_{}" value="present" checked"#,
            asha.id
        )));
        assert!(markup.contains(r#"value="2024-06-03""#));
    }

    #[test]
    fn existing_marks_are_counted_and_checked() {
        let asha = student("asha");
        let ravi = student("ravi");
        let marked = HashMap::from([
            (asha.id, AttendanceStatus::Late),
            (ravi.id, AttendanceStatus::Absent),
        ]);
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap_or_default();
        let markup = register("4", "A", date, &[asha.clone(), ravi], &marked, None).into_string();

        assert!(markup.contains("Present: 0, Absent: 1, Late: 1"));
        assert!(markup.contains(&format!(r#"name="status_{}" value="late" checked"#, asha.id)));
    }
}
