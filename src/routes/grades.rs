use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        DataType, IdForm,
        curriculum::available_subjects,
        grade::{Grade, GradeForm, GradeWithStudent},
        student::Student,
        teacher::Teacher,
    },
    error::{
        ClassSectionNotTaughtSnafu, MissingGradeSnafu, MissingStudentSnafu, SchoolResult,
        StudentNotTaughtSnafu,
    },
    maud_conveniences::{
        INPUT_CLASSES, errors_list, form_element, form_submit_button, select_form_element,
        simple_form_element, success_message, table, title,
    },
    routes::{
        sse::SseEvent,
        teacher::{class_section_picker, selectable_class_sections, split_class_section},
    },
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use maud::{Markup, html};
use serde::Deserialize;
use snafu::{OptionExt, ensure};

const EXAM_SUGGESTIONS: [&str; 5] = [
    "Unit Test 1",
    "Unit Test 2",
    "Half Yearly",
    "Unit Test 3",
    "Annual",
];

#[derive(Deserialize)]
pub struct GradesQuery {
    class_section: Option<String>,
}

///teachers only see classes they teach, admins see everything
fn ensure_may_view(
    session: &SchoolSession,
    class_name: &str,
    section: &str,
) -> SchoolResult<()> {
    if let Some(teacher) = session.current_user()?.as_teacher() {
        ensure!(
            teacher.teaches(class_name, section),
            ClassSectionNotTaughtSnafu {
                class_name,
                section
            }
        );
    }
    Ok(())
}

///what the class studies, narrowed to what the teacher teaches
fn subject_choices(teacher: Option<&Teacher>, class_name: &str) -> Vec<String> {
    available_subjects(&[class_name])
        .into_iter()
        .filter(|subject| teacher.is_none_or(|teacher| teacher.teaches_subject(subject)))
        .map(ToString::to_string)
        .collect()
}

fn grades_table(grades: Vec<GradeWithStudent>) -> Markup {
    table(
        None,
        ["Student", "Subject", "Exam", "Marks", "Comments", ""],
        grades
            .into_iter()
            .map(|GradeWithStudent { grade, student_name, admission_id }| {
                let id = grade.id.to_string();
                let percentage = grade
                    .percentage()
                    .map_or_else(|| "N/A".to_string(), |p| format!("{p}%"));
                [
                    html! {
                        p {(student_name)}
                        p class="text-xs text-gray-400" {(admission_id)}
                    },
                    html! {(grade.subject)},
                    html! {(grade.exam_type)},
                    html! {(grade.marks_obtained) " / " (grade.total_marks) " (" (percentage) ")"},
                    html! {(grade.comments.unwrap_or_default())},
                    html! {
                        button class="bg-red-600 hover:bg-red-800 text-sm py-1 px-2 rounded" hx-delete={"/internal/grades?id=" (id)} hx-swap="none" hx-confirm="Delete this mark?" {"Delete"}
                    },
                ]
            })
            .collect(),
    )
}

fn record_form(students: &[Student], subjects: &[String]) -> Markup {
    let students: Vec<(String, String)> = students
        .iter()
        .map(|student| {
            (
                student.id.to_string(),
                format!("{} ({})", student.name, student.admission_id),
            )
        })
        .collect();

    html! {
        form hx-put="/internal/grades" hx-target="#grade_result" class="rounded-lg bg-gray-700 p-4 mb-4" {
            div class="flex flex-row gap-4" {
                div class="flex-1" {
                    (select_form_element("student_id", "Student", "Choose a student", students.iter().map(|(id, name)| (id.as_str(), name.as_str())), None))
                }
                div class="flex-1" {
                    (select_form_element("subject", "Subject", "Choose a subject", subjects.iter().map(|s| (s.as_str(), s.as_str())), None))
                }
            }
            (form_element("exam_type", "Exam", html! {
                input required id="exam_type" name="exam_type" type="text" list="exam_suggestions" class=(INPUT_CLASSES);
                datalist id="exam_suggestions" {
                    @for exam in EXAM_SUGGESTIONS {
                        option value=(exam) {}
                    }
                }
            }))
            div class="flex flex-row gap-4" {
                div class="flex-1" {
                    (simple_form_element("marks_obtained", "Marks Obtained", true, Some("number"), None))
                }
                div class="flex-1" {
                    (simple_form_element("total_marks", "Total Marks", true, Some("number"), Some("100")))
                }
            }
            (simple_form_element("comments", "Comments", false, None, None))
            (form_submit_button(Some("Record Marks")))
        }
    }
}

pub async fn internal_get_grades(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(GradesQuery { class_section }): Query<GradesQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GRADES)?;

    let pairs = selectable_class_sections(&state, &session).await?;
    let selected = class_section.as_deref().and_then(split_class_section);

    let contents = match &selected {
        None => html! {
            p class="italic text-gray-400" {"Choose a class to record and review marks."}
        },
        Some((class_name, section)) => {
            ensure_may_view(&session, class_name, section)?;

            let students = Student::get_in_class(class_name, section, &state).await?;
            let grades = Grade::get_for_class(class_name, section, &state).await?;
            let subjects = subject_choices(session.current_user()?.as_teacher(), class_name);
            let list_url = format!("/internal/grades/list?class_section={class_name}:{section}");

            html! {
                div id="grade_result" {}
                @if students.is_empty() {
                    p class="italic text-gray-400 mb-4" {"No students in this class yet."}
                } @else {
                    (record_form(&students, &subjects))
                }
                div hx-get=(list_url) hx-trigger="sse:crud_grade" hx-swap="innerHTML" {
                    (grades_table(grades))
                }
            }
        }
    };

    Ok(html! {
        div class="flex flex-col" {
            (title("Marks"))
            (class_section_picker("/internal/grades", &pairs, selected.as_ref(), html! {}))
            (contents)
        }
    })
}

pub async fn internal_get_grades_list(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(GradesQuery { class_section }): Query<GradesQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GRADES)?;

    let Some((class_name, section)) = class_section.as_deref().and_then(split_class_section)
    else {
        return Ok(html! {});
    };
    ensure_may_view(&session, &class_name, &section)?;

    Ok(grades_table(
        Grade::get_for_class(&class_name, &section, &state).await?,
    ))
}

pub async fn internal_put_grade(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(form): Form<GradeForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GRADES)?;
    let user = session.current_user()?;

    let grade = match form.validate(user.id) {
        Ok(grade) => grade,
        Err(errors) => return Ok(errors_list(None, errors.as_nice_list())),
    };

    let mut conn = state.get_connection().await?;
    let student = Student::get_from_db_by_id(grade.student_id, &mut conn)
        .await?
        .context(MissingStudentSnafu {
            id: grade.student_id,
        })?;
    if let Some(teacher) = user.as_teacher() {
        grade.ensure_teacher_may_record(teacher, &student)?;
    }

    let message = format!(
        "Recorded {} marks in {} for {}.",
        grade.exam_type, grade.subject, student.name
    );
    Grade::insert_into_database(grade, &mut conn).await?;
    state.send_sse_event(SseEvent::CrudGrade);

    Ok(success_message(message))
}

pub async fn delete_grade(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GRADES)?;
    let user = session.current_user()?;

    let mut conn = state.get_connection().await?;
    let grade = Grade::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingGradeSnafu { id })?;

    if let Some(teacher) = user.as_teacher() {
        let student = Student::get_from_db_by_id(grade.student_id, &mut conn)
            .await?
            .context(MissingStudentSnafu {
                id: grade.student_id,
            })?;
        ensure!(
            teacher.teaches(&student.class_name, &student.section),
            StudentNotTaughtSnafu {
                student: student.name
            }
        );
    }

    Grade::remove_from_database(id, &mut conn).await?;
    state.send_sse_event(SseEvent::CrudGrade);

    Ok(html! {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[test]
    fn grades_show_marks_and_percentage() {
        let grades = vec![GradeWithStudent {
            grade: Grade {
                id: Uuid::nil(),
                student_id: Uuid::nil(),
                subject: "Science".into(),
                exam_type: "Half Yearly".into(),
                marks_obtained: 45.0,
                total_marks: 50.0,
                comments: Some("Well done".into()),
                recorded_by: None,
                created_at: DateTime::<Utc>::UNIX_EPOCH,
            },
            student_name: "Asha Rao".into(),
            admission_id: "ADM-7".into(),
        }];

        let markup = grades_table(grades).into_string();
        assert!(markup.contains("Asha Rao"));
        assert!(markup.contains("45 / 50 (90%)"));
        assert!(markup.contains("Well done"));
    }

    #[test]
    fn subjects_are_limited_to_the_class() {
        let teacher = Teacher {
            id: Uuid::nil(),
            teacher_id: "T-4".into(),
            name: "Kiran".into(),
            email: "kiran@example.org".into(),
            phone: None,
            classes: vec!["3".into(), "9".into()],
            sections: vec!["A".into()],
            subjects: vec!["Maths".into(), "AI".into()],
            profile_photo: None,
            status: "active".into(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };

        assert_eq!(subject_choices(Some(&teacher), "3"), vec!["Maths".to_string()]);
        assert_eq!(
            subject_choices(Some(&teacher), "9"),
            vec!["AI".to_string(), "Maths".to_string()]
        );
        assert!(subject_choices(None, "3").contains(&"EVS".to_string()));
    }

    #[test]
    fn form_suggests_exam_names() {
        let markup = record_form(&[], &["Maths".to_string()]).into_string();
        assert!(markup.contains(r#"<option value="Half Yearly">"#));
        assert!(markup.contains(r#"<option value="Maths">Maths</option>"#));
    }
}
