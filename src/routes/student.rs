use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        attendance::AttendanceRecord,
        grade::{ExamSummary, Grade, summarise_by_exam},
        homework::{Homework, STUDENT_RECENT_HOMEWORK},
        student::Student,
    },
    error::{SchoolResult, UnableToFindUserInfoSnafu},
    maud_conveniences::{Email, detail_row, stat_card, subtitle, supertitle},
    routes::login::replace_password_redirect,
    state::SchoolState,
};
use axum::{
    body::Body,
    extract::State,
    http::Response,
    response::{IntoResponse, Redirect},
};
use maud::{Markup, html};
use snafu::OptionExt;

const RECENT_COMMENTS: usize = 5;

fn current_student(session: &SchoolSession) -> SchoolResult<Student> {
    session.ensure_can(PermissionsTarget::VIEW_STUDENT_DASHBOARD)?;
    session
        .current_user()?
        .as_student()
        .cloned()
        .context(UnableToFindUserInfoSnafu)
}

fn percentage_or_na(percentage: Option<i64>) -> String {
    percentage.map_or_else(|| "N/A".to_string(), |p| format!("{p}%"))
}

async fn stats(state: &SchoolState, student: &Student) -> SchoolResult<Markup> {
    let attendance = AttendanceRecord::summary_for_student(student.id, state).await?;
    let latest = Grade::latest_exam_percentage(student.id, state).await?;
    let assignments =
        Homework::count_for_class(&student.class_name, &student.section, state).await?;
    let exams = summarise_by_exam(&Grade::get_for_student(student.id, state).await?).len();

    Ok(html! {
        div class="grid grid-cols-2 lg:grid-cols-4 gap-4" {
            (stat_card("Attendance", attendance.display_percentage()))
            (stat_card("Latest Score", percentage_or_na(latest.map(i64::from))))
            (stat_card("Assignments", assignments))
            (stat_card("Exams", exams))
        }
    })
}

fn homework_list(homework: Vec<Homework>) -> Markup {
    html! {
        (subtitle("Recent Homework"))
        @if homework.is_empty() {
            p class="italic text-gray-400" {"No homework yet."}
        }
        div class="flex flex-col space-y-2" {
            @for item in homework {
                div class="rounded-lg p-4 bg-gray-700" {
                    div class="flex flex-row items-center justify-between" {
                        h3 class="font-semibold" {(item.title)}
                        span class="text-xs text-gray-400" {(item.subject)}
                    }
                    @if !item.description.is_empty() {
                        p class="text-gray-200 whitespace-pre-line" {(item.description)}
                    }
                    p class="text-xs text-gray-400 mt-2" {
                        "Set by " (item.teacher_name)
                        @if let Some(due) = item.submission_date {
                            ", due " (due.format("%d %b %Y").to_string())
                        }
                    }
                }
            }
        }
    }
}

fn performance(exams: &[ExamSummary], grades: &[Grade]) -> Markup {
    let comments: Vec<&Grade> = grades
        .iter()
        .filter(|grade| grade.comments.is_some())
        .take(RECENT_COMMENTS)
        .collect();

    html! {
        (subtitle("Academic Performance"))
        @if exams.is_empty() {
            p class="italic text-gray-400" {"No marks recorded yet."}
        }
        div class="flex flex-col space-y-4" {
            @for exam in exams {
                div class="rounded-lg p-4 bg-gray-700" {
                    div class="flex flex-row items-center justify-between mb-2" {
                        h3 class="font-semibold" {(exam.exam_type)}
                        span class="font-bold" {(percentage_or_na(exam.percentage()))}
                    }
                    ul {
                        @for grade in &exam.grades {
                            li class="flex flex-row justify-between text-gray-200" {
                                span {(grade.subject)}
                                span {(grade.marks_obtained) " / " (grade.total_marks)}
                            }
                        }
                    }
                }
            }
        }

        (subtitle("Recent Comments"))
        @if comments.is_empty() {
            p class="italic text-gray-400" {"No comments yet."}
        }
        ul class="flex flex-col space-y-2" {
            @for grade in comments {
                li class="rounded-lg p-3 bg-gray-700" {
                    p class="text-xs text-gray-400" {(grade.subject) ", " (grade.exam_type)}
                    p {(grade.comments.as_deref().unwrap_or_default())}
                }
            }
        }
    }
}

pub async fn get_student_dashboard(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Response<Body>> {
    if !session.can(PermissionsTarget::VIEW_STUDENT_DASHBOARD) {
        return Ok(Redirect::to("/login?next=/student").into_response());
    }
    if let Some(replace) = replace_password_redirect(session.user.as_ref(), "/student")? {
        return Ok(Redirect::to(&replace).into_response());
    }

    let student = current_student(&session)?;
    let stats = stats(&state, &student).await?;
    let homework = Homework::get_for_class(
        &student.class_name,
        &student.section,
        Some(STUDENT_RECENT_HOMEWORK),
        &state,
    )
    .await?;
    let grades = Grade::get_for_student(student.id, &state).await?;
    let exams = summarise_by_exam(&grades);

    Ok(state.render(session, html! {
        div class="bg-gray-800 p-8 rounded shadow-md max-w-6xl w-full" {
            (supertitle(format!("Welcome, {}", student.name)))

            div class="flex flex-col lg:flex-row gap-8 mb-8" {
                div class="flex flex-row gap-4 items-center" {
                    @if let Some(photo) = &student.profile_photo {
                        img src=(photo) alt=(student.name) class="h-24 w-24 rounded-full object-cover";
                    }
                    div {
                        (detail_row("Admission ID", &student.admission_id))
                        (detail_row("Class", format!("{} {}", student.class_name, student.section)))
                        (detail_row("Email", Email(&student.email)))
                        @if let Some(phone) = &student.phone {
                            (detail_row("Phone", phone))
                        }
                    }
                }
                div class="flex-1" {
                    (subtitle("Personal Details"))
                    @if let Some(dob) = student.dob {
                        (detail_row("Date of Birth", dob.format("%d %b %Y").to_string()))
                    }
                    @if let Some(blood_group) = &student.blood_group {
                        (detail_row("Blood Group", blood_group))
                    }
                    @if let Some(father_name) = &student.father_name {
                        (detail_row("Father's Name", father_name))
                    }
                    @if let Some(mother_name) = &student.mother_name {
                        (detail_row("Mother's Name", mother_name))
                    }
                    @if let Some(address) = &student.address {
                        (detail_row("Address", address))
                    }
                }
            }

            div hx-ext="sse" sse-connect="/sse_feed" class="flex flex-col space-y-8" {
                div hx-get="/internal/student/stats" hx-trigger="sse:crud_grade, sse:crud_homework, sse:crud_attendance" {
                    (stats)
                }
                div class="flex flex-col lg:flex-row gap-8" {
                    div class="flex-1" hx-get="/internal/student/homework" hx-trigger="sse:crud_homework" {
                        (homework_list(homework))
                    }
                    div class="flex-1" hx-get="/internal/student/performance" hx-trigger="sse:crud_grade" {
                        (performance(&exams, &grades))
                    }
                }
            }
        }
    }).into_response())
}

pub async fn internal_get_student_stats(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    let student = current_student(&session)?;
    stats(&state, &student).await
}

pub async fn internal_get_student_homework(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    let student = current_student(&session)?;
    Ok(homework_list(
        Homework::get_for_class(
            &student.class_name,
            &student.section,
            Some(STUDENT_RECENT_HOMEWORK),
            &state,
        )
        .await?,
    ))
}

pub async fn internal_get_student_performance(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    let student = current_student(&session)?;
    let grades = Grade::get_for_student(student.id, &state).await?;
    Ok(performance(&summarise_by_exam(&grades), &grades))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn grade(exam_type: &str, subject: &str, obtained: f64, comments: Option<&str>) -> Grade {
        Grade {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            subject: subject.into(),
            exam_type: exam_type.into(),
            marks_obtained: obtained,
            total_marks: 50.0,
            comments: comments.map(ToString::to_string),
            recorded_by: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn performance_groups_by_exam_with_percentages() {
        let grades = vec![
            grade("Annual", "Maths", 40.0, Some("Strong finish")),
            grade("Annual", "Science", 30.0, None),
            grade("Half Yearly", "Maths", 25.0, None),
        ];
        let markup = performance(&summarise_by_exam(&grades), &grades).into_string();

        assert!(markup.contains("Annual"));
        assert!(markup.contains("70%"));
        assert!(markup.contains("50%"));
        assert!(markup.contains("Strong finish"));
        assert!(!markup.contains("No comments yet."));
    }

    #[test]
    fn missing_scores_read_as_na() {
        assert_eq!(percentage_or_na(None), "N/A");
        assert_eq!(percentage_or_na(Some(83)), "83%");
    }
}
