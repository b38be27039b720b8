use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        DataType, IdForm,
        curriculum::{BLOOD_GROUPS, ClassNumber, SECTIONS, available_sections, available_subjects},
        student::{AddStudent, Student, StudentForm, StudentFormError},
        teacher::{AddTeacher, Teacher, TeacherForm, TeacherFormError},
    },
    error::{MissingStudentSnafu, MissingTeacherSnafu, SchoolResult},
    maud_conveniences::{
        INPUT_CLASSES, checkbox_group, default_password_notice, errors_list, form_element,
        form_submit_button, generate_password_checkbox, read_only_form_element,
        select_form_element, simple_form_element, success_message, table, title,
    },
    routes::sse::SseEvent,
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use maud::{Markup, html};
use secrecy::SecretString;
use serde::Deserialize;
use snafu::OptionExt;
use uuid::Uuid;

const TEACHER_CHOICES_URL: &str = "/internal/users/teacher_choices";

#[derive(Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserListKind {
    #[default]
    Students,
    Teachers,
}

impl UserListKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Teachers => "teachers",
        }
    }
}

///no id means a blank form for adding
#[derive(Deserialize)]
pub struct UserFormQuery {
    id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UsersQuery {
    kind: Option<UserListKind>,
}

pub async fn internal_get_users(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(UsersQuery { kind }): Query<UsersQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;
    let kind = kind.unwrap_or_default();

    let list = match kind {
        UserListKind::Students => students_table(Student::get_all(&state).await?),
        UserListKind::Teachers => teachers_table(Teacher::get_all(&state).await?),
    };

    let toggle_classes = |active: bool| {
        if active {
            "bg-blue-600 font-bold py-2 px-4 rounded"
        } else {
            "bg-gray-700 hover:bg-gray-600 py-2 px-4 rounded"
        }
    };

    Ok(html! {
        div hx-get={"/internal/users?kind=" (kind.as_str())} hx-trigger="sse:crud_user" hx-swap="outerHTML" class="flex flex-col space-y-4" {
            div class="flex flex-row items-center justify-between" {
                div class="flex flex-row space-x-2" {
                    button hx-get="/internal/users?kind=students" hx-target="#tab_contents" class=(toggle_classes(kind == UserListKind::Students)) {"Students"}
                    button hx-get="/internal/users?kind=teachers" hx-target="#tab_contents" class=(toggle_classes(kind == UserListKind::Teachers)) {"Teachers"}
                }
                @match kind {
                    UserListKind::Students => {
                        button class="bg-green-700 hover:bg-green-800 font-bold py-2 px-4 rounded" hx-get="/internal/users/student_form" hx-target="#in_focus" {"Add Student"}
                    },
                    UserListKind::Teachers => {
                        button class="bg-green-700 hover:bg-green-800 font-bold py-2 px-4 rounded" hx-get="/internal/users/teacher_form" hx-target="#in_focus" {"Add Teacher"}
                    },
                }
            }
            (list)
        }
    })
}

fn row_actions(edit_url: &str, delete_url: &str, name: &str) -> Markup {
    html! {
        div class="flex flex-row space-x-2" {
            button class="bg-blue-600 hover:bg-blue-800 text-sm py-1 px-2 rounded" hx-get=(edit_url) hx-target="#in_focus" {"Edit"}
            button class="bg-red-600 hover:bg-red-800 text-sm py-1 px-2 rounded" hx-delete=(delete_url) hx-target="#in_focus" hx-confirm={"Delete " (name) "? This cannot be undone."} {"Delete"}
        }
    }
}

fn students_table(students: Vec<Student>) -> Markup {
    table(
        Some(title("Students")),
        ["Name", "Admission ID", "Class", "Email", ""],
        students
            .into_iter()
            .map(|student| {
                [
                    html! {(student)},
                    html! {(student.admission_id)},
                    html! {(student.class_name) "-" (student.section)},
                    html! {(student.email)},
                    row_actions(
                        &format!("/internal/users/student_form?id={}", student.id),
                        &format!("/internal/users/student?id={}", student.id),
                        &student.name,
                    ),
                ]
            })
            .collect(),
    )
}

fn teachers_table(teachers: Vec<Teacher>) -> Markup {
    table(
        Some(title("Teachers")),
        ["Name", "Teacher ID", "Classes", "Subjects", ""],
        teachers
            .into_iter()
            .map(|teacher| {
                [
                    html! {(teacher)},
                    html! {(teacher.teacher_id)},
                    html! {(teacher.classes.join(", ")) " (" (teacher.sections.join(", ")) ")"},
                    html! {(teacher.subjects.join(", "))},
                    row_actions(
                        &format!("/internal/users/teacher_form?id={}", teacher.id),
                        &format!("/internal/users/teacher?id={}", teacher.id),
                        &teacher.name,
                    ),
                ]
            })
            .collect(),
    )
}

fn saved_card(verb: &str, name: &str, identifier: &str, generated: Option<&SecretString>) -> Markup {
    html! {
        div class="rounded-lg shadow-md bg-gray-700 p-4" {
            (success_message(html! { (verb) " " (name) " (" (identifier) ")." }))
            @if let Some(generated) = generated {
                (default_password_notice(identifier, generated))
            }
        }
    }
}

fn password_fields(editing: bool) -> Markup {
    let label = if editing {
        "New Password (leave blank to keep the current one)"
    } else {
        "Password"
    };

    html! {
        (simple_form_element("password", label, false, Some("password"), None))
        (generate_password_checkbox())
    }
}

fn class_names() -> Vec<String> {
    ClassNumber::all().map(|class| class.to_string()).collect()
}

pub fn student_form(form: &StudentForm, editing: Option<Uuid>, errors: StudentFormError) -> Markup {
    let classes = class_names();

    html! {
        div class="rounded-lg shadow-md bg-gray-700 p-4" {
            @if editing.is_some() {
                (title("Edit Student"))
            } @else {
                (title("Add New Student"))
            }

            @if !errors.is_empty() {
                (errors_list(None, errors.as_nice_list()))
            }

            @if let Some(id) = editing {
                form hx-post={"/internal/users/student?id=" (id.to_string())} hx-target="#in_focus" {
                    (read_only_form_element("admission_id", "Admission ID", &form.admission_id))
                    (student_fields(form, &classes))
                    (password_fields(true))
                    (form_submit_button(Some("Save Student")))
                }
            } @else {
                form hx-put="/internal/users/student" hx-target="#in_focus" {
                    (simple_form_element("admission_id", "Admission ID", true, None, Some(&form.admission_id)))
                    (student_fields(form, &classes))
                    (password_fields(false))
                    (form_submit_button(Some("Add Student")))
                }
            }
        }
    }
}

fn student_fields(form: &StudentForm, classes: &[String]) -> Markup {
    html! {
        (simple_form_element("name", "Name", true, None, Some(&form.name)))
        (simple_form_element("email", "Email", true, Some("email"), Some(&form.email)))
        (simple_form_element("phone", "Phone", false, Some("tel"), Some(&form.phone)))
        div class="flex flex-row gap-4" {
            div class="flex-1" {
                (select_form_element("class_name", "Class", "Select a class", classes.iter().map(|c| (c.as_str(), c.as_str())), Some(form.class_name.trim())))
            }
            div class="flex-1" {
                (select_form_element("section", "Section", "Select a section", SECTIONS.iter().map(|s| (*s, *s)), Some(form.section.trim())))
            }
        }
        (simple_form_element("dob", "Date of Birth", true, Some("date"), Some(&form.dob)))
        (select_form_element("blood_group", "Blood Group", "Unknown", BLOOD_GROUPS.iter().map(|g| (*g, *g)), Some(form.blood_group.trim())))
        (simple_form_element("father_name", "Father's Name", false, None, Some(&form.father_name)))
        (simple_form_element("mother_name", "Mother's Name", false, None, Some(&form.mother_name)))
        (form_element("address", "Address", html! {
            textarea id="address" name="address" rows="2" class=(INPUT_CLASSES) {(form.address)}
        }))
        (simple_form_element("profile_photo", "Profile Photo URL", false, Some("url"), Some(&form.profile_photo)))
    }
}

pub async fn internal_get_student_form(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(UserFormQuery { id }): Query<UserFormQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let Some(id) = id else {
        return Ok(student_form(
            &StudentForm::default(),
            None,
            StudentFormError::empty(),
        ));
    };

    let student = Student::get_from_db_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingStudentSnafu { id })?;

    Ok(student_form(
        &StudentForm::from(&student),
        Some(id),
        StudentFormError::empty(),
    ))
}

pub async fn internal_put_student(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(form): Form<StudentForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let (details, password) = match form.clone().validate(true) {
        Ok(valid) => valid,
        Err(errors) => return Ok(student_form(&form, None, errors)),
    };
    let password = password.resolve(&state.config().auth_config());
    let generated = password
        .as_ref()
        .filter(|password| password.is_default)
        .map(|password| password.plaintext.clone());
    let name = details.name.clone();
    let admission_id = details.admission_id.clone();

    Student::insert_into_database(
        AddStudent { details, password },
        &mut *state.get_connection().await?,
    )
    .await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(saved_card("Added", &name, &admission_id, generated.as_ref()))
}

pub async fn internal_post_student(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
    Form(form): Form<StudentForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let mut conn = state.get_connection().await?;
    let existing = Student::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingStudentSnafu { id })?;

    //the admission id is read-only, so never trust what came back for it
    let form = StudentForm {
        admission_id: existing.admission_id,
        ..form
    };
    let (details, password) = match form.clone().validate(false) {
        Ok(valid) => valid,
        Err(errors) => return Ok(student_form(&form, Some(id), errors)),
    };
    let password = password.resolve(&state.config().auth_config());
    let generated = password
        .as_ref()
        .filter(|password| password.is_default)
        .map(|password| password.plaintext.clone());
    let name = details.name.clone();
    let admission_id = details.admission_id.clone();

    Student::update_in_database(id, details, password, &mut conn).await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(saved_card("Saved", &name, &admission_id, generated.as_ref()))
}

pub async fn delete_student(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    Student::remove_from_database(id, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(success_message("Student removed."))
}

///sections and subjects depend on which classes are ticked
pub fn teacher_choices(form: &TeacherForm) -> Markup {
    let sections = available_sections(&form.classes);
    let subjects = available_subjects(&form.classes);

    html! {
        (checkbox_group("sections", "Sections", sections, &form.sections, None))
        (checkbox_group("subjects", "Subjects", subjects, &form.subjects, None))
    }
}

pub fn teacher_form(form: &TeacherForm, editing: Option<Uuid>, errors: TeacherFormError) -> Markup {
    let classes = class_names();

    let fields = html! {
        (simple_form_element("name", "Name", true, None, Some(&form.name)))
        (simple_form_element("email", "Email", true, Some("email"), Some(&form.email)))
        (simple_form_element("phone", "Phone", false, Some("tel"), Some(&form.phone)))
        (simple_form_element("profile_photo", "Profile Photo URL", false, Some("url"), Some(&form.profile_photo)))
        (checkbox_group(
            "classes",
            "Classes",
            classes.iter().map(String::as_str),
            &form.classes,
            Some((TEACHER_CHOICES_URL, "#teacher_choices")),
        ))
        div id="teacher_choices" {
            (teacher_choices(form))
        }
    };

    html! {
        div class="rounded-lg shadow-md bg-gray-700 p-4" {
            @if editing.is_some() {
                (title("Edit Teacher"))
            } @else {
                (title("Add New Teacher"))
            }

            @if !errors.is_empty() {
                (errors_list(None, errors.as_nice_list()))
            }

            @if let Some(id) = editing {
                form hx-post={"/internal/users/teacher?id=" (id.to_string())} hx-target="#in_focus" {
                    (read_only_form_element("teacher_id", "Teacher ID", &form.teacher_id))
                    (fields)
                    (password_fields(true))
                    (form_submit_button(Some("Save Teacher")))
                }
            } @else {
                form hx-put="/internal/users/teacher" hx-target="#in_focus" {
                    (simple_form_element("teacher_id", "Teacher ID", true, None, Some(&form.teacher_id)))
                    (fields)
                    (password_fields(false))
                    (form_submit_button(Some("Add Teacher")))
                }
            }
        }
    }
}

pub async fn internal_get_teacher_form(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(UserFormQuery { id }): Query<UserFormQuery>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let Some(id) = id else {
        return Ok(teacher_form(
            &TeacherForm::default(),
            None,
            TeacherFormError::empty(),
        ));
    };

    let teacher = Teacher::get_from_db_by_id(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingTeacherSnafu { id })?;

    Ok(teacher_form(
        &TeacherForm::from(&teacher),
        Some(id),
        TeacherFormError::empty(),
    ))
}

pub async fn internal_post_teacher_choices(
    session: SchoolSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;
    Ok(teacher_choices(&TeacherForm::from_pairs(pairs)))
}

pub async fn internal_put_teacher(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(pairs): Form<Vec<(String, String)>>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let form = TeacherForm::from_pairs(pairs);
    let (details, password) = match form.clone().validate(true) {
        Ok(valid) => valid,
        Err(errors) => return Ok(teacher_form(&form, None, errors)),
    };
    let password = password.resolve(&state.config().auth_config());
    let generated = password
        .as_ref()
        .filter(|password| password.is_default)
        .map(|password| password.plaintext.clone());
    let name = details.name.clone();
    let teacher_id = details.teacher_id.clone();

    Teacher::insert_into_database(
        AddTeacher { details, password },
        &mut *state.get_connection().await?,
    )
    .await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(saved_card("Added", &name, &teacher_id, generated.as_ref()))
}

pub async fn internal_post_teacher(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    let mut conn = state.get_connection().await?;
    let existing = Teacher::get_from_db_by_id(id, &mut conn)
        .await?
        .context(MissingTeacherSnafu { id })?;

    let form = TeacherForm {
        teacher_id: existing.teacher_id,
        ..TeacherForm::from_pairs(pairs)
    };
    let (details, password) = match form.clone().validate(false) {
        Ok(valid) => valid,
        Err(errors) => return Ok(teacher_form(&form, Some(id), errors)),
    };
    let password = password.resolve(&state.config().auth_config());
    let generated = password
        .as_ref()
        .filter(|password| password.is_default)
        .map(|password| password.plaintext.clone());
    let name = details.name.clone();
    let teacher_id = details.teacher_id.clone();

    Teacher::update_in_database(id, details, password, &mut conn).await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(saved_card("Saved", &name, &teacher_id, generated.as_ref()))
}

pub async fn delete_teacher(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_USERS)?;

    Teacher::remove_from_database(id, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudUser);

    Ok(success_message("Teacher removed."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neev_is_only_offered_to_senior_classes() {
        let junior = teacher_choices(&TeacherForm {
            classes: vec!["3".into()],
            ..TeacherForm::default()
        })
        .into_string();
        assert!(!junior.contains("NEEV"));
        assert!(junior.contains("EVS"));

        let senior = teacher_choices(&TeacherForm {
            classes: vec!["9".into()],
            sections: vec!["NEEV".into()],
            ..TeacherForm::default()
        })
        .into_string();
        assert!(senior.contains(r#"value="NEEV" checked"#));
        assert!(senior.contains(r#"value="AI""#));
    }

    #[test]
    fn no_classes_means_nothing_to_choose() {
        let markup = teacher_choices(&TeacherForm::default()).into_string();
        assert_eq!(markup.matches("Nothing to choose from yet.").count(), 2);
    }

    #[test]
    fn editing_locks_the_identifier() {
        let form = StudentForm {
            admission_id: "ADM-42".into(),
            ..StudentForm::default()
        };

        let editing = student_form(&form, Some(Uuid::nil()), StudentFormError::empty()).into_string();
        assert!(editing.contains("readonly"));
        assert!(editing.contains("hx-post"));
        assert!(editing.contains("leave blank to keep"));

        let adding = student_form(&form, None, StudentFormError::EMPTY_NAME).into_string();
        assert!(!adding.contains("readonly"));
        assert!(adding.contains("hx-put"));
        assert!(adding.contains(r#"role="alert""#));
    }
}
