use crate::{
    auth::{AuthUtilities, NewPassword, PermissionsTarget, SchoolSession},
    data::{
        DataType,
        student::{AddStudent, Student, StudentForm},
        teacher::{AddTeacher, RosterTeacher, Teacher, TeacherForm},
    },
    error::{
        CommitTransactionSnafu, CsvFlushSnafu, CsvSnafu, JsonSnafu, MultipartSnafu,
        RollbackTransactionSnafu, SchoolResult,
    },
    maud_conveniences::{errors_list, form_submit_button, subsubtitle, table, title},
    routes::sse::SseEvent,
    state::SchoolState,
};
use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{Response, header},
    response::IntoResponse,
};
use maud::{Markup, html};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use snafu::ResultExt;

const FILE_INPUT_CLASSES: &str = "block w-full text-sm text-gray-300 file:mr-4 file:py-2 file:px-4 file:rounded file:border-0 file:text-sm file:font-semibold file:bg-blue-50 file:text-blue-700 hover:file:bg-blue-100 mb-4";

pub async fn get_import_export_page(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::EXPORT_CSVS)?;
    let can_import = session.can(PermissionsTarget::IMPORT_CSVS);

    Ok(state.render(session, html!{
        div class="mx-auto flex flex-col lg:flex-row justify-center p-2 m-2 rounded gap-8" {
            div class="rounded shadow-xl flex flex-col p-4 m-2 bg-gray-800" {
                (title("Teachers"))

                div class="mb-8" {
                    h3 class="text-xl font-semibold mb-4" {"Export Teachers"}
                    a href="/import_export/teachers.csv" class="bg-blue-600 hover:bg-blue-700 font-bold py-2 px-4 rounded" {"Download as CSV"}
                }

                @if can_import {
                    h3 class="text-xl font-semibold mb-4" {"Import Teacher Roster"}
                    div id="import_roster_form" {
                        (table(
                            Some(subsubtitle("JSON Format (an array of these)")),
                            ["Key", "Example", "Required"],
                            vec![
                                ["teacherId", "\"T-12\" or 12", "Yes"],
                                ["name", "\"Meera Iyer\"", "Yes"],
                                ["email", "\"meera@example.org\"", "Yes"],
                                ["classes", "[6, \"7\"]", "Yes"],
                                ["sections", "[\"A\", \"B\"]", "Yes"],
                                ["subjects", "[\"Maths\"]", "Yes"],
                                ["phone", "\"98450 12345\"", "No"],
                                ["profilePhoto", "\"https://...\"", "No"],
                            ]
                        ))
                        br;
                        form hx-put="/import_export/import_roster" hx-swap="innerHTML" hx-target="#import_roster_form" hx-encoding="multipart/form-data" {
                            label for="roster_json" class="block text-sm font-medium text-gray-400 mb-2" {"Upload Roster JSON"}
                            input type="file" name="roster_json" id="roster_json" accept=".json" class=(FILE_INPUT_CLASSES);
                            (form_submit_button(Some("Import Teachers")))
                        }
                    }
                }
            }

            div class="rounded shadow-xl flex flex-col p-4 m-2 bg-gray-800" {
                (title("Students"))

                div class="mb-8" {
                    h3 class="text-xl font-semibold mb-4" {"Export Students"}
                    a href="/import_export/students.csv" class="bg-blue-600 hover:bg-blue-700 font-bold py-2 px-4 rounded" {"Download as CSV"}
                }

                @if can_import {
                    h3 class="text-xl font-semibold mb-4" {"Import Students"}
                    div id="import_students_form" {
                        (table(
                            Some(subsubtitle("CSV Format")),
                            ["Column", "Example", "Required"],
                            vec![
                                ["admission_id", "ADM-1042", "Yes"],
                                ["name", "Asha Rao", "Yes"],
                                ["email", "asha@example.org", "Yes"],
                                ["class_name", "7", "Yes"],
                                ["section", "B", "Yes"],
                                ["dob", "2012-04-30", "Yes"],
                                ["phone", "98450 12345", "No"],
                                ["blood_group", "O+", "No"],
                                ["father_name", "Ravi Rao", "No"],
                                ["mother_name", "Lakshmi Rao", "No"],
                                ["address", "12 MG Road", "No"],
                            ]
                        ))
                        p class="italic" {"Every imported student gets a generated password, shown once after the import."}
                        br;
                        form hx-put="/import_export/import_students" hx-swap="innerHTML" hx-target="#import_students_form" hx-encoding="multipart/form-data" {
                            label for="students_csv" class="block text-sm font-medium text-gray-400 mb-2" {"Upload Students CSV"}
                            input multiple type="file" name="students_csv" id="students_csv" accept=".csv" class=(FILE_INPUT_CLASSES);
                            (form_submit_button(Some("Import Students")))
                        }
                    }
                }
            }
        }
    }))
}

async fn read_uploads(mut multipart: Multipart) -> SchoolResult<Vec<Vec<u8>>> {
    let mut files = vec![];
    while let Some(field) = multipart.next_field().await.context(MultipartSnafu)? {
        files.push(field.bytes().await.context(MultipartSnafu)?.to_vec());
    }
    Ok(files)
}

fn parse_roster(bytes: &[u8]) -> SchoolResult<Vec<TeacherForm>> {
    let roster: Vec<RosterTeacher> = serde_json::from_slice(bytes).context(JsonSnafu)?;
    Ok(roster.into_iter().map(RosterTeacher::into_form).collect())
}

///rows that fail to parse are reported by their line in the file, counting the header as line 1
fn parse_students_csv(bytes: &[u8]) -> (Vec<(usize, StudentForm)>, Vec<String>) {
    let mut rows = vec![];
    let mut errors = vec![];

    let mut rdr = csv::Reader::from_reader(bytes);
    for (i, record) in rdr.deserialize::<StudentForm>().enumerate() {
        let line = i + 2;
        match record {
            Ok(mut form) => {
                form.password = None;
                form.generate_password = Some("on".into());
                rows.push((line, form));
            }
            Err(e) => errors.push(format!("Line {line}: {e}")),
        }
    }

    (rows, errors)
}

fn passwords_table(caption: &str, rows: Vec<(String, String, SecretString)>) -> Markup {
    html! {
        div class="flex flex-col space-y-4" {
            p class="text-green-400" {(caption)}
            p class="italic text-gray-400" {"These passwords are not shown again. Everyone will be asked to choose their own at first login."}
            (table(
                None,
                ["ID", "Name", "Default Password"],
                rows.into_iter()
                    .map(|(identifier, name, password)| [
                        html! {(identifier)},
                        html! {(name)},
                        html! {span class="font-mono" {(password.expose_secret())}},
                    ])
                    .collect(),
            ))
        }
    }
}

fn generated(password: Option<&NewPassword>) -> SecretString {
    password.map_or_else(
        || SecretString::from(String::new()),
        |password| password.plaintext.clone(),
    )
}

pub async fn put_import_roster(
    State(state): State<SchoolState>,
    session: SchoolSession,
    multipart: Multipart,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let mut forms = vec![];
    for file in read_uploads(multipart).await? {
        forms.extend(parse_roster(&file)?);
    }

    let mut validation_errors = vec![];
    let mut teachers = vec![];
    for (i, form) in forms.into_iter().enumerate() {
        let label = if form.teacher_id.trim().is_empty() {
            format!("Entry {}", i + 1)
        } else {
            format!("Entry {} ({})", i + 1, form.teacher_id.trim())
        };
        match form.validate(true) {
            Ok(valid) => teachers.push(valid),
            Err(errors) => validation_errors.extend(
                errors
                    .as_nice_list()
                    .map(|message| format!("{label}: {message}")),
            ),
        }
    }

    if !validation_errors.is_empty() {
        return Ok(errors_list(
            Some("Nothing was imported, the roster had these problems:"),
            validation_errors.into_iter(),
        ));
    }

    let auth_config = state.config().auth_config();
    let mut added = vec![];
    let mut insert_errors = vec![];
    let mut tx = state.get_transaction().await?;

    for (details, password) in teachers {
        let password = password.resolve(&auth_config);
        let shown = generated(password.as_ref());
        let (teacher_id, name) = (details.teacher_id.clone(), details.name.clone());

        if Teacher::get_by_teacher_id(&teacher_id, &mut tx).await?.is_some() {
            insert_errors.push(format!("{teacher_id}: a teacher with this ID already exists"));
            continue;
        }
        match Teacher::insert_into_database(AddTeacher { details, password }, &mut tx).await {
            Ok(_) => added.push((teacher_id, name, shown)),
            Err(e) => {
                //the transaction is unusable after a failed insert
                insert_errors.push(format!("{teacher_id}: {e}"));
                break;
            }
        }
    }

    if !insert_errors.is_empty() {
        tx.rollback().await.context(RollbackTransactionSnafu)?;
        return Ok(errors_list(
            Some("Errors adding teachers to database, nothing was imported:"),
            insert_errors.into_iter(),
        ));
    }

    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_sse_event(SseEvent::CrudUser);
    info!(count = added.len(), "Imported teacher roster");

    Ok(passwords_table(
        &format!("Imported {} teachers.", added.len()),
        added,
    ))
}

pub async fn put_import_students(
    State(state): State<SchoolState>,
    session: SchoolSession,
    multipart: Multipart,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::IMPORT_CSVS)?;

    let mut rows = vec![];
    let mut problems = vec![];
    for file in read_uploads(multipart).await? {
        let (parsed, syntax_errors) = parse_students_csv(&file);
        rows.extend(parsed);
        problems.extend(syntax_errors);
    }

    let mut students = vec![];
    for (line, form) in rows {
        match form.validate(true) {
            Ok(valid) => students.push(valid),
            Err(errors) => problems.extend(
                errors
                    .as_nice_list()
                    .map(|message| format!("Line {line}: {message}")),
            ),
        }
    }

    if !problems.is_empty() {
        return Ok(errors_list(
            Some("Nothing was imported, the CSV had these problems:"),
            problems.into_iter(),
        ));
    }

    let auth_config = state.config().auth_config();
    let mut added = vec![];
    let mut insert_errors = vec![];
    let mut tx = state.get_transaction().await?;

    for (details, password) in students {
        let password = password.resolve(&auth_config);
        let shown = generated(password.as_ref());
        let (admission_id, name) = (details.admission_id.clone(), details.name.clone());

        if Student::get_by_admission_id(&admission_id, &mut tx).await?.is_some() {
            insert_errors.push(format!(
                "{admission_id}: a student with this admission ID already exists"
            ));
            continue;
        }
        match Student::insert_into_database(AddStudent { details, password }, &mut tx).await {
            Ok(_) => added.push((admission_id, name, shown)),
            Err(e) => {
                //the transaction is unusable after a failed insert
                insert_errors.push(format!("{admission_id}: {e}"));
                break;
            }
        }
    }

    if !insert_errors.is_empty() {
        tx.rollback().await.context(RollbackTransactionSnafu)?;
        return Ok(errors_list(
            Some("Errors adding students to database, nothing was imported:"),
            insert_errors.into_iter(),
        ));
    }

    tx.commit().await.context(CommitTransactionSnafu)?;
    state.send_sse_event(SseEvent::CrudUser);
    info!(count = added.len(), "Imported students");

    Ok(passwords_table(
        &format!("Imported {} students.", added.len()),
        added,
    ))
}

fn csv_bytes<T: Serialize>(rows: impl IntoIterator<Item = T>) -> SchoolResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    for row in rows {
        writer.serialize(row).context(CsvSnafu)?;
    }
    writer
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .context(CsvFlushSnafu)
}

fn csv_download(filename: &str, bytes: Vec<u8>) -> Response<Body> {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

#[derive(Serialize)]
struct StudentRow<'a> {
    admission_id: &'a str,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    class_name: &'a str,
    section: &'a str,
    dob: String,
    blood_group: &'a str,
    father_name: &'a str,
    mother_name: &'a str,
    address: &'a str,
    status: &'a str,
}

impl<'a> From<&'a Student> for StudentRow<'a> {
    fn from(student: &'a Student) -> Self {
        Self {
            admission_id: &student.admission_id,
            name: &student.name,
            email: &student.email,
            phone: student.phone.as_deref().unwrap_or_default(),
            class_name: &student.class_name,
            section: &student.section,
            dob: student
                .dob
                .map(|dob| dob.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            blood_group: student.blood_group.as_deref().unwrap_or_default(),
            father_name: student.father_name.as_deref().unwrap_or_default(),
            mother_name: student.mother_name.as_deref().unwrap_or_default(),
            address: student.address.as_deref().unwrap_or_default(),
            status: &student.status,
        }
    }
}

#[derive(Serialize)]
struct TeacherRow<'a> {
    teacher_id: &'a str,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    classes: String,
    sections: String,
    subjects: String,
    status: &'a str,
}

impl<'a> From<&'a Teacher> for TeacherRow<'a> {
    fn from(teacher: &'a Teacher) -> Self {
        Self {
            teacher_id: &teacher.teacher_id,
            name: &teacher.name,
            email: &teacher.email,
            phone: teacher.phone.as_deref().unwrap_or_default(),
            classes: teacher.classes.join(", "),
            sections: teacher.sections.join(", "),
            subjects: teacher.subjects.join(", "),
            status: &teacher.status,
        }
    }
}

pub async fn get_export_students(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Response<Body>> {
    session.ensure_can(PermissionsTarget::EXPORT_CSVS)?;

    let students = Student::get_all(&state).await?;
    let bytes = csv_bytes(students.iter().map(StudentRow::from))?;

    Ok(csv_download("students.csv", bytes))
}

pub async fn get_export_teachers(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Response<Body>> {
    session.ensure_can(PermissionsTarget::EXPORT_CSVS)?;

    let teachers = Teacher::get_all(&state).await?;
    let bytes = csv_bytes(teachers.iter().map(TeacherRow::from))?;

    Ok(csv_download("teachers.csv", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_rows_always_generate_passwords() {
        let csv = "admission_id,name,email,class_name,section,dob\nADM-1,Asha Rao,asha@example.org,7,b,2012-04-30\n";
        let (rows, errors) = parse_students_csv(csv.as_bytes());

        assert!(errors.is_empty());
        assert_eq!(rows.len(), 1);
        let (line, form) = &rows[0];
        assert_eq!(*line, 2);
        assert_eq!(form.generate_password.as_deref(), Some("on"));
        assert!(form.clone().validate(true).is_ok());
    }

    #[test]
    fn ragged_rows_are_reported_by_line() {
        let csv = "admission_id,name\nADM-1,Asha\nADM-2,Ravi,extra\n";
        let (rows, errors) = parse_students_csv(csv.as_bytes());

        assert_eq!(rows.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Line 3:"));
    }

    #[test]
    fn roster_becomes_teacher_forms() {
        let json = r#"[{"teacherId": 7, "name": "Meera", "email": "meera@example.org",
            "classes": [9], "sections": ["NEEV"], "subjects": ["AI"]}]"#;
        let forms = parse_roster(json.as_bytes()).unwrap_or_default();

        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].teacher_id, "7");
        assert!(forms[0].generate_password);
        assert!(parse_roster(b"{not json").is_err());
    }

    #[test]
    fn exports_have_a_header_row() {
        let rows = [TeacherRow {
            teacher_id: "T-1",
            name: "Meera Iyer",
            email: "meera@example.org",
            phone: "",
            classes: "6, 7".into(),
            sections: "A".into(),
            subjects: "Maths".into(),
            status: "active",
        }];
        let bytes = csv_bytes(rows).unwrap_or_default();
        let text = String::from_utf8(bytes).unwrap_or_default();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("teacher_id,name,email,phone,classes,sections,subjects,status")
        );
        assert_eq!(
            lines.next(),
            Some("T-1,Meera Iyer,meera@example.org,,\"6, 7\",A,Maths,active")
        );
    }
}
