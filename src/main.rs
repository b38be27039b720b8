#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else)]

use crate::{
    auth::{backend::SchoolAuthBackend, postgres_store::PostgresSessionStore},
    config::RuntimeConfiguration,
    routes::{
        admin::get_admin_dashboard,
        attendance::{internal_get_attendance, internal_post_attendance},
        gallery::{
            delete_gallery_image, internal_get_gallery, internal_get_gallery_list,
            internal_post_toggle_gallery_image, internal_put_gallery_image,
        },
        grades::{delete_grade, internal_get_grades, internal_get_grades_list, internal_put_grade},
        homework::{
            delete_homework, internal_get_homework, internal_get_homework_list,
            internal_put_homework,
        },
        import_export::{
            get_export_students, get_export_teachers, get_import_export_page, put_import_roster,
            put_import_students,
        },
        index::{get_index_route, internal_get_index_gallery, internal_get_index_notices},
        login::{get_login, post_login, post_logout},
        notices::{
            delete_notice, internal_get_notices, internal_get_notices_list,
            internal_post_toggle_notice, internal_put_notice,
        },
        onboarding::{get_onboarding, post_onboarding},
        set_new_password::{
            get_change_password, get_replace_default_password, post_change_password,
            post_replace_default_password,
        },
        sse::sse_feed,
        student::{
            get_student_dashboard, internal_get_student_homework,
            internal_get_student_performance, internal_get_student_stats,
        },
        teacher::get_teacher_dashboard,
        users::{
            delete_student, delete_teacher, internal_get_student_form, internal_get_teacher_form,
            internal_get_users, internal_post_student, internal_post_teacher,
            internal_post_teacher_choices, internal_put_student, internal_put_teacher,
        },
    },
    state::SchoolState,
};
use axum::{
    Router,
    routing::{get, post, put},
};
use axum_login::{
    AuthManagerLayerBuilder,
    tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer, cookie::time::Duration},
};
use sqlx::postgres::PgPoolOptions;
use tokio::{net::TcpListener, signal};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod data;
mod error;
mod maud_conveniences;
mod routes;
mod state;

const EXPIRED_SESSION_SWEEP: std::time::Duration = std::time::Duration::from_secs(60 * 60);

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(?e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(?e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
}

fn app(state: SchoolState, session_store: PostgresSessionStore) -> Router {
    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(5)));
    let auth_backend = SchoolAuthBackend::new(state.clone());
    let auth_layer = AuthManagerLayerBuilder::new(auth_backend, session_layer).build();

    let trace_layer = TraceLayer::new_for_http();

    Router::new()
        .route("/", get(get_index_route))
        .route("/login", get(get_login).post(post_login))
        .route("/logout", post(post_logout))
        .route("/onboarding", get(get_onboarding).post(post_onboarding))
        .route(
            "/replace_default_password",
            get(get_replace_default_password).post(post_replace_default_password),
        )
        .route(
            "/change_password",
            get(get_change_password).post(post_change_password),
        )
        .route("/admin", get(get_admin_dashboard))
        .route("/teacher", get(get_teacher_dashboard))
        .route("/student", get(get_student_dashboard))
        .route("/import_export", get(get_import_export_page))
        .route("/import_export/import_roster", put(put_import_roster))
        .route("/import_export/import_students", put(put_import_students))
        .route("/import_export/students.csv", get(get_export_students))
        .route("/import_export/teachers.csv", get(get_export_teachers))
        .route("/internal/index/notices", get(internal_get_index_notices))
        .route("/internal/index/gallery", get(internal_get_index_gallery))
        .route("/internal/users", get(internal_get_users))
        .route(
            "/internal/users/student_form",
            get(internal_get_student_form),
        )
        .route(
            "/internal/users/student",
            put(internal_put_student)
                .post(internal_post_student)
                .delete(delete_student),
        )
        .route(
            "/internal/users/teacher_form",
            get(internal_get_teacher_form),
        )
        .route(
            "/internal/users/teacher_choices",
            post(internal_post_teacher_choices),
        )
        .route(
            "/internal/users/teacher",
            put(internal_put_teacher)
                .post(internal_post_teacher)
                .delete(delete_teacher),
        )
        .route(
            "/internal/gallery",
            get(internal_get_gallery)
                .put(internal_put_gallery_image)
                .delete(delete_gallery_image),
        )
        .route("/internal/gallery/list", get(internal_get_gallery_list))
        .route(
            "/internal/gallery/toggle",
            post(internal_post_toggle_gallery_image),
        )
        .route(
            "/internal/notices",
            get(internal_get_notices)
                .put(internal_put_notice)
                .delete(delete_notice),
        )
        .route("/internal/notices/list", get(internal_get_notices_list))
        .route("/internal/notices/toggle", post(internal_post_toggle_notice))
        .route(
            "/internal/homework",
            get(internal_get_homework)
                .put(internal_put_homework)
                .delete(delete_homework),
        )
        .route("/internal/homework/list", get(internal_get_homework_list))
        .route(
            "/internal/grades",
            get(internal_get_grades)
                .put(internal_put_grade)
                .delete(delete_grade),
        )
        .route("/internal/grades/list", get(internal_get_grades_list))
        .route(
            "/internal/attendance",
            get(internal_get_attendance).post(internal_post_attendance),
        )
        .route("/internal/student/stats", get(internal_get_student_stats))
        .route(
            "/internal/student/homework",
            get(internal_get_student_homework),
        )
        .route(
            "/internal/student/performance",
            get(internal_get_student_performance),
        )
        .route("/sse_feed", get(sse_feed))
        .layer(auth_layer)
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().expect("unable to load env vars");

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");

    let options = PgPoolOptions::new().max_connections(15);
    let config = RuntimeConfiguration::new().expect("unable to create config");
    let state = SchoolState::new(options, config.clone())
        .await
        .expect("unable to create state");

    let session_store = PostgresSessionStore::new(state.clone());
    tokio::task::spawn({
        let session_store = session_store.clone();
        async move {
            let mut interval = tokio::time::interval(EXPIRED_SESSION_SWEEP);
            loop {
                interval.tick().await;
                if let Err(e) = session_store.delete_expired().await {
                    warn!(?e, "Unable to remove expired sessions");
                }
            }
        }
    });

    let listener = TcpListener::bind(config.server_ip())
        .await
        .expect("unable to listen on server ip");

    info!(server_ip = config.server_ip(), "Listening");
    axum::serve(listener, app(state, session_store))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("unable to serve app");
}
