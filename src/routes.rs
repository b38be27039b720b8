pub mod admin;
pub mod attendance;
pub mod gallery;
pub mod grades;
pub mod homework;
pub mod import_export;
pub mod index;
pub mod login;
pub mod notices;
pub mod onboarding;
pub mod set_new_password;
pub mod sse;
pub mod student;
pub mod teacher;
pub mod users;
