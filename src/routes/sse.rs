use crate::state::SchoolState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};

///published after every write so open pages can re-fetch their fragments
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SseEvent {
    CrudUser,
    CrudGallery,
    CrudNotice,
    CrudHomework,
    CrudGrade,
    CrudAttendance,
}

impl SseEvent {
    ///matches the `hx-trigger="sse:<name>"` used by fragments
    pub const fn name(self) -> &'static str {
        match self {
            Self::CrudUser => "crud_user",
            Self::CrudGallery => "crud_gallery",
            Self::CrudNotice => "crud_notice",
            Self::CrudHomework => "crud_homework",
            Self::CrudGrade => "crud_grade",
            Self::CrudAttendance => "crud_attendance",
        }
    }
}

pub async fn sse_feed(
    State(state): State<SchoolState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream =
        BroadcastStream::new(state.subscribe_to_sse_feed()).filter_map(|event| match event {
            Ok(event) => Some(Ok(Event::default().event(event.name()).data(event.name()))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "SSE listener fell behind");
                None
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_unique() {
        let all = [
            SseEvent::CrudUser,
            SseEvent::CrudGallery,
            SseEvent::CrudNotice,
            SseEvent::CrudHomework,
            SseEvent::CrudGrade,
            SseEvent::CrudAttendance,
        ];
        let mut names: Vec<_> = all.iter().map(|event| event.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
        assert!(names.iter().all(|name| name.starts_with("crud_")));
    }
}
