use crate::{
    auth::SchoolSession,
    data::{gallery::GalleryImage, notice::Notice},
    error::SchoolResult,
    maud_conveniences::{subtitle, supertitle},
    state::SchoolState,
};
use axum::extract::State;
use maud::{Markup, html};

pub async fn get_index_route(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    let dashboard = session.user.as_ref().map(|user| user.role().dashboard());

    Ok(state.render(
        session,
        html! {
            div class="bg-gray-800 p-8 rounded shadow-md max-w-4xl w-full" {
                (supertitle("Welcome to Schoolyard"))

                div class="flex flex-row space-x-4 justify-center mb-8" {
                    @if let Some(dashboard) = dashboard {
                        a href=(dashboard) class="bg-slate-600 hover:bg-slate-800 font-bold py-2 px-4 rounded" {
                            "Go to Dashboard"
                        }
                    } @else {
                        a href="/login" class="bg-slate-600 hover:bg-slate-800 font-bold py-2 px-4 rounded" {
                            "Login"
                        }
                    }
                }

                div hx-ext="sse" sse-connect="/sse_feed" class="flex flex-col space-y-8" {
                    div hx-get="/internal/index/notices" hx-trigger="load,sse:crud_notice" {}
                    div hx-get="/internal/index/gallery" hx-trigger="load,sse:crud_gallery" {}
                }
            }
        },
    ))
}

pub async fn internal_get_index_notices(State(state): State<SchoolState>) -> SchoolResult<Markup> {
    let notices = Notice::get_active(&state).await?;

    Ok(html! {
        (subtitle("Notices"))
        @if notices.is_empty() {
            p class="italic text-gray-400" {"No notices right now."}
        }
        div class="flex flex-col space-y-4" {
            @for notice in notices {
                @let priority = notice.priority();
                div class="rounded-lg p-4 bg-gray-700" {
                    div class="flex flex-row items-center justify-between mb-2" {
                        h3 class="font-semibold" {(notice.title)}
                        span class={"text-xs px-2 py-1 rounded " (priority.badge_classes())} {(priority.as_str())}
                    }
                    p class="text-gray-200 whitespace-pre-line" {(notice.content)}
                    p class="text-xs text-gray-400 mt-2" {(notice.date.format("%d %b %Y").to_string())}
                }
            }
        }
    })
}

pub async fn internal_get_index_gallery(State(state): State<SchoolState>) -> SchoolResult<Markup> {
    let images = GalleryImage::get_active(&state).await?;

    Ok(html! {
        (subtitle("Gallery"))
        @if images.is_empty() {
            p class="italic text-gray-400" {"No photos yet."}
        }
        div class="grid grid-cols-1 sm:grid-cols-2 md:grid-cols-3 gap-4" {
            @for image in images {
                figure class="rounded-lg overflow-hidden bg-gray-700" {
                    img src=(image.image_url) alt=(image.title) class="w-full h-48 object-cover";
                    figcaption class="p-2" {
                        p class="font-semibold" {(image.title)}
                        @if let Some(description) = image.description {
                            p class="text-sm text-gray-300" {(description)}
                        }
                    }
                }
            }
        }
    })
}
