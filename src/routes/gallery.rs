use crate::{
    auth::{AuthUtilities, PermissionsTarget, SchoolSession},
    data::{
        DataType, IdForm,
        gallery::{GalleryForm, GalleryFormError, GalleryImage},
    },
    error::{MissingGalleryImageSnafu, SchoolResult},
    maud_conveniences::{errors_list, form_submit_button, simple_form_element, table, title},
    routes::sse::SseEvent,
    state::SchoolState,
};
use axum::{
    Form,
    extract::{Query, State},
};
use maud::{Markup, html};
use snafu::OptionExt;

fn add_image_form(errors: GalleryFormError) -> Markup {
    html! {
        div id="gallery_form" class="rounded-lg bg-gray-700 p-4 mb-4" {
            @if !errors.is_empty() {
                (errors_list(None, errors.as_nice_list()))
            }
            form hx-put="/internal/gallery" hx-target="#gallery_form" hx-swap="outerHTML" {
                (simple_form_element("image_url", "Image URL", true, Some("url"), None))
                (simple_form_element("title", "Title", true, None, None))
                (simple_form_element("description", "Description", false, None, None))
                (form_submit_button(Some("Add Image")))
            }
        }
    }
}

pub async fn internal_get_gallery(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GALLERY)?;

    let images = GalleryImage::get_all(&state).await?;

    Ok(html! {
        div class="flex flex-col" {
            (title("Gallery"))
            (add_image_form(GalleryFormError::empty()))
            div hx-get="/internal/gallery/list" hx-trigger="sse:crud_gallery" hx-swap="innerHTML" {
                (images_table(images))
            }
        }
    })
}

pub async fn internal_get_gallery_list(
    State(state): State<SchoolState>,
    session: SchoolSession,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GALLERY)?;
    Ok(images_table(GalleryImage::get_all(&state).await?))
}

fn images_table(images: Vec<GalleryImage>) -> Markup {
    table(
        None,
        ["Image", "Title", "Status", ""],
        images
            .into_iter()
            .map(|image| {
                let id = image.id.to_string();
                [
                    html! { img src=(image.image_url) alt=(image.title) class="h-16 w-24 object-cover rounded"; },
                    html! {
                        p class="font-semibold" {(image.title)}
                        @if let Some(description) = &image.description {
                            p class="text-sm text-gray-400" {(description)}
                        }
                    },
                    html! {
                        @if image.is_active {
                            span class="text-green-400" {"Shown"}
                        } @else {
                            span class="text-gray-400" {"Hidden"}
                        }
                    },
                    html! {
                        div class="flex flex-row space-x-2" {
                            button class="bg-blue-600 hover:bg-blue-800 text-sm py-1 px-2 rounded" hx-post={"/internal/gallery/toggle?id=" (id)} hx-swap="none" {
                                @if image.is_active { "Hide" } @else { "Show" }
                            }
                            button class="bg-red-600 hover:bg-red-800 text-sm py-1 px-2 rounded" hx-delete={"/internal/gallery?id=" (id)} hx-swap="none" hx-confirm={"Delete \"" (image.title) "\"?"} {"Delete"}
                        }
                    },
                ]
            })
            .collect(),
    )
}

pub async fn internal_put_gallery_image(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Form(form): Form<GalleryForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GALLERY)?;
    let uploaded_by = session.current_user()?.id;

    let image = match form.validate(uploaded_by) {
        Ok(image) => image,
        Err(errors) => return Ok(add_image_form(errors)),
    };

    GalleryImage::insert_into_database(image, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudGallery);

    Ok(add_image_form(GalleryFormError::empty()))
}

pub async fn internal_post_toggle_gallery_image(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GALLERY)?;

    GalleryImage::toggle_active(id, &mut *state.get_connection().await?)
        .await?
        .context(MissingGalleryImageSnafu { id })?;
    state.send_sse_event(SseEvent::CrudGallery);

    Ok(html! {})
}

pub async fn delete_gallery_image(
    State(state): State<SchoolState>,
    session: SchoolSession,
    Query(IdForm { id }): Query<IdForm>,
) -> SchoolResult<Markup> {
    session.ensure_can(PermissionsTarget::CRUD_GALLERY)?;

    GalleryImage::remove_from_database(id, &mut *state.get_connection().await?).await?;
    state.send_sse_event(SseEvent::CrudGallery);

    Ok(html! {})
}
