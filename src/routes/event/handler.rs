use axum::{
    extract::{Extension, Json, Multipart, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    access::authorize_owned,
    error::{AppError, Result},
    membership::MemberField,
    routes::{auth::MessageResponse, user::Directory},
    upload,
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{Event, EventView, NewEvent};

const FILE_FIELD: &str = "file";

async fn load_view(state: &AppState, id: &str) -> Result<EventView> {
    let event = Event::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("活动"))?;
    Ok(event.populate(&state.pool).await?)
}

#[axum::debug_handler]
pub async fn get_events(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<EventView>>>> {
    let events = Event::list(&state.pool).await?;
    let directory = Directory::load(&state.pool, events.iter().flat_map(Event::user_ids)).await?;

    let views = events
        .into_iter()
        .map(|event| event.into_view(&directory))
        .collect();
    Ok(success_to_api_response(views))
}

#[axum::debug_handler]
pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<EventView>>)> {
    let mut form = upload::read_form(
        multipart,
        FILE_FIELD,
        &state.config.upload_dir,
        state.config.max_upload_bytes,
    )
    .await?;
    let stored = form.attachment.as_ref().map(|file| file.stored_name.clone());

    let created = match NewEvent::from_form(&mut form) {
        Ok(new_event) => Event::create(&state.pool, new_event, &claims.sub)
            .await
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    let event = match created {
        Ok(event) => event,
        Err(e) => {
            if let Some(stored) = stored {
                upload::remove_attachment(&state.config.upload_dir, &stored).await;
            }
            return Err(e);
        }
    };
    tracing::info!(event_id = %event.id, creator = %claims.sub, date = %event.date, "Event created");

    let view = event.populate(&state.pool).await?;
    Ok((StatusCode::CREATED, success_to_api_response(view)))
}

#[axum::debug_handler]
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    let event = Event::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("活动"))?;
    authorize_owned(&claims, &event)?;

    if !Event::delete(&state.pool, &id).await? {
        return Err(AppError::NotFound("活动"));
    }
    if let Some(stored) = &event.file_path {
        upload::remove_attachment(&state.config.upload_dir, stored).await;
    }
    tracing::info!(event_id = %id, by = %claims.sub, "Event deleted");

    Ok(success_to_api_response(MessageResponse::new("活动已删除")))
}

/// 报名或取消报名
#[axum::debug_handler]
pub async fn rsvp_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EventView>>> {
    MemberField::EventAttendees
        .toggle(&state.pool, &id, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("活动"))?;

    Ok(success_to_api_response(load_view(&state, &id).await?))
}
