use axum::{
    extract::{Extension, Json, Path, State},
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

use super::model::{CreateGroupRequest, Group, GroupView, RemoveMemberRequest};

async fn load_view(state: &AppState, id: &str) -> Result<GroupView> {
    let group = Group::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("群组"))?;
    Ok(group.populate(&state.pool).await?)
}

#[axum::debug_handler]
pub async fn get_groups(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<GroupView>>>> {
    let groups = Group::list(&state.pool).await?;
    let directory = Directory::load(&state.pool, groups.iter().flat_map(Group::user_ids)).await?;

    let views = groups
        .into_iter()
        .map(|group| group.into_view(&directory))
        .collect();
    Ok(success_to_api_response(views))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<GroupView>>> {
    Ok(success_to_api_response(load_view(&state, &id).await?))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GroupView>>)> {
    req.validate()?;

    let group = Group::create(&state.pool, req, &claims.sub).await?;
    tracing::info!(group_id = %group.id, creator = %claims.sub, "Group created");

    let view = group.populate(&state.pool).await?;
    Ok((StatusCode::CREATED, success_to_api_response(view)))
}

/// 加入或退出群组
#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<GroupView>>> {
    MemberField::GroupMembers
        .toggle(&state.pool, &id, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("群组"))?;

    Ok(success_to_api_response(load_view(&state, &id).await?))
}

#[axum::debug_handler]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<RemoveMemberRequest>,
) -> Result<Json<ApiResponse<GroupView>>> {
    let group = Group::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("群组"))?;
    authorize_owned(&claims, &group)?;

    MemberField::GroupMembers
        .remove(&state.pool, &id, &req.user_id)
        .await?
        .ok_or(AppError::NotFound("群组"))?;
    tracing::info!(group_id = %id, member = %req.user_id, by = %claims.sub, "Member removed");

    Ok(success_to_api_response(load_view(&state, &id).await?))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    let group = Group::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("群组"))?;
    authorize_owned(&claims, &group)?;

    let attachments = Group::delete(&state.pool, &id).await?;
    for stored in &attachments {
        upload::remove_attachment(&state.config.upload_dir, stored).await;
    }
    tracing::info!(group_id = %id, by = %claims.sub, removed_files = attachments.len(), "Group deleted");

    Ok(success_to_api_response(MessageResponse::new("群组已删除")))
}
