use axum::extract::{Extension, Json, Path, State};

use crate::{
    AppState,
    access::authorize_self,
    error::{AppError, Result},
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{UpdateUserRequest, User};

const MAX_BIO_CHARS: usize = 500;

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<User>>> {
    let user = User::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("用户"))?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<User>>> {
    authorize_self(&claims, &id)?;

    if req
        .bio
        .as_deref()
        .is_some_and(|bio| bio.trim().chars().count() > MAX_BIO_CHARS)
    {
        return Err(AppError::Validation(format!("个人简介不能超过{MAX_BIO_CHARS}个字符")));
    }

    let user = User::update_profile(&state.pool, &id, req)
        .await?
        .ok_or(AppError::NotFound("用户"))?;
    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn search_users(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<ApiResponse<Vec<User>>>> {
    if query.trim().is_empty() {
        return Ok(success_to_api_response(Vec::new()));
    }

    let users = User::search(&state.pool, &query).await?;
    Ok(success_to_api_response(users))
}
