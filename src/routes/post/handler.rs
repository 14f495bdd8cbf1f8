use axum::{
    extract::{Extension, Json, Multipart, Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    access::authorize_owned,
    error::{AppError, Result},
    membership::MemberField,
    routes::{auth::MessageResponse, group::Group, user::User},
    upload::{self, UploadForm},
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{Comment, CommentRequest, NewPost, Post};

/// 附件使用的表单字段名
const PICTURE_FIELD: &str = "picture";

#[axum::debug_handler]
pub async fn get_feed_posts(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Post>>>> {
    let posts = Post::feed(&state.pool).await?;
    Ok(success_to_api_response(posts))
}

#[axum::debug_handler]
pub async fn get_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Post>>>> {
    let posts = Post::by_user(&state.pool, &user_id).await?;
    Ok(success_to_api_response(posts))
}

#[axum::debug_handler]
pub async fn get_group_posts(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Post>>>> {
    let posts = Post::by_group(&state.pool, &group_id).await?;
    Ok(success_to_api_response(posts))
}

#[axum::debug_handler]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Post>>)> {
    let form = upload::read_form(
        multipart,
        PICTURE_FIELD,
        &state.config.upload_dir,
        state.config.max_upload_bytes,
    )
    .await?;
    let stored = form.attachment.as_ref().map(|file| file.stored_name.clone());

    // 失败时清理已经写入磁盘的附件
    match insert_post(&state, &claims, form).await {
        Ok(post) => Ok((StatusCode::CREATED, success_to_api_response(post))),
        Err(e) => {
            if let Some(stored) = stored {
                upload::remove_attachment(&state.config.upload_dir, &stored).await;
            }
            Err(e)
        }
    }
}

async fn insert_post(state: &AppState, claims: &Claims, form: UploadForm) -> Result<Post> {
    let description = form.text("description").unwrap_or_default().to_string();
    if description.is_empty() && form.attachment.is_none() {
        return Err(AppError::Validation("帖子内容不能为空".into()));
    }

    let group_id = form.text("group_id").or(form.text("groupId")).map(str::to_string);
    if let Some(group_id) = &group_id {
        if !Group::exists(&state.pool, group_id).await? {
            return Err(AppError::NotFound("群组"));
        }
    }

    let author = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("用户"))?;

    let new_post = NewPost {
        description,
        attachment: form.attachment,
        group_id,
    };
    let post = Post::create(&state.pool, &author, new_post).await?;
    tracing::info!(post_id = %post.id, user_id = %author.id, group_id = ?post.group_id, "Post created");
    Ok(post)
}

#[axum::debug_handler]
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    let post = Post::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("帖子"))?;
    authorize_owned(&claims, &post)?;

    if !Post::delete(&state.pool, &id).await? {
        return Err(AppError::NotFound("帖子"));
    }
    for stored in post.attachments() {
        upload::remove_attachment(&state.config.upload_dir, stored).await;
    }
    tracing::info!(post_id = %id, by = %claims.sub, "Post deleted");

    Ok(success_to_api_response(MessageResponse::new("帖子已删除")))
}

#[axum::debug_handler]
pub async fn like_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Post>>> {
    MemberField::PostLikes
        .toggle(&state.pool, &id, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("帖子"))?;

    let post = Post::find_by_id(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound("帖子"))?;
    Ok(success_to_api_response(post))
}

#[axum::debug_handler]
pub async fn comment_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<ApiResponse<Post>>> {
    req.validate()
        .map_err(|msg| AppError::Validation(msg.to_string()))?;

    let author = User::find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or(AppError::NotFound("用户"))?;

    let post = Post::add_comment(&state.pool, &id, Comment::by(&author, &req.comment))
        .await?
        .ok_or(AppError::NotFound("帖子"))?;
    Ok(success_to_api_response(post))
}
