use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
};
use tower_http::services::ServeDir;

use crate::{AppState, middleware::auth_middleware};

pub mod auth;
pub mod event;
pub mod group;
pub mod post;
pub mod user;

// multipart 边界和文本字段的额外开销
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// 组装全部接口，限流、日志、CORS 由调用方按部署环境添加
pub fn router(state: AppState) -> Router {
    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password));

    let protected_routes = Router::new()
        // 帖子
        .route("/posts", get(post::get_feed_posts).post(post::create_post))
        .route("/posts/{id}/posts", get(post::get_user_posts))
        .route("/posts/group/{id}", get(post::get_group_posts))
        .route("/posts/{id}", delete(post::delete_post))
        .route("/posts/{id}/like", patch(post::like_post))
        .route("/posts/{id}/comment", post(post::comment_post))
        // 群组
        .route("/groups", get(group::get_groups).post(group::create_group))
        .route("/groups/{id}", get(group::get_group).delete(group::delete_group))
        .route("/groups/{id}/join", patch(group::join_group))
        .route("/groups/{id}/remove", patch(group::remove_member))
        // 活动
        .route("/events", get(event::get_events).post(event::create_event))
        .route("/events/{id}", delete(event::delete_event))
        .route("/events/{id}/rsvp", patch(event::rsvp_event))
        // 用户
        .route("/users/search/{query}", get(user::search_users))
        .route("/users/{id}", get(user::get_user).patch(user::update_user))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_bytes + FORM_OVERHEAD_BYTES,
        ));

    // 根路径不能 nest，前缀为空时直接合并
    let base_uri = state.config.api_base_uri.clone();
    let api = if base_uri.is_empty() {
        api
    } else {
        Router::new().nest(&base_uri, api)
    };

    api.nest_service("/assets", ServeDir::new(&state.config.upload_dir))
        .with_state(state)
}
