use axum::{
    extract::{Json, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::{AppError, Result},
    routes::user::{NewUser, User},
    utils::{
        ApiResponse, digest_reset_token, generate_reset_token, generate_token, hash_password,
        success_to_api_response, verify_password,
    },
};

use super::model::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
    ResetPasswordRequest, store_reset_token, take_reset_token, validate_new_password,
};

// bcrypt 计算较慢，放到阻塞线程池执行
async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("密码哈希任务失败: {e}")))?
        .map_err(AppError::from)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("密码校验任务失败: {e}")))?
        .map_err(AppError::from)
}

fn issue(state: &AppState, user: User) -> Result<AuthResponse> {
    let (token, expires_at) = generate_token(&user.id, user.role, &state.config)?;
    Ok(AuthResponse {
        token,
        expires_at,
        user,
    })
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    // 校验全部在访问数据库之前完成
    let roll_number = req.validate(&state.config.college_code)?;

    let password_hash = hash_blocking(req.password).await?;
    let new_user = NewUser {
        name: req.name.trim().to_string(),
        roll_number,
        email: req.email.trim().to_lowercase(),
        password_hash,
        role: req.role,
        department: req.department,
    };

    let user = User::create(&state.pool, new_user)
        .await
        .map_err(|e| AppError::from_insert(e, "该邮箱或学号已被注册"))?;
    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    Ok((StatusCode::CREATED, success_to_api_response(issue(&state, user)?)))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>> {
    let user = User::find_by_login(&state.pool, &req.identifier)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(success_to_api_response(issue(&state, user)?))
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    // 无论邮箱是否存在都返回同样的结果
    let reply = MessageResponse::new("如果该邮箱已注册，重置链接已发送");

    let Some(user) = User::find_by_email(&state.pool, &req.email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(success_to_api_response(reply));
    };

    let (token, digest) = generate_reset_token();
    store_reset_token(
        &state.redis,
        &digest,
        &user.id,
        state.config.reset_token_expiration().as_secs(),
    )
    .await?;
    state.mailer.send_password_reset(&user.email, &token).await?;
    tracing::info!(user_id = %user.id, "Password reset token issued");

    Ok(success_to_api_response(reply))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    validate_new_password(&req.new_password)?;

    let user_id = take_reset_token(&state.redis, &digest_reset_token(req.token.trim()))
        .await?
        .ok_or_else(|| AppError::Validation("重置链接无效或已过期".into()))?;

    let password_hash = hash_blocking(req.new_password).await?;
    if !User::update_password(&state.pool, &user_id, &password_hash).await? {
        return Err(AppError::NotFound("用户"));
    }
    tracing::info!(%user_id, "Password reset");

    Ok(success_to_api_response(MessageResponse::new("密码已重置，请重新登录")))
}
