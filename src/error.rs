use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::utils::{ApiResponse, error_codes};

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("学号格式无效: {0}")]
    InvalidIdentifier(String),
    #[error("请至少选择一个院系")]
    MissingDepartment,
    #[error("上传文件超过{0}字节限制")]
    PayloadTooLarge(usize),
    #[error("{0}")]
    Conflict(String),
    #[error("未授权访问")]
    Unauthorized,
    #[error("令牌无效或已过期")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("账号或密码错误")]
    InvalidCredentials,
    #[error("{0}")]
    AccessDenied(&'static str),
    #[error("{0}不存在")]
    NotFound(&'static str),
    #[error("请求过于频繁，请在{0}秒后重试")]
    RateLimited(u64),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("缓存错误: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("密码处理失败: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("生成令牌失败: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("邮件发送失败: {0}")]
    Mail(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidIdentifier(_) | AppError::MissingDepartment => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized | AppError::InvalidToken(_) | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Hash(_)
            | AppError::Token(_)
            | AppError::Io(_)
            | AppError::Mail(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_)
            | AppError::InvalidIdentifier(_)
            | AppError::MissingDepartment
            | AppError::PayloadTooLarge(_) => error_codes::VALIDATION_ERROR,
            AppError::Conflict(_) => error_codes::USER_EXISTS,
            AppError::Unauthorized | AppError::InvalidToken(_) | AppError::InvalidCredentials => {
                error_codes::AUTH_FAILED
            }
            AppError::AccessDenied(_) => error_codes::PERMISSION_DENIED,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::RateLimited(_) => error_codes::RATE_LIMIT,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// 唯一约束冲突转换为 409，其余数据库错误保持原样
    pub fn from_insert(err: sqlx::Error, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(message.to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 服务端错误只记录日志，不把内部细节返回给客户端
        let msg = if status.is_server_error() {
            tracing::error!(error = %self, %status, "Replying with server error");
            "内部服务器错误".to_string()
        } else {
            tracing::debug!(error = %self, %status, "Replying with client error");
            self.to_string()
        };

        let body = Json(ApiResponse::<()> {
            code: self.code(),
            msg,
            resp_data: None,
        });

        (status, body).into_response()
    }
}
