use std::sync::Arc;

use config::Config;
use mail::Mailer;
use redis::Client as RedisClient;
use sqlx::PgPool;

pub mod access;
pub mod config;
pub mod error;
pub mod mail;
pub mod membership;
pub mod middleware;
pub mod upload;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub mailer: Mailer,
}
