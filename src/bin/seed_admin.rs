//! 创建管理员账号，账号已存在时只提升角色
//!
//! 需要 DATABASE_URL 和 ADMIN_PASSWORD，ADMIN_EMAIL 与 ADMIN_ROLL_NUMBER 可选。

use std::env;
use std::error::Error;

use campus_backend::{
    access::Role,
    routes::user::{NewUser, User},
    utils::hash_password,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADMIN_EMAIL: &str = "admin@campusconnect.com";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = env::var("DATABASE_URL")?;
    let email = env::var("ADMIN_EMAIL")
        .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string())
        .trim()
        .to_lowercase();
    let roll_number = env::var("ADMIN_ROLL_NUMBER")
        .ok()
        .filter(|roll| !roll.trim().is_empty());

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    if let Some(existing) = User::find_by_email(&pool, &email).await? {
        User::set_role(&pool, &existing.id, Role::Admin).await?;
        tracing::info!(user_id = %existing.id, %email, "Existing account promoted to admin");
        return Ok(());
    }

    let password = env::var("ADMIN_PASSWORD")
        .map_err(|_| "ADMIN_PASSWORD must be set to create the admin account")?;
    if password.chars().count() < 6 {
        return Err("ADMIN_PASSWORD must be at least 6 characters".into());
    }

    let admin = User::create(
        &pool,
        NewUser {
            name: "Admin".into(),
            roll_number,
            email,
            password_hash: hash_password(&password)?,
            role: Role::Admin,
            department: vec!["Office".into()],
        },
    )
    .await?;
    tracing::info!(user_id = %admin.id, email = %admin.email, "Admin account created");

    Ok(())
}
