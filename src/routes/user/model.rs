use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::access::Role;
use crate::membership::MemberSet;

pub(crate) const USER_COLUMNS: &str = "id, name, roll_number, email, password_hash, role, \
     department, bio, location, occupation, avatar, created_at";

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub roll_number: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub department: Vec<String>,
    pub bio: String,
    pub location: Option<String>,
    pub occupation: Option<String>,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// 写入数据库前已校验过的注册信息
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub roll_number: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub occupation: Option<String>,
}

/// 群组成员、活动报名者展开后的简要信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub roll_number: Option<String>,
    pub email: String,
}

/// 创建者的引用，账号被删除后 name 为空
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorRef {
    pub id: String,
    pub name: Option<String>,
}

impl User {
    pub async fn create(pool: &PgPool, new_user: NewUser) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, roll_number, email, password_hash, role, department)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(new_user.name)
            .bind(new_user.roll_number)
            .bind(new_user.email)
            .bind(new_user.password_hash)
            .bind(new_user.role.as_str())
            .bind(new_user.department)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(pool)
            .await
    }

    /// 按邮箱或学号查找登录账号
    pub async fn find_by_login(pool: &PgPool, identifier: &str) -> Result<Option<Self>, sqlx::Error> {
        let identifier = identifier.trim();
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR roll_number = $2");
        sqlx::query_as::<_, User>(&sql)
            .bind(identifier.to_lowercase())
            .bind(identifier)
            .fetch_optional(pool)
            .await
    }

    /// 只更新请求里给出的字段
    pub async fn update_profile(
        pool: &PgPool,
        id: &str,
        req: UpdateUserRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE users
            SET bio = COALESCE($2, bio),
                location = COALESCE($3, location),
                occupation = COALESCE($4, occupation)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.bio.map(|bio| bio.trim().to_string()))
            .bind(req.location.map(|location| location.trim().to_string()))
            .bind(req.occupation.map(|occupation| occupation.trim().to_string()))
            .fetch_optional(pool)
            .await
    }

    pub async fn update_password(
        pool: &PgPool,
        id: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role(pool: &PgPool, id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 姓名、学号、邮箱任一包含关键字即匹配，不区分大小写
    pub async fn search(pool: &PgPool, query: &str) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE name ILIKE $1 OR roll_number ILIKE $1 OR email ILIKE $1
            ORDER BY name
            LIMIT $2
            "#
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(like_pattern(query))
            .bind(SEARCH_LIMIT)
            .fetch_all(pool)
            .await
    }
}

// 关键字里的通配符按普通字符匹配
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// 一次查询取回展开引用所需的全部用户
#[derive(Debug, Default)]
pub struct Directory(HashMap<String, UserSummary>);

impl Directory {
    pub async fn load<'a>(
        pool: &PgPool,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, sqlx::Error> {
        let mut ids: Vec<String> = ids.into_iter().map(str::to_string).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, roll_number, email FROM users WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        Ok(users.into_iter().collect())
    }

    /// 已删除的账号不出现在结果中
    pub fn members(&self, set: &MemberSet) -> Vec<UserSummary> {
        set.iter().filter_map(|id| self.0.get(id).cloned()).collect()
    }

    pub fn creator(&self, id: &str) -> CreatorRef {
        CreatorRef {
            id: id.to_string(),
            name: self.0.get(id).map(|user| user.name.clone()),
        }
    }
}

impl FromIterator<UserSummary> for Directory {
    fn from_iter<I: IntoIterator<Item = UserSummary>>(iter: I) -> Self {
        Directory(iter.into_iter().map(|user| (user.id.clone(), user)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, name: &str) -> UserSummary {
        UserSummary {
            id: id.into(),
            name: name.into(),
            roll_number: None,
            email: format!("{id}@campus.edu"),
        }
    }

    #[test]
    fn search_keywords_escape_wildcards() {
        assert_eq!(like_pattern(" ravi "), "%ravi%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn directory_skips_unknown_members_and_keeps_order() {
        let directory: Directory = vec![summary("u1", "Asha"), summary("u2", "Ravi")]
            .into_iter()
            .collect();
        let set: MemberSet = vec!["u2".to_string(), "gone".to_string(), "u1".to_string()].into();

        let members = directory.members(&set);
        let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["u2", "u1"]);
    }

    #[test]
    fn creator_of_deleted_account_has_no_name() {
        let directory: Directory = std::iter::once(summary("u1", "Asha")).collect();
        assert_eq!(directory.creator("u1").name.as_deref(), Some("Asha"));
        assert_eq!(directory.creator("u9").name, None);
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user = User {
            id: "u1".into(),
            name: "Asha".into(),
            roll_number: Some("2256700001".into()),
            email: "asha@campus.edu".into(),
            password_hash: "$2b$12$secret".into(),
            role: Role::Student,
            department: vec!["Computer Science & Engineering".into()],
            bio: String::new(),
            location: None,
            occupation: None,
            avatar: String::new(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "student");
    }
}
