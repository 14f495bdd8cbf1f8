use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::access::Owned;
use crate::error::AppError;
use crate::membership::MemberSet;
use crate::routes::user::{CreatorRef, Directory, UserSummary};

const GROUP_COLUMNS: &str = "id, name, description, privacy, creator_id, \
     COALESCE(members, '{}') AS members, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
        }
    }
}

impl TryFrom<String> for Privacy {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "public" => Ok(Privacy::Public),
            "private" => Ok(Privacy::Private),
            other => Err(AppError::Validation(format!("未知的群组类型: {other}"))),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub privacy: Privacy,
    pub creator_id: String,
    #[sqlx(try_from = "Vec<String>")]
    pub members: MemberSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 返回给客户端的群组，成员和创建者已展开
#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub privacy: Privacy,
    pub creator: CreatorRef,
    pub members: Vec<UserSummary>,
    pub member_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub privacy: Privacy,
}

impl CreateGroupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let name_len = self.name.trim().chars().count();
        if !(2..=50).contains(&name_len) {
            return Err(AppError::Validation("群组名称长度必须在2到50个字符之间".into()));
        }
        if self.description.trim().chars().count() < 5 {
            return Err(AppError::Validation("群组简介至少需要5个字符".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
}

impl Owned for Group {
    fn owner_id(&self) -> &str {
        &self.creator_id
    }

    fn denied_message(&self) -> &'static str {
        "只有群主、教职工或管理员可以执行此操作"
    }
}

impl Group {
    pub async fn create(
        pool: &PgPool,
        req: CreateGroupRequest,
        creator_id: &str,
    ) -> Result<Self, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO groups (id, name, description, privacy, creator_id, members)
            VALUES ($1, $2, $3, $4, $5, ARRAY[$5])
            RETURNING {GROUP_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Group>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(req.name.trim())
            .bind(req.description.trim())
            .bind(req.privacy.as_str())
            .bind(creator_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");
        sqlx::query_as::<_, Group>(&sql).bind(id).fetch_optional(pool).await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM groups ORDER BY created_at DESC");
        sqlx::query_as::<_, Group>(&sql).fetch_all(pool).await
    }

    pub async fn exists(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// 删除群组及其下的帖子，返回帖子附件文件名以便清理
    pub async fn delete(pool: &PgPool, id: &str) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let attachments: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "DELETE FROM posts WHERE group_id = $1 RETURNING picture_path, file_path",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(attachments
            .into_iter()
            .flat_map(|(picture, file)| picture.into_iter().chain(file))
            .collect())
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.creator_id.as_str()).chain(self.members.iter())
    }

    pub fn into_view(self, directory: &Directory) -> GroupView {
        GroupView {
            creator: directory.creator(&self.creator_id),
            members: directory.members(&self.members),
            member_count: self.members.len(),
            id: self.id,
            name: self.name,
            description: self.description,
            privacy: self.privacy,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// 展开单个群组的成员与创建者
    pub async fn populate(self, pool: &PgPool) -> Result<GroupView, sqlx::Error> {
        let directory = Directory::load(pool, self.user_ids()).await?;
        Ok(self.into_view(&directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, description: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.into(),
            description: description.into(),
            privacy: Privacy::default(),
        }
    }

    #[test]
    fn group_fields_are_validated() {
        assert!(request("Robotics Club", "Build robots together").validate().is_ok());
        assert!(request("R", "Build robots together").validate().is_err());
        assert!(request(&"R".repeat(51), "Build robots together").validate().is_err());
        assert!(request("Robotics Club", "tiny").validate().is_err());
    }

    #[test]
    fn privacy_defaults_to_public() {
        let req: CreateGroupRequest =
            serde_json::from_value(serde_json::json!({"name": "Chess", "description": "Weekly games"}))
                .unwrap();
        assert_eq!(req.privacy, Privacy::Public);
        assert_eq!(Privacy::try_from("private".to_string()).unwrap(), Privacy::Private);
        assert!(Privacy::try_from("secret".to_string()).is_err());
    }

    #[test]
    fn view_expands_creator_and_members() {
        let group = Group {
            id: "g1".into(),
            name: "Chess".into(),
            description: "Weekly games".into(),
            privacy: Privacy::Public,
            creator_id: "u1".into(),
            members: vec!["u1".to_string(), "u2".to_string()].into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(group.user_ids().collect::<Vec<_>>(), ["u1", "u1", "u2"]);

        let directory: Directory = std::iter::once(UserSummary {
            id: "u1".into(),
            name: "Asha".into(),
            roll_number: None,
            email: "asha@campus.edu".into(),
        })
        .collect();

        let view = group.into_view(&directory);
        assert_eq!(view.creator.name.as_deref(), Some("Asha"));
        assert_eq!(view.member_count, 2);
        assert_eq!(view.members.len(), 1);
    }
}
