use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::access::Owned;
use crate::membership::MemberSet;
use crate::routes::user::User;
use crate::upload::Attachment;

const POST_COLUMNS: &str = "id, user_id, name, roll_number, user_avatar, description, \
     picture_path, file_path, original_file_name, COALESCE(likes, '{}') AS likes, comments, \
     group_id, created_at, updated_at";

const MAX_COMMENT_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub roll_number: Option<String>,
    pub user_avatar: String,
    pub description: String,
    pub picture_path: Option<String>,
    pub file_path: Option<String>,
    pub original_file_name: Option<String>,
    #[sqlx(try_from = "Vec<String>")]
    #[serde(serialize_with = "MemberSet::serialize_presence_map")]
    pub likes: MemberSet,
    pub comments: Json<Vec<Comment>>,
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 评论保存发表时的作者快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub user_id: String,
    pub name: String,
    pub roll_number: Option<String>,
    pub user_avatar: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn by(author: &User, text: &str) -> Self {
        Comment {
            user_id: author.id.clone(),
            name: author.name.clone(),
            roll_number: author.roll_number.clone(),
            user_avatar: author.avatar.clone(),
            comment: text.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub comment: String,
}

impl CommentRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        let len = self.comment.trim().chars().count();
        if len == 0 {
            return Err("评论内容不能为空");
        }
        if len > MAX_COMMENT_CHARS {
            return Err("评论不能超过1000个字符");
        }
        Ok(())
    }
}

/// 新帖子，作者信息取自令牌对应的账号
#[derive(Debug)]
pub struct NewPost {
    pub description: String,
    pub attachment: Option<Attachment>,
    pub group_id: Option<String>,
}

impl NewPost {
    /// 图片放在 picture_path，其他文档放在 file_path
    fn attachment_columns(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        match &self.attachment {
            Some(file) if file.is_image() => (
                Some(file.stored_name.as_str()),
                None,
                Some(file.original_name.as_str()),
            ),
            Some(file) => (
                None,
                Some(file.stored_name.as_str()),
                Some(file.original_name.as_str()),
            ),
            None => (None, None, None),
        }
    }
}

impl Owned for Post {
    fn owner_id(&self) -> &str {
        &self.user_id
    }

    fn denied_message(&self) -> &'static str {
        "只能删除自己的帖子"
    }
}

impl Post {
    /// 附件在上传目录中的文件名
    pub fn attachments(&self) -> impl Iterator<Item = &str> {
        self.picture_path
            .as_deref()
            .into_iter()
            .chain(self.file_path.as_deref())
    }

    pub async fn create(pool: &PgPool, author: &User, new_post: NewPost) -> Result<Self, sqlx::Error> {
        let (picture_path, file_path, original_file_name) = new_post.attachment_columns();
        let sql = format!(
            r#"
            INSERT INTO posts (
                id, user_id, name, roll_number, user_avatar, description,
                picture_path, file_path, original_file_name, group_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {POST_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&author.id)
            .bind(&author.name)
            .bind(&author.roll_number)
            .bind(&author.avatar)
            .bind(&new_post.description)
            .bind(picture_path)
            .bind(file_path)
            .bind(original_file_name)
            .bind(&new_post.group_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, Post>(&sql).bind(id).fetch_optional(pool).await
    }

    /// 首页动态只包含不属于任何群组的帖子
    pub async fn feed(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE group_id IS NULL ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Post>(&sql).fetch_all(pool).await
    }

    pub async fn by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Post>(&sql).bind(user_id).fetch_all(pool).await
    }

    pub async fn by_group(pool: &PgPool, group_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE group_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Post>(&sql).bind(group_id).fetch_all(pool).await
    }

    /// 追加评论，帖子不存在时返回 None
    pub async fn add_comment(
        pool: &PgPool,
        id: &str,
        comment: Comment,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE posts
            SET comments = COALESCE(comments, '[]'::jsonb) || $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {POST_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(Json(vec![comment]))
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
