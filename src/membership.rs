//! 成员集合的切换
//!
//! 点赞、群组成员、活动报名都是同一种操作：判断某个用户是否在集合里，
//! 在则移除，不在则加入。集合保存在对应表的 `TEXT[]` 列中，
//! 切换由一条 `UPDATE` 完成，行锁保证同一用户的并发切换依次生效。

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use sqlx::PgPool;

/// 有序、去重的用户ID集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MemberSet(Vec<String>);

impl MemberSet {
    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|member| member == id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// 点赞集合按 `{用户ID: true}` 的形式输出
    pub fn serialize_presence_map<S: Serializer>(set: &MemberSet, serializer: S) -> Result<S::Ok, S::Error> {
        set.iter()
            .map(|id| (id, true))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }
}

// 数据库读出的数组里若有重复项，只保留第一次出现的位置
impl From<Vec<String>> for MemberSet {
    fn from(ids: Vec<String>) -> Self {
        let mut set = MemberSet::default();
        for id in ids {
            if !set.contains(&id) {
                set.0.push(id);
            }
        }
        set
    }
}

/// 支持成员切换的集合列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberField {
    PostLikes,
    GroupMembers,
    EventAttendees,
}

impl MemberField {
    fn table_and_column(self) -> (&'static str, &'static str) {
        match self {
            MemberField::PostLikes => ("posts", "likes"),
            MemberField::GroupMembers => ("groups", "members"),
            MemberField::EventAttendees => ("events", "attendees"),
        }
    }

    // NULL 集合先按空集合处理，array_remove 会顺带清除重复项
    fn toggle_sql(self) -> String {
        let (table, column) = self.table_and_column();
        format!(
            r#"
            UPDATE {table}
            SET {column} = CASE
                    WHEN $2 = ANY(COALESCE({column}, '{{}}')) THEN array_remove({column}, $2)
                    ELSE array_append(COALESCE({column}, '{{}}'), $2)
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {column}
            "#
        )
    }

    fn remove_sql(self) -> String {
        let (table, column) = self.table_and_column();
        format!(
            r#"
            UPDATE {table}
            SET {column} = array_remove(COALESCE({column}, '{{}}'), $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {column}
            "#
        )
    }

    /// 切换成员状态，返回切换后的集合，资源不存在时返回 None
    pub async fn toggle(
        self,
        pool: &PgPool,
        resource_id: &str,
        member_id: &str,
    ) -> Result<Option<MemberSet>, sqlx::Error> {
        let members: Option<Vec<String>> = sqlx::query_scalar(&self.toggle_sql())
            .bind(resource_id)
            .bind(member_id)
            .fetch_optional(pool)
            .await?;

        let members = members.map(MemberSet::from);
        if let Some(members) = &members {
            tracing::debug!(
                field = ?self,
                resource_id,
                member_id,
                present = members.contains(member_id),
                "Toggled membership"
            );
        }
        Ok(members)
    }

    /// 强制移除成员，成员本就不在集合中时不报错
    pub async fn remove(
        self,
        pool: &PgPool,
        resource_id: &str,
        member_id: &str,
    ) -> Result<Option<MemberSet>, sqlx::Error> {
        let members: Option<Vec<String>> = sqlx::query_scalar(&self.remove_sql())
            .bind(resource_id)
            .bind(member_id)
            .fetch_optional(pool)
            .await?;

        Ok(members.map(MemberSet::from))
    }
}
