//! 角色与资源访问控制
//!
//! 所有会修改他人资源的接口都通过 [`authorize`] 做同一套判断，
//! 判断发生在读取资源之后、任何写操作之前。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::utils::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }

    /// 管理员和教职工可以处理任何人的资源
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Faculty | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("未知的角色: {other}"))),
        }
    }
}

// 数据库里角色以文本存储
impl TryFrom<String> for Role {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 发起请求的用户，来自已验证的令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor<'a> {
    pub id: &'a str,
    pub role: Role,
}

impl<'a> From<&'a Claims> for Actor<'a> {
    fn from(claims: &'a Claims) -> Self {
        Actor {
            id: &claims.sub,
            role: claims.role,
        }
    }
}

/// 修改某个资源所需满足的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// 资源创建者，或管理员/教职工
    OwnerOrStaff { owner_id: &'a str },
    /// 只能是本人，角色不能越权
    SelfOnly { subject_id: &'a str },
}

impl Requirement<'_> {
    pub fn is_satisfied_by(&self, actor: Actor<'_>) -> bool {
        match *self {
            Requirement::OwnerOrStaff { owner_id } => actor.id == owner_id || actor.role.is_staff(),
            Requirement::SelfOnly { subject_id } => actor.id == subject_id,
        }
    }
}

/// 有创建者的资源：帖子、群组、活动
pub trait Owned {
    fn owner_id(&self) -> &str;

    /// 拒绝时返回给客户端的提示
    fn denied_message(&self) -> &'static str {
        "无权操作该资源"
    }

    fn requirement(&self) -> Requirement<'_> {
        Requirement::OwnerOrStaff {
            owner_id: self.owner_id(),
        }
    }
}

pub fn authorize<'a>(
    actor: impl Into<Actor<'a>>,
    requirement: Requirement<'_>,
    denied_message: &'static str,
) -> Result<(), AppError> {
    let actor = actor.into();
    if requirement.is_satisfied_by(actor) {
        Ok(())
    } else {
        tracing::info!(actor = actor.id, role = %actor.role, ?requirement, "Access denied");
        Err(AppError::AccessDenied(denied_message))
    }
}

/// 删除、移除成员等操作前的统一检查
pub fn authorize_owned(claims: &Claims, resource: &impl Owned) -> Result<(), AppError> {
    authorize(claims, resource.requirement(), resource.denied_message())
}

/// 只能修改自己的资料
pub fn authorize_self(claims: &Claims, subject_id: &str) -> Result<(), AppError> {
    authorize(claims, Requirement::SelfOnly { subject_id }, "只能修改自己的资料")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc {
        creator: String,
    }

    impl Owned for Doc {
        fn owner_id(&self) -> &str {
            &self.creator
        }
    }

    fn claims(id: &str, role: Role) -> Claims {
        Claims {
            sub: id.into(),
            role,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn owner_may_mutate_own_resource() {
        let doc = Doc { creator: "a".into() };
        assert!(authorize_owned(&claims("a", Role::Student), &doc).is_ok());
    }

    #[test]
    fn staff_may_mutate_any_resource() {
        let doc = Doc { creator: "a".into() };
        assert!(authorize_owned(&claims("b", Role::Faculty), &doc).is_ok());
        assert!(authorize_owned(&claims("c", Role::Admin), &doc).is_ok());
    }

    #[test]
    fn other_student_is_denied() {
        let doc = Doc { creator: "a".into() };
        let err = authorize_owned(&claims("b", Role::Student), &doc).unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
    }

    #[test]
    fn self_only_ignores_role() {
        assert!(authorize_self(&claims("a", Role::Student), "a").is_ok());
        assert!(matches!(
            authorize_self(&claims("b", Role::Admin), "a"),
            Err(AppError::AccessDenied(_))
        ));
    }

    #[test]
    fn role_parses_from_stored_text() {
        assert_eq!("faculty".parse::<Role>().unwrap(), Role::Faculty);
        assert_eq!(Role::try_from("admin".to_string()).unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
    }
}
