use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::error::AppError;
use crate::routes::user::User;

/// 学号长度
const ROLL_NUMBER_LEN: usize = 10;
/// 院校代码在学号中的起始位置
const COLLEGE_CODE_OFFSET: usize = 2;
const MIN_PASSWORD_CHARS: usize = 6;

pub const DEPARTMENTS: &[&str] = &[
    "Computer Science and Engineering (CSE)",
    "Information Technology (IT)",
    "Computer Science and Data Science (CSD)",
    "Electrical and Electronics Engineering (EEE)",
    "Electronics and Communication Engineering (ECE)",
    "Mechanical Engineering (Mech)",
    "Civil Engineering (Civil)",
    "Office",
    "Library",
];

const RESET_KEY_PREFIX: &str = "reset:";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default, alias = "rollNumber")]
    pub roll_number: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub department: Vec<String>,
}

impl RegisterRequest {
    /// 校验注册信息，返回去除空白后的学号
    pub fn validate(&self, college_code: &str) -> Result<Option<String>, AppError> {
        if self.role == Role::Admin {
            return Err(AppError::Validation("不能自行注册管理员账号".into()));
        }

        let roll_number = self
            .roll_number
            .as_deref()
            .map(str::trim)
            .filter(|roll| !roll.is_empty());

        if self.role == Role::Student {
            let roll = roll_number
                .ok_or_else(|| AppError::InvalidIdentifier("学生注册必须填写学号".into()))?;
            validate_roll_number(roll, college_code)?;
        }

        self.validate_departments()?;

        let name_len = self.name.trim().chars().count();
        if !(2..=50).contains(&name_len) {
            return Err(AppError::Validation("姓名长度必须在2到50个字符之间".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::Validation("邮箱格式无效".into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::Validation(format!(
                "密码至少需要{MIN_PASSWORD_CHARS}个字符"
            )));
        }

        Ok(roll_number.map(str::to_string))
    }

    fn validate_departments(&self) -> Result<(), AppError> {
        if self.department.is_empty() {
            return Err(AppError::MissingDepartment);
        }
        if self.role == Role::Student && self.department.len() != 1 {
            return Err(AppError::Validation("学生只能选择一个院系".into()));
        }
        if let Some(unknown) = self
            .department
            .iter()
            .find(|dept| !DEPARTMENTS.contains(&dept.as_str()))
        {
            return Err(AppError::Validation(format!("未知的院系: {unknown}")));
        }
        Ok(())
    }
}

/// 学号必须为10位，第3到5位是院校代码
pub fn validate_roll_number(roll: &str, college_code: &str) -> Result<(), AppError> {
    let chars: Vec<char> = roll.chars().collect();
    if chars.len() != ROLL_NUMBER_LEN {
        return Err(AppError::InvalidIdentifier(format!(
            "学号必须恰好为{ROLL_NUMBER_LEN}个字符"
        )));
    }

    let code_len = college_code.chars().count();
    let infix: String = chars
        .iter()
        .skip(COLLEGE_CODE_OFFSET)
        .take(code_len)
        .collect();
    if infix != college_code {
        return Err(AppError::InvalidIdentifier(format!(
            "院校代码无效，学号第3至5位必须为{college_code}"
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// 邮箱或学号
    #[serde(alias = "email", alias = "roll_number")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[serde(alias = "password")]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "密码至少需要{MIN_PASSWORD_CHARS}个字符"
        )));
    }
    Ok(())
}

fn reset_key(digest: &str) -> String {
    format!("{RESET_KEY_PREFIX}{digest}")
}

/// 保存重置令牌摘要，过期后自动失效
pub async fn store_reset_token(
    redis: &RedisClient,
    digest: &str,
    user_id: &str,
    ttl_secs: u64,
) -> Result<(), redis::RedisError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let _: () = redis::cmd("SET")
        .arg(reset_key(digest))
        .arg(user_id)
        .arg("EX")
        .arg(ttl_secs)
        .query_async(&mut conn)
        .await?;
    Ok(())
}

/// 取出并删除令牌对应的用户ID，同一令牌只能使用一次
pub async fn take_reset_token(
    redis: &RedisClient,
    digest: &str,
) -> Result<Option<String>, redis::RedisError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let user_id: Option<String> = redis::cmd("GETDEL")
        .arg(reset_key(digest))
        .query_async(&mut conn)
        .await?;
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(roll: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Asha Rao".into(),
            roll_number: Some(roll.into()),
            email: "asha@campus.edu".into(),
            password: "secret123".into(),
            role: Role::Student,
            department: vec![DEPARTMENTS[0].into()],
        }
    }

    #[test]
    fn valid_student_passes() {
        assert_eq!(
            student(" 2256700042 ").validate("567").unwrap().as_deref(),
            Some("2256700042")
        );
    }

    #[test]
    fn roll_number_must_have_ten_characters() {
        let err = student("225670004").validate("567").unwrap_err();
        assert!(matches!(err, AppError::InvalidIdentifier(_)));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn roll_number_must_carry_college_code() {
        let err = student("2212300042").validate("567").unwrap_err();
        assert!(matches!(err, AppError::InvalidIdentifier(_)));
        assert!(err.to_string().contains("567"));

        assert!(student("2212300042").validate("123").is_ok());
    }

    #[test]
    fn student_without_roll_number_is_rejected() {
        let mut req = student("");
        assert!(matches!(req.validate("567"), Err(AppError::InvalidIdentifier(_))));
        req.roll_number = None;
        assert!(matches!(req.validate("567"), Err(AppError::InvalidIdentifier(_))));
    }

    #[test]
    fn department_rules() {
        let mut req = student("2256700042");
        req.department.clear();
        assert!(matches!(req.validate("567"), Err(AppError::MissingDepartment)));

        req.department = vec![DEPARTMENTS[0].into(), DEPARTMENTS[1].into()];
        assert!(matches!(req.validate("567"), Err(AppError::Validation(_))));

        req.department = vec!["Astrology".into()];
        assert!(matches!(req.validate("567"), Err(AppError::Validation(_))));
    }

    #[test]
    fn faculty_may_skip_roll_number_and_pick_several_departments() {
        let req = RegisterRequest {
            roll_number: None,
            role: Role::Faculty,
            department: vec![DEPARTMENTS[0].into(), "Library".into()],
            ..student("")
        };
        assert_eq!(req.validate("567").unwrap(), None);
    }

    #[test]
    fn admin_cannot_self_register() {
        let req = RegisterRequest {
            role: Role::Admin,
            ..student("2256700042")
        };
        assert!(matches!(req.validate("567"), Err(AppError::Validation(_))));
    }

    #[test]
    fn basic_field_checks() {
        let mut req = student("2256700042");
        req.name = "A".into();
        assert!(req.validate("567").is_err());

        let mut req = student("2256700042");
        req.email = "asha.campus.edu".into();
        assert!(req.validate("567").is_err());

        let mut req = student("2256700042");
        req.password = "12345".into();
        assert!(req.validate("567").is_err());
    }

    #[test]
    fn login_accepts_email_or_roll_number_keys() {
        let by_email: LoginRequest =
            serde_json::from_value(serde_json::json!({"email": "a@b.c", "password": "x"})).unwrap();
        assert_eq!(by_email.identifier, "a@b.c");

        let by_roll: LoginRequest = serde_json::from_value(
            serde_json::json!({"roll_number": "2256700042", "password": "x"}),
        )
        .unwrap();
        assert_eq!(by_roll.identifier, "2256700042");
    }

    #[test]
    fn register_request_defaults_to_student() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "name": "Asha",
            "rollNumber": "2256700042",
            "email": "asha@campus.edu",
            "password": "secret123",
            "department": ["Library"]
        }))
        .unwrap();
        assert_eq!(req.role, Role::Student);
        assert_eq!(req.roll_number.as_deref(), Some("2256700042"));
    }
}
