use std::sync::Arc;

use lettre::message::{Mailbox, Message, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::{Config, SmtpConfig};
use crate::error::AppError;

/// 发送重置密码等通知邮件，没有配置 SMTP 时只记录日志
#[derive(Clone)]
pub struct Mailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    client_url: String,
}

impl Mailer {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let from = config
            .smtp
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Mail(format!("SMTP_FROM 地址无效: {e}")))?;

        Ok(Self {
            transport: build_transport(&config.smtp)?.map(Arc::new),
            from,
            client_url: config.client_url.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub fn password_reset_link(&self, token: &str) -> String {
        format!("{}/reset-password/{}", self.client_url, token)
    }

    pub async fn send_password_reset(&self, recipient: &str, token: &str) -> Result<(), AppError> {
        let link = self.password_reset_link(token);
        let body = format!(
            "您好，\n\n我们收到了重置您账号密码的请求，请在一小时内打开以下链接设置新密码：\n{link}\n\n如果这不是您本人的操作，请忽略这封邮件。"
        );
        self.send(recipient, "重置密码", body).await
    }

    async fn send(&self, recipient: &str, subject: &str, body: String) -> Result<(), AppError> {
        let Some(transport) = &self.transport else {
            tracing::info!(recipient, subject, "SMTP not configured, skipping email");
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| AppError::Mail(format!("收件人地址无效: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Mail(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| AppError::Mail(e.to_string()))?;
        tracing::info!(recipient, subject, "Email sent");
        Ok(())
    }
}

fn build_transport(
    smtp: &SmtpConfig,
) -> Result<Option<AsyncSmtpTransport<Tokio1Executor>>, AppError> {
    if smtp.host.trim().is_empty() {
        tracing::warn!("SMTP_HOST not set, mailer running in no-op mode");
        return Ok(None);
    }

    let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        .map_err(|e| AppError::Mail(format!("SMTP 配置失败: {e}")))?
        .port(smtp.port);

    let builder = match (&smtp.username, &smtp.password) {
        (Some(username), Some(password)) => {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        }
        _ => builder,
    };

    Ok(Some(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailer_without_smtp_host_is_disabled() {
        let mailer = Mailer::new(&Config::for_tests()).unwrap();
        assert!(!mailer.is_enabled());
        assert_eq!(
            mailer.password_reset_link("abc"),
            "http://localhost:5173/reset-password/abc"
        );
    }

    #[tokio::test]
    async fn disabled_mailer_accepts_sends() {
        let mailer = Mailer::new(&Config::for_tests()).unwrap();
        assert!(mailer.send_password_reset("someone@example.com", "tok").await.is_ok());
    }

    #[test]
    fn invalid_sender_address_is_rejected() {
        let mut config = Config::for_tests();
        config.smtp.from = "not an address".into();
        assert!(matches!(Mailer::new(&config), Err(AppError::Mail(_))));
    }
}
