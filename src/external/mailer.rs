use crate::config::MailerConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMailResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// 事务邮件服务商的HTTP客户端
#[derive(Clone)]
pub struct MailerService {
    client: Client,
    config: MailerConfig,
}

impl MailerService {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    pub async fn send(&self, recipient: &str, subject: &str, body: &str) -> AppResult<()> {
        // 未配置服务商时直接视为已投递（本地开发）
        if !self.is_configured() {
            log::info!("Mailer not configured, skipping email to {recipient}: {subject}");
            return Ok(());
        }

        let url = format!("{}/v1/messages", self.config.base_url);
        let payload = SendMailRequest {
            from: &self.config.from_address,
            to: recipient,
            subject,
            text: body,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: SendMailResponse = response.json().await.unwrap_or(SendMailResponse {
                id: None,
                message: None,
            });
            return Err(AppError::ExternalApiError(format!(
                "Mail provider returned {status}: {}",
                body.message.unwrap_or_default()
            )));
        }

        let body: SendMailResponse = response.json().await?;
        log::debug!(
            "Email accepted by provider, id={}",
            body.id.unwrap_or_default()
        );

        Ok(())
    }
}
