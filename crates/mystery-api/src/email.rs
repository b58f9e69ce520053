//! Verification emails over a Resend-compatible HTTP API.

use askama::Template;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ApiError;

pub const DEFAULT_RESEND_BASE_URL: &str = "https://api.resend.com";
pub const DEFAULT_FROM: &str = "Mystery Message <onboarding@resend.dev>";

const VERIFY_SUBJECT: &str = "Mystery Message - Verify your email address";

#[derive(Debug, Clone)]
pub struct MailerOptions {
    /// `None` disables delivery: every send fails with `Upstream`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub from: String,
}

impl Default for MailerOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_RESEND_BASE_URL.to_string(),
            from: DEFAULT_FROM.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mailer {
    http_client: Client,
    options: MailerOptions,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

impl Mailer {
    pub fn new(options: MailerOptions) -> Self {
        Self {
            http_client: Client::new(),
            options,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.options.api_key.is_some()
    }

    pub async fn send_verification_email(
        &self,
        email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), ApiError> {
        let api_key = self
            .options
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Upstream("email delivery is not configured".into()))?;

        let html = VerificationEmail { username, code }.render().map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("failed to render verification email: {}", e))
        })?;

        let request = SendEmailRequest {
            from: &self.options.from,
            to: [email],
            subject: VERIFY_SUBJECT,
            html,
        };

        let response = self
            .http_client
            .post(format!("{}/emails", self.options.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Email request failed");
                ApiError::Upstream(format!("failed to reach email provider: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Email provider rejected message");
            return Err(ApiError::Upstream(format!(
                "email provider returned {}: {}",
                status, error_text
            )));
        }

        debug!(to = %email, "Verification email sent");
        Ok(())
    }
}

/// HTML body of the verification email. Values are escaped by the template.
#[derive(Template)]
#[template(path = "verification_email.html")]
pub struct VerificationEmail<'a> {
    pub username: &'a str,
    pub code: &'a str,
}
