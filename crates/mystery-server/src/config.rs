//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development. Optional integrations (email, suggestions) are simply
//! disabled when their API key is absent.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use mystery_api::email::{DEFAULT_FROM, DEFAULT_RESEND_BASE_URL, MailerOptions};
use mystery_api::suggest::{DEFAULT_MISTRAL_BASE_URL, DEFAULT_MODEL, SuggesterOptions};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `MYSTERY_HOST` / `MYSTERY_PORT`. Default: `0.0.0.0:3000`.
    pub addr: SocketAddr,

    /// SQLite database file.
    /// Env: `MYSTERY_DB_PATH`. Default: `mystery.db`.
    pub db_path: PathBuf,

    /// HS256 secret for session tokens.
    /// Env: `MYSTERY_JWT_SECRET` (required).
    pub jwt_secret: String,

    /// Env: `RESEND_API_KEY`, `RESEND_BASE_URL`, `MYSTERY_EMAIL_FROM`.
    pub mailer: MailerOptions,

    /// Env: `MISTRAL_API_KEY`, `MISTRAL_BASE_URL`, `MISTRAL_MODEL`.
    pub suggester: SuggesterOptions,

    /// Env: `MYSTERY_EXPOSE_CODE_ON_EMAIL_FAILURE` (true/false). Default: false.
    pub expose_code_on_email_failure: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process
    /// environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("MYSTERY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MYSTERY_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let env_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.into());
        let env_opt = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let host = env_or("MYSTERY_HOST", "0.0.0.0");
        let port: u16 = env_or("MYSTERY_PORT", "3000")
            .parse()
            .context("MYSTERY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let expose_code_on_email_failure = match env_opt("MYSTERY_EXPOSE_CODE_ON_EMAIL_FAILURE") {
            Some(v) => v
                .parse()
                .context("MYSTERY_EXPOSE_CODE_ON_EMAIL_FAILURE must be true or false")?,
            None => false,
        };

        Ok(Self {
            addr,
            db_path: env_or("MYSTERY_DB_PATH", "mystery.db").into(),
            jwt_secret,
            mailer: MailerOptions {
                api_key: env_opt("RESEND_API_KEY"),
                base_url: env_or("RESEND_BASE_URL", DEFAULT_RESEND_BASE_URL),
                from: env_or("MYSTERY_EMAIL_FROM", DEFAULT_FROM),
            },
            suggester: SuggesterOptions {
                api_key: env_opt("MISTRAL_API_KEY"),
                base_url: env_or("MISTRAL_BASE_URL", DEFAULT_MISTRAL_BASE_URL),
                model: env_or("MISTRAL_MODEL", DEFAULT_MODEL),
            },
            expose_code_on_email_failure,
        })
    }
}
