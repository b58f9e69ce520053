use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use rand_core::OsRng;
use tracing::{error, info, warn};
use uuid::Uuid;

use mystery_db::queries::PendingUser;
use mystery_db::{Database, SignUpOutcome};
use mystery_types::api::{
    ApiResponse, Claims, SignInRequest, SignInResponse, SignUpRequest, UsernameQuery,
    VerifyCodeRequest,
};

use crate::convert::{parse_timestamp, user_from_row};
use crate::email::Mailer;
use crate::error::ApiError;
use crate::suggest::Suggester;

/// Session tokens stay valid for 30 days.
const TOKEN_TTL_DAYS: i64 = 30;
/// Verification codes expire one hour after sign-up.
const VERIFY_CODE_TTL_HOURS: i64 = 1;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mailer: Mailer,
    pub suggester: Suggester,
    /// Put the verification code in the sign-up response when the email
    /// could not be delivered. Development only.
    pub expose_code_on_email_failure: bool,
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::from)
}

// -- Validation --

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(2..=20).contains(&len) {
        return Err(ApiError::bad_request("Username must be between 2 and 20 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "Username must not contain special characters",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email address"))
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 6 {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }
    Ok(())
}

/// Six decimal digits, never starting with zero.
pub fn generate_verify_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

// -- Handlers --

/// POST /api/sign-up
pub async fn sign_up(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SignUpRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let verify_code = generate_verify_code();
    let now = Utc::now();
    let expiry = now + Duration::hours(VERIFY_CODE_TTL_HOURS);

    let outcome = {
        let (username, email, code) = (username.clone(), email.clone(), verify_code.clone());
        let new_id = Uuid::new_v4().to_string();
        run_db(&state, move |db| {
            db.register_pending_user(
                &new_id,
                &PendingUser {
                    username: &username,
                    email: &email,
                    password_hash: &password_hash,
                    verify_code: &code,
                    verify_code_expiry: expiry,
                },
                now,
            )
        })
        .await?
    };

    match outcome {
        SignUpOutcome::UsernameTaken => return Err(ApiError::bad_request("Username is already taken")),
        SignUpOutcome::EmailTaken => {
            return Err(ApiError::bad_request("User already exists with this email"));
        }
        SignUpOutcome::Created { id } => info!("Registered user {} ({})", username, id),
        SignUpOutcome::Refreshed { id } => info!("Refreshed pending registration {} ({})", username, id),
    }

    let message = match state
        .mailer
        .send_verification_email(&email, &username, &verify_code)
        .await
    {
        Ok(()) => "User registered successfully. Please verify your email address.".to_string(),
        Err(e) => {
            warn!("Verification email to {} failed: {}", email, e);
            if state.expose_code_on_email_failure {
                format!(
                    "User registered successfully. Please verify your email address. Code: {}",
                    verify_code
                )
            } else {
                "User registered successfully, but the verification email could not be sent. \
                 Please sign up again to get a new code."
                    .to_string()
            }
        }
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

/// POST /api/verify-code
pub async fn verify_code(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<VerifyCodeRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let code = req.code.trim().to_string();
    if username.is_empty() || code.is_empty() {
        return Err(ApiError::bad_request("Username and code are required"));
    }

    let user = run_db(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let not_expired = parse_timestamp(&user.verify_code_expiry).is_some_and(|expiry| expiry > Utc::now());
    let code_matches = user.verify_code == code;

    if code_matches && not_expired {
        let id = user.id.clone();
        run_db(&state, move |db| db.mark_verified(&id)).await?;
        info!("User {} verified", user.username);
        Ok(Json(ApiResponse::ok("Account verified successfully")))
    } else if !not_expired {
        Err(ApiError::bad_request(
            "Verification code has expired. Please sign up again to get a new code.",
        ))
    } else {
        Err(ApiError::bad_request("Incorrect verification code"))
    }
}

/// POST /api/sign-in: Exchanges credentials for a bearer token.
pub async fn sign_in(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SignInRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = req.identifier.trim().to_string();
    if identifier.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Identifier and password are required"));
    }

    let user = run_db(&state, move |db| db.get_user_by_identifier(&identifier))
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("Invalid credentials".into()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated("Invalid credentials".into()))?;

    if !user.is_verified {
        return Err(ApiError::Unauthenticated(
            "Please verify your account before logging in".into(),
        ));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;

    info!("User {} signed in", user.username);
    Ok(Json(SignInResponse {
        success: true,
        message: "Signed in successfully".into(),
        token,
        user: user_from_row(&user),
    }))
}

/// GET /api/check-username-unique?username=
pub async fn check_username_unique(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let username = query.username.unwrap_or_default().trim().to_string();
    validate_username(&username)?;

    let taken = run_db(&state, move |db| db.is_username_taken(&username)).await?;
    if taken {
        return Err(ApiError::bad_request("Username is already taken"));
    }
    Ok(Json(ApiResponse::ok("Username is unique")))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
