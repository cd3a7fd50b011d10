use std::sync::LazyLock;

use axum::{Extension, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::auth::{
    jwt,
    middleware::{AuthUser, MaybeAuthUser},
    password,
};
use crate::config::Config;
use crate::db::{accounts, games};
use crate::error::AppError;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid username regex"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `username` may hold either the username or the email address.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Only the email address is editable for now.
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub rating: i32,
    pub games_played: i32,
    pub games_won: i32,
    pub is_online: bool,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

fn account_to_response(a: &accounts::Account) -> UserResponse {
    UserResponse {
        id: a.id,
        username: a.username.clone(),
        display_name: a.name().to_string(),
        email: a.email.clone(),
        rating: a.rating,
        games_played: a.games_played,
        games_won: a.games_won,
        is_online: a.is_online,
        created_at: a.created_at.to_rfc3339(),
    }
}

fn validate_username(username: &str) -> Result<(), AppError> {
    if username.len() < 3 {
        return Err(AppError::BadRequest(
            "Username must be at least 3 characters".into(),
        ));
    }
    if username.len() > 20 {
        return Err(AppError::BadRequest(
            "Username must be at most 20 characters".into(),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(AppError::BadRequest(
            "Username can only contain letters, numbers, and underscores".into(),
        ));
    }
    Ok(())
}

/// Trim and lowercase, then check the address shape.
fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn register(
    Extension(pool): Extension<PgPool>,
    Extension(config): Extension<Config>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let username = req.username.trim();
    validate_username(username)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    // Check uniqueness
    if accounts::email_exists(&pool, &email).await? {
        return Err(AppError::Conflict("Email already registered".into()));
    }
    if accounts::username_exists(&pool, username).await? {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let hash = password::hash_password(&req.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;

    let account_id = accounts::create_account(&pool, username, &email, &hash).await?;
    accounts::record_login(&pool, account_id).await?;

    let account = accounts::get_account_by_id(&pool, account_id)
        .await?
        .ok_or_else(|| AppError::Internal("Failed to retrieve created account".into()))?;

    let token = jwt::create_token(account_id, &config.jwt_secret, config.jwt_expire_hours)
        .map_err(|e| AppError::Internal(format!("Token creation error: {e}")))?;

    tracing::info!(account_id, username = %account.username, "Account registered");

    Ok(Json(AuthResponse {
        user: account_to_response(&account),
        token,
    }))
}

pub async fn login(
    Extension(pool): Extension<PgPool>,
    Extension(config): Extension<Config>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let login = req
        .username
        .as_deref()
        .or(req.email.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Username or email is required".into()))?;

    let account = accounts::get_account_by_login(&pool, login)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let valid = password::verify_password(&req.password, &account.password_hash)
        .map_err(|e| AppError::Internal(format!("Password verify error: {e}")))?;
    if !valid {
        return Err(AppError::Unauthorized);
    }

    accounts::record_login(&pool, account.id).await?;
    let account = accounts::get_account_by_id(&pool, account.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let token = jwt::create_token(account.id, &config.jwt_secret, config.jwt_expire_hours)
        .map_err(|e| AppError::Internal(format!("Token creation error: {e}")))?;

    Ok(Json(AuthResponse {
        user: account_to_response(&account),
        token,
    }))
}

/// Tokens are stateless; logout only flips the presence flag.
pub async fn logout(
    Extension(pool): Extension<PgPool>,
    user: AuthUser,
) -> Result<Json<JsonValue>, AppError> {
    accounts::set_online(&pool, user.id, false).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn me(user: AuthUser) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(UserResponse {
        id: user.id,
        username: user.username.clone(),
        display_name: user
            .display_name
            .clone()
            .unwrap_or_else(|| user.username.clone()),
        email: user.email.clone(),
        rating: user.rating,
        games_played: user.games_played,
        games_won: user.games_won,
        is_online: user.is_online,
        created_at: user.created_at.to_rfc3339(),
    }))
}

/// GET /api/auth/stats
pub async fn stats(
    Extension(pool): Extension<PgPool>,
    user: AuthUser,
) -> Result<Json<JsonValue>, AppError> {
    let games_lost = games::count_losses(&pool, user.id).await?;
    let win_rate = if user.games_played > 0 {
        (f64::from(user.games_won) / f64::from(user.games_played) * 1000.0).round() / 10.0
    } else {
        0.0
    };

    Ok(Json(json!({
        "rating": user.rating,
        "games_played": user.games_played,
        "games_won": user.games_won,
        "games_lost": games_lost,
        "win_rate": win_rate,
    })))
}

/// GET /api/auth/check
///
/// Never fails: a missing or stale token reads as unauthenticated.
pub async fn check(MaybeAuthUser(user): MaybeAuthUser) -> Json<JsonValue> {
    Json(json!({
        "authenticated": user.is_some(),
        "user_id": user.map(|u| u.id),
    }))
}

/// PUT /api/auth/update-profile
pub async fn update_profile(
    Extension(pool): Extension<PgPool>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let requested = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(raw) = requested {
        let email = normalize_email(raw)?;
        if email != user.email.to_lowercase() {
            if accounts::email_exists(&pool, &email).await? {
                return Err(AppError::Conflict("Email already registered".into()));
            }
            accounts::update_email(&pool, user.id, &email).await?;
            tracing::info!(account_id = user.id, "Email updated");
        }
    }

    let account = accounts::get_account_by_id(&pool, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    Ok(Json(account_to_response(&account)))
}

/// PUT /api/auth/change-password
pub async fn change_password(
    Extension(pool): Extension<PgPool>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let account = accounts::get_account_by_id(&pool, user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let valid = password::verify_password(&req.current_password, &account.password_hash)
        .map_err(|e| AppError::Internal(format!("Password verify error: {e}")))?;
    if !valid {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    validate_password(&req.new_password)?;

    let hash = password::hash_password(&req.new_password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;
    accounts::update_password_hash(&pool, user.id, &hash).await?;

    Ok(Json(json!({ "success": true })))
}
