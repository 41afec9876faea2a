use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, verify_password};
use crate::db::models::{User, DEFAULT_PICTURE};
use crate::error::{AppError, AppResult};
use crate::extractors::{AppJson, CurrentUser};
use crate::mailer;
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::users::repository;
use crate::users::{NewUser, PasswordProfile};
use crate::validation;

// --- Requests ---

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "bYear")]
    pub b_year: i32,
    #[serde(alias = "bMonth")]
    pub b_month: u32,
    #[serde(alias = "bDay")]
    pub b_day: u32,
    pub gender: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct FederatedLoginRequest {
    #[serde(alias = "tokenId", alias = "token")]
    pub credential: String,
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ValidateCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub code: String,
    #[serde(alias = "newPassword")]
    pub password: String,
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub picture: String,
    pub first_name: String,
    pub last_name: String,
    pub token: String,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FoundUser {
    pub email: String,
    pub picture: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google-auth", post(federated_login))
        .route("/activate", post(activate))
        .route("/sendVerification", post(send_verification))
        .route("/findUser", post(find_user))
        .route("/sendResetPasswordCode", post(send_reset_code))
        .route("/validateResetCode", post(validate_reset_code))
        .route("/changePassword", post(change_password))
}

// --- Helpers ---

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn session_response(state: &AppState, user: &User, message: Option<&str>) -> AppResult<AuthResponse> {
    let token = state.tokens.issue_session(&user.id)?;
    Ok(AuthResponse {
        id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        picture: user.picture.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        token,
        verified: user.verified,
        message: message.map(str::to_string),
    })
}

fn send_activation_link(state: &AppState, user: &User) -> AppResult<()> {
    let token = state.tokens.issue_activation(&user.id)?;
    let url = format!(
        "{}/activate/{}",
        state.config.email.base_url.trim_end_matches('/'),
        token
    );
    let email = mailer::verification_email(
        &user.email,
        &user.first_name,
        &url,
        state.config.auth.activation_minutes,
    )?;
    mailer::dispatch(state.mailer.clone(), email);
    Ok(())
}

// --- Handlers ---

async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);
    validation::require_email(&email)?;

    let existing = {
        let conn = state.db.get()?;
        repository::find_by_email(&conn, &email)?
    };

    // Federation-only account: attach a password instead of refusing.
    if let Some(user) = existing {
        if user.password_hash.is_some() || user.federation_id.is_none() {
            return Err(AppError::Conflict(repository::EMAIL_TAKEN.into()));
        }

        validation::require_password(&req.password)?;
        validation::require_birth_date(req.b_year, req.b_month, req.b_day)?;
        let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;

        let profile = PasswordProfile {
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            b_year: req.b_year,
            b_month: req.b_month,
            b_day: req.b_day,
            gender: req.gender,
        };
        let user = {
            let conn = state.db.get()?;
            repository::add_password(&conn, &user.id, &profile, Utc::now())?
        };

        tracing::info!(user_id = %user.id, "Password added to federated account");
        return Ok(Json(session_response(
            &state,
            &user,
            Some("Password added! You can now log in with both Google and your password."),
        )?));
    }

    validation::require_name("First name", &req.first_name)?;
    validation::require_name("Last name", &req.last_name)?;
    validation::require_password(&req.password)?;
    validation::require_birth_date(req.b_year, req.b_month, req.b_day)?;

    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;

    let user = {
        let conn = state.db.get()?;
        let base = validation::username_base(&req.first_name, &req.last_name);
        let new_user = NewUser {
            email,
            username: repository::unique_username(&conn, &base)?,
            password_hash: Some(password_hash),
            federation_id: None,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            picture: DEFAULT_PICTURE.to_string(),
            b_year: req.b_year,
            b_month: req.b_month,
            b_day: req.b_day,
            gender: req.gender,
            verified: false,
        };
        repository::register_user(&conn, new_user, Utc::now())?
    };

    send_activation_link(&state, &user)?;

    Ok(Json(session_response(
        &state,
        &user,
        Some("Thank you for registering! We sent you an email to confirm your account."),
    )?))
}

async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&req.email);
    let user = {
        let conn = state.db.get()?;
        repository::find_by_email(&conn, &email)?
    }
    .ok_or_else(|| {
        AppError::InvalidCredentials(
            "The email address you entered is not connected to an account.".into(),
        )
    })?;

    let hash = user.password_hash.as_deref().ok_or_else(|| {
        AppError::InvalidCredentials(
            "This account was created using Google Sign-In. Please log in with Google.".into(),
        )
    })?;

    if !verify_password(&req.password, hash).await? {
        return Err(AppError::InvalidCredentials(
            "These are invalid credentials. Please try again.".into(),
        ));
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(session_response(&state, &user, None)?))
}

async fn federated_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<FederatedLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let identity = state.identity.verify(&req.credential).await?;
    if !identity.email_verified {
        return Err(AppError::Validation(
            "Your Google account is not verified.".into(),
        ));
    }
    let email = normalize_email(&identity.email);

    let user = {
        let conn = state.db.get()?;
        match repository::find_by_email(&conn, &email)? {
            Some(user) => {
                if user.federation_id.is_none() {
                    repository::link_federation(&conn, &user.id, &identity.subject)?;
                    tracing::info!(user_id = %user.id, "Linked federated identity");
                }
                user
            }
            None => {
                let first_name = identity.given_name.clone().unwrap_or_default();
                let last_name = identity.family_name.clone().unwrap_or_default();
                let mut base = validation::username_base(&first_name, &last_name);
                if base == "user" {
                    base = validation::username_base(email.split('@').next().unwrap_or(""), "");
                }
                let new_user = NewUser {
                    username: repository::unique_username(&conn, &base)?,
                    email,
                    password_hash: None,
                    federation_id: Some(identity.subject.clone()),
                    first_name,
                    last_name,
                    picture: identity
                        .picture
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PICTURE.to_string()),
                    b_year: 1990,
                    b_month: 1,
                    b_day: 1,
                    gender: None,
                    verified: true,
                };
                repository::register_user(&conn, new_user, Utc::now())?
            }
        }
    };

    Ok(Json(session_response(&state, &user, None)?))
}

async fn activate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(req): AppJson<ActivateRequest>,
) -> AppResult<Json<MessageResponse>> {
    let claims = state.tokens.verify_activation(&req.token)?;
    if claims.id != user.id {
        return Err(AppError::Forbidden(
            "You don't have the authorization to complete this operation.".into(),
        ));
    }
    if user.verified {
        return Err(AppError::Conflict(
            "This email is already activated.".into(),
        ));
    }

    {
        let conn = state.db.get()?;
        repository::set_verified(&conn, &user.id)?;
    }
    tracing::info!(user_id = %user.id, "Account activated");

    Ok(Json(MessageResponse::new(
        "Your account has been activated successfully.",
    )))
}

async fn send_verification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<MessageResponse>> {
    if user.verified {
        return Err(AppError::Conflict(
            "This account is already activated.".into(),
        ));
    }
    send_activation_link(&state, &user)?;
    Ok(Json(MessageResponse::new(
        "We sent an email verification link to your email address.",
    )))
}

async fn find_user(
    State(state): State<AppState>,
    AppJson(req): AppJson<EmailRequest>,
) -> AppResult<Json<FoundUser>> {
    let conn = state.db.get()?;
    let user = repository::find_by_email(&conn, &normalize_email(&req.email))?
        .ok_or_else(|| AppError::NotFound("This account does not exist.".into()))?;
    Ok(Json(FoundUser {
        email: user.email,
        picture: user.picture,
    }))
}

async fn send_reset_code(
    State(state): State<AppState>,
    AppJson(req): AppJson<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    let minutes = state.config.auth.reset_code_minutes;
    let (user, reset) = {
        let conn = state.db.get()?;
        let user = repository::find_by_email(&conn, &normalize_email(&req.email))?
            .ok_or_else(|| {
                AppError::NotFound("There is no account found with that email address.".into())
            })?;
        let code = repository::generate_code(5);
        let reset = repository::replace_reset_code(
            &conn,
            &user.id,
            &code,
            Utc::now(),
            Duration::minutes(minutes),
        )?;
        (user, reset)
    };

    let email = mailer::reset_code_email(&user.email, &user.first_name, &reset.code, minutes)?;
    mailer::dispatch(state.mailer.clone(), email);
    tracing::info!(user_id = %user.id, "Reset code issued");

    Ok(Json(MessageResponse::new(
        "A reset code has been sent to your email address.",
    )))
}

/// Look up the account and check its live reset code.
fn check_reset_code(state: &AppState, email: &str, code: &str) -> AppResult<User> {
    let conn = state.db.get()?;
    let user = repository::find_by_email(&conn, &normalize_email(email))?
        .ok_or_else(|| AppError::NotFound("This account is not found.".into()))?;
    let stored = repository::find_reset_code(&conn, &user.id)?
        .ok_or_else(|| AppError::NotFound("No reset code has been requested.".into()))?;

    if stored.is_expired(Utc::now()) {
        return Err(AppError::Validation(
            "Your verification code has expired.".into(),
        ));
    }
    if stored.code != code.trim() {
        return Err(AppError::Validation(
            "Your verification code is incorrect.".into(),
        ));
    }
    Ok(user)
}

async fn validate_reset_code(
    State(state): State<AppState>,
    AppJson(req): AppJson<ValidateCodeRequest>,
) -> AppResult<Json<MessageResponse>> {
    check_reset_code(&state, &req.email, &req.code)?;
    Ok(Json(MessageResponse::new("Verification code is correct.")))
}

async fn change_password(
    State(state): State<AppState>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user = check_reset_code(&state, &req.email, &req.code)?;
    validation::require_password(&req.password)?;
    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;

    {
        let conn = state.db.get()?;
        repository::set_password_by_email(&conn, &user.email, &password_hash)?;
        repository::delete_reset_code(&conn, &user.id)?;
    }
    tracing::info!(user_id = %user.id, "Password reset");

    Ok(Json(MessageResponse::new(
        "Password has been reset successfully.",
    )))
}
