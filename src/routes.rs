use std::sync::Arc;

use actix_web::{web, HttpResponse};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{create_jwt, Auth};
use crate::error::ApiError;
use crate::mailer::{otp_email, todo_export_email, Mailer};
use crate::models::*;
use crate::otp::{generate_code, ChallengeKind, OtpLedger, PendingProfile, Purpose, OTP_TTL};
use crate::repo::{Repo, RepoError};

const BCRYPT_COST: u32 = 12;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(web::resource("/signup").route(web::post().to(signup)))
            .service(web::resource("/verify-otp").route(web::post().to(verify_otp)))
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/forgot-password").route(web::post().to(forgot_password)))
            .service(web::resource("/verify-reset-otp").route(web::post().to(verify_reset_otp)))
            .service(web::resource("/reset-password").route(web::post().to(reset_password)))
            .service(web::resource("/update-username").route(web::put().to(update_username))),
    )
    .service(
        web::scope("/api")
            .service(
                web::resource("/todos")
                    .route(web::get().to(list_todos))
                    .route(web::post().to(create_todo)),
            )
            .service(
                web::resource("/todos/{id}")
                    .route(web::put().to(update_todo))
                    .route(web::delete().to(delete_todo)),
            )
            .service(web::resource("/send-todos").route(web::post().to(send_todos))),
    )
    .route("/", web::get().to(health));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub ledger: OtpLedger,
    pub mailer: Arc<dyn Mailer>,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "data": "server is running" }))
}

// ---------------- auth workflow -----------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUsernameRequest {
    #[serde(rename = "newUsername")]
    pub new_username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthData {
    pub token: String,
    pub user: UserPublic,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid email format"))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 6 {
        return Err(ApiError::bad_request(
            "Password must be at least 6 characters long",
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| {
        log::error!("bcrypt hash error: {e}");
        ApiError::Internal
    })
}

fn subject_id(auth: &Auth) -> Result<Id, ApiError> {
    auth.0
        .user_id()
        .ok_or_else(|| ApiError::Unauthorized("Invalid token.".into()))
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "OTP sent; signup pending confirmation"),
        (status = 400, description = "Invalid fields or account already exists"),
        (status = 500, description = "Email delivery failed")
    )
)]
pub async fn signup(
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_email(&req.email)?;
    if req.username.trim().is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    validate_password(&req.password)?;

    if data.repo.find_user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::bad_request("User already exists with this email"));
    }

    let code = generate_code();
    data.ledger.issue(
        &req.email,
        &code,
        ChallengeKind::Signup(PendingProfile {
            username: req.username.trim().to_string(),
            password_hash: hash_password(&req.password)?,
        }),
        OTP_TTL,
    );

    let (subject, text, html) = otp_email(&code, Purpose::Signup);
    if let Err(e) = data.mailer.send(&req.email, &subject, &text, Some(&html)).await {
        log::error!("signup OTP delivery failed for {}: {e}", req.email);
        // drop the challenge so a retry re-issues cleanly
        data.ledger.clear(&req.email);
        return Err(ApiError::Internal);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "OTP sent to email. Please verify to complete signup.",
        "email": req.email,
    })))
}

#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    tag = "auth",
    request_body = VerifyOtpRequest,
    responses(
        (status = 201, description = "Account created", body = AuthData),
        (status = 400, description = "Invalid or expired OTP")
    )
)]
pub async fn verify_otp(
    data: web::Data<AppState>,
    payload: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_email(&req.email)?;

    if !data.ledger.check(&req.email, &req.otp, Some(Purpose::Signup)) {
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }
    let profile = match data.ledger.peek(&req.email).map(|c| c.kind) {
        Some(ChallengeKind::Signup(profile)) => profile,
        // the slot expired or was replaced between check and peek
        _ => return Err(ApiError::bad_request("Invalid or expired OTP")),
    };

    let user = data
        .repo
        .create_user(NewUser {
            username: profile.username,
            email: req.email.clone(),
            password_hash: profile.password_hash,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::bad_request("User already exists with this email"),
            other => other.into(),
        })?;
    data.ledger.clear(&req.email);

    let token = create_jwt(user.id, &user.username, &user.email).map_err(|e| {
        log::error!("jwt encode error: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "data": AuthData { token, user: UserPublic::from(&user) },
    })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthData),
        (status = 401, description = "Unknown email or wrong password")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_email(&req.email)?;

    // one message for both failure modes, to avoid account enumeration
    let unauthorized = || ApiError::Unauthorized("Invalid email or password".into());
    let user = data
        .repo
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(unauthorized)?;
    let valid = bcrypt::verify(&req.password, &user.password_hash).map_err(|e| {
        log::error!("bcrypt verify error: {e}");
        ApiError::Internal
    })?;
    if !valid {
        return Err(unauthorized());
    }

    let token = create_jwt(user.id, &user.username, &user.email).map_err(|e| {
        log::error!("jwt encode error: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "data": AuthData { token, user: UserPublic::from(&user) },
    })))
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Generic acknowledgement, sent if the account exists"),
        (status = 500, description = "Email delivery failed")
    )
)]
pub async fn forgot_password(
    data: web::Data<AppState>,
    payload: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_email(&req.email)?;

    if data.repo.find_user_by_email(&req.email).await?.is_some() {
        let code = generate_code();
        data.ledger
            .issue(&req.email, &code, ChallengeKind::PasswordReset, OTP_TTL);
        let (subject, text, html) = otp_email(&code, Purpose::PasswordReset);
        if let Err(e) = data.mailer.send(&req.email, &subject, &text, Some(&html)).await {
            log::error!("reset OTP delivery failed for {}: {e}", req.email);
            data.ledger.clear(&req.email);
            return Err(ApiError::Internal);
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If an account exists for this email, a password reset code has been sent.",
    })))
}

#[utoipa::path(
    post,
    path = "/auth/verify-reset-otp",
    tag = "auth",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP is valid; challenge stays live for the reset step"),
        (status = 400, description = "Invalid or expired OTP")
    )
)]
pub async fn verify_reset_otp(
    data: web::Data<AppState>,
    payload: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    // gate only; reset-password re-checks and clears
    if !data
        .ledger
        .check(&req.email, &req.otp, Some(Purpose::PasswordReset))
    {
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "OTP verified" })))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated"),
        (status = 400, description = "Invalid or expired OTP"),
        (status = 404, description = "No account for this email")
    )
)]
pub async fn reset_password(
    data: web::Data<AppState>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_password(&req.new_password)?;
    if !data
        .ledger
        .check(&req.email, &req.otp, Some(Purpose::PasswordReset))
    {
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }
    let user = data
        .repo
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    data.repo
        .update_password(user.id, &hash_password(&req.new_password)?)
        .await?;
    data.ledger.clear(&req.email);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Password reset successful" })))
}

#[utoipa::path(
    put,
    path = "/auth/update-username",
    tag = "auth",
    request_body = UpdateUsernameRequest,
    responses(
        (status = 200, description = "Username updated; fresh token issued"),
        (status = 400, description = "Empty username"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn update_username(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateUsernameRequest>,
) -> Result<HttpResponse, ApiError> {
    let new_username = payload.into_inner().new_username.trim().to_string();
    if new_username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    let id = subject_id(&auth)?;
    let user = data
        .repo
        .update_username(id, &new_username)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("User not found".into()),
            other => other.into(),
        })?;
    // re-mint so the token's display name matches
    let token = create_jwt(user.id, &user.username, &user.email).map_err(|e| {
        log::error!("jwt encode error: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Username updated successfully",
        "data": { "username": user.username, "email": user.email, "token": token },
    })))
}

// ---------------- todo workflow -----------------------------------

#[utoipa::path(
    get,
    path = "/api/todos",
    tag = "todos",
    responses(
        (status = 200, description = "Undone items owned by the caller", body = [Todo]),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn list_todos(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let id = subject_id(&auth)?;
    let todos = data.repo.list_todos(id, false).await?;
    Ok(HttpResponse::Ok().json(todos))
}

#[utoipa::path(
    post,
    path = "/api/todos",
    tag = "todos",
    request_body = NewTodo,
    responses(
        (status = 201, description = "Todo created", body = Todo),
        (status = 400, description = "Missing title"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn create_todo(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewTodo>,
) -> Result<HttpResponse, ApiError> {
    let id = subject_id(&auth)?;
    let new = payload.into_inner();
    if new.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let todo = data.repo.create_todo(id, new).await?;
    Ok(HttpResponse::Created().json(todo))
}

#[utoipa::path(
    put,
    path = "/api/todos/{id}",
    tag = "todos",
    params(("id" = Id, Path, description = "Todo id")),
    responses(
        (status = 200, description = "Todo marked done", body = Todo),
        (status = 404, description = "Not found or owned by someone else")
    )
)]
pub async fn update_todo(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = subject_id(&auth)?;
    let todo = data
        .repo
        .mark_done(path.into_inner(), user_id)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("Todo not found".into()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(todo))
}

#[utoipa::path(
    delete,
    path = "/api/todos/{id}",
    tag = "todos",
    params(("id" = Id, Path, description = "Todo id")),
    responses(
        (status = 200, description = "Todo deleted"),
        (status = 404, description = "Not found or owned by someone else")
    )
)]
pub async fn delete_todo(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = subject_id(&auth)?;
    data.repo
        .delete_todo(path.into_inner(), user_id)
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("Todo not found".into()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Todo deleted successfully" })))
}

#[utoipa::path(
    post,
    path = "/api/send-todos",
    tag = "todos",
    responses(
        (status = 200, description = "Export emailed to the caller"),
        (status = 400, description = "Nothing to send"),
        (status = 500, description = "Email delivery failed")
    )
)]
pub async fn send_todos(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user_id = subject_id(&auth)?;
    let user = data
        .repo
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let todos = data.repo.list_todos(user_id, true).await?;
    if todos.is_empty() {
        return Err(ApiError::bad_request("No todos to send."));
    }

    let website_url = std::env::var("WEBSITE_URL").ok();
    let (subject, text, html) =
        todo_export_email(&user.username, &todos, website_url.as_deref());
    if let Err(e) = data.mailer.send(&user.email, &subject, &text, Some(&html)).await {
        log::error!("todo export delivery failed for {}: {e}", user.email);
        return Err(ApiError::Internal);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Todos sent to your email!" })))
}
