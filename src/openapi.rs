use crate::models::{NewTodo, Todo, UserPublic};
use crate::routes::{
    AuthData, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
    UpdateUsernameRequest, VerifyOtpRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::signup,
        crate::routes::verify_otp,
        crate::routes::login,
        crate::routes::forgot_password,
        crate::routes::verify_reset_otp,
        crate::routes::reset_password,
        crate::routes::update_username,
        crate::routes::list_todos,
        crate::routes::create_todo,
        crate::routes::update_todo,
        crate::routes::delete_todo,
        crate::routes::send_todos,
    ),
    components(schemas(
        Todo, NewTodo, UserPublic, AuthData,
        SignupRequest, VerifyOtpRequest, LoginRequest,
        ForgotPasswordRequest, ResetPasswordRequest, UpdateUsernameRequest
    )),
    tags(
        (name = "auth", description = "Signup, login and password reset"),
        (name = "todos", description = "Per-user todo operations"),
    )
)]
pub struct ApiDoc;
