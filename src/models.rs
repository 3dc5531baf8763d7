use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

// Never serialized to clients directly; responses go through `UserPublic`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields persisted when a confirmed signup creates the account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// View of a user safe to return to API clients (no credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserPublic {
    pub id: Id,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserPublic {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Todo {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub description: Option<String>,
    // free-form display strings, stored as the client sent them
    pub date: Option<String>,
    pub time: Option<String>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub done: bool,
}
