use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_id(&self, id: Id) -> RepoResult<Option<User>>;
    /// Conflict when the email is already taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()>;
    async fn update_username(&self, id: Id, username: &str) -> RepoResult<User>;
}

#[async_trait]
pub trait TodoRepo: Send + Sync {
    /// Items owned by `user_id`; `include_done` widens to completed ones.
    async fn list_todos(&self, user_id: Id, include_done: bool) -> RepoResult<Vec<Todo>>;
    async fn create_todo(&self, user_id: Id, new: NewTodo) -> RepoResult<Todo>;
    /// Marks done only when the item belongs to `user_id`.
    async fn mark_done(&self, id: Id, user_id: Id) -> RepoResult<Todo>;
    async fn delete_todo(&self, id: Id, user_id: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + TodoRepo {}

impl<T> Repo for T where T: UserRepo + TodoRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        users: HashMap<Id, User>,
        todos: HashMap<Id, Todo>,
        next_id: Id,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }

        async fn find_user_by_id(&self, id: Id) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.get(&id).cloned())
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }

        async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.password_hash = password_hash.to_string();
            Ok(())
        }

        async fn update_username(&self, id: Id, username: &str) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.username = username.to_string();
            Ok(user.clone())
        }
    }

    #[async_trait]
    impl TodoRepo for InMemRepo {
        async fn list_todos(&self, user_id: Id, include_done: bool) -> RepoResult<Vec<Todo>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .todos
                .values()
                .filter(|t| t.user_id == user_id && (include_done || !t.done))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn create_todo(&self, user_id: Id, new: NewTodo) -> RepoResult<Todo> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let todo = Todo {
                id,
                user_id,
                title: new.title,
                description: new.description,
                date: new.date,
                time: new.time,
                done: new.done,
                created_at: Utc::now(),
            };
            s.todos.insert(id, todo.clone());
            Ok(todo)
        }

        async fn mark_done(&self, id: Id, user_id: Id) -> RepoResult<Todo> {
            let mut s = self.state.write().unwrap();
            match s.todos.get_mut(&id) {
                Some(t) if t.user_id == user_id => {
                    t.done = true;
                    Ok(t.clone())
                }
                // foreign items are indistinguishable from missing ones
                _ => Err(RepoError::NotFound),
            }
        }

        async fn delete_todo(&self, id: Id, user_id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let owned = matches!(s.todos.get(&id), Some(t) if t.user_id == user_id);
            if !owned {
                return Err(RepoError::NotFound);
            }
            s.todos.remove(&id);
            Ok(())
        }
    }

}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn find_user_by_id(&self, id: Id) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
                 RETURNING id, username, email, password_hash, created_at",
            )
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db) = e {
                    if db.is_unique_violation() {
                        return RepoError::Conflict;
                    }
                }
                internal(e)
            })
        }

        async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn update_username(&self, id: Id, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "UPDATE users SET username = $2 WHERE id = $1 \
                 RETURNING id, username, email, password_hash, created_at",
            )
            .bind(id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl TodoRepo for PgRepo {
        async fn list_todos(&self, user_id: Id, include_done: bool) -> RepoResult<Vec<Todo>> {
            sqlx::query_as::<_, Todo>(
                "SELECT id, user_id, title, description, date, time, done, created_at \
                 FROM todos WHERE user_id = $1 AND (done = FALSE OR $2) ORDER BY created_at",
            )
            .bind(user_id)
            .bind(include_done)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_todo(&self, user_id: Id, new: NewTodo) -> RepoResult<Todo> {
            sqlx::query_as::<_, Todo>(
                "INSERT INTO todos (user_id, title, description, date, time, done) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, user_id, title, description, date, time, done, created_at",
            )
            .bind(user_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.date)
            .bind(&new.time)
            .bind(new.done)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn mark_done(&self, id: Id, user_id: Id) -> RepoResult<Todo> {
            sqlx::query_as::<_, Todo>(
                "UPDATE todos SET done = TRUE WHERE id = $1 AND user_id = $2 \
                 RETURNING id, user_id, title, description, date, time, done, created_at",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_todo(&self, id: Id, user_id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        #[test]
        fn schema_migrations_are_embedded() {
            let migrator = sqlx::migrate!("./migrations");
            assert!(!migrator.migrations.is_empty());
            assert!(migrator
                .migrations
                .iter()
                .any(|m| m.description.contains("init")));
        }
    }
}
