//! User repository. Nickname and email are each unique case-insensitively;
//! conflicts surface the clashing rows rather than a bare error.

use async_trait::async_trait;
use burrow_core::models::{User, UserUpdate};
use burrow_core::traits::UserStore;
use burrow_core::{AppError, Result};
use sqlx::error::ErrorKind;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::Row;

use crate::store_err;

const USER_COLUMNS: &str = "nickname, fullname, about, email";

pub struct SqliteUsers {
    pool: SqlitePool,
}

impl SqliteUsers {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_user(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        nickname: row.try_get("nickname")?,
        fullname: row.try_get("fullname")?,
        about: row.try_get("about")?,
        email: row.try_get("email")?,
    })
}

/// Looks a user up by nickname for other repositories (post `related`
/// expansion), failing with the generic user error.
pub(crate) async fn fetch_user<'e, E>(ex: E, nickname: &str) -> Result<User>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE nickname = ?1"))
        .bind(nickname)
        .fetch_optional(ex)
        .await
        .map_err(store_err)?;
    row.as_ref()
        .map(map_user)
        .transpose()
        .map_err(store_err)?
        .ok_or_else(|| AppError::UserNotFound(nickname.to_owned()))
}

async fn clashing_rows<'e, E>(ex: E, nickname: &str, email: &str) -> Result<Vec<User>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE nickname = ?1 OR email = ?2"
    ))
    .bind(nickname)
    .bind(email)
    .fetch_all(ex)
    .await
    .map_err(store_err)?;
    rows.iter().map(map_user).collect::<sqlx::Result<_>>().map_err(store_err)
}

#[async_trait]
impl UserStore for SqliteUsers {
    async fn create_user(&self, user: User) -> Result<User> {
        if user.nickname.is_empty() || user.email.is_empty() {
            return Err(AppError::Validation("nickname and email must be non-empty".into()));
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let clashes = clashing_rows(&mut *tx, &user.nickname, &user.email).await?;
        if !clashes.is_empty() {
            return Err(AppError::UserConflict(clashes));
        }

        sqlx::query("INSERT INTO users (nickname, fullname, about, email) VALUES (?1, ?2, ?3, ?4)")
            .bind(&user.nickname)
            .bind(&user.fullname)
            .bind(&user.about)
            .bind(&user.email)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(user)
    }

    async fn get_user(&self, nickname: &str) -> Result<User> {
        fetch_user(&self.pool, nickname).await
    }

    async fn update_user(&self, nickname: &str, update: &UserUpdate) -> Result<User> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let current = fetch_user(&mut *tx, nickname).await?;

        let pick = |new: &Option<String>, old: &str| match new {
            Some(s) if !s.is_empty() => s.clone(),
            _ => old.to_owned(),
        };
        let fullname = pick(&update.fullname, &current.fullname);
        let email = pick(&update.email, &current.email);
        let about = pick(&update.about, &current.about);

        let updated = sqlx::query(
            "UPDATE users SET fullname = ?1, email = ?2, about = ?3 WHERE nickname = ?4",
        )
        .bind(&fullname)
        .bind(&email)
        .bind(&about)
        .bind(&current.nickname)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db)) = &updated {
            if matches!(db.kind(), ErrorKind::UniqueViolation) {
                let clashes = clashing_rows(&mut *tx, "", &email).await?;
                return Err(AppError::UserConflict(clashes));
            }
        }
        updated.map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(User { nickname: current.nickname, fullname, about, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mem_pool, user};

    #[tokio::test]
    async fn create_then_get() {
        let pool = mem_pool().await;
        let users = SqliteUsers::new(pool);

        let created = users.create_user(user("ada")).await.unwrap();
        let fetched = users.get_user("ada").await.unwrap();
        assert_eq!(created, fetched);

        // Lookup is case-insensitive but keeps the stored casing.
        let fetched = users.get_user("ADA").await.unwrap();
        assert_eq!(fetched.nickname, "ada");

        let err = users.get_user("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn conflict_returns_every_clashing_row() {
        let pool = mem_pool().await;
        let users = SqliteUsers::new(pool);

        users.create_user(user("ada")).await.unwrap();
        users.create_user(user("bob")).await.unwrap();

        // Same nickname as ada, same email as bob: both come back.
        let err = users
            .create_user(User {
                nickname: "ada".into(),
                fullname: "imposter".into(),
                about: String::new(),
                email: "bob@example.org".into(),
            })
            .await
            .unwrap_err();
        match err {
            AppError::UserConflict(rows) => {
                let mut names: Vec<_> = rows.iter().map(|u| u.nickname.as_str()).collect();
                names.sort_unstable();
                assert_eq!(names, ["ada", "bob"]);
            }
            other => panic!("expected UserConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_coalesces_and_guards_email_uniqueness() {
        let pool = mem_pool().await;
        let users = SqliteUsers::new(pool);

        users.create_user(user("ada")).await.unwrap();
        users.create_user(user("bob")).await.unwrap();

        let updated = users
            .update_user(
                "ada",
                &UserUpdate {
                    fullname: Some("Ada L.".into()),
                    email: None,
                    about: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.fullname, "Ada L.");
        assert_eq!(updated.email, "ada@example.org");

        let err = users
            .update_user(
                "ada",
                &UserUpdate { email: Some("bob@example.org".into()), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserConflict(_)));

        let err = users.update_user("ghost", &UserUpdate::default()).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }
}
