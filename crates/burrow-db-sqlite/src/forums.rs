//! Forum repository: creation, lookup with denormalized counters, and the
//! membership listing fed by the `forum_users` table that thread and post
//! creation maintain.

use async_trait::async_trait;
use burrow_core::models::{Forum, User};
use burrow_core::traits::ForumStore;
use burrow_core::{AppError, Result};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::Row;

use crate::{sql_limit, store_err};

const FORUM_COLUMNS: &str = "slug, title, owner, posts, threads";

pub struct SqliteForums {
    pool: SqlitePool,
}

impl SqliteForums {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_forum(row: &SqliteRow) -> sqlx::Result<Forum> {
    Ok(Forum {
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        owner: row.try_get("owner")?,
        posts: row.try_get("posts")?,
        threads: row.try_get("threads")?,
    })
}

pub(crate) async fn fetch_forum<'e, E>(ex: E, slug: &str) -> Result<Forum>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {FORUM_COLUMNS} FROM forums WHERE slug = ?1"))
        .bind(slug)
        .fetch_optional(ex)
        .await
        .map_err(store_err)?;
    row.as_ref()
        .map(map_forum)
        .transpose()
        .map_err(store_err)?
        .ok_or_else(|| AppError::ForumNotFound(slug.to_owned()))
}

#[async_trait]
impl ForumStore for SqliteForums {
    async fn create_forum(&self, forum: Forum) -> Result<Forum> {
        if forum.slug.is_empty() || forum.title.is_empty() {
            return Err(AppError::Validation("forum slug and title must be non-empty".into()));
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT nickname FROM users WHERE nickname = ?1")
                .bind(&forum.owner)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
        let owner = owner.ok_or_else(|| AppError::UserNotFound(forum.owner.clone()))?;

        match fetch_forum(&mut *tx, &forum.slug).await {
            Ok(existing) => return Err(AppError::ForumConflict(Box::new(existing))),
            Err(AppError::ForumNotFound(_)) => {}
            Err(other) => return Err(other),
        }

        sqlx::query("INSERT INTO forums (slug, title, owner) VALUES (?1, ?2, ?3)")
            .bind(&forum.slug)
            .bind(&forum.title)
            .bind(&owner)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(Forum { owner, posts: 0, threads: 0, ..forum })
    }

    async fn get_forum(&self, slug: &str) -> Result<Forum> {
        fetch_forum(&self.pool, slug).await
    }

    async fn forum_users(
        &self,
        slug: &str,
        limit: Option<i64>,
        since: Option<&str>,
        desc: bool,
    ) -> Result<Vec<User>> {
        let forum = fetch_forum(&self.pool, slug).await?;

        let dir = if desc { "DESC" } else { "ASC" };
        let rows = match since {
            Some(since) => {
                let cmp = if desc { "<" } else { ">" };
                sqlx::query(&format!(
                    "SELECT u.nickname, u.fullname, u.about, u.email
                     FROM users u JOIN forum_users fu ON fu.nickname = u.nickname
                     WHERE fu.forum = ?1 AND u.nickname {cmp} ?2
                     ORDER BY u.nickname {dir} LIMIT ?3"
                ))
                .bind(&forum.slug)
                .bind(since)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT u.nickname, u.fullname, u.about, u.email
                     FROM users u JOIN forum_users fu ON fu.nickname = u.nickname
                     WHERE fu.forum = ?1
                     ORDER BY u.nickname {dir} LIMIT ?2"
                ))
                .bind(&forum.slug)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(User {
                    nickname: row.try_get("nickname")?,
                    fullname: row.try_get("fullname")?,
                    about: row.try_get("about")?,
                    email: row.try_get("email")?,
                })
            })
            .collect::<sqlx::Result<_>>()
            .map_err(store_err)
    }
}
