//! Thread repository: creation, lookup by id-or-slug, updates, forum
//! listings and the vote tally.

use async_trait::async_trait;
use burrow_core::models::{NewThread, Thread, ThreadRef, ThreadUpdate, Vote};
use burrow_core::traits::ThreadStore;
use burrow_core::{AppError, Result};
use chrono::Utc;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::Row;

use crate::{from_millis, sql_limit, store_err, to_millis};

const THREAD_COLUMNS: &str = "id, slug, title, message, author, forum, votes, created";

pub struct SqliteThreads {
    pool: SqlitePool,
}

impl SqliteThreads {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn map_thread(row: &SqliteRow) -> sqlx::Result<Thread> {
    Ok(Thread {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        author: row.try_get("author")?,
        forum: row.try_get("forum")?,
        votes: row.try_get("votes")?,
        created: from_millis(row.try_get("created")?),
    })
}

/// Resolves a thread reference against any executor (pool or open
/// transaction). Shared with the post repository, which must resolve the
/// target thread inside its own transaction.
pub(crate) async fn fetch_thread<'e, E>(ex: E, thread: &ThreadRef) -> sqlx::Result<Option<Thread>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = match thread {
        ThreadRef::Id(id) => {
            sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"))
                .bind(id)
                .fetch_optional(ex)
                .await?
        }
        ThreadRef::Slug(slug) => {
            sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE slug = ?1"))
                .bind(slug)
                .fetch_optional(ex)
                .await?
        }
    };
    row.as_ref().map(map_thread).transpose()
}

/// Empty or absent update fields keep the stored value.
fn coalesce(update: &Option<String>, current: &str) -> String {
    match update {
        Some(s) if !s.is_empty() => s.clone(),
        _ => current.to_owned(),
    }
}

#[async_trait]
impl ThreadStore for SqliteThreads {
    async fn create_thread(&self, forum_slug: &str, thread: NewThread) -> Result<Thread> {
        thread.validate()?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Canonical casing comes from the stored rows, not the request.
        let forum: Option<String> = sqlx::query_scalar("SELECT slug FROM forums WHERE slug = ?1")
            .bind(forum_slug)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        let forum = forum.ok_or_else(|| AppError::ForumNotFound(forum_slug.to_owned()))?;

        let author: Option<String> =
            sqlx::query_scalar("SELECT nickname FROM users WHERE nickname = ?1")
                .bind(&thread.author)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
        let author = author.ok_or_else(|| AppError::AuthorNotFound(thread.author.clone()))?;

        if let Some(slug) = &thread.slug {
            let existing = fetch_thread(&mut *tx, &ThreadRef::Slug(slug.clone()))
                .await
                .map_err(store_err)?;
            if let Some(existing) = existing {
                return Err(AppError::ThreadConflict(Box::new(existing)));
            }
        }

        let created = thread.created.unwrap_or_else(Utc::now);
        let created_ms = to_millis(&created);

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO threads (slug, title, message, author, forum, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
        )
        .bind(&thread.slug)
        .bind(&thread.title)
        .bind(&thread.message)
        .bind(&author)
        .bind(&forum)
        .bind(created_ms)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE forums SET threads = threads + 1 WHERE slug = ?1")
            .bind(&forum)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query("INSERT INTO forum_users (forum, nickname) VALUES (?1, ?2) ON CONFLICT DO NOTHING")
            .bind(&forum)
            .bind(&author)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        Ok(Thread {
            id,
            slug: thread.slug,
            title: thread.title,
            message: thread.message,
            author,
            forum,
            votes: 0,
            created: from_millis(created_ms),
        })
    }

    async fn get_thread(&self, thread: &ThreadRef) -> Result<Thread> {
        fetch_thread(&self.pool, thread)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AppError::ThreadNotFound(thread.to_string()))
    }

    async fn update_thread(&self, thread: &ThreadRef, update: &ThreadUpdate) -> Result<Thread> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let current = fetch_thread(&mut *tx, thread)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AppError::ThreadNotFound(thread.to_string()))?;

        let title = coalesce(&update.title, &current.title);
        let message = coalesce(&update.message, &current.message);

        sqlx::query("UPDATE threads SET title = ?1, message = ?2 WHERE id = ?3")
            .bind(&title)
            .bind(&message)
            .bind(current.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        Ok(Thread { title, message, ..current })
    }

    async fn list_threads(
        &self,
        forum_slug: &str,
        limit: Option<i64>,
        since: Option<chrono::DateTime<Utc>>,
        desc: bool,
    ) -> Result<Vec<Thread>> {
        let forum: Option<String> = sqlx::query_scalar("SELECT slug FROM forums WHERE slug = ?1")
            .bind(forum_slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        let forum = forum.ok_or_else(|| AppError::ForumNotFound(forum_slug.to_owned()))?;

        let dir = if desc { "DESC" } else { "ASC" };
        let rows = match since {
            Some(since) => {
                // The since bound is inclusive and flips with direction.
                let cmp = if desc { "<=" } else { ">=" };
                sqlx::query(&format!(
                    "SELECT {THREAD_COLUMNS} FROM threads
                     WHERE forum = ?1 AND created {cmp} ?2
                     ORDER BY created {dir} LIMIT ?3"
                ))
                .bind(&forum)
                .bind(to_millis(&since))
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {THREAD_COLUMNS} FROM threads
                     WHERE forum = ?1 ORDER BY created {dir} LIMIT ?2"
                ))
                .bind(&forum)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(store_err)?;

        rows.iter().map(map_thread).collect::<sqlx::Result<_>>().map_err(store_err)
    }

    async fn vote(&self, thread: &ThreadRef, vote: &Vote) -> Result<Thread> {
        vote.validate()?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let mut found = fetch_thread(&mut *tx, thread)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AppError::ThreadNotFound(thread.to_string()))?;

        let voter: Option<String> =
            sqlx::query_scalar("SELECT nickname FROM users WHERE nickname = ?1")
                .bind(&vote.nickname)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
        let voter = voter.ok_or_else(|| AppError::VoterNotFound(vote.nickname.clone()))?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT value FROM votes WHERE nickname = ?1 AND thread = ?2")
                .bind(&voter)
                .bind(found.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;

        let delta = match existing {
            // Re-casting the same value is an explicit no-op.
            Some(old) if old == vote.value => 0,
            Some(old) => {
                sqlx::query("UPDATE votes SET value = ?1 WHERE nickname = ?2 AND thread = ?3")
                    .bind(vote.value)
                    .bind(&voter)
                    .bind(found.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                vote.value - old
            }
            None => {
                let inserted =
                    sqlx::query("INSERT INTO votes (nickname, thread, value) VALUES (?1, ?2, ?3)")
                        .bind(&voter)
                        .bind(found.id)
                        .bind(vote.value)
                        .execute(&mut *tx)
                        .await;
                match inserted {
                    Ok(_) => vote.value,
                    // Lost the (voter, thread) unique-index race to a
                    // concurrent vote; fall back to overwriting it.
                    Err(sqlx::Error::Database(db))
                        if matches!(db.kind(), ErrorKind::UniqueViolation) =>
                    {
                        let old: i64 = sqlx::query_scalar(
                            "SELECT value FROM votes WHERE nickname = ?1 AND thread = ?2",
                        )
                        .bind(&voter)
                        .bind(found.id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(store_err)?;
                        if old == vote.value {
                            0
                        } else {
                            sqlx::query(
                                "UPDATE votes SET value = ?1 WHERE nickname = ?2 AND thread = ?3",
                            )
                            .bind(vote.value)
                            .bind(&voter)
                            .bind(found.id)
                            .execute(&mut *tx)
                            .await
                            .map_err(store_err)?;
                            vote.value - old
                        }
                    }
                    Err(e) => return Err(store_err(e)),
                }
            }
        };

        if delta != 0 {
            sqlx::query("UPDATE threads SET votes = votes + ?1 WHERE id = ?2")
                .bind(delta)
                .bind(found.id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        found.votes = sqlx::query_scalar("SELECT votes FROM threads WHERE id = ?1")
            .bind(found.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mem_pool, seed_thread, user};
    use crate::SqliteUsers;
    use burrow_core::models::User;
    use burrow_core::traits::UserStore;
    use chrono::{Duration, Utc};

    fn by_id(id: i64) -> ThreadRef {
        ThreadRef::Id(id)
    }

    #[tokio::test]
    async fn create_and_get_by_id_and_slug() {
        let pool = mem_pool().await;
        let created = seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let by_id = threads.get_thread(&ThreadRef::Id(created.id)).await.unwrap();
        let by_slug = threads.get_thread(&ThreadRef::Slug("intro".into())).await.unwrap();
        assert_eq!(by_id, by_slug);
        assert_eq!(by_id.votes, 0);
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_conflict_carrying_the_existing_thread() {
        let pool = mem_pool().await;
        let first = seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let err = threads
            .create_thread(
                "general",
                NewThread {
                    slug: Some("intro".into()),
                    title: "again".into(),
                    message: "again".into(),
                    author: "ada".into(),
                    created: None,
                },
            )
            .await
            .unwrap_err();
        match err {
            AppError::ThreadConflict(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected ThreadConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_forum_and_author_are_distinct_errors() {
        let pool = mem_pool().await;
        seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let input = NewThread {
            slug: None,
            title: "t".into(),
            message: "m".into(),
            author: "ada".into(),
            created: None,
        };

        let err = threads.create_thread("nope", input.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::ForumNotFound(_)));

        let err = threads
            .create_thread("general", NewThread { author: "ghost".into(), ..input })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthorNotFound(_)));
    }

    #[tokio::test]
    async fn update_keeps_empty_fields() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let updated = threads
            .update_thread(
                &by_id(thread.id),
                &ThreadUpdate { title: Some("renamed".into()), message: None },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.message, thread.message);

        let updated = threads
            .update_thread(
                &by_id(thread.id),
                &ThreadUpdate { title: Some(String::new()), message: Some("edited".into()) },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.message, "edited");
    }

    #[tokio::test]
    async fn list_threads_orders_by_created_with_inclusive_since() {
        let pool = mem_pool().await;
        seed_thread(&pool, "first").await;
        let threads = SqliteThreads::new(pool.clone());

        let base = Utc::now();
        for (i, slug) in ["second", "third"].iter().enumerate() {
            threads
                .create_thread(
                    "general",
                    NewThread {
                        slug: Some((*slug).into()),
                        title: (*slug).into(),
                        message: "m".into(),
                        author: "ada".into(),
                        created: Some(base + Duration::seconds(i as i64 + 60)),
                    },
                )
                .await
                .unwrap();
        }

        let all = threads.list_threads("general", None, None, false).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created <= w[1].created));

        let since = threads
            .list_threads("general", None, Some(base + Duration::seconds(60)), false)
            .await
            .unwrap();
        assert_eq!(
            since.iter().map(|t| t.slug.clone().unwrap()).collect::<Vec<_>>(),
            ["second", "third"]
        );

        let newest = threads.list_threads("general", Some(1), None, true).await.unwrap();
        assert_eq!(newest[0].slug.as_deref(), Some("third"));

        let err = threads.list_threads("nope", None, None, false).await.unwrap_err();
        assert!(matches!(err, AppError::ForumNotFound(_)));
    }

    #[tokio::test]
    async fn vote_insert_flip_and_idempotence() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let up = Vote { nickname: "ada".into(), value: 1 };
        let down = Vote { nickname: "ada".into(), value: -1 };

        assert_eq!(threads.vote(&by_id(thread.id), &up).await.unwrap().votes, 1);
        // Same vote again: tally untouched.
        assert_eq!(threads.vote(&by_id(thread.id), &up).await.unwrap().votes, 1);
        // Flip removes the old effect and applies the new one in one step.
        assert_eq!(threads.vote(&by_id(thread.id), &down).await.unwrap().votes, -1);
        // Round trip back to +1 leaves no residue.
        assert_eq!(threads.vote(&by_id(thread.id), &up).await.unwrap().votes, 1);
    }

    #[tokio::test]
    async fn vote_tally_sums_across_voters() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "intro").await;
        let users = SqliteUsers::new(pool.clone());
        let threads = SqliteThreads::new(pool);

        users.create_user(user("bob")).await.unwrap();
        users.create_user(user("eve")).await.unwrap();

        threads.vote(&by_id(thread.id), &Vote { nickname: "ada".into(), value: 1 }).await.unwrap();
        threads.vote(&by_id(thread.id), &Vote { nickname: "bob".into(), value: 1 }).await.unwrap();
        let t = threads
            .vote(&by_id(thread.id), &Vote { nickname: "eve".into(), value: -1 })
            .await
            .unwrap();
        assert_eq!(t.votes, 1);
    }

    #[tokio::test]
    async fn vote_error_paths() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "intro").await;
        let threads = SqliteThreads::new(pool);

        let err = threads
            .vote(&by_id(thread.id + 100), &Vote { nickname: "ada".into(), value: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ThreadNotFound(_)));

        let err = threads
            .vote(&by_id(thread.id), &Vote { nickname: "ghost".into(), value: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VoterNotFound(_)));

        let err = threads
            .vote(&by_id(thread.id), &Vote { nickname: "ada".into(), value: 3 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn canonical_nickname_case_is_used_for_votes() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "intro").await;
        let users = SqliteUsers::new(pool.clone());
        let threads = SqliteThreads::new(pool);

        users
            .create_user(User {
                nickname: "MixedCase".into(),
                fullname: "Mixed".into(),
                about: String::new(),
                email: "mixed@example.org".into(),
            })
            .await
            .unwrap();

        let t = threads
            .vote(&by_id(thread.id), &Vote { nickname: "mixedcase".into(), value: 1 })
            .await
            .unwrap();
        assert_eq!(t.votes, 1);
        // Re-vote through another casing must still be the same voter.
        let t = threads
            .vote(&by_id(thread.id), &Vote { nickname: "MIXEDCASE".into(), value: 1 })
            .await
            .unwrap();
        assert_eq!(t.votes, 1);
    }
}
