//! # burrow-db-sqlite
//!
//! SQLite (sqlx) implementation of the burrow-core storage ports.
//!
//! Two representation choices drive the whole module and must survive any
//! schema migration:
//!
//! * `posts.id` is `INTEGER PRIMARY KEY AUTOINCREMENT` — a single strictly
//!   increasing, never-reused sequence shared by every post, which makes
//!   the id a valid ordering and tie-break key.
//! * `posts.path` is the materialized ancestor chain (root..=self), each id
//!   rendered as a fixed-width segment (see [`path`]) so that plain string
//!   comparison of paths equals element-wise numeric comparison.
//!
//! Timestamps are stored as INTEGER epoch milliseconds; `DateTime<Utc>`
//! only exists at the model boundary.

use std::str::FromStr;
use std::time::Duration;

use burrow_core::{AppError, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

mod forums;
pub mod path;
mod posts;
mod service;
mod threads;
mod users;

pub use forums::SqliteForums;
pub use posts::SqlitePosts;
pub use service::SqliteService;
pub use threads::SqliteThreads;
pub use users::SqliteUsers;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    nickname TEXT NOT NULL COLLATE NOCASE UNIQUE,
    fullname TEXT NOT NULL,
    about    TEXT NOT NULL DEFAULT '',
    email    TEXT NOT NULL COLLATE NOCASE UNIQUE
);

CREATE TABLE IF NOT EXISTS forums (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    slug    TEXT NOT NULL COLLATE NOCASE UNIQUE,
    title   TEXT NOT NULL,
    owner   TEXT NOT NULL REFERENCES users(nickname),
    posts   INTEGER NOT NULL DEFAULT 0,
    threads INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS threads (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    slug    TEXT COLLATE NOCASE UNIQUE,
    title   TEXT NOT NULL,
    message TEXT NOT NULL,
    author  TEXT NOT NULL REFERENCES users(nickname),
    forum   TEXT NOT NULL REFERENCES forums(slug),
    votes   INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS threads_forum_created ON threads(forum, created);

CREATE TABLE IF NOT EXISTS posts (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    author    TEXT NOT NULL,
    forum     TEXT NOT NULL,
    thread    INTEGER NOT NULL REFERENCES threads(id),
    parent    INTEGER NOT NULL DEFAULT 0,
    message   TEXT NOT NULL,
    is_edited INTEGER NOT NULL DEFAULT 0,
    created   INTEGER NOT NULL,
    path      TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS posts_thread_path ON posts(thread, path);
CREATE INDEX IF NOT EXISTS posts_thread_created_id ON posts(thread, created, id);

CREATE TABLE IF NOT EXISTS votes (
    nickname TEXT NOT NULL COLLATE NOCASE,
    thread   INTEGER NOT NULL REFERENCES threads(id),
    value    INTEGER NOT NULL,
    PRIMARY KEY (nickname, thread)
);

CREATE TABLE IF NOT EXISTS forum_users (
    forum    TEXT NOT NULL COLLATE NOCASE,
    nickname TEXT NOT NULL COLLATE NOCASE,
    PRIMARY KEY (forum, nickname)
);
"#;

/// Opens the pool and bootstraps the schema.
///
/// Every request path acquires a connection from this pool and releases
/// it on exit; acquisition is bounded so exhaustion surfaces as an error
/// rather than a hang.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .map_err(AppError::store)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(opts)
        .await
        .map_err(AppError::store)?;

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .map_err(AppError::store)?;

    log::debug!("schema ready, pool capped at {max_connections} connections");
    Ok(pool)
}

pub(crate) fn store_err(err: sqlx::Error) -> AppError {
    AppError::store(err)
}

/// The store's native timestamp precision is one millisecond; everything
/// finer is truncated on the way in.
pub(crate) fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

/// SQLite reads a negative LIMIT as "no limit", which is exactly the
/// port contract for absent/negative limits.
pub(crate) fn sql_limit(limit: Option<i64>) -> i64 {
    limit.filter(|l| *l >= 0).unwrap_or(-1)
}

#[cfg(test)]
pub(crate) mod testutil {
    use burrow_core::models::{Forum, NewThread, Thread, User};
    use burrow_core::traits::{ForumStore, ThreadStore, UserStore};
    use sqlx::sqlite::SqlitePool;

    use super::{SqliteForums, SqliteThreads, SqliteUsers};

    /// One-connection pool so the in-memory database is actually shared.
    pub async fn mem_pool() -> SqlitePool {
        super::connect("sqlite::memory:", 1).await.expect("in-memory pool")
    }

    pub fn user(nickname: &str) -> User {
        User {
            nickname: nickname.into(),
            fullname: format!("{nickname} tester"),
            about: String::new(),
            email: format!("{nickname}@example.org"),
        }
    }

    /// Registers a user, a forum owned by them, and one thread in it.
    pub async fn seed_thread(pool: &SqlitePool, slug: &str) -> Thread {
        let users = SqliteUsers::new(pool.clone());
        let forums = SqliteForums::new(pool.clone());
        let threads = SqliteThreads::new(pool.clone());

        // Idempotent across multiple seed calls in one test.
        let _ = users.create_user(user("ada")).await;
        let _ = forums
            .create_forum(Forum {
                slug: "general".into(),
                title: "General".into(),
                owner: "ada".into(),
                posts: 0,
                threads: 0,
            })
            .await;

        threads
            .create_thread(
                "general",
                NewThread {
                    slug: Some(slug.into()),
                    title: format!("thread {slug}"),
                    message: "opening".into(),
                    author: "ada".into(),
                    created: None,
                },
            )
            .await
            .expect("seed thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_truncates() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let back = from_millis(to_millis(&dt));
        assert_eq!(back.timestamp_millis(), dt.timestamp_millis());
        assert_eq!(back.timestamp_subsec_micros() % 1000, 0);
    }

    #[test]
    fn negative_or_absent_limit_is_unbounded() {
        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(-5)), -1);
        assert_eq!(sql_limit(Some(0)), 0);
        assert_eq!(sql_limit(Some(25)), 25);
    }

    #[tokio::test]
    async fn connect_bootstraps_schema() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM posts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}
