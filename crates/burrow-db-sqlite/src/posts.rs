//! Post repository: atomic batch creation with path assignment, the three
//! traversal orders with cursor pagination, and single-post detail/update.

use std::collections::BTreeSet;

use async_trait::async_trait;
use burrow_core::models::{NewPost, Post, PostFull, PostPage, PostUpdate, Related, SortMode, ThreadRef};
use burrow_core::traits::PostStore;
use burrow_core::{AppError, Result};
use chrono::Utc;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};

use crate::threads::fetch_thread;
use crate::{forums, from_millis, path, sql_limit, store_err, to_millis, users};

const POST_COLUMNS: &str = "id, author, forum, thread, parent, message, is_edited, created, path";

pub struct SqlitePosts {
    pool: SqlitePool,
}

impl SqlitePosts {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_post(row: &SqliteRow) -> sqlx::Result<Post> {
    let encoded: String = row.try_get("path")?;
    Ok(Post {
        id: row.try_get("id")?,
        author: row.try_get("author")?,
        forum: row.try_get("forum")?,
        thread: row.try_get("thread")?,
        parent: row.try_get("parent")?,
        message: row.try_get("message")?,
        is_edited: row.try_get("is_edited")?,
        created: from_millis(row.try_get("created")?),
        path: path::decode(&encoded),
    })
}

/// Runs the page query for one resolved thread. Query shape depends on
/// (mode, cursor presence, direction); everything else is bound.
async fn fetch_page(
    tx: &mut Transaction<'_, Sqlite>,
    thread_id: i64,
    page: &PostPage,
) -> sqlx::Result<Vec<SqliteRow>> {
    let dir = if page.desc { "DESC" } else { "ASC" };
    let cmp = if page.desc { "<" } else { ">" };
    let limit = sql_limit(page.limit);
    let since = page.since.filter(|id| *id != 0);
    let w = path::SEGMENT_WIDTH;

    match (page.sort, since) {
        (SortMode::Flat, None) => {
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1
                 ORDER BY created {dir}, id {dir} LIMIT ?2"
            ))
            .bind(thread_id)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
        (SortMode::Flat, Some(cursor)) => {
            // Strictly after/before the cursor post in (created, id) order;
            // the cursor itself is excluded.
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1
                   AND (created, id) {cmp} (SELECT created, id FROM posts WHERE id = ?2)
                 ORDER BY created {dir}, id {dir} LIMIT ?3"
            ))
            .bind(thread_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
        (SortMode::Tree, None) => {
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1
                 ORDER BY path {dir} LIMIT ?2"
            ))
            .bind(thread_id)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
        (SortMode::Tree, Some(cursor)) => {
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1
                   AND path {cmp} (SELECT path FROM posts WHERE id = ?2)
                 ORDER BY path {dir} LIMIT ?3"
            ))
            .bind(thread_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
        // ParentTree paginates whole top-level branches: the cursor and
        // limit pick root posts, then every post under a picked root is
        // returned. Branches follow the requested direction; inside a
        // branch the walk is always the natural ascending pre-order.
        (SortMode::ParentTree, None) => {
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1 AND substr(path, 1, {w}) IN (
                     SELECT substr(path, 1, {w}) FROM posts
                     WHERE thread = ?1 AND parent = 0
                     ORDER BY id {dir} LIMIT ?2)
                 ORDER BY substr(path, 1, {w}) {dir}, path ASC"
            ))
            .bind(thread_id)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
        (SortMode::ParentTree, Some(cursor)) => {
            // The cursor is a post; its root branch is the branch cursor.
            sqlx::query(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE thread = ?1 AND substr(path, 1, {w}) IN (
                     SELECT substr(path, 1, {w}) FROM posts
                     WHERE thread = ?1 AND parent = 0
                       AND substr(path, 1, {w}) {cmp}
                           (SELECT substr(path, 1, {w}) FROM posts WHERE id = ?2)
                     ORDER BY id {dir} LIMIT ?3)
                 ORDER BY substr(path, 1, {w}) {dir}, path ASC"
            ))
            .bind(thread_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&mut **tx)
            .await
        }
    }
}

#[async_trait]
impl PostStore for SqlitePosts {
    async fn create_posts(&self, thread: &ThreadRef, posts: Vec<NewPost>) -> Result<Vec<Post>> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let target = fetch_thread(&mut *tx, thread)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AppError::ThreadNotFound(thread.to_string()))?;

        if posts.is_empty() {
            return Ok(Vec::new());
        }
        if posts.iter().any(|p| p.message.is_empty()) {
            return Err(AppError::Validation("post message must be non-empty".into()));
        }

        // One instant per batch unless the caller set per-post timestamps,
        // so submission order stays the tie-break within the batch.
        let batch_ms = to_millis(&Utc::now());

        let mut inserted = Vec::with_capacity(posts.len());
        let mut authors = BTreeSet::new();

        for input in posts {
            let author: Option<String> =
                sqlx::query_scalar("SELECT nickname FROM users WHERE nickname = ?1")
                    .bind(&input.author)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_err)?;
            let author = author.ok_or_else(|| AppError::AuthorNotFound(input.author.clone()))?;

            // Parents inserted earlier in this batch are already visible
            // inside the transaction, so intra-batch replies chain fine.
            let parent_path = if input.parent == 0 {
                String::new()
            } else {
                let row = sqlx::query("SELECT thread, path FROM posts WHERE id = ?1")
                    .bind(input.parent)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_err)?;
                let row = row.ok_or(AppError::ParentNotFound(input.parent))?;
                let parent_thread: i64 = row.try_get("thread").map_err(store_err)?;
                if parent_thread != target.id {
                    return Err(AppError::ParentThreadMismatch {
                        parent: input.parent,
                        thread: target.id,
                    });
                }
                row.try_get("path").map_err(store_err)?
            };

            let created_ms = input.created.map(|c| to_millis(&c)).unwrap_or(batch_ms);

            let id: i64 = sqlx::query_scalar(
                "INSERT INTO posts (author, forum, thread, parent, message, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING id",
            )
            .bind(&author)
            .bind(&target.forum)
            .bind(target.id)
            .bind(input.parent)
            .bind(&input.message)
            .bind(created_ms)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;

            let encoded = path::child(&parent_path, id);
            sqlx::query("UPDATE posts SET path = ?1 WHERE id = ?2")
                .bind(&encoded)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;

            authors.insert(author.clone());
            inserted.push(Post {
                id,
                message: input.message,
                is_edited: false,
                author,
                forum: target.forum.clone(),
                thread: target.id,
                parent: input.parent,
                created: from_millis(created_ms),
                path: path::decode(&encoded),
            });
        }

        // Counters and memberships land in the same commit as the rows.
        sqlx::query("UPDATE forums SET posts = posts + ?1 WHERE slug = ?2")
            .bind(inserted.len() as i64)
            .bind(&target.forum)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        for author in &authors {
            sqlx::query(
                "INSERT INTO forum_users (forum, nickname) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            )
            .bind(&target.forum)
            .bind(author)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        log::debug!("thread {}: inserted batch of {}", target.id, inserted.len());
        Ok(inserted)
    }

    async fn list_posts(&self, thread: &ThreadRef, page: &PostPage) -> Result<Vec<Post>> {
        // Resolution and page read share one transaction so the page never
        // observes a half-committed batch.
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let target = fetch_thread(&mut *tx, thread)
            .await
            .map_err(store_err)?
            .ok_or_else(|| AppError::ThreadNotFound(thread.to_string()))?;

        let rows = fetch_page(&mut tx, target.id, page).await.map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;

        rows.iter().map(map_post).collect::<sqlx::Result<_>>().map_err(store_err)
    }

    async fn get_post(&self, id: i64, related: &[Related]) -> Result<PostFull> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        let post = row.as_ref().map(map_post).transpose().map_err(store_err)?;
        let post = post.ok_or(AppError::PostNotFound(id))?;

        let mut full = PostFull { post, author: None, forum: None, thread: None };
        for rel in related {
            match rel {
                Related::Author => {
                    full.author = Some(users::fetch_user(&self.pool, &full.post.author).await?);
                }
                Related::Forum => {
                    full.forum = Some(forums::fetch_forum(&self.pool, &full.post.forum).await?);
                }
                Related::Thread => {
                    let thread =
                        fetch_thread(&self.pool, &ThreadRef::Id(full.post.thread))
                            .await
                            .map_err(store_err)?;
                    full.thread = Some(
                        thread
                            .ok_or_else(|| AppError::ThreadNotFound(full.post.thread.to_string()))?,
                    );
                }
            }
        }
        Ok(full)
    }

    async fn update_post(&self, id: i64, update: &PostUpdate) -> Result<Post> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        let post = row.as_ref().map(map_post).transpose().map_err(store_err)?;
        let mut post = post.ok_or(AppError::PostNotFound(id))?;

        match &update.message {
            // Only a real text change flips the edited flag; structural
            // fields are immutable after creation.
            Some(message) if !message.is_empty() && *message != post.message => {
                sqlx::query("UPDATE posts SET message = ?1, is_edited = 1 WHERE id = ?2")
                    .bind(message)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                post.message = message.clone();
                post.is_edited = true;
            }
            _ => {}
        }

        tx.commit().await.map_err(store_err)?;
        Ok(post)
    }
}
