//! Whole-service maintenance: row counts for the status endpoint and the
//! destructive clear used between test rounds.

use async_trait::async_trait;
use burrow_core::models::Status;
use burrow_core::traits::StatusStore;
use burrow_core::Result;
use sqlx::sqlite::{Sqlite, SqlitePool};

use crate::store_err;

pub struct SqliteService {
    pool: SqlitePool,
}

impl SqliteService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn count<'e, E>(ex: E, table: &str) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(ex)
        .await
        .map_err(store_err)
}

#[async_trait]
impl StatusStore for SqliteService {
    async fn status(&self) -> Result<Status> {
        // One transaction so the four counts are a consistent snapshot.
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let status = Status {
            user: count(&mut *tx, "users").await?,
            forum: count(&mut *tx, "forums").await?,
            thread: count(&mut *tx, "threads").await?,
            post: count(&mut *tx, "posts").await?,
        };

        tx.commit().await.map_err(store_err)?;
        Ok(status)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        for table in ["votes", "forum_users", "posts", "threads", "forums", "users"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }

        // Restart the id sequences. sqlite_sequence only exists once an
        // AUTOINCREMENT insert has happened, so a missing table is fine.
        if let Err(err) = sqlx::query("DELETE FROM sqlite_sequence").execute(&mut *tx).await {
            log::debug!("sqlite_sequence not present yet: {err}");
        }

        tx.commit().await.map_err(store_err)?;
        log::info!("store cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mem_pool, seed_thread};
    use crate::SqlitePosts;
    use burrow_core::models::{NewPost, ThreadRef};
    use burrow_core::traits::PostStore;

    #[tokio::test]
    async fn status_counts_every_table() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "counted").await;
        let posts = SqlitePosts::new(pool.clone());
        let service = SqliteService::new(pool);

        posts
            .create_posts(
                &ThreadRef::Id(thread.id),
                vec![NewPost { author: "ada".into(), message: "hi".into(), parent: 0, created: None }],
            )
            .await
            .unwrap();

        let status = service.status().await.unwrap();
        assert_eq!(status, Status { user: 1, forum: 1, thread: 1, post: 1 });
    }

    #[tokio::test]
    async fn clear_wipes_rows_and_restarts_the_post_sequence() {
        let pool = mem_pool().await;
        let thread = seed_thread(&pool, "doomed").await;
        let posts = SqlitePosts::new(pool.clone());
        let service = SqliteService::new(pool.clone());

        let first = posts
            .create_posts(
                &ThreadRef::Id(thread.id),
                vec![NewPost { author: "ada".into(), message: "hi".into(), parent: 0, created: None }],
            )
            .await
            .unwrap();
        assert!(first[0].id >= 1);

        service.clear().await.unwrap();
        assert_eq!(service.status().await.unwrap(), Status::default());

        // Fresh data starts back at id 1.
        let thread = seed_thread(&pool, "reborn").await;
        let again = posts
            .create_posts(
                &ThreadRef::Id(thread.id),
                vec![NewPost { author: "ada".into(), message: "hi".into(), parent: 0, created: None }],
            )
            .await
            .unwrap();
        assert_eq!(again[0].id, 1);
        assert_eq!(again[0].path, vec![1]);
    }
}
