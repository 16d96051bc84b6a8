//! # Storage Ports
//!
//! Any storage backend must implement these traits to be used by the
//! delivery layer. All methods return typed [`crate::AppError`]s; backends
//! never leak their own error types.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Forum, NewPost, NewThread, Post, PostFull, PostPage, PostUpdate, Related, Status, Thread,
    ThreadRef, ThreadUpdate, User, UserUpdate, Vote,
};

/// Hierarchical post store: batch creation with path assignment and the
/// three traversal orders.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Inserts a batch of posts into one thread atomically. Fails whole,
    /// or succeeds whole with server-assigned ids and paths populated.
    async fn create_posts(&self, thread: &ThreadRef, posts: Vec<NewPost>) -> Result<Vec<Post>>;

    /// One page of the thread's posts in the order `page` describes.
    /// An existing thread with no posts yields an empty page.
    async fn list_posts(&self, thread: &ThreadRef, page: &PostPage) -> Result<Vec<Post>>;

    async fn get_post(&self, id: i64, related: &[Related]) -> Result<PostFull>;

    /// Updates the message; sets the edited flag only when the text
    /// actually changes. An absent message is a no-op returning current
    /// state.
    async fn update_post(&self, id: i64, update: &PostUpdate) -> Result<Post>;
}

/// Threads and the per-thread vote tally.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create_thread(&self, forum_slug: &str, thread: NewThread) -> Result<Thread>;

    async fn get_thread(&self, thread: &ThreadRef) -> Result<Thread>;

    async fn update_thread(&self, thread: &ThreadRef, update: &ThreadUpdate) -> Result<Thread>;

    /// Threads of a forum ordered by creation time; `since` is inclusive.
    async fn list_threads(
        &self,
        forum_slug: &str,
        limit: Option<i64>,
        since: Option<chrono::DateTime<chrono::Utc>>,
        desc: bool,
    ) -> Result<Vec<Thread>>;

    /// Applies one user's vote and returns the thread with the updated
    /// tally. Re-voting overwrites, never duplicates.
    async fn vote(&self, thread: &ThreadRef, vote: &Vote) -> Result<Thread>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: User) -> Result<User>;

    async fn get_user(&self, nickname: &str) -> Result<User>;

    async fn update_user(&self, nickname: &str, update: &UserUpdate) -> Result<User>;
}

#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn create_forum(&self, forum: Forum) -> Result<Forum>;

    async fn get_forum(&self, slug: &str) -> Result<Forum>;

    /// Members of a forum (everyone who posted or opened a thread there),
    /// ordered by nickname with an exclusive `since` cursor.
    async fn forum_users(
        &self,
        slug: &str,
        limit: Option<i64>,
        since: Option<&str>,
        desc: bool,
    ) -> Result<Vec<User>>;
}

/// Whole-service maintenance operations.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn status(&self) -> Result<Status>;

    /// Wipes every table and resets the post sequence.
    async fn clear(&self) -> Result<()>;
}
