//! # Domain Models
//!
//! The persisted entities of the Burrow forum service plus the input and
//! paging types the ports accept. Identities are store-assigned `i64`s
//! from a single strictly increasing sequence, so they double as a stable
//! ordering key everywhere a tie needs breaking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A registered user, unique by nickname and by email (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub nickname: String,
    pub fullname: String,
    #[serde(default)]
    pub about: String,
    pub email: String,
}

/// A forum: a named container for threads, owned by a user.
/// `posts` and `threads` are denormalized counters maintained by the
/// write paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub slug: String,
    pub title: String,
    #[serde(rename = "user")]
    pub owner: String,
    #[serde(default)]
    pub posts: i64,
    #[serde(default)]
    pub threads: i64,
}

/// A discussion thread. `votes` always equals the sum of the per-user
/// vote values recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub title: String,
    pub message: String,
    pub author: String,
    pub forum: String,
    #[serde(default)]
    pub votes: i64,
    pub created: DateTime<Utc>,
}

/// The fundamental unit of conversation.
///
/// `path` is the materialized tree position: the ordered ancestor
/// identities from the thread root down to this post, self included.
/// Roots have `path == [id]`; a child's path is its parent's path with
/// its own id appended. It is assigned once at creation and never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub message: String,
    #[serde(rename = "isEdited", default)]
    pub is_edited: bool,
    pub author: String,
    pub forum: String,
    pub thread: i64,
    #[serde(default)]
    pub parent: i64,
    pub created: DateTime<Utc>,
    #[serde(skip)]
    pub path: Vec<i64>,
}

/// A single user's vote on a thread, unique per (voter, thread).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub nickname: String,
    #[serde(rename = "voice")]
    pub value: i64,
}

impl Vote {
    pub fn validate(&self) -> Result<()> {
        if self.value != 1 && self.value != -1 {
            return Err(AppError::Validation(format!(
                "vote value must be +1 or -1, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

/// A post and its optionally expanded relatives, for detail views.
#[derive(Debug, Clone, Serialize)]
pub struct PostFull {
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum: Option<Forum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
}

/// Which relatives [`PostFull`] should expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Related {
    Author,
    Forum,
    Thread,
}

impl Related {
    /// Parses one element of a `related=user,forum,thread` query value.
    /// Unknown names are ignored by callers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" | "author" => Some(Related::Author),
            "forum" => Some(Related::Forum),
            "thread" => Some(Related::Thread),
            _ => None,
        }
    }
}

/// Input for one post in a creation batch. `parent == 0` means a new
/// top-level branch; `created` absent means "the batch instant".
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub author: String,
    pub message: String,
    #[serde(default)]
    pub parent: i64,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// Input for thread creation under a forum.
#[derive(Debug, Clone, Deserialize)]
pub struct NewThread {
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    pub message: String,
    pub author: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl NewThread {
    /// Slugs share a namespace with numeric thread ids, so a slug must
    /// never itself parse as a bare integer.
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() || self.message.is_empty() {
            return Err(AppError::Validation("title and message must be non-empty".into()));
        }
        if let Some(slug) = &self.slug {
            let well_formed = !slug.is_empty()
                && slug.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
                && slug.parse::<i64>().is_err();
            if !well_formed {
                return Err(AppError::Validation(format!("invalid thread slug {slug:?}")));
            }
        }
        Ok(())
    }
}

/// Message-only update for a post; `None` leaves the post untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    #[serde(default)]
    pub message: Option<String>,
}

/// Partial thread update; empty/absent fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Partial user-profile update; empty/absent fields keep stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
}

/// Row counts reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    pub user: i64,
    pub forum: i64,
    pub thread: i64,
    pub post: i64,
}

/// A thread reference as it arrives from the outside: a numeric id or a
/// slug. Resolved against storage exactly once at the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadRef {
    Id(i64),
    Slug(String),
}

impl ThreadRef {
    /// Numeric input resolves by id, anything else by slug. Thread slugs
    /// are validated to never be bare integers, so this is unambiguous.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => ThreadRef::Id(id),
            Err(_) => ThreadRef::Slug(raw.to_owned()),
        }
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadRef::Id(id) => write!(f, "{id}"),
            ThreadRef::Slug(slug) => f.write_str(slug),
        }
    }
}

/// The three traversal orders over a thread's post tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// (created, id) order; the only mode where wall-clock time governs.
    #[default]
    Flat,
    /// Depth-first pre-order over the whole tree (path order).
    Tree,
    /// Paginate top-level branches; each selected branch is emitted whole.
    ParentTree,
}

impl SortMode {
    /// Unrecognized sort names fall back to flat.
    pub fn parse(s: &str) -> Self {
        match s {
            "tree" => SortMode::Tree,
            "parent_tree" => SortMode::ParentTree,
            _ => SortMode::Flat,
        }
    }
}

/// Paging directive for post listing.
///
/// `since` is an exclusive post-id cursor (`None`/0 = from the start);
/// `limit` of `None` or a negative value means unbounded.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub sort: SortMode,
    pub since: Option<i64>,
    pub limit: Option<i64>,
    pub desc: bool,
}
