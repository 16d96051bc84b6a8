//! Request handlers: thin glue from HTTP to the storage ports.

use actix_web::{web, HttpResponse};
use burrow_core::models::{
    Forum, NewPost, NewThread, PostPage, PostUpdate, Related, SortMode, ThreadRef, ThreadUpdate,
    User, UserUpdate, Vote,
};
use burrow_core::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Typed errors onto status codes. Conflicts carry the clashing entity as
/// the response body, the way lookups carry a message.
fn error_response(err: AppError) -> HttpResponse {
    match err {
        AppError::Validation(_) => {
            HttpResponse::BadRequest().json(ErrorBody { message: err.to_string() })
        }
        AppError::ThreadNotFound(_)
        | AppError::ParentNotFound(_)
        | AppError::AuthorNotFound(_)
        | AppError::VoterNotFound(_)
        | AppError::UserNotFound(_)
        | AppError::ForumNotFound(_)
        | AppError::PostNotFound(_) => {
            HttpResponse::NotFound().json(ErrorBody { message: err.to_string() })
        }
        AppError::ParentThreadMismatch { .. } => {
            HttpResponse::Conflict().json(ErrorBody { message: err.to_string() })
        }
        AppError::UserConflict(users) => HttpResponse::Conflict().json(users),
        AppError::ThreadConflict(thread) => HttpResponse::Conflict().json(thread),
        AppError::ForumConflict(forum) => HttpResponse::Conflict().json(forum),
        AppError::Store(source) => {
            log::error!("store failure: {source:#}");
            HttpResponse::InternalServerError()
                .json(ErrorBody { message: "internal store error".into() })
        }
    }
}

// ── Posts ───────────────────────────────────────────────────────────────────

pub async fn create_posts(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Vec<NewPost>>,
) -> HttpResponse {
    let thread = ThreadRef::parse(&path.into_inner());
    match state.posts.create_posts(&thread, body.into_inner()).await {
        Ok(posts) => HttpResponse::Created().json(posts),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    limit: Option<i64>,
    since: Option<i64>,
    sort: Option<String>,
    desc: Option<bool>,
}

pub async fn list_posts(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListPostsQuery>,
) -> HttpResponse {
    let thread = ThreadRef::parse(&path.into_inner());
    let page = PostPage {
        sort: query.sort.as_deref().map(SortMode::parse).unwrap_or_default(),
        since: query.since,
        limit: query.limit,
        desc: query.desc.unwrap_or(false),
    };
    match state.posts.list_posts(&thread, &page).await {
        Ok(posts) => HttpResponse::Ok().json(posts),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PostDetailsQuery {
    related: Option<String>,
}

pub async fn get_post(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<PostDetailsQuery>,
) -> HttpResponse {
    let related: Vec<Related> = query
        .related
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(Related::parse)
        .collect();
    match state.posts.get_post(path.into_inner(), &related).await {
        Ok(full) => HttpResponse::Ok().json(full),
        Err(err) => error_response(err),
    }
}

pub async fn update_post(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<PostUpdate>,
) -> HttpResponse {
    match state.posts.update_post(path.into_inner(), &body).await {
        Ok(post) => HttpResponse::Ok().json(post),
        Err(err) => error_response(err),
    }
}

// ── Threads ─────────────────────────────────────────────────────────────────

pub async fn create_thread(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NewThread>,
) -> HttpResponse {
    match state.threads.create_thread(&path.into_inner(), body.into_inner()).await {
        Ok(thread) => HttpResponse::Created().json(thread),
        Err(err) => error_response(err),
    }
}

pub async fn get_thread(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let thread = ThreadRef::parse(&path.into_inner());
    match state.threads.get_thread(&thread).await {
        Ok(thread) => HttpResponse::Ok().json(thread),
        Err(err) => error_response(err),
    }
}

pub async fn update_thread(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ThreadUpdate>,
) -> HttpResponse {
    let thread = ThreadRef::parse(&path.into_inner());
    match state.threads.update_thread(&thread, &body).await {
        Ok(thread) => HttpResponse::Ok().json(thread),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    limit: Option<i64>,
    since: Option<DateTime<Utc>>,
    desc: Option<bool>,
}

pub async fn list_threads(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListThreadsQuery>,
) -> HttpResponse {
    match state
        .threads
        .list_threads(&path.into_inner(), query.limit, query.since, query.desc.unwrap_or(false))
        .await
    {
        Ok(threads) => HttpResponse::Ok().json(threads),
        Err(err) => error_response(err),
    }
}

pub async fn vote(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Vote>,
) -> HttpResponse {
    let thread = ThreadRef::parse(&path.into_inner());
    match state.threads.vote(&thread, &body).await {
        Ok(thread) => HttpResponse::Ok().json(thread),
        Err(err) => error_response(err),
    }
}

// ── Users ───────────────────────────────────────────────────────────────────

/// Create/update bodies carry everything but the nickname, which rides in
/// the path.
#[derive(Debug, Deserialize)]
pub struct UserBody {
    fullname: String,
    #[serde(default)]
    about: String,
    email: String,
}

pub async fn create_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UserBody>,
) -> HttpResponse {
    let body = body.into_inner();
    let user = User {
        nickname: path.into_inner(),
        fullname: body.fullname,
        about: body.about,
        email: body.email,
    };
    match state.users.create_user(user).await {
        Ok(user) => HttpResponse::Created().json(user),
        Err(err) => error_response(err),
    }
}

pub async fn get_user(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.users.get_user(&path.into_inner()).await {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(err) => error_response(err),
    }
}

pub async fn update_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UserUpdate>,
) -> HttpResponse {
    match state.users.update_user(&path.into_inner(), &body).await {
        Ok(user) => HttpResponse::Ok().json(user),
        Err(err) => error_response(err),
    }
}

// ── Forums ──────────────────────────────────────────────────────────────────

pub async fn create_forum(state: web::Data<AppState>, body: web::Json<Forum>) -> HttpResponse {
    match state.forums.create_forum(body.into_inner()).await {
        Ok(forum) => HttpResponse::Created().json(forum),
        Err(err) => error_response(err),
    }
}

pub async fn get_forum(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.forums.get_forum(&path.into_inner()).await {
        Ok(forum) => HttpResponse::Ok().json(forum),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ForumUsersQuery {
    limit: Option<i64>,
    since: Option<String>,
    desc: Option<bool>,
}

pub async fn forum_users(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ForumUsersQuery>,
) -> HttpResponse {
    match state
        .forums
        .forum_users(
            &path.into_inner(),
            query.limit,
            query.since.as_deref(),
            query.desc.unwrap_or(false),
        )
        .await
    {
        Ok(users) => HttpResponse::Ok().json(users),
        Err(err) => error_response(err),
    }
}

// ── Service ─────────────────────────────────────────────────────────────────

pub async fn status(state: web::Data<AppState>) -> HttpResponse {
    match state.service.status().await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(err) => error_response(err),
    }
}

pub async fn clear(state: web::Data<AppState>) -> HttpResponse {
    match state.service.clear().await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => error_response(err),
    }
}
