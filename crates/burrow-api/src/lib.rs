//! # burrow-api
//!
//! HTTP delivery for the Burrow forum service. Handlers parse the request,
//! call the storage ports and map typed errors onto status codes; nothing
//! here touches the database directly.

pub mod handlers;

use std::sync::Arc;

use actix_web::web;
use burrow_core::traits::{ForumStore, PostStore, StatusStore, ThreadStore, UserStore};

/// State shared across all workers. Trait objects so the binary decides
/// which backend to wire in.
pub struct AppState {
    pub posts: Arc<dyn PostStore>,
    pub threads: Arc<dyn ThreadStore>,
    pub users: Arc<dyn UserStore>,
    pub forums: Arc<dyn ForumStore>,
    pub service: Arc<dyn StatusStore>,
}

/// Mounts the full route table under `/api`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    use handlers::*;

    cfg.service(
        web::scope("/api")
            .route("/user/{nickname}/create", web::post().to(create_user))
            .service(
                web::resource("/user/{nickname}/profile")
                    .route(web::get().to(get_user))
                    .route(web::post().to(update_user)),
            )
            .route("/forum/create", web::post().to(create_forum))
            .route("/forum/{slug}/details", web::get().to(get_forum))
            .route("/forum/{slug}/create", web::post().to(create_thread))
            .route("/forum/{slug}/threads", web::get().to(list_threads))
            .route("/forum/{slug}/users", web::get().to(forum_users))
            .route("/thread/{slug_or_id}/create", web::post().to(create_posts))
            .service(
                web::resource("/thread/{slug_or_id}/details")
                    .route(web::get().to(get_thread))
                    .route(web::post().to(update_thread)),
            )
            .route("/thread/{slug_or_id}/posts", web::get().to(list_posts))
            .route("/thread/{slug_or_id}/vote", web::post().to(vote))
            .service(
                web::resource("/post/{id}/details")
                    .route(web::get().to(get_post))
                    .route(web::post().to(update_post)),
            )
            .route("/service/status", web::get().to(status))
            .route("/service/clear", web::post().to(clear)),
    );
}
