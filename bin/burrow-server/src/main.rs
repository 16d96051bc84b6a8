//! # Burrow Server
//!
//! Wires the SQLite store into the HTTP delivery layer and serves the
//! forum API.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use burrow_api::{routes, AppState};
use burrow_db_sqlite::{SqliteForums, SqlitePosts, SqliteService, SqliteThreads, SqliteUsers};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:burrow.db".to_owned());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_owned());

    let pool = burrow_db_sqlite::connect(&database_url, 16)
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let state = web::Data::new(AppState {
        posts: Arc::new(SqlitePosts::new(pool.clone())),
        threads: Arc::new(SqliteThreads::new(pool.clone())),
        users: Arc::new(SqliteUsers::new(pool.clone())),
        forums: Arc::new(SqliteForums::new(pool.clone())),
        service: Arc::new(SqliteService::new(pool)),
    });

    log::info!("burrow-server listening on http://{bind_addr}");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(bind_addr)?
        .run()
        .await
}
