//! # vh-api
//!
//! The JSON routing and orchestration layer for vibehunt.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;

use actix_web::{error::JsonPayloadError, error::PathError, error::QueryPayloadError, web, HttpRequest};
use error::ApiError;

pub use handlers::AppState;

fn bad_path(err: PathError, _: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn bad_query(err: QueryPayloadError, _: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn bad_json(err: JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

/// Configures the routes for the showcase.
///
/// Everything is mounted under `/api`; malformed ids, queries and bodies
/// answer 400 with the usual error body.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PathConfig::default().error_handler(bad_path))
        .app_data(web::QueryConfig::default().error_handler(bad_query))
        .app_data(web::JsonConfig::default().error_handler(bad_json))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                // Projects
                .service(
                    web::resource("/projects")
                        .route(web::get().to(handlers::list_projects))
                        .route(web::post().to(handlers::create_project)),
                )
                .route("/projects/search", web::get().to(handlers::search_projects))
                .route("/projects/slug/{slug}", web::get().to(handlers::project_by_slug))
                .service(
                    web::resource("/projects/{id}")
                        .route(web::get().to(handlers::get_project))
                        .route(web::patch().to(handlers::update_project))
                        .route(web::delete().to(handlers::delete_project)),
                )
                // Comments
                .service(
                    web::resource("/projects/{id}/comments")
                        .route(web::get().to(handlers::list_comments))
                        .route(web::post().to(handlers::create_comment)),
                )
                .service(
                    web::resource("/comments/{id}")
                        .route(web::get().to(handlers::get_comment))
                        .route(web::patch().to(handlers::update_comment))
                        .route(web::delete().to(handlers::delete_comment)),
                )
                .route("/comments/{id}/replies", web::get().to(handlers::list_replies))
                // Votes
                .service(
                    web::resource("/projects/{id}/vote")
                        .route(web::post().to(handlers::vote_project))
                        .route(web::delete().to(handlers::unvote_project)),
                )
                .service(
                    web::resource("/comments/{id}/vote")
                        .route(web::post().to(handlers::vote_comment))
                        .route(web::delete().to(handlers::unvote_comment)),
                )
                .route("/votes/{kind}/{id}", web::get().to(handlers::has_voted))
                // Per-user listings
                .route("/users/{id}/projects", web::get().to(handlers::projects_by_user))
                .route("/users/{id}/comments", web::get().to(handlers::comments_by_user))
                .route("/users/{id}/votes", web::get().to(handlers::votes_by_user)),
        );
}
