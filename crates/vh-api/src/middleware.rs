//! vibehunt/crates/vh-api/src/middleware.rs Middleware
//!
//! Custom middleware for security, logging, and cross-origin access.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};

use crate::identity::{USER_AVATAR_HEADER, USER_ID_HEADER, USER_NAME_HEADER};

// Returns the request logger for the vibehunt API.
pub fn standard_middleware() -> Logger {
    // remote-ip "request-line" status-code response-size "referrer" "user-agent"
    Logger::default()
}

// Configures CORS (Cross-Origin Resource Sharing)
// The UI is served from its own origin; `*` allows any.
pub fn cors_policy(allowed_origin: &str) -> Cors {
    let cors = if allowed_origin == "*" {
        Cors::default().allow_any_origin()
    } else {
        Cors::default().allowed_origin(allowed_origin)
    };
    cors.allowed_methods(vec!["GET", "POST", "PATCH", "DELETE"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .allowed_header(USER_ID_HEADER)
        .allowed_header(USER_NAME_HEADER)
        .allowed_header(USER_AVATAR_HEADER)
        .max_age(3600)
}

// Security headers added to every response.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .add((header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
}
