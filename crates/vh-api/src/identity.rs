//! Caller identity, as forwarded by the identity provider in front of the API.

use crate::error::ApiError;
use actix_web::dev::Payload;
use actix_web::http::header::HeaderMap;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use vh_core::Actor;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_NAME_HEADER: &str = "X-User-Name";
pub const USER_AVATAR_HEADER: &str = "X-User-Avatar";

/// Extracts the acting user. Rejects the request with 401 when
/// `X-User-Id` is absent or blank.
pub struct Identity(pub Actor);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = header(headers, USER_ID_HEADER).ok_or(ApiError::Unauthenticated)?;
    // Display name falls back to the id.
    let display_name = header(headers, USER_NAME_HEADER).unwrap_or_else(|| user_id.clone());
    let actor = Actor::new(user_id, display_name);
    Ok(match header(headers, USER_AVATAR_HEADER) {
        Some(avatar) => actor.with_avatar(avatar),
        None => actor,
    })
}

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).map(Identity))
    }
}
