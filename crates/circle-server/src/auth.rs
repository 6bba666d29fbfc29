//! Acting-user extraction.
//!
//! Authentication happens upstream; requests reach the relay with the
//! verified user id in the `x-user-id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use circle_core::UserId;

use crate::error::ApiError;

pub const USER_HEADER: &str = "x-user-id";

/// The user a request acts as. Rejects with `401` when the header is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(UserId::new(value)))
            .ok_or(ApiError::Unauthorized)
    }
}
