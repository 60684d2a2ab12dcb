//! Caller identity extractors
//!
//! A trusted edge authenticates users and forwards the user id in
//! `x-user-id`. Requests without it are guests, who may carry the signed
//! guest pass issued earlier in `x-guest-pass`.

use anshim_types::{Identity, UserId};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the guest pass
pub const GUEST_PASS_HEADER: &str = "x-guest-pass";

/// Member or guest
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

/// Authenticated member; rejects guests
#[derive(Debug, Clone, Copy)]
pub struct Member(pub UserId);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header encoding")))
        })
        .transpose()
}

fn user_id(parts: &Parts) -> Result<Option<UserId>, ApiError> {
    match header(parts, USER_ID_HEADER)? {
        None | Some("") => Ok(None),
        Some(raw) => UserId::parse(raw)
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER}"))),
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = user_id(parts)? {
            return Ok(Self(Identity::Member(id)));
        }

        let pass = header(parts, GUEST_PASS_HEADER)?
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Ok(Self(Identity::Guest { pass }))
    }
}

impl<S> FromRequestParts<S> for Member
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id(parts)?.map(Self).ok_or(ApiError::Unauthorized)
    }
}
