use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use shared::models::user::User;

use crate::{error::ApiError, state::AppState};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";

/// Identity carried by the request, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Absent,
    Present(User),
}

impl Session {
    pub fn from_headers(headers: &HeaderMap, default_username: &str) -> Result<Self, ApiError> {
        let Some(user_id) = header(headers, USER_ID_HEADER)? else {
            return Ok(Session::Absent);
        };
        let username = header(headers, USERNAME_HEADER)?
            .unwrap_or_else(|| default_username.to_string());
        Ok(Session::Present(User::new(&user_id, &username)))
    }

    /// The session's user, or a rejection when there is none.
    pub fn require(self) -> Result<User, ApiError> {
        match self {
            Session::Present(user) => Ok(user),
            Session::Absent => Err(ApiError::Unauthorized),
        }
    }

    /// The session's user, or a freshly minted visitor identity.
    pub fn or_mint(self, default_username: &str) -> User {
        match self {
            Session::Present(user) => user,
            Session::Absent => User::with_fresh_id(default_username),
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{} is not valid text", name)))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Session::from_headers(&parts.headers, &state.config.lobby.default_username)
    }
}
