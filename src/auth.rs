//! Principal extraction.
//!
//! Credential storage and issuance live outside this service; requests
//! carry an opaque bearer token that is resolved against `users`. Admin
//! routes wrap the same lookup with an `is_admin` check.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

pub(crate) fn bearer_token(value: Option<&str>) -> Option<&str> {
    value?.strip_prefix("Bearer ").filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = bearer_token(header_value).ok_or(ApiError::Unauthorized)?;

        sqlx::query_as::<_, CurrentUser>(
            "SELECT id, email, name, is_admin FROM users WHERE api_token = $1",
        )
        .bind(token)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Clone, Debug)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::Forbidden);
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc123")), None);
        assert_eq!(bearer_token(None), None);
    }
}
