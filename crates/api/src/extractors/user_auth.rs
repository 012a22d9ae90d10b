//! User JWT authentication extractor.
//!
//! Validates the bearer token issued by the external auth provider and turns
//! its claims into an [`Identity`]. Every identity seen here is remembered so
//! that invitations sent to its e-mail can be bound to the account.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::Identity;
use shared::jwt::{extract_user_id, JwtError};
use shared::validation::validate_email_address;
use tracing::warn;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub identity: Identity,
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<UserAuth>() {
            return Ok(auth.clone());
        }

        let token = bearer_token(parts)?;
        let claims = state.jwt.validate_token(token).map_err(|e| match e {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Invalid or expired token".to_string()),
        })?;
        let user_id = extract_user_id(&claims)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;
        if validate_email_address(&claims.email).is_err() {
            return Err(ApiError::Unauthorized(
                "Token does not carry a valid email".to_string(),
            ));
        }

        let identity = Identity::new(user_id, &claims.email);
        if let Err(e) = state.identities.remember_identity(&identity).await {
            // Binding falls back to the e-mail match on respond.
            warn!(user_id = %identity.user_id, error = %e, "Failed to remember identity");
        }

        let auth = UserAuth { identity };
        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_extracted() {
        let parts = parts_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header_rejected() {
        let parts = parts_with(None);
        assert!(matches!(
            bearer_token(&parts),
            Err(ApiError::Unauthorized(msg)) if msg.contains("Missing")
        ));
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        for header in ["Basic dXNlcjpwYXNz", "Bearer ", "bearer abc"] {
            let parts = parts_with(Some(header));
            assert!(bearer_token(&parts).is_err(), "{}", header);
        }
    }
}
