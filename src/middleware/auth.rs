//! Bearer-token authentication middleware.
//!
//! Token issuance is owned by the identity provider; this service only
//! validates access tokens and exposes the authenticated principal (user id
//! plus roles) to handlers through an extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, AppState};

/// Roles recognized by the access-scoping layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Manager,
    Mechanic,
    Client,
}

impl Role {
    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "Manager" => Some(Role::Manager),
            "Mechanic" => Some(Role::Mechanic),
            "Client" => Some(Role::Client),
            _ => None,
        }
    }
}

/// Claims carried by access tokens issued for this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Role names granted to the user
    pub roles: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// The authenticated principal, available to every handler.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub roles: Vec<Role>,
}

impl AuthUser {
    pub fn from_claims(claims: &AccessTokenClaims) -> Self {
        let roles = claims
            .roles
            .iter()
            .filter_map(|r| Role::from_string(r))
            .collect();
        Self {
            user_id: claims.sub.clone(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_manager(&self) -> bool {
        self.has_role(Role::Manager)
    }

    pub fn is_mechanic(&self) -> bool {
        self.has_role(Role::Mechanic)
    }

    pub fn is_client(&self) -> bool {
        self.has_role(Role::Client)
    }
}

/// Validate the bearer token and stash the principal in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let key = DecodingKey::from_secret(state.config.auth.jwt_secret.expose_secret().as_bytes());
    let claims = decode::<AccessTokenClaims>(token, &key, &Validation::new(Algorithm::HS256))
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?
        .claims;

    req.extensions_mut().insert(AuthUser::from_claims(&claims));

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Auth principal missing from request"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, roles: &[&str], secret: &str) -> String {
        let claims = AccessTokenClaims {
            sub: sub.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp: (chrono::Utc::now() + chrono::Duration::minutes(5)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn round_trips_claims_through_hs256() {
        let token = token_for("user-1", &["Client"], "test-secret");
        let decoded = decode::<AccessTokenClaims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "user-1");
        assert_eq!(decoded.claims.roles, vec!["Client".to_string()]);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = token_for("user-1", &["Client"], "other-secret");
        let result = decode::<AccessTokenClaims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_role_names_are_dropped() {
        let claims = AccessTokenClaims {
            sub: "user-2".to_string(),
            roles: vec!["Manager".to_string(), "Janitor".to_string()],
            exp: 0,
        };
        let user = AuthUser::from_claims(&claims);
        assert!(user.is_manager());
        assert_eq!(user.roles.len(), 1);
    }
}
