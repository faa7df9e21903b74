use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::auth::{ActorContext, Claims, RoleTier};
use crate::config;
use crate::error::ApiError;
use crate::state::AppState;

/// JWT authentication middleware: validates the bearer token and injects the
/// caller's `ActorContext`. The role tier is resolved through the permission
/// oracle on every request. The token's role is never trusted: when the oracle
/// cannot answer the caller gets `RoleTier::Default`, which passes no gate.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = match bearer_token(&headers).and_then(decode_claims) {
        Ok(claims) => claims,
        Err(msg) => return ApiError::unauthorized(msg).into_response(),
    };

    let tier = match state.oracle.role_tier(claims.sub).await {
        Ok(tier) => tier,
        Err(e) => {
            tracing::warn!(
                "role lookup failed for user {} (token role '{}'), treating as default: {}",
                claims.sub,
                claims.role,
                e
            );
            RoleTier::Default
        }
    };

    let actor = ActorContext::from_claims(&claims, tier);
    tracing::debug!("authenticated user {} as {:?}", actor.id, actor.role_tier);
    request.extensions_mut().insert(actor);

    next.run(request).await
}

/// The token of an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Result<&str, String> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or("Missing Authorization header")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;
    match value.strip_prefix("Bearer ").map(str::trim) {
        Some("") => Err("Empty JWT token".to_string()),
        Some(token) => Ok(token),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

fn decode_claims(token: &str) -> Result<Claims, String> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err("JWT secret not configured".to_string());
    }
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| format!("Invalid JWT token: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(bearer_token(&headers).is_err());
    }

    #[test]
    fn rejects_garbage_tokens() {
        assert!(decode_claims("not-a-token").is_err());
    }
}
