use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The operator a request was authenticated as, stored in request
/// extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentOperator(pub String);

/// Claims expected inside an operator token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the operator's login.
    pub sub: String,
    pub exp: usize,
}

/// HS256 keys for operator tokens.
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a token for `operator` valid until `expires_at`.
    pub fn issue(&self, operator: &str, expires_at: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = Claims {
            sub: operator.to_string(),
            exp: usize::try_from(expires_at.timestamp())?,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Option<CurrentOperator> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .ok()
            .map(|data| CurrentOperator(data.claims.sub))
    }
}

/// Middleware to validate a Bearer JWT in the `Authorization` header.
///
/// On success the request is forwarded with the operator attached; on
/// failure a `401` is returned.
pub async fn jwt_middleware(
    State(auth): State<Arc<JwtAuth>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = match req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) if s.starts_with("Bearer ") => &s[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let Some(operator) = auth.verify(token) else {
        warn!("Rejected request to {} with an invalid token", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    };

    req.extensions_mut().insert(operator);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let auth = JwtAuth::new("s3cret");
        let token = auth.issue("reception", Utc::now() + Duration::hours(1)).unwrap();
        assert_eq!(auth.verify(&token), Some(CurrentOperator("reception".into())));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = JwtAuth::new("other")
            .issue("reception", Utc::now() + Duration::hours(1))
            .unwrap();
        assert_eq!(JwtAuth::new("s3cret").verify(&token), None);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = JwtAuth::new("s3cret");
        let token = auth.issue("reception", Utc::now() - Duration::hours(2)).unwrap();
        assert_eq!(auth.verify(&token), None);
    }
}
