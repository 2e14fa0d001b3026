/**
 * AUTH - Bearer tokens HS256 pour les routes de gestion des devices
 *
 * RÔLE : Émet un token signé au login ({userId, iat, exp}) et le valide sur
 * les routes de gestion /device. Les endpoints de polling des devices ne passent
 * jamais par ici.
 *
 * FORMAT : JWT compact `header.payload.signature`, base64 URL-safe sans
 * padding, signature HMAC-SHA256 avec IOTDASH_SECRET_KEY.
 */

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    user_id: String,
    iat: i64,
    exp: i64,
}

/// Utilisateur authentifié, injecté dans les extensions de la requête
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user_id: &str) -> String {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: &str, now: OffsetDateTime) -> String {
        let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };
        // Claims ne contient que des String/i64 : la sérialisation ne peut pas échouer
        let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap_or_default());
        let signing_input = format!("{header}.{payload}");
        let signature = BASE64_URL_SAFE_NO_PAD.encode(self.mac(&signing_input).finalize().into_bytes());
        format!("{signing_input}.{signature}")
    }

    /// Retourne l'id utilisateur porté par un token valide
    pub fn validate(&self, token: &str) -> Result<String, AuthError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<String, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let signature = BASE64_URL_SAFE_NO_PAD.decode(signature).map_err(|_| AuthError::Malformed)?;
        self.mac(&format!("{header}.{payload}"))
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let payload = BASE64_URL_SAFE_NO_PAD.decode(payload).map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;
        if claims.exp < now.unix_timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims.user_id)
    }

    fn mac(&self, data: &str) -> HmacSha256 {
        // HMAC accepte des clés de toute longueur
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(data.as_bytes());
        mac
    }
}

/// Middleware des routes /device/... : header `Authorization: Bearer <token>`
pub async fn require_auth(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(header) = req.headers().get("authorization") else {
        debug!("[auth] no authorization header found");
        return Err(ApiError::unauthorized("Authorization token required"));
    };

    let token = header
        .to_str()
        .ok()
        .and_then(|v| v.split(' ').nth(1))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Authorization token is missing or malformed"))?;

    let user_id = app.tokens.validate(token).map_err(|e| {
        warn!("[auth] rejected token: {e}");
        ApiError::unauthorized("Request is not authorized")
    })?;

    let Some(user) = app.users.get(&user_id) else {
        warn!("[auth] token for unknown user {user_id}");
        return Err(ApiError::unauthorized("User not found"));
    };

    req.extensions_mut().insert(AuthUser { id: user.id });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_issue_then_validate() {
        let issuer = TokenIssuer::new("test-secret", 30);
        let token = issuer.issue("user-42");
        assert_eq!(issuer.validate(&token), Ok("user-42".to_string()));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = TokenIssuer::new("a", 30).issue("u");
        assert_eq!(TokenIssuer::new("b", 30).validate(&token), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let issuer = TokenIssuer::new("test-secret", 30);
        let token = issuer.issue("alice");
        let forged_claims = BASE64_URL_SAFE_NO_PAD.encode(r#"{"userId":"mallory","iat":0,"exp":99999999999}"#);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(issuer.validate(&forged), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_expiry() {
        let issuer = TokenIssuer::new("test-secret", 30);
        let issued = datetime!(2024-01-01 00:00:00 UTC);
        let token = issuer.issue_at("u", issued);

        assert!(issuer.validate_at(&token, issued + Duration::days(29)).is_ok());
        assert_eq!(issuer.validate_at(&token, issued + Duration::days(31)), Err(AuthError::Expired));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let issuer = TokenIssuer::new("test-secret", 30);
        assert_eq!(issuer.validate("not-a-token"), Err(AuthError::Malformed));
        assert_eq!(issuer.validate("a.b.c.d"), Err(AuthError::Malformed));
    }
}
