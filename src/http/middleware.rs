//! Connection admission: access token verification and identity resolution

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::game::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Claims of an access token issued by the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: UserId,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity material supplied with the WebSocket upgrade
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Access token, required when a secret is configured
    pub token: Option<String>,
    /// Trusted identity, used when no secret is configured
    pub user_id: Option<String>,
}

/// Verify a JWT token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    // Split token into parts
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    // Verify signature (HMAC-SHA256)
    let message = format!("{}.{}", header_b64, payload_b64);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    // Decode payload
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    // Check expiration
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Work out who is connecting. With a secret the token's `sub` is the
/// identity; without one the handshake's `userId` is taken on trust.
pub fn resolve_identity(handshake: &Handshake, secret: Option<&str>) -> Result<UserId, AuthError> {
    let user_id = match secret {
        Some(secret) => {
            let token = handshake.token.as_deref().ok_or(AuthError::MissingToken)?;
            verify_jwt(token, secret)?.sub
        }
        None => handshake
            .user_id
            .as_deref()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or(AuthError::MissingIdentity)?,
    };

    if user_id <= 0 {
        return Err(AuthError::MissingIdentity);
    }
    Ok(user_id)
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing access token")]
    MissingToken,

    #[error("Missing or invalid user identity")]
    MissingIdentity,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::MissingIdentity => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "access-secret";

    fn sign(payload: serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", header, payload, signature)
    }

    fn far_future() -> u64 {
        4_102_444_800 // 2100-01-01
    }

    #[test]
    fn valid_token_yields_numeric_subject() {
        let token = sign(
            serde_json::json!({"sub": 42, "email": "a@b.c", "exp": far_future()}),
            SECRET,
        );
        let claims = verify_jwt(&token, SECRET).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign(serde_json::json!({"sub": 42, "exp": far_future()}), "other");
        assert!(matches!(verify_jwt(&token, SECRET), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign(serde_json::json!({"sub": 42, "exp": 1}), SECRET);
        assert!(matches!(verify_jwt(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(verify_jwt("nope", SECRET), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn trusted_handshake_needs_positive_number() {
        let ok = Handshake {
            token: None,
            user_id: Some("17".to_string()),
        };
        assert_eq!(resolve_identity(&ok, None).unwrap(), 17);

        for bad in [None, Some("0"), Some("-3"), Some("abc")] {
            let handshake = Handshake {
                token: None,
                user_id: bad.map(str::to_string),
            };
            assert!(matches!(
                resolve_identity(&handshake, None),
                Err(AuthError::MissingIdentity)
            ));
        }
    }

    #[test]
    fn secret_makes_token_mandatory() {
        let handshake = Handshake {
            token: None,
            user_id: Some("17".to_string()),
        };
        assert!(matches!(
            resolve_identity(&handshake, Some(SECRET)),
            Err(AuthError::MissingToken)
        ));

        let handshake = Handshake {
            token: Some(sign(serde_json::json!({"sub": 9, "exp": far_future()}), SECRET)),
            user_id: Some("17".to_string()),
        };
        assert_eq!(resolve_identity(&handshake, Some(SECRET)).unwrap(), 9);
    }
}
