//! JWT decoding/encoding (HS256).
//!
//! Wire claims use numeric `iat`/`exp` seconds per RFC 7519; the rest of the
//! crate works with the richer [`JwtClaims`] model.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pharmaflow_core::PharmacyId;

use crate::{JwtClaims, PrincipalId, Role};

#[derive(Debug, Error)]
pub enum TokenDecodeError {
    #[error("token decode failed: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error("token carries an invalid timestamp")]
    InvalidTimestamp,
}

/// Serde shape of the token on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: PrincipalId,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pharmacy_id: Option<PharmacyId>,
    iat: i64,
    exp: i64,
}

/// Decodes bearer tokens into claims.
///
/// Trait seam so the HTTP layer can be tested with a stub validator.
pub trait JwtValidator: Send + Sync {
    fn decode(&self, token: &str) -> Result<JwtClaims, TokenDecodeError>;
}

/// HS256 shared-secret validator.
pub struct Hs256JwtValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
        }
    }

    /// Issue a token for the given claims. Used by dev tooling and tests.
    pub fn encode(&self, claims: &JwtClaims) -> Result<String, TokenDecodeError> {
        let wire = WireClaims {
            sub: claims.sub,
            roles: claims.roles.clone(),
            pharmacy_id: claims.pharmacy_id,
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key)?)
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn decode(&self, token: &str) -> Result<JwtClaims, TokenDecodeError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked deterministically by `validate_claims`.
        validation.validate_exp = false;

        let data = decode::<WireClaims>(token, &self.decoding_key, &validation)?;
        let wire = data.claims;

        let issued_at = timestamp(wire.iat)?;
        let expires_at = timestamp(wire.exp)?;

        Ok(JwtClaims {
            sub: wire.sub,
            roles: wire.roles,
            pharmacy_id: wire.pharmacy_id,
            issued_at,
            expires_at,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenDecodeError> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(TokenDecodeError::InvalidTimestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn round_trips_claims() {
        let validator = Hs256JwtValidator::new(b"test-secret");
        let now = Utc::now();
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![Role::new("admin")],
            pharmacy_id: None,
            issued_at: DateTime::from_timestamp(now.timestamp(), 0).unwrap(),
            expires_at: DateTime::from_timestamp((now + Duration::hours(1)).timestamp(), 0)
                .unwrap(),
        };

        let token = validator.encode(&claims).unwrap();
        let decoded = validator.decode(&token).unwrap();

        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_wrong_secret() {
        let issuer = Hs256JwtValidator::new(b"secret-a");
        let verifier = Hs256JwtValidator::new(b"secret-b");
        let now = Utc::now();
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![],
            pharmacy_id: None,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        };

        let token = issuer.encode(&claims).unwrap();
        assert!(verifier.decode(&token).is_err());
    }

    #[test]
    fn preserves_pharmacy_binding() {
        let validator = Hs256JwtValidator::new(b"test-secret");
        let now = Utc::now();
        let pharmacy = PharmacyId::new();
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![Role::new("pharmacy")],
            pharmacy_id: Some(pharmacy),
            issued_at: DateTime::from_timestamp(now.timestamp(), 0).unwrap(),
            expires_at: DateTime::from_timestamp((now + Duration::hours(1)).timestamp(), 0)
                .unwrap(),
        };

        let token = validator.encode(&claims).unwrap();
        let decoded = validator.decode(&token).unwrap();

        assert_eq!(decoded.pharmacy_id, Some(pharmacy));
    }
}
