//! Bearer token verification.
//!
//! The lobby only verifies tokens; issuance belongs to the account service.
//! Tokens are HS256-signed with a shared secret (`JWT_SECRET`) and carry
//! `PlayerClaims`. Validation enforces size limits, signature, and `exp`
//! with a configurable clock skew.

use crate::errors::RosterError;
use common::jwt::{check_token_size, PlayerClaims};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

/// Verifies bearer tokens against the shared HS256 secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier from the shared secret and clock skew tolerance.
    pub fn new(secret: &SecretString, clock_skew_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = clock_skew_seconds.max(0) as u64;
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Verify a raw bearer token and return its claims.
    ///
    /// The size check runs before any decoding so oversized tokens are
    /// rejected without cryptographic work.
    pub fn verify(&self, token: &str) -> Result<PlayerClaims, RosterError> {
        check_token_size(token).map_err(|e| {
            tracing::debug!(target: "roster.auth", error = %e, "Token rejected by size check");
            RosterError::InvalidToken("The access token is invalid or expired".to_string())
        })?;

        let data = jsonwebtoken::decode::<PlayerClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(target: "roster.auth", error = %e, "Token failed validation");
                RosterError::InvalidToken("The access token is invalid or expired".to_string())
            })?;

        Ok(data.claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    const TEST_SECRET: &str = "unit-test-secret";

    fn sign(claims: &PlayerClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_for(owner: Uuid, exp_offset: i64) -> PlayerClaims {
        let now = Utc::now().timestamp();
        PlayerClaims {
            sub: format!("player:{owner}"),
            exp: now + exp_offset,
            iat: now,
            jti: None,
        }
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(&SecretString::from(TEST_SECRET), 60)
    }

    #[test]
    fn test_verify_accepts_valid_token() {
        let owner = Uuid::new_v4();
        let token = sign(&claims_for(owner, 600), TEST_SECRET);

        let claims = verifier().verify(&token).unwrap();
        assert_eq!(claims.owner_id().unwrap(), owner);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = sign(&claims_for(Uuid::new_v4(), 600), "some-other-secret");

        let err = verifier().verify(&token).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        // Expired well past the 60s leeway
        let token = sign(&claims_for(Uuid::new_v4(), -3600), TEST_SECRET);

        let err = verifier().verify(&token).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let err = verifier().verify("not.a.jwt").unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn test_verify_rejects_oversized_token() {
        let token = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);
        let err = verifier().verify(&token).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
