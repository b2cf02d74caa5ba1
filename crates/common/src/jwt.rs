//! JWT utilities shared across Rally Lobby services.
//!
//! The lobby never issues tokens; it only verifies bearer tokens minted by
//! the account service. This module provides:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat` validation
//! - Player token claims structure
//! - Subject parsing (`player:{uuid}` or plain UUID)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Generic error messages prevent information leakage
//! - The `sub` field in claims is redacted in Debug output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical player tokens are 200-500 bytes. Anything larger is rejected
/// before base64 decode or signature verification so oversized tokens cannot
/// waste CPU or memory.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Accounts for clock drift between the token issuer and this service.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would weaken `exp`/`iat` validation.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during token validation.
///
/// Messages are intentionally generic; details are logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token subject is not a valid player identifier.
    #[error("The access token is invalid or expired")]
    InvalidSubject,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Player token claims structure.
///
/// # Fields
///
/// - `sub`: Subject (player identifier, `player:{uuid}` or plain UUID)
/// - `exp`: Expiration timestamp (Unix epoch seconds)
/// - `iat`: Issued-at timestamp (Unix epoch seconds)
/// - `jti`: Optional unique token identifier
///
/// # Security
///
/// The `sub` field is redacted in Debug output to prevent accidental logging
/// of player identifiers.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlayerClaims {
    /// Subject (player identifier) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Unique token identifier, if the issuer set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl fmt::Debug for PlayerClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("jti", &self.jti)
            .finish()
    }
}

impl PlayerClaims {
    /// Parse the owner UUID out of the token subject.
    ///
    /// Supports both `player:{uuid}` and plain UUID subjects.
    pub fn owner_id(&self) -> Result<Uuid, JwtValidationError> {
        parse_owner_id(&self.sub)
    }
}

/// Parse a player identifier from a JWT subject.
///
/// Supports both plain UUID and `player:{uuid}` formats.
pub fn parse_owner_id(sub: &str) -> Result<Uuid, JwtValidationError> {
    let uuid_str = sub.strip_prefix("player:").unwrap_or(sub);
    Uuid::parse_str(uuid_str).map_err(|_| JwtValidationError::InvalidSubject)
}

/// Check a raw token against the size limit before any parsing.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> PlayerClaims {
        PlayerClaims {
            sub: sub.to_string(),
            exp: 2_000_000_000,
            iat: 1_000_000_000,
            jti: None,
        }
    }

    #[test]
    fn test_parse_owner_id_plain_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_owner_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_owner_id_with_prefix() {
        let id = Uuid::new_v4();
        let sub = format!("player:{id}");
        assert_eq!(parse_owner_id(&sub).unwrap(), id);
    }

    #[test]
    fn test_parse_owner_id_invalid() {
        assert_eq!(
            parse_owner_id("not-a-uuid"),
            Err(JwtValidationError::InvalidSubject)
        );
    }

    #[test]
    fn test_claims_owner_id() {
        let id = Uuid::new_v4();
        assert_eq!(claims(&format!("player:{id}")).owner_id().unwrap(), id);
    }

    #[test]
    fn test_debug_redacts_subject() {
        let debug = format!("{:?}", claims("player:secret-subject"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-subject"));
    }

    #[test]
    fn test_check_token_size_accepts_typical_token() {
        let token = "a".repeat(500);
        assert!(check_token_size(&token).is_ok());
    }

    #[test]
    fn test_check_token_size_rejects_oversized_token() {
        let token = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            check_token_size(&token),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    #[test]
    fn test_claims_roundtrip_serde() {
        let original = claims("player:123");
        let json = serde_json::to_string(&original).unwrap();
        let parsed: PlayerClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.sub, original.sub);
        assert_eq!(parsed.exp, original.exp);
    }
}
