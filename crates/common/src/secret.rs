//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports types from the [`secrecy`] crate with Rally Lobby-specific
//! guidance. Use these types for all sensitive values: the JWT verification
//! secret, database URLs with credentials, and webhook auth headers.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` while holding a secret gets safe logging
//! behavior for free. Accidentally logging a secret via `{:?}` or tracing is
//! a compile-time impossibility.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped, so sensitive data does not linger in
//! memory after use.
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - The JWT verification secret (`JWT_SECRET`)
//! - Webhook authorization header values
//! - Any connection string carrying credentials
//!
//! To access the actual value you must explicitly call `expose_secret()`.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("channel-key-123");
        assert_eq!(secret.expose_secret(), "channel-key-123");
    }

    #[test]
    fn test_struct_with_secret_redacts_only_secret() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct WebhookTarget {
            url: String,
            auth_header: SecretString,
        }

        let target = WebhookTarget {
            url: "https://hooks.example.com/timeline".to_string(),
            auth_header: SecretString::from("Bearer sk-123"),
        };

        let debug_str = format!("{target:?}");
        assert!(debug_str.contains("hooks.example.com"));
        assert!(!debug_str.contains("sk-123"));
    }
}
