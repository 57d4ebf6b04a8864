//! HMAC signing and verification of check-in tokens

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{CheckInToken, TokenError};
use crate::error::{Error, Result};
use crate::models::{AttendeeId, EventId};

type HmacSha256 = Hmac<Sha256>;

/// Holds the shared door key used to issue and verify tokens
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(Error::Config("signing key must not be empty".to_string()));
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Issue a signed token for an attendee
    #[must_use]
    pub fn issue(
        &self,
        event_id: &EventId,
        attendee_id: &AttendeeId,
        issued_at: i64,
    ) -> CheckInToken {
        let signature = URL_SAFE_NO_PAD.encode(
            self.mac(event_id, attendee_id, issued_at)
                .finalize()
                .into_bytes(),
        );
        CheckInToken {
            event_id: event_id.clone(),
            attendee_id: attendee_id.clone(),
            issued_at,
            signature,
        }
    }

    /// Verify in constant time. An undecodable signature is malformed, not invalid.
    pub fn verify(&self, token: &CheckInToken) -> std::result::Result<bool, TokenError> {
        let signature = URL_SAFE_NO_PAD
            .decode(token.signature.as_bytes())
            .map_err(|_| TokenError::Malformed("signature is not base64url".to_string()))?;

        Ok(self
            .mac(&token.event_id, &token.attendee_id, token.issued_at)
            .verify_slice(&signature)
            .is_ok())
    }

    fn mac(&self, event_id: &EventId, attendee_id: &AttendeeId, issued_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC-SHA-256 accepts keys of any size");
        mac.update(format!("{event_id}\n{attendee_id}\n{issued_at}").as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(TokenSigner::new("").is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let signer = TokenSigner::new("secret-door-key").unwrap();
        let debug = format!("{signer:?}");
        assert!(!debug.contains("secret-door-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn issued_signature_is_deterministic_and_verifies() {
        let signer = TokenSigner::new("k").unwrap();
        let event: EventId = "evt1".parse().unwrap();
        let attendee: AttendeeId = "usr1".parse().unwrap();
        let first = signer.issue(&event, &attendee, 42);
        let second = signer.issue(&event, &attendee, 42);
        assert_eq!(first.signature, second.signature);
        assert!(!first.signature.contains('='));
        assert_eq!(signer.verify(&first), Ok(true));
    }

    #[test]
    fn tampered_issue_time_fails_verification() {
        let signer = TokenSigner::new("k").unwrap();
        let mut token = signer.issue(&"evt1".parse().unwrap(), &"usr1".parse().unwrap(), 42);
        token.issued_at = 43;
        assert_eq!(signer.verify(&token), Ok(false));
    }
}
