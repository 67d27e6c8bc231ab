//! Single-use tokens for email verification and password reset.
//!
//! Plaintext tokens only ever leave the core inside a notification intent,
//! and the outbox drops them once that intent is delivered or abandoned.
//! Account storage keeps the SHA-256 digest, so a leaked account table
//! cannot be replayed.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Entropy carried by every issued token.
pub const TOKEN_BYTES: usize = 32;

/// Default lifetime of an email verification token.
pub const DEFAULT_VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default lifetime of a password reset token.
pub const DEFAULT_RESET_TTL: Duration = Duration::from_secs(60 * 60);

/// Plaintext one-time token as delivered to the account holder.
#[derive(Clone)]
pub struct OneTimeToken(Zeroizing<String>);

impl OneTimeToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0_u8; TOKEN_BYTES]);
        rand::thread_rng().fill_bytes(bytes.as_mut_slice());
        Self(Zeroizing::new(hex::encode(bytes.as_slice())))
    }

    /// Wrap a token presented back by a caller.
    pub fn presented(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into().trim().to_owned()))
    }

    /// Borrow the plaintext for delivery.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Digest used for storage and lookup.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::OneTimeToken;
    ///
    /// let token = OneTimeToken::generate();
    /// let presented = OneTimeToken::presented(token.expose());
    /// assert_eq!(token.digest(), presented.digest());
    /// ```
    pub fn digest(&self) -> TokenDigest {
        TokenDigest(hex::encode(Sha256::digest(self.0.as_bytes())))
    }
}

impl fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeToken(<redacted>)")
    }
}

/// Hex-encoded SHA-256 digest of a [`OneTimeToken`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenDigest(String);

impl TokenDigest {
    /// Rehydrate a digest read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Hex-encoded digest as stored.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Token paired with the digest and expiry that get persisted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: OneTimeToken,
    pub digest: TokenDigest,
    pub expires_at: DateTime<Utc>,
}

/// Lifetimes applied when issuing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            verification_ttl: DEFAULT_VERIFICATION_TTL,
            reset_ttl: DEFAULT_RESET_TTL,
        }
    }
}

impl TokenPolicy {
    /// Issue a verification token valid from `now`.
    pub fn issue_verification(&self, now: DateTime<Utc>) -> IssuedToken {
        issue(now, self.verification_ttl)
    }

    /// Issue a password reset token valid from `now`.
    pub fn issue_reset(&self, now: DateTime<Utc>) -> IssuedToken {
        issue(now, self.reset_ttl)
    }
}

fn issue(now: DateTime<Utc>, ttl: Duration) -> IssuedToken {
    let token = OneTimeToken::generate();
    let expires_at = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    IssuedToken {
        digest: token.digest(),
        expires_at,
        token,
    }
}
