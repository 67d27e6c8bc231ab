//! Credential values exchanged with the external hashing collaborator.
//!
//! The core never hashes passwords itself. It hands a [`PlainCredential`] to
//! the `CredentialHasher` port and stores the returned [`CredentialDigest`].

use std::fmt;

use zeroize::Zeroizing;

/// Minimum accepted credential length, in characters.
pub const CREDENTIAL_MIN_CHARS: usize = 8;

/// Validation errors for plaintext credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialValidationError {
    #[error("credential must be at least {min} characters")]
    TooShort { min: usize },
}

/// Plaintext credential supplied by a caller; wiped from memory on drop.
#[derive(Clone)]
pub struct PlainCredential(Zeroizing<String>);

impl PlainCredential {
    /// Accept a caller supplied credential after a length check.
    ///
    /// # Examples
    /// ```
    /// use campus_rides::domain::PlainCredential;
    ///
    /// assert!(PlainCredential::new("correct horse").is_ok());
    /// assert!(PlainCredential::new("short").is_err());
    /// ```
    pub fn new(raw: impl Into<String>) -> Result<Self, CredentialValidationError> {
        let raw = Zeroizing::new(raw.into());
        if raw.chars().count() < CREDENTIAL_MIN_CHARS {
            return Err(CredentialValidationError::TooShort {
                min: CREDENTIAL_MIN_CHARS,
            });
        }
        Ok(Self(raw))
    }

    /// Borrow the plaintext for hashing or verification.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlainCredential(<redacted>)")
    }
}

/// Digest produced by the credential collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialDigest(String);

impl CredentialDigest {
    /// Wrap a digest produced by the hashing collaborator or read from
    /// storage.
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Encoded digest as produced by the hasher.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialDigest(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn debug_output_hides_plaintext() {
        let credential = PlainCredential::new("hunter2hunter2").expect("long enough");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(credential.expose(), "hunter2hunter2");
    }

    #[rstest]
    fn debug_output_hides_digest() {
        let digest = CredentialDigest::new("$argon2id$v=19$secret");
        assert!(!format!("{digest:?}").contains("secret"));
    }

    #[rstest]
    #[case("", false)]
    #[case("1234567", false)]
    #[case("12345678", true)]
    fn enforces_minimum_length(#[case] raw: &str, #[case] accepted: bool) {
        assert_eq!(PlainCredential::new(raw).is_ok(), accepted);
    }
}
