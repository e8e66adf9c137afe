//! PKCE (RFC 7636) verifier/challenge generation and the CSRF `state` value.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method this harness speaks.
pub const CHALLENGE_METHOD: &str = "S256";

/// Raw entropy behind a verifier. 32 bytes encode to 43 characters.
const VERIFIER_BYTES: usize = 32;

/// Raw entropy behind a `state` value.
const STATE_BYTES: usize = 16;

/// PKCE code verifier and its S256 challenge.
///
/// Fields are private so the pair cannot drift apart once generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceParameters {
    verifier: String,
    challenge: String,
}

impl PkceParameters {
    /// Generate a new verifier/challenge pair from the thread CSPRNG.
    pub fn generate() -> Self {
        let mut verifier_bytes = [0u8; VERIFIER_BYTES];
        rand::rng().fill_bytes(&mut verifier_bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(verifier_bytes))
    }

    /// Derive the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

/// `base64url_nopad(SHA-256(verifier))`.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}
