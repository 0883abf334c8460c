//! Credential key generation and secret hashing.
//!
//! Issues two independent random tokens per credential: a `pk_`-prefixed
//! public key used for lookup and an `sk_`-prefixed secret shown to the
//! caller exactly once. The secret is persisted only as a SHA-256 digest.
//!
//! Plain SHA-256 (no salt/HMAC) is acceptable here because the tokens
//! are 256-bit random strings from the OS CSPRNG; pre-computation
//! attacks are infeasible against that input space.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix of the public half of a credential.
pub const PUBLIC_KEY_PREFIX: &str = "pk_";

/// Prefix of the secret half of a credential.
pub const SECRET_PREFIX: &str = "sk_";

/// Length of the random token body: 32 bytes, URL-safe base64, no padding.
pub const TOKEN_BODY_LEN: usize = 43;

/// Number of public-key characters exposed by masked listings.
pub const MASK_PREFIX_LEN: usize = 8;

/// A freshly generated credential pair, both halves in plaintext.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub secret: String,
}

fn generate_token(prefix: &str) -> String {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a new public-key/secret pair.
///
/// Both tokens carry 256 bits of entropy; public-key uniqueness is
/// enforced by the store's unique index, collisions are negligible.
#[must_use]
pub fn generate_key_pair() -> KeyPair {
    KeyPair {
        public_key: generate_token(PUBLIC_KEY_PREFIX),
        secret: generate_token(SECRET_PREFIX),
    }
}

/// SHA-256 hex digest of a secret.
///
/// The plaintext cannot be recovered from the digest; losing the secret
/// requires reissuing the credential.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a presented secret against a stored digest.
///
/// Re-hashes the presented value and compares digests in constant time.
#[must_use]
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(presented);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

/// Mask a public key down to a short identifying prefix.
#[must_use]
pub fn mask_public_key(public_key: &str) -> String {
    let prefix: String = public_key.chars().take(MASK_PREFIX_LEN).collect();
    format!("{prefix}...")
}
