//! Canonical JSON serialization, Ed25519 signing/verification, and SHA-256
//! hashing used by the signed-bundle layer.
//!
//! Canonicalization sorts object keys recursively, preserves array order,
//! and emits no insignificant whitespace, so that a normalized rule set
//! round-trips to byte-identical bytes across any conforming implementation.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Errors from canonicalization, signing, or verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A base64-encoded field failed to decode.
    #[error("invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A key was not a valid 32-byte Ed25519 key.
    #[error("invalid Ed25519 key material")]
    InvalidKey,
    /// A signature did not have the expected byte length.
    #[error("invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),
    /// Signature verification failed.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Recursively sort object keys and re-serialize with no insignificant
/// whitespace. Array order is preserved. The result is deterministic for
/// any JSON value with the same logical content.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("canonical value always serializes")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// SHA-256 of `bytes`, lowercase hex-encoded.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse a base64-encoded 32-byte Ed25519 signing (private) key.
pub fn signing_key_from_base64(b64: &str) -> Result<SigningKey, CryptoError> {
    let bytes = BASE64.decode(b64.trim())?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
    Ok(SigningKey::from_bytes(&arr))
}

/// Parse a base64-encoded 32-byte Ed25519 verifying (public) key.
pub fn verifying_key_from_base64(b64: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = BASE64.decode(b64.trim())?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidKey)
}

/// Sign canonical bytes with an Ed25519 signing key; returns base64.
#[must_use]
pub fn sign_payload(canonical: &[u8], key: &SigningKey) -> String {
    let sig: Signature = key.sign(canonical);
    BASE64.encode(sig.to_bytes())
}

/// Verify a base64 Ed25519 signature over canonical bytes.
///
/// Returns `Ok(true)`/`Ok(false)` for well-formed but possibly invalid
/// signatures, and `Err` only when the signature is structurally malformed
/// (wrong length or bad base64). Comparison against the expected digest
/// elsewhere in this crate uses constant-time equality; actual signature
/// verification is delegated to `ed25519-dalek`, which itself avoids
/// early-exit timing leaks.
pub fn verify_signature(
    canonical: &[u8],
    signature_b64: &str,
    key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let sig_bytes = BASE64.decode(signature_b64.trim())?;
    let arr: [u8; 64] =
        sig_bytes.try_into().map_err(|v: Vec<u8>| CryptoError::InvalidSignatureLength(v.len()))?;
    let sig = Signature::from_bytes(&arr);
    Ok(key.verify(canonical, &sig).is_ok())
}

/// Constant-time hex-digest comparison, for pinning checks that must not
/// leak timing information about where two hashes first diverge.
#[must_use]
pub fn constant_time_hex_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_keys_and_strips_whitespace() {
        let v = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonicalize(&v), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn canonicalize_preserves_array_order() {
        let v = json!({"xs": [3, 1, 2]});
        assert_eq!(canonicalize(&v), r#"{"xs":[3,1,2]}"#);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let mut csprng = rand::rngs::OsRng;
        let key = SigningKey::generate(&mut csprng);
        let canonical = b"{\"a\":1}";
        let sig = sign_payload(canonical, &key);
        assert!(verify_signature(canonical, &sig, &key.verifying_key()).unwrap());
    }

    #[test]
    fn verify_fails_on_tampered_payload() {
        let mut csprng = rand::rngs::OsRng;
        let key = SigningKey::generate(&mut csprng);
        let canonical = b"{\"a\":1}";
        let sig = sign_payload(canonical, &key);
        assert!(!verify_signature(b"{\"a\":2}", &sig, &key.verifying_key()).unwrap());
    }

    #[test]
    fn sha256_hex_is_stable() {
        let expected = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(expected.len(), 64);
        assert_eq!(sha256_hex(b""), expected);
    }
}
