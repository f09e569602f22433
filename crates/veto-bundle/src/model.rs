//! `SignedBundle`: the wire format for a signed rule set (specification §3).

use serde::{Deserialize, Serialize};

/// `{ payload, signature, publicKeyId, version, payloadHash, signedAt }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBundle {
    /// Canonical JSON of the normalized rule set.
    pub payload: String,
    /// Base64-encoded Ed25519 signature over `payload`'s bytes.
    pub signature: String,
    /// Identifies which trusted key signed this bundle.
    pub public_key_id: String,
    /// Bundle format version.
    pub version: u32,
    /// SHA-256 hex digest of `payload`.
    pub payload_hash: String,
    /// ISO 8601 signing timestamp.
    pub signed_at: String,
}

impl SignedBundle {
    /// The current bundle format version.
    pub const FORMAT_VERSION: u32 = 1;
}
