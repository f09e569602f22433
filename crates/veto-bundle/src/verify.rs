//! `createSignedBundle` / `verifyBundle` / `verifyBundleWithConfig`
//! (specification §4.13).

use std::collections::HashMap;

use chrono::Utc;
use ed25519_dalek::{SigningKey, VerifyingKey};
use thiserror::Error;

use veto_core::error::{Classify, ErrorKind};
use veto_crypto::{canonicalize, sha256_hex, sign_payload, verify_signature};
use veto_rules::RuleSet;

use crate::model::SignedBundle;

/// Errors raised while verifying a [`SignedBundle`].
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The bundle's `payload` is not valid JSON, or does not deserialize
    /// into a [`RuleSet`].
    #[error("bundle payload is malformed: {0}")]
    MalformedPayload(String),
    /// `publicKeyId` does not name a key in the trusted set, or (with
    /// `allowKeyRotation=false`) the signing key is not the pinned one.
    #[error("public key '{0}' is not trusted")]
    UntrustedKey(String),
    /// The Ed25519 signature did not verify.
    #[error("signature verification failed")]
    SignatureVerification,
    /// The recomputed payload hash does not match `bundle.payloadHash`.
    #[error("payload hash mismatch: expected {expected}, computed {computed}")]
    PayloadHashMismatch {
        /// Hash recorded in the bundle.
        expected: String,
        /// Hash recomputed from the payload bytes.
        computed: String,
    },
    /// `pinnedVersion` is set and does not match `bundle.version`.
    #[error("bundle version {actual} does not match pinned version {pinned}")]
    VersionPinMismatch {
        /// The pinned version from config.
        pinned: u32,
        /// The bundle's actual version.
        actual: u32,
    },
    /// `pinnedHash` is set and does not match the actual payload hash.
    #[error("payload hash {actual} does not match pinned hash {pinned}")]
    HashPinMismatch {
        /// The pinned hash from config.
        pinned: String,
        /// The bundle's actual payload hash.
        actual: String,
    },
    /// `signing.required` is true but the bundle carries no usable
    /// signature material (an empty signature or key id).
    #[error("signing is required but the bundle is unsigned")]
    SigningRequired,
}

impl Classify for VerifyError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedPayload(_) => ErrorKind::BundleFormat,
            Self::UntrustedKey(_) | Self::SignatureVerification | Self::SigningRequired => {
                ErrorKind::SignatureVerification
            }
            Self::PayloadHashMismatch { .. } | Self::VersionPinMismatch { .. } | Self::HashPinMismatch { .. } => {
                ErrorKind::BundlePin
            }
        }
    }
}

/// Normalizes `rule_set`, canonicalizes it, signs it with `signing_key`,
/// and wraps the result in a [`SignedBundle`]. Normalizing before signing
/// is what makes `parseBundlePayload(createSignedBundle(R, k, id)) ==
/// normalize(R)` hold for every `R`, not just already-normalized ones.
pub fn create_signed_bundle(rule_set: &RuleSet, signing_key: &SigningKey, key_id: &str) -> SignedBundle {
    let normalized = veto_rules::normalize(rule_set.clone());
    let json = serde_json::to_value(&normalized).expect("RuleSet always serializes");
    let payload = canonicalize(&json);
    let payload_hash = sha256_hex(payload.as_bytes());
    let signature = sign_payload(payload.as_bytes(), signing_key);
    SignedBundle {
        payload,
        signature,
        public_key_id: key_id.to_string(),
        version: SignedBundle::FORMAT_VERSION,
        payload_hash,
        signed_at: Utc::now().to_rfc3339(),
    }
}

/// Parses a verified bundle's payload back into a [`RuleSet`]. Callers
/// should only trust the result after [`verify_bundle`] /
/// [`verify_bundle_with_config`] has succeeded.
pub fn parse_bundle_payload(bundle: &SignedBundle) -> Result<RuleSet, VerifyError> {
    serde_json::from_str(&bundle.payload).map_err(|e| VerifyError::MalformedPayload(e.to_string()))
}

/// Verifies `bundle`'s signature against `trusted_keys` (keyed by
/// `publicKeyId`). If `bundle.publicKeyId` is not in `trusted_keys`:
/// when `allow_key_rotation` is true, every trusted key is tried in turn
/// and the first successful verification wins; otherwise the bundle is
/// rejected outright.
pub fn verify_bundle(
    bundle: &SignedBundle,
    trusted_keys: &HashMap<String, VerifyingKey>,
    allow_key_rotation: bool,
) -> Result<(), VerifyError> {
    let payload_bytes = bundle.payload.as_bytes();

    if let Some(key) = trusted_keys.get(&bundle.public_key_id) {
        return verify_with_key(payload_bytes, &bundle.signature, key);
    }

    if allow_key_rotation {
        for key in trusted_keys.values() {
            if verify_with_key(payload_bytes, &bundle.signature, key).is_ok() {
                return Ok(());
            }
        }
    }

    Err(VerifyError::UntrustedKey(bundle.public_key_id.clone()))
}

fn verify_with_key(payload: &[u8], signature_b64: &str, key: &VerifyingKey) -> Result<(), VerifyError> {
    match verify_signature(payload, signature_b64, key) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(VerifyError::SignatureVerification),
    }
}

/// Additional pinning configuration for [`verify_bundle_with_config`].
#[derive(Debug, Clone, Default)]
pub struct VerifyConfig {
    /// Allow a bundle signed by a key not named by `publicKeyId`'s exact
    /// trusted entry, as long as some trusted key verifies it.
    pub allow_key_rotation: bool,
    /// Reject any bundle whose `version` is not exactly this.
    pub pinned_version: Option<u32>,
    /// Reject any bundle whose recomputed payload hash is not exactly
    /// this.
    pub pinned_hash: Option<String>,
    /// Fail closed if the bundle carries no signature at all.
    pub signing_required: bool,
}

/// [`verify_bundle`], plus: recomputes the payload hash and fails on
/// mismatch, and enforces `pinnedVersion` / `pinnedHash` when configured.
pub fn verify_bundle_with_config(
    bundle: &SignedBundle,
    trusted_keys: &HashMap<String, VerifyingKey>,
    config: &VerifyConfig,
) -> Result<(), VerifyError> {
    if config.signing_required && (bundle.signature.is_empty() || bundle.public_key_id.is_empty()) {
        return Err(VerifyError::SigningRequired);
    }

    let computed_hash = sha256_hex(bundle.payload.as_bytes());
    if !veto_crypto::constant_time_hex_eq(&computed_hash, &bundle.payload_hash) {
        return Err(VerifyError::PayloadHashMismatch { expected: bundle.payload_hash.clone(), computed: computed_hash });
    }

    if let Some(pinned) = config.pinned_version {
        if bundle.version != pinned {
            return Err(VerifyError::VersionPinMismatch { pinned, actual: bundle.version });
        }
    }

    if let Some(pinned) = &config.pinned_hash {
        if !veto_crypto::constant_time_hex_eq(pinned, &computed_hash) {
            return Err(VerifyError::HashPinMismatch { pinned: pinned.clone(), actual: computed_hash });
        }
    }

    verify_bundle(bundle, trusted_keys, config.allow_key_rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn key_pair() -> (SigningKey, VerifyingKey) {
        let key = SigningKey::generate(&mut OsRng);
        let verifying = key.verifying_key();
        (key, verifying)
    }

    fn empty_rule_set() -> RuleSet {
        RuleSet { version: "1".to_string(), name: "empty".to_string(), description: None, rules: vec![] }
    }

    #[test]
    fn round_trip_parses_back_to_normalized_rule_set() {
        let (key, _) = key_pair();
        let bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        let parsed = parse_bundle_payload(&bundle).unwrap();
        assert_eq!(parsed, veto_rules::normalize(empty_rule_set()));
    }

    /// Regression test: an unsorted, un-trimmed rule set must still satisfy
    /// `parseBundlePayload(createSignedBundle(R, k, id)) == normalize(R)`.
    /// `empty_rule_set` alone can't catch a signer that forgets to
    /// normalize, since normalizing an empty rule set is a no-op.
    #[test]
    fn round_trip_normalizes_out_of_order_rule_set() {
        use veto_rules::{Action, Condition, Operator, Rule, Severity};

        let unordered = RuleSet {
            version: "1".to_string(),
            name: "  unordered  ".to_string(),
            description: None,
            rules: vec![
                Rule {
                    id: "low-rule".to_string(),
                    name: "Low".to_string(),
                    description: None,
                    enabled: true,
                    severity: Severity::Low,
                    action: Action::Log,
                    tools: vec!["Bash".to_string(), "apply_patch".to_string()],
                    conditions: vec![
                        Condition::Triple {
                            field: "arguments.zeta".to_string(),
                            operator: Operator::Equals,
                            value: serde_json::json!(1),
                        },
                        Condition::Triple {
                            field: "arguments.alpha".to_string(),
                            operator: Operator::Equals,
                            value: serde_json::json!(2),
                        },
                    ],
                    condition_groups: vec![],
                },
                Rule {
                    id: "critical-rule".to_string(),
                    name: "Critical".to_string(),
                    description: Some("  trims me  ".to_string()),
                    enabled: true,
                    severity: Severity::Critical,
                    action: Action::Block,
                    tools: vec![],
                    conditions: vec![],
                    condition_groups: vec![vec![Condition::Triple {
                        field: "arguments.path".to_string(),
                        operator: Operator::Contains,
                        value: serde_json::json!("etc"),
                    }]],
                },
            ],
        };

        let (key, _) = key_pair();
        let bundle = create_signed_bundle(&unordered, &key, "k1");
        let parsed = parse_bundle_payload(&bundle).unwrap();
        let expected = veto_rules::normalize(unordered.clone());

        assert_eq!(parsed, expected);
        // The fixture really was out of order: a signer that skipped
        // normalization would have parsed back to `unordered` unchanged.
        assert_ne!(parsed, unordered);
        assert_eq!(parsed.rules[0].id, "critical-rule");
    }

    #[test]
    fn trusted_exact_key_verifies() {
        let (key, verifying) = key_pair();
        let bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        let mut trusted = HashMap::new();
        trusted.insert("k1".to_string(), verifying);
        assert!(verify_bundle(&bundle, &trusted, false).is_ok());
    }

    #[test]
    fn untrusted_key_without_rotation_is_rejected() {
        let (key, _) = key_pair();
        let (_, other_verifying) = key_pair();
        let bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        let mut trusted = HashMap::new();
        trusted.insert("k2".to_string(), other_verifying);
        assert!(matches!(verify_bundle(&bundle, &trusted, false), Err(VerifyError::UntrustedKey(_))));
    }

    #[test]
    fn untrusted_key_with_rotation_and_member_key_verifies() {
        let (key, verifying) = key_pair();
        let bundle = create_signed_bundle(&empty_rule_set(), &key, "k1-rotated-out");
        let mut trusted = HashMap::new();
        trusted.insert("k2".to_string(), verifying);
        assert!(verify_bundle(&bundle, &trusted, true).is_ok());
    }

    #[test]
    fn tampered_payload_fails_signature_verification() {
        let (key, verifying) = key_pair();
        let mut bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        bundle.payload.push('X');
        let mut trusted = HashMap::new();
        trusted.insert("k1".to_string(), verifying);
        assert!(matches!(verify_bundle(&bundle, &trusted, false), Err(VerifyError::SignatureVerification)));
    }

    #[test]
    fn config_verify_catches_payload_hash_mismatch() {
        let (key, verifying) = key_pair();
        let mut bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        bundle.payload_hash = "0".repeat(64);
        let mut trusted = HashMap::new();
        trusted.insert("k1".to_string(), verifying);
        let result = verify_bundle_with_config(&bundle, &trusted, &VerifyConfig::default());
        assert!(matches!(result, Err(VerifyError::PayloadHashMismatch { .. })));
    }

    #[test]
    fn config_verify_enforces_version_pin() {
        let (key, verifying) = key_pair();
        let bundle = create_signed_bundle(&empty_rule_set(), &key, "k1");
        let mut trusted = HashMap::new();
        trusted.insert("k1".to_string(), verifying);
        let config = VerifyConfig { pinned_version: Some(99), ..Default::default() };
        assert!(matches!(
            verify_bundle_with_config(&bundle, &trusted, &config),
            Err(VerifyError::VersionPinMismatch { .. })
        ));
    }

    #[test]
    fn signing_required_rejects_unsigned_bundle() {
        let bundle = SignedBundle {
            payload: "{}".to_string(),
            signature: String::new(),
            public_key_id: String::new(),
            version: 1,
            payload_hash: sha256_hex(b"{}"),
            signed_at: Utc::now().to_rfc3339(),
        };
        let config = VerifyConfig { signing_required: true, ..Default::default() };
        let result = verify_bundle_with_config(&bundle, &HashMap::new(), &config);
        assert!(matches!(result, Err(VerifyError::SigningRequired)));
    }
}
