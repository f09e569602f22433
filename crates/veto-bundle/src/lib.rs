//! Signed-bundle load path (specification §4.13): wires the canonical
//! signer (`veto-crypto`) up with pinning and key-rotation config.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod model;
mod verify;

pub use model::SignedBundle;
pub use verify::{
    create_signed_bundle, parse_bundle_payload, verify_bundle, verify_bundle_with_config, VerifyConfig, VerifyError,
};
