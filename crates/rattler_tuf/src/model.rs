//! The v0.6 (mamba-native) root metadata dialect.
//!
//! This is the format mamba/rattler historically produced: a `delegations`
//! map with `root` and `key_mgr` entries rather than TUF's full
//! `root`/`targets`/`snapshot`/`timestamp` role set.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use hex::FromHex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, TrustChainError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub other_headers: Option<String>,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSpecVersion(pub String);

impl MetadataSpecVersion {
    /// The major component, e.g. `"0.6.0"` -> `0`.
    pub fn major(&self) -> u32 {
        self.0
            .split('.')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Root,
    KeyMgr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub delegations: BTreeMap<String, Delegation>,
    pub expiration: DateTime<Utc>,
    pub metadata_spec_version: MetadataSpecVersion,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub file_type: Type,
    pub version: Version,
}

impl Payload {
    /// Two-space pretty JSON, bit-exact, matching what signers hashed.
    pub fn canonical_serialize(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        Ok(serde_json::to_string_pretty(self)?.into_bytes())
    }

    pub fn hash(&self) -> String {
        let serialized = self
            .canonical_serialize()
            .expect("payload is always serializable");
        let mut hasher = Sha256::new();
        hasher.update(serialized);
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, PartialOrd, Ord, Eq)]
pub struct PublicKey(pub String);

impl PublicKey {
    pub fn verify(&self, payload: &Payload, signature: &Signature) -> bool {
        self.verify_bytes(
            &payload
                .canonical_serialize()
                .expect("payload is always serializable"),
            signature,
        )
    }

    /// Verify a signature over an arbitrary already-canonicalized byte string.
    /// Used both for v0.6 `Payload` and for the v1 dialect's minified JSON.
    pub fn verify_bytes(&self, serialized: &[u8], signature: &Signature) -> bool {
        let Ok(public_key_bytes) = <[u8; 32]>::from_hex(&self.0) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key_bytes) else {
            return false;
        };
        let Ok(signature_bytes) = hex::decode(&signature.signature) else {
            return false;
        };
        let Ok(ed_signature) = Ed25519Signature::try_from(signature_bytes.as_slice()) else {
            return false;
        };

        if let Some(other_headers) = &signature.other_headers {
            // GPG v4 trailer: the detached signature covers the canonical
            // payload followed by the trailer bytes, a fixed 0x04 0xFF
            // marker and the big-endian trailer length.
            let Ok(additional_header_data) = hex::decode(other_headers) else {
                return false;
            };
            let mut hasher = Sha256::new();
            hasher.update(serialized);
            hasher.update(&additional_header_data);
            hasher.update(b"\x04\xff");
            hasher.update((additional_header_data.len() as u32).to_be_bytes());
            let combined_hash = hasher.finalize();
            verifying_key.verify(&combined_hash, &ed_signature).is_ok()
        } else {
            verifying_key.verify(serialized, &ed_signature).is_ok()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub pubkeys: Vec<PublicKey>,
    pub threshold: u32,
}

impl Delegation {
    /// Count how many of `signatures` are valid under this delegation's
    /// keys, then compare against its threshold.
    pub fn check_threshold(
        &self,
        role: &str,
        payload: &Payload,
        signatures: &BTreeMap<PublicKey, Signature>,
    ) -> Result<()> {
        let valid = self
            .pubkeys
            .iter()
            .filter(|key| {
                signatures
                    .get(key)
                    .is_some_and(|sig| key.verify(payload, sig))
            })
            .count() as u32;
        if valid >= self.threshold {
            Ok(())
        } else {
            Err(TrustChainError::ThresholdError {
                role: role.to_string(),
                valid,
                threshold: self.threshold,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub signatures: BTreeMap<PublicKey, Signature>,
    pub signed: Payload,
}

impl Root {
    pub fn try_from_file(path: &Path) -> std::result::Result<Self, std::io::Error> {
        let root_str = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&root_str)?)
    }

    pub fn try_from_slice(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The delegation responsible for signing further root updates.
    pub fn root_delegation(&self) -> Option<&Delegation> {
        self.signed.delegations.get("root")
    }

    /// The delegation responsible for signing `key_mgr.json` (and, via it,
    /// repository metadata). Not involved in root-to-root updates directly.
    pub fn key_mgr_delegation(&self) -> Option<&Delegation> {
        self.signed.delegations.get("key_mgr")
    }

    /// Verify this root's own signatures against its own embedded keys.
    /// Used for self-consistency checks (e.g. a freshly generated root).
    pub fn verify_signatures(&self) -> std::result::Result<(), std::io::Error> {
        for (pubkey, sig) in &self.signatures {
            if !pubkey.verify(&self.signed, sig) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Bad signature",
                ));
            }
        }
        Ok(())
    }

    /// Verify that `self.signatures` meets the threshold of the `delegation`
    /// supplied (which may come from a *different* root — see the
    /// double-verification step in the update algorithm).
    pub fn verify_against(&self, role: &str, delegation: &Delegation) -> Result<()> {
        delegation.check_threshold(role, &self.signed, &self.signatures)
    }
}
