//! The TUF-style v1 root metadata dialect (`_type="root"`, `spec_version="1.0.*"`).
//!
//! Structurally this is much closer to upstream TUF than the v0.6 dialect:
//! keys are addressed by id in a top-level `keys` map, and each of the four
//! standard roles (`root`, `targets`, `snapshot`, `timestamp`) names its own
//! key ids and threshold under `roles`. Signatures are a flat array of
//! `{keyid, sig}` pairs rather than a map keyed by the public key itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TrustChainError},
    model::{Delegation, PublicKey, Signature as V06Signature},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyIdSignature {
    pub keyid: String,
    pub sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedV1 {
    #[serde(rename = "_type")]
    pub type_: String,
    pub spec_version: String,
    pub version: u32,
    pub expires: chrono::DateTime<chrono::Utc>,
    pub keys: BTreeMap<String, Key>,
    pub roles: BTreeMap<String, RoleKeys>,
}

impl SignedV1 {
    /// Minified JSON, matching TUF's canonical JSON signing convention for
    /// this dialect (as opposed to v0.6's two-space pretty-printed form).
    pub fn canonical_serialize(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        Ok(serde_json::to_string(self)?.into_bytes())
    }

    pub fn major(&self) -> u32 {
        self.spec_version
            .split('.')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Build the [`Delegation`] equivalent to a named role's key set, so
    /// the shared threshold-checking logic in [`crate::model`] can be reused
    /// across both dialects.
    pub fn delegation_for(&self, role: &str) -> Option<Delegation> {
        let role_keys = self.roles.get(role)?;
        let pubkeys = role_keys
            .keyids
            .iter()
            .filter_map(|id| self.keys.get(id))
            .map(|k| PublicKey(k.keyval.public.clone()))
            .collect();
        Some(Delegation {
            pubkeys,
            threshold: role_keys.threshold,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootV1 {
    pub signatures: Vec<KeyIdSignature>,
    pub signed: SignedV1,
}

impl RootV1 {
    pub fn try_from_slice(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Verify `self.signatures` against an externally-supplied delegation
    /// (the `root` role's keys from either the current or candidate root,
    /// per the update algorithm's double-check).
    pub fn verify_against(&self, role: &str, delegation: &Delegation) -> Result<()> {
        let serialized = self.signed.canonical_serialize()?;
        let valid = self
            .signatures
            .iter()
            .filter_map(|sig| {
                let pubkey = PublicKey(find_keyid_pubkey(self, &sig.keyid)?);
                if !delegation.pubkeys.contains(&pubkey) {
                    return None;
                }
                let v06_sig = V06Signature {
                    other_headers: None,
                    signature: sig.sig.clone(),
                };
                pubkey.verify_bytes(&serialized, &v06_sig).then_some(())
            })
            .count() as u32;
        if valid >= delegation.threshold {
            Ok(())
        } else {
            Err(TrustChainError::ThresholdError {
                role: role.to_string(),
                valid,
                threshold: delegation.threshold,
            })
        }
    }
}

fn find_keyid_pubkey(root: &RootV1, keyid: &str) -> Option<String> {
    root.signed.keys.get(keyid).map(|k| k.keyval.public.clone())
}

/// Construct a v1 root equivalent to a v0.6 root's `root`/`key_mgr`
/// delegations, mapping `root -> root`, `key_mgr -> targets`, and leaving
/// `snapshot`/`timestamp` delegated to the same keys as `targets` (v0.6 has
/// no notion of those two roles). The caller re-signs the result with a key
/// trusted by the v0.6 root's `root` delegation.
pub fn upgrade_from_v06(
    v06: &crate::model::Root,
    expires: chrono::DateTime<chrono::Utc>,
) -> Result<SignedV1> {
    let root_delegation = v06
        .root_delegation()
        .ok_or(TrustChainError::UpgradeRequiresSigningKey)?;
    let key_mgr_delegation = v06.key_mgr_delegation().unwrap_or(root_delegation);

    let mut keys = BTreeMap::new();
    let mut register = |delegation: &Delegation, keys: &mut BTreeMap<String, Key>| -> Vec<String> {
        delegation
            .pubkeys
            .iter()
            .map(|pk| {
                let keyid = pk.0.clone();
                keys.entry(keyid.clone()).or_insert_with(|| Key {
                    keytype: "ed25519".to_string(),
                    scheme: "ed25519".to_string(),
                    keyval: KeyVal {
                        public: pk.0.clone(),
                    },
                });
                keyid
            })
            .collect()
    };

    let root_keyids = register(root_delegation, &mut keys);
    let targets_keyids = register(key_mgr_delegation, &mut keys);

    let mut roles = BTreeMap::new();
    roles.insert(
        "root".to_string(),
        RoleKeys {
            keyids: root_keyids,
            threshold: root_delegation.threshold,
        },
    );
    roles.insert(
        "targets".to_string(),
        RoleKeys {
            keyids: targets_keyids.clone(),
            threshold: key_mgr_delegation.threshold,
        },
    );
    roles.insert(
        "snapshot".to_string(),
        RoleKeys {
            keyids: targets_keyids.clone(),
            threshold: key_mgr_delegation.threshold,
        },
    );
    roles.insert(
        "timestamp".to_string(),
        RoleKeys {
            keyids: targets_keyids,
            threshold: key_mgr_delegation.threshold,
        },
    );

    Ok(SignedV1 {
        type_: "root".to_string(),
        spec_version: "1.0.17".to_string(),
        version: v06.signed.version.0 + 1,
        expires,
        keys,
        roles,
    })
}
