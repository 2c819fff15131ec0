//! TUF-style trust chain validation for conda repository metadata.
//!
//! A [`TrustChain`] holds the currently-trusted `root.json` and offers
//! [`TrustChain::update`] to roll it forward to a signed successor, following
//! the same shape as TUF's root-update procedure (spec §5.3.4-5.3.5): the
//! candidate is checked against both the *current* root's delegated keys and
//! its *own* delegated keys before it is accepted, which defeats a
//! compromised signing key from unilaterally rotating trust onto itself.
//!
//! Two metadata dialects are supported side by side: the mamba-native
//! `v0.6` dialect ([`model::Root`]) and the TUF-proper `v1` dialect
//! ([`v1::RootV1`]). A `v0.6` chain can be upgraded onto `v1` via
//! [`v1::upgrade_from_v06`].

pub mod error;
pub mod model;
pub mod v1;

use error::{Result, TrustChainError};
use model::{Delegation, Root as RootV06};
use v1::RootV1;

/// The currently-trusted root, tagged by dialect.
#[derive(Debug, Clone)]
pub enum RootRole {
    /// The mamba-native `v0.6` dialect.
    V06(RootV06),
    /// The TUF-proper `v1` dialect.
    V1(RootV1),
}

impl RootRole {
    /// Parse a candidate root file, sniffing its dialect from the `signed`
    /// sub-object's type tag rather than trusting the filename.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let is_v1 = value
            .get("signed")
            .and_then(|s| s.get("_type"))
            .is_some();
        if is_v1 {
            Ok(RootRole::V1(RootV1::try_from_slice(bytes)?))
        } else {
            Ok(RootRole::V06(RootV06::try_from_slice(bytes)?))
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            RootRole::V06(root) => root.signed.version.0,
            RootRole::V1(root) => root.signed.version,
        }
    }

    pub fn spec_version_major(&self) -> u32 {
        match self {
            RootRole::V06(root) => root.signed.metadata_spec_version.major(),
            RootRole::V1(root) => root.signed.major(),
        }
    }

    /// The delegation that must authorize the *next* root update — `root`
    /// in both dialects.
    fn root_delegation(&self) -> Result<Delegation> {
        match self {
            RootRole::V06(root) => root
                .root_delegation()
                .cloned()
                .ok_or(TrustChainError::UpgradeRequiresSigningKey),
            RootRole::V1(root) => root
                .signed
                .delegation_for("root")
                .ok_or(TrustChainError::UpgradeRequiresSigningKey),
        }
    }

    /// Verify `self`'s own signatures against an externally supplied
    /// delegation (which may come from the current root or from `self`).
    fn verify_against(&self, role: &str, delegation: &Delegation) -> Result<()> {
        match self {
            RootRole::V06(root) => root.verify_against(role, delegation),
            RootRole::V1(root) => root.verify_against(role, delegation),
        }
    }
}

/// A chain of trust anchored at a locally-held root of trust.
///
/// Only the latest root is retained; callers that need the full history
/// should persist each accepted root themselves (one JSON file per version,
/// as the filename convention in [`Self::update`] implies).
#[derive(Debug, Clone)]
pub struct TrustChain {
    current: RootRole,
}

impl TrustChain {
    /// Anchor a new chain at an already-verified root. Callers are
    /// responsible for establishing initial trust out of band (e.g. a root
    /// shipped with the distribution).
    pub fn new(root: RootRole) -> Self {
        Self { current: root }
    }

    /// The currently-trusted root.
    pub fn current(&self) -> &RootRole {
        &self.current
    }

    /// Attempt to roll the chain forward to `candidate_bytes`, named
    /// `filename` as it was found on disk/remote. On success the chain's
    /// current root becomes the candidate; on failure the chain is
    /// untouched and the existing root remains valid.
    pub fn update(&mut self, filename: &str, candidate_bytes: &[u8]) -> Result<()> {
        let expected_version = self.current.version() + 1;
        let expected_major = self.current.spec_version_major();
        validate_filename(filename, expected_version, expected_major)?;

        let candidate = RootRole::parse(candidate_bytes)?;

        let candidate_version = candidate.version();
        if candidate_version <= self.current.version() {
            return Err(TrustChainError::RollbackError {
                current: self.current.version(),
                candidate: candidate_version,
            });
        }
        if candidate_version != expected_version {
            return Err(TrustChainError::RoleMetadataError {
                expected: expected_version,
                candidate: candidate_version,
            });
        }

        let candidate_major = candidate.spec_version_major();
        if candidate_major > expected_major + 1 {
            return Err(TrustChainError::SpecVersionError {
                current_major: expected_major,
                candidate_major,
            });
        }

        // Step 3: the candidate must be signed by enough of the *current*
        // root's delegated keys.
        let current_delegation = self.current.root_delegation()?;
        candidate.verify_against("root", &current_delegation)?;

        // Step 4: the candidate must also be signed by enough of its *own*
        // delegated keys, so a leaked old key cannot alone promote a rogue
        // root that names only itself as trusted going forward.
        let new_delegation = candidate.root_delegation()?;
        candidate.verify_against("root", &new_delegation)?;

        self.current = candidate;
        Ok(())
    }
}

/// Validate a candidate root filename against `[N.]?[sv<major>.]?root.json`.
fn validate_filename(name: &str, expected_version: u32, expected_major: u32) -> Result<()> {
    let re = regex::Regex::new(r"^(?:(?P<version>\d+)\.)?(?:(?P<specver>s?v\d+)\.)?root\.json$")
        .expect("static pattern is valid");
    let caps = re
        .captures(name)
        .ok_or_else(|| TrustChainError::RoleFileNameError(name.to_string()))?;

    if let Some(version) = caps.name("version") {
        let version: u32 = version
            .as_str()
            .parse()
            .map_err(|_| TrustChainError::RoleFileNameError(name.to_string()))?;
        if version != expected_version {
            return Err(TrustChainError::RoleFileNameError(name.to_string()));
        }
    }

    if let Some(specver) = caps.name("specver") {
        let digits: String = specver.as_str().chars().filter(char::is_ascii_digit).collect();
        let major: u32 = digits
            .parse()
            .map_err(|_| TrustChainError::RoleFileNameError(name.to_string()))?;
        if major != expected_major {
            return Err(TrustChainError::RoleFileNameError(name.to_string()));
        }
    }

    Ok(())
}
