//! Error taxonomy for the trust chain.
//!
//! Every variant here corresponds to a named error condition from the trust
//! chain's update algorithm: a candidate root is rejected at a specific step
//! and the existing local root remains valid regardless of which variant is
//! returned.

/// Errors produced while loading or updating a chain of trust.
#[derive(Debug, thiserror::Error)]
pub enum TrustChainError {
    /// The candidate file could not be parsed as JSON, or its `signed`
    /// sub-object is missing a field required by its declared dialect.
    #[error("failed to parse role metadata: {0}")]
    RoleFileError(#[from] serde_json::Error),

    /// The candidate's filename does not match `[N.]?[sv<major>.]?root.json`
    /// for the expected next version and major spec version.
    #[error("root metadata filename '{0}' does not match the expected pattern")]
    RoleFileNameError(String),

    /// The candidate does not carry `threshold` valid signatures from the
    /// keys it is being checked against (either the current or the new
    /// root's delegated keys).
    #[error("candidate root has {valid} valid signature(s) from '{role}' but {threshold} are required")]
    ThresholdError {
        /// Which delegated role's keys the check was performed against.
        role: String,
        /// Number of valid signatures found.
        valid: u32,
        /// Number of signatures required.
        threshold: u32,
    },

    /// The candidate's version does not equal the current version plus one.
    /// A version equal to or lower than the current one signals a rollback
    /// attempt; this is distinguished from [`TrustChainError::RoleMetadataError`]
    /// which covers version *jumps*.
    #[error("root version rollback: candidate version {candidate} is not newer than current version {current}")]
    RollbackError {
        /// The currently trusted root's version.
        current: u32,
        /// The candidate root's version.
        candidate: u32,
    },

    /// The candidate's version skips ahead of `current + 1`.
    #[error("root version jump: candidate version {candidate} skips ahead of expected version {expected}")]
    RoleMetadataError {
        /// The version the candidate was expected to carry.
        expected: u32,
        /// The candidate root's actual version.
        candidate: u32,
    },

    /// The candidate's spec-version major component differs from the
    /// current root's by more than one.
    #[error("spec version gap too large: current major {current_major}, candidate major {candidate_major}")]
    SpecVersionError {
        /// Major spec version of the currently trusted root.
        current_major: u32,
        /// Major spec version of the candidate root.
        candidate_major: u32,
    },

    /// A v0.6 root cannot be mechanically upgraded to v1 without a
    /// caller-supplied signing key (the upgrade re-signs the derived v1
    /// structure).
    #[error("upgrading a v0.6 root to v1 requires a signing key")]
    UpgradeRequiresSigningKey,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TrustChainError>;
