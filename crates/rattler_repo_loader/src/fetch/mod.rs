//! This module provides functionality to load and cache `repodata.json` files keyed by an
//! origin fingerprint. Actually retrieving bytes from a remote channel is an external
//! collaborator's job: this module only ever sees a [`FetchResponse`] handed to it by a closure
//! the caller supplies, the same boundary `rattler_link` draws around package extraction.

mod cache;
pub mod repodata;

pub use cache::{CacheHeaders, RepoDataState, RepodataOrigin};

use std::path::PathBuf;

/// The outcome of asking the caller's fetch closure for a `repodata.json` variant.
#[derive(Debug)]
pub enum FetchResponse {
    /// The cached copy is still valid; the origin fingerprint the caller observed is returned so
    /// the on-disk cache state can be refreshed (e.g. to bump `Cache-Control` expiry).
    NotModified(RepodataOrigin),

    /// New content was retrieved. `origin` is the fingerprint under which it should be cached.
    New {
        /// The fingerprint to store alongside the cached data.
        origin: RepodataOrigin,
        /// The raw (already decompressed) bytes of the repodata document.
        bytes: Vec<u8>,
    },
}

/// The result of a successful [`repodata::fetch_repo_data`] call.
#[derive(Debug, Clone)]
pub struct CachedData {
    /// Path to the (now up to date) `repodata.json` file on disk.
    pub repo_data_json_path: PathBuf,

    /// The cache state that was written alongside `repo_data_json_path`.
    pub cache_state: RepoDataState,

    /// Whether the data came straight from the cache without contacting the origin.
    pub cache_hit: bool,
}

/// Defines which type of repodata.json file to fetch. Usually you want to use the
/// [`Variant::AfterPatches`] variant because that reflects the repodata with any patches applied.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Fetch the `repodata.json` file. This `repodata.json` has repodata
    /// patches applied. Packages may have also been removed from this file
    /// (yanked).
    #[default]
    AfterPatches,

    /// Fetch the `repodata_from_packages.json` file. This file contains all
    /// packages with the information extracted from their index.json file.
    /// This file is not patched and contains all packages ever uploaded.
    ///
    /// Note that this file is not available for all channels. This only seems
    /// to be available for the conda-forge and bioconda channels on
    /// anaconda.org.
    FromPackages,

    /// Fetch `current_repodata.json` file. This file contains only the latest
    /// version of each package.
    ///
    /// Note that this file is not available for all channels. This only seems
    /// to be available for the conda-forge and bioconda channels on
    /// anaconda.org.
    Current,
}

impl Variant {
    /// Returns the file name of the repodata file to download.
    pub fn file_name(&self) -> &'static str {
        match self {
            Variant::AfterPatches => "repodata.json",
            Variant::FromPackages => "repodata_from_packages.json",
            Variant::Current => "current_repodata.json",
        }
    }
}

/// Defines how to use the repodata cache.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheAction {
    /// Use the cache if its up to date or fetch from the origin if there is no valid cached
    /// value.
    #[default]
    CacheOrFetch,

    /// Only use the cache, but error out if the cache is not up to date.
    UseCacheOnly,

    /// Only use the cache, ignore whether or not it is up to date.
    ForceCacheOnly,

    /// Do not use the cache even if there is an up to date entry.
    NoCache,
}

/// Errors that can occur while fetching or reading cached repodata.
#[derive(Debug, thiserror::Error)]
pub enum FetchRepoDataError {
    /// Failed to acquire the lock that guards the repodata cache directory.
    #[error("failed to acquire a lock on the repodata cache")]
    FailedToAcquireLock(#[source] std::io::Error),

    /// The caller's fetch closure returned an error.
    #[error(transparent)]
    FetchFailed(#[from] anyhow::Error),

    /// An IO error occurred while reading or writing the cache.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// `CacheAction::UseCacheOnly` was requested but no up to date cache entry exists.
    #[error("there is no up to date cache entry available and the cache action forbids fetching")]
    NoCacheAvailable,

    /// Neither a cache entry nor a fetch was able to produce a result.
    #[error("repodata not found")]
    NotFound,

    /// Failed to persist the freshly written repodata.json atomically.
    #[error(transparent)]
    FailedToPersist(#[from] tempfile::PersistError),
}
