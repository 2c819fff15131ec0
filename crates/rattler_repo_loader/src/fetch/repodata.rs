//! Fetches a `repodata.json` file, validating the on-disk cache against an origin fingerprint
//! before asking the caller's `fetch` closure to contact the origin.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use fs_err as fs;
use tracing::instrument;

use super::{
    cache::RepoDataState, CacheAction, CachedData, FetchRepoDataError, FetchResponse,
    RepodataOrigin, Variant,
};
use crate::utils::LockedFile;

/// Fetch a `repodata.json` variant for a subdirectory, validating any existing cache entry
/// against the origin fingerprint described in `fetch`'s `FetchResponse::NotModified` arm before
/// falling back to the bytes it returns on a cache miss.
///
/// `fetch` is handed the currently cached origin (if any) and decides whether the remote copy is
/// still current; this mirrors the way `rattler_link` resolves an extracted package directory
/// through an injected closure rather than a concrete download client.
#[instrument(skip(fetch), fields(cache_path = %cache_path.display()))]
pub async fn fetch_repo_data<F, Fut>(
    cache_path: &Path,
    variant: Variant,
    cache_action: CacheAction,
    fetch: F,
) -> Result<CachedData, FetchRepoDataError>
where
    F: FnOnce(Option<RepodataOrigin>) -> Fut,
    Fut: Future<Output = anyhow::Result<FetchResponse>>,
{
    fs::create_dir_all(cache_path)?;

    let repo_data_json_path = cache_path.join(variant.file_name());
    let cache_state_path = cache_path.join(format!("{}.info.json", variant.file_name()));
    let lock_path = cache_path.join(format!("{}.lock", variant.file_name()));

    let _lock = LockedFile::open_rw(&lock_path, "repodata cache")
        .map_err(|err| FetchRepoDataError::FailedToAcquireLock(to_io_error(err)))?;

    let cached_state = RepoDataState::from_path(&cache_state_path).ok();

    if cache_action == CacheAction::ForceCacheOnly {
        return match cached_state {
            Some(cache_state) if repo_data_json_path.is_file() => Ok(CachedData {
                repo_data_json_path,
                cache_state,
                cache_hit: true,
            }),
            _ => Err(FetchRepoDataError::NotFound),
        };
    }

    if cache_action == CacheAction::NoCache {
        return fetch_and_persist(
            &repo_data_json_path,
            &cache_state_path,
            fetch(None).await?,
        );
    }

    let current_origin = cached_state.as_ref().map(RepoDataState::origin);
    let response = fetch(current_origin).await?;

    match response {
        FetchResponse::NotModified(origin) => {
            let Some(mut cache_state) = cached_state else {
                return Err(FetchRepoDataError::NotFound);
            };
            if !cache_state.origin().matches(&origin) {
                return Err(FetchRepoDataError::NotFound);
            }
            cache_state.cache_headers = origin.cache_headers;
            cache_state.to_path(&cache_state_path)?;
            Ok(CachedData {
                repo_data_json_path,
                cache_state,
                cache_hit: true,
            })
        }
        new @ FetchResponse::New { .. } => {
            if cache_action == CacheAction::UseCacheOnly {
                return Err(FetchRepoDataError::NoCacheAvailable);
            }
            fetch_and_persist(&repo_data_json_path, &cache_state_path, new)
        }
    }
}

fn fetch_and_persist(
    repo_data_json_path: &Path,
    cache_state_path: &Path,
    response: FetchResponse,
) -> Result<CachedData, FetchRepoDataError> {
    let FetchResponse::New { origin, bytes } = response else {
        return Err(FetchRepoDataError::NotFound);
    };

    let parent = repo_data_json_path
        .parent()
        .expect("cache path always has a parent");
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut temp_file, &bytes)?;
    temp_file.persist(repo_data_json_path)?;

    let metadata = fs::metadata(repo_data_json_path)?;
    let cache_state = RepoDataState {
        url: origin.url,
        cache_headers: origin.cache_headers,
        cache_last_modified: metadata.modified()?,
        cache_size: metadata.len(),
        blake2_hash: Some(rattler_digest::compute_bytes_digest::<rattler_digest::Blake2b256>(
            &bytes,
        )),
        has_zst: None,
        has_bz2: None,
    };
    cache_state.to_path(cache_state_path)?;

    Ok(CachedData {
        repo_data_json_path: repo_data_json_path.to_path_buf(),
        cache_state,
        cache_hit: false,
    })
}

fn to_io_error(err: anyhow::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err)
}
