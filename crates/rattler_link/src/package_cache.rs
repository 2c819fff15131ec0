//! This module provides functionality to cache extracted Conda packages. See [`PackageCache`].
//!
//! Populating the cache (downloading and extracting an archive) is an external concern: this
//! module only provides the coalescing/locking machinery plus the writable-cache-directory probe
//! described for the package cache directory in the concurrency & resource model. The caller
//! supplies a `fetch` closure that materializes the package directory; this module never reaches
//! out to the network or an archive codec itself.

use crate::validation::validate_package_directory;
use ahash::HashMap as AHashMap;
use itertools::Itertools;
use rattler_conda_types::{package::ArchiveIdentifier, PackageRecord};
use std::error::Error;
use std::{
    fmt::{Display, Formatter},
    fs::OpenOptions,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;
use tracing::Instrument;

/// A [`PackageCache`] manages a cache of extracted Conda packages on disk.
///
/// The store does not provide an implementation to get the data into the store. Instead this is
/// left up to the user when the package is requested. If the package is found in the cache it is
/// returned immediately. However, if the cache is stale a user defined function is called to
/// populate the cache. This separates the concerns of caching and fetching of the content.
#[derive(Clone)]
pub struct PackageCache {
    inner: Arc<Mutex<PackageCacheInner>>,
}

/// Provides a unique identifier for packages in the cache.
#[derive(Debug, Hash, Clone, Eq, PartialEq)]
pub struct CacheKey {
    name: String,
    version: String,
    build_string: String,
}

impl From<ArchiveIdentifier> for CacheKey {
    fn from(pkg: ArchiveIdentifier) -> Self {
        CacheKey {
            name: pkg.name,
            version: pkg.version,
            build_string: pkg.build_string,
        }
    }
}

impl From<&PackageRecord> for CacheKey {
    fn from(record: &PackageRecord) -> Self {
        Self {
            name: record.name.as_normalized().to_string(),
            version: record.version.to_string(),
            build_string: record.build.to_string(),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", &self.name, &self.version, &self.build_string)
    }
}

#[derive(Default)]
struct PackageCacheInner {
    path: PathBuf,
    packages: AHashMap<CacheKey, Arc<Mutex<Package>>>,
}

#[derive(Default)]
struct Package {
    path: Option<PathBuf>,
    inflight: Option<broadcast::Sender<Result<PathBuf, PackageCacheError>>>,
}

/// An error that might be returned from one of the caching functions of the [`PackageCache`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PackageCacheError {
    /// The caller-supplied `fetch` closure failed to populate the cache entry.
    #[error(transparent)]
    FetchError(#[from] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

/// The name of the sentinel file used to probe whether a cache directory is writable by the
/// current (and other) users. Its presence, with group-shared permissions, is what lets a
/// multi-user package cache be safely reused across prefixes and processes.
const WRITABLE_SENTINEL_FILE: &str = ".rattler_cache_writable";

/// Ensures `dir` exists and is writable by touching a sentinel file in it.
///
/// On POSIX this also creates the directory with group-shared permissions (setgid + 0775) so
/// that a package cache can be safely shared between multiple users of the same machine.
pub fn ensure_writable_cache_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perm = std::fs::metadata(dir)?.permissions();
        // setgid (02000) + rwxrwxr-x (0775)
        perm.set_mode(0o2775);
        // Best-effort: some filesystems (and non-owners) reject this; that's fine, the
        // directory is still usable, just not guaranteed group-shared.
        let _ = std::fs::set_permissions(dir, perm);
    }

    let sentinel = dir.join(WRITABLE_SENTINEL_FILE);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&sentinel)?;
    std::fs::remove_file(&sentinel)?;
    Ok(())
}

impl PackageCache {
    /// Constructs a new [`PackageCache`] located at the specified path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PackageCacheInner {
                path: path.into(),
                packages: Default::default(),
            })),
        }
    }

    /// Returns the directory that contains the specified package.
    ///
    /// If the package was previously successfully fetched and stored in the cache the directory
    /// containing the data is returned immediately. If the package was not previously fetched the
    /// filesystem is checked to see if a directory with valid package content exists. Otherwise,
    /// the user provided `fetch` function is called to populate the cache.
    ///
    /// If the package is already being fetched by another task/thread the request is coalesced. No
    /// duplicate fetch is performed.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        pkg: impl Into<CacheKey>,
        fetch: F,
    ) -> Result<PathBuf, PackageCacheError>
    where
        F: (FnOnce(PathBuf) -> Fut) + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let cache_key = pkg.into();

        // Get the package entry
        let (package, pkg_cache_dir) = {
            let mut inner = self.inner.lock().unwrap();
            let destination = inner.path.join(cache_key.to_string());
            let package = inner.packages.entry(cache_key).or_default().clone();
            (package, destination)
        };

        let mut rx = {
            // Only sync code in this block
            let mut inner = package.lock().unwrap();

            // If there exists an existing value in our cache, we can return that.
            if let Some(path) = inner.path.as_ref() {
                return Ok(path.clone());
            }

            // Is there an in-flight request for the package?
            if let Some(inflight) = inner.inflight.as_ref() {
                inflight.subscribe()
            } else {
                // There is no in-flight request so we start one!
                let (tx, rx) = broadcast::channel(1);
                inner.inflight = Some(tx.clone());

                let package = package.clone();
                tokio::spawn(async move {
                    let result = validate_or_fetch_to_cache(pkg_cache_dir.clone(), fetch)
                        .instrument(
                            tracing::debug_span!("validating", path = %pkg_cache_dir.display()),
                        )
                        .await;

                    {
                        // only sync code in this block
                        let mut package = package.lock().unwrap();
                        package.inflight = None;

                        match result {
                            Ok(_) => {
                                package.path.replace(pkg_cache_dir.clone());
                                let _ = tx.send(Ok(pkg_cache_dir));
                            }
                            Err(e) => {
                                let _ = tx.send(Err(e));
                            }
                        }
                    }
                });

                rx
            }
        };

        rx.recv().await.expect("in-flight request has died")
    }
}

/// Validates that the package that is currently stored is a valid package and otherwise calls the
/// `fetch` method to populate the cache.
async fn validate_or_fetch_to_cache<F, Fut, E>(
    path: PathBuf,
    fetch: F,
) -> Result<(), PackageCacheError>
where
    F: FnOnce(PathBuf) -> Fut + Send,
    Fut: Future<Output = Result<(), E>> + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // If the directory already exists validate the contents of the package
    if path.is_dir() {
        let path_inner = path.clone();
        match tokio::task::spawn_blocking(move || validate_package_directory(&path_inner)).await {
            Ok(Ok(_)) => {
                tracing::debug!("validation succeeded");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::warn!("validation failed: {e}",);
                if let Some(cause) = e.source() {
                    tracing::debug!(
                        "  Caused by: {}",
                        std::iter::successors(Some(cause), |e| (*e).source())
                            .format("\n  Caused by: ")
                    );
                }
            }
            Err(e) => {
                if let Ok(panic) = e.try_into_panic() {
                    std::panic::resume_unwind(panic)
                }
            }
        }
    }

    // Otherwise, defer to the populate method to fill our cache.
    fetch(path)
        .await
        .map_err(|e| PackageCacheError::FetchError(Arc::new(e)))
}

#[cfg(test)]
mod test {
    use super::{ensure_writable_cache_dir, PackageCache};
    use rattler_conda_types::package::ArchiveIdentifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    pub async fn test_package_cache_coalesces_concurrent_fetches() {
        let packages_dir = tempdir().unwrap();
        let cache = PackageCache::new(packages_dir.path());
        let fetch_count = Arc::new(AtomicUsize::new(0));

        let pkg = ArchiveIdentifier {
            name: "foo".to_string(),
            version: "1.0".to_string(),
            build_string: "0".to_string(),
        };

        let fetches = (0..8).map(|_| {
            let cache = cache.clone();
            let fetch_count = fetch_count.clone();
            let pkg = pkg.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(pkg, move |destination| {
                        let fetch_count = fetch_count.clone();
                        async move {
                            fetch_count.fetch_add(1, Ordering::SeqCst);
                            std::fs::create_dir_all(&destination)?;
                            std::fs::write(destination.join("info").join("paths.json"), "")
                                .or_else(|_| {
                                    std::fs::create_dir_all(destination.join("info"))?;
                                    std::fs::write(
                                        destination.join("info").join("paths.json"),
                                        r#"{"paths_version":1,"paths":[]}"#,
                                    )
                                })?;
                            Ok::<_, std::io::Error>(())
                        }
                    })
                    .await
                    .unwrap()
            })
        });

        let results = futures::future::join_all(fetches).await;
        for result in results {
            result.unwrap();
        }

        // Even though 8 concurrent requests came in, the fetch closure must only run once; the
        // rest should be coalesced onto the in-flight request or hit the warm cache entry.
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ensure_writable_cache_dir() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("pkgs");
        ensure_writable_cache_dir(&cache_dir).unwrap();
        assert!(cache_dir.is_dir());
    }
}
