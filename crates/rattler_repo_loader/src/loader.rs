//! Parses a fetched `repodata.json` into [`PackageRecord`]s and feeds them into a
//! [`rattler_solver::Pool`], maintaining a binary cache of the parsed result keyed by
//! [`RepodataOrigin`].
//!
//! This is the glue between [`crate::fetch`] (which produces validated JSON bytes on disk) and
//! [`rattler_solver::Pool`] (which wants `&PackageRecord`s to intern into solvables). The binary
//! cache trades a JSON parse for a single `rmp-serde` deserialization on repeat loads of an
//! unchanged subdirectory.

use std::path::Path;

use rattler_conda_types::{PackageRecord, RepoData};
use rattler_solver::{Pool, RepoId};
use serde::{Deserialize, Serialize};

use crate::fetch::RepodataOrigin;

/// Bumped whenever the binary cache's on-disk shape changes incompatibly; a version mismatch is
/// treated exactly like an origin mismatch (reparse from JSON).
const CACHE_TOOL_VERSION: u32 = 1;

/// Errors produced while turning `repodata.json` bytes into pool-ready records.
#[derive(Debug, thiserror::Error)]
pub enum RepoParseError {
    /// The `repodata.json` bytes were not valid JSON, or did not match the expected shape.
    #[error("failed to parse repodata.json: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred reading or writing the binary cache.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The binary cache could not be encoded.
    #[error("failed to encode binary repodata cache: {0}")]
    CacheEncode(#[from] rmp_serde::encode::Error),
}

/// Governs which `repodata.json` sections are parsed and whether the pip-as-python-dependency
/// transform is applied. `pip_as_python_dependency` is folded into the binary cache's header so a
/// cache produced with the transform on can never be silently reused with it off (and vice
/// versa) — flipping the option forces a reparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Only load the `packages` (tar.bz2) section, skipping `packages.conda`.
    pub tar_bz2_only: bool,
    /// Inject a `pip` dependency into every `python` record, and a `python` dependency into
    /// every `pip` record.
    pub pip_as_python_dependency: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            tar_bz2_only: false,
            pip_as_python_dependency: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheHeader {
    origin: RepodataOrigin,
    tool_version: u32,
    tar_bz2_only: bool,
    pip_as_python_dependency: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedRepo {
    header: CacheHeader,
    records: Vec<PackageRecord>,
}

impl CacheHeader {
    fn matches(&self, origin: &RepodataOrigin, options: &LoadOptions) -> bool {
        self.tool_version == CACHE_TOOL_VERSION
            && self.tar_bz2_only == options.tar_bz2_only
            && self.pip_as_python_dependency == options.pip_as_python_dependency
            && self.origin.matches(origin)
    }
}

/// Parse `packages` and (unless `tar_bz2_only`) `packages.conda` out of a `repodata.json` byte
/// string into a flat list of records. Insertion order is not guaranteed to match the source
/// file — callers that need pool-state reproducibility across runs must not rely on it, per the
/// "bit-identical modulo insertion order" requirement this loader is held to.
fn parse_repodata_json(bytes: &[u8], options: &LoadOptions) -> Result<Vec<PackageRecord>, RepoParseError> {
    let repo_data: RepoData = serde_json::from_slice(bytes)?;
    let mut records: Vec<PackageRecord> = repo_data.packages.into_values().collect();
    if !options.tar_bz2_only {
        records.extend(repo_data.conda_packages.into_values());
    }
    Ok(records)
}

/// Inject `pip` as an implicit dependency of `python`, and `python` as an implicit dependency of
/// `pip`, mirroring the well-known conda convention that a `python` environment should be able to
/// `pip install` without the user spelling out the dependency explicitly.
fn apply_pip_as_python_dependency(records: &mut [PackageRecord]) {
    for record in records.iter_mut() {
        let name = record.name.as_normalized();
        let already_depends_on = |deps: &[String], target: &str| {
            deps.iter().any(|d| {
                d.split_once(|c: char| matches!(c, ' ' | '=' | '<' | '>'))
                    .map_or(d.as_str(), |(n, _)| n)
                    == target
            })
        };
        if name == "python" && !already_depends_on(&record.depends, "pip") {
            record.depends.push("pip".to_string());
        } else if name == "pip" && !already_depends_on(&record.depends, "python") {
            record.depends.push("python".to_string());
        }
    }
}

/// Attempt to read a binary cache at `cache_path`, returning `None` (a cache miss, never an
/// error) on any I/O failure, decode failure, or header mismatch.
fn read_binary_cache(cache_path: &Path, origin: &RepodataOrigin, options: &LoadOptions) -> Option<Vec<PackageRecord>> {
    let bytes = std::fs::read(cache_path).ok()?;
    let cached: CachedRepo = rmp_serde::from_slice(&bytes).ok()?;
    if cached.header.matches(origin, options) {
        Some(cached.records)
    } else {
        None
    }
}

/// Write the binary cache atomically (temp file + rename) next to `cache_path`. Failure is
/// logged and swallowed by the caller — per spec this is a warning, not a fatal error.
fn write_binary_cache(
    cache_path: &Path,
    origin: &RepodataOrigin,
    options: &LoadOptions,
    records: &[PackageRecord],
) -> Result<(), RepoParseError> {
    let cached = CachedRepo {
        header: CacheHeader {
            origin: origin.clone(),
            tool_version: CACHE_TOOL_VERSION,
            tar_bz2_only: options.tar_bz2_only,
            pip_as_python_dependency: options.pip_as_python_dependency,
        },
        records: records.to_vec(),
    };
    let bytes = rmp_serde::to_vec(&cached)?;
    let parent = cache_path.parent().expect("cache path always has a parent");
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, &bytes)?;
    tmp.persist(cache_path)
        .map_err(|persist_err| RepoParseError::Io(persist_err.error))?;
    Ok(())
}

/// Load the package records for one subdirectory, reusing `cache_path`'s binary cache if its
/// header matches `origin` and `options`, otherwise reparsing `json_bytes` and refreshing the
/// cache. A cache-write failure is logged at `warn` and does not fail the load.
pub fn load_records(
    cache_path: &Path,
    origin: &RepodataOrigin,
    json_bytes: &[u8],
    options: &LoadOptions,
) -> Result<Vec<PackageRecord>, RepoParseError> {
    if let Some(records) = read_binary_cache(cache_path, origin, options) {
        tracing::debug!(path = %cache_path.display(), "binary repodata cache hit");
        return Ok(records);
    }

    tracing::debug!(path = %cache_path.display(), "binary repodata cache miss, parsing json");
    let mut records = parse_repodata_json(json_bytes, options)?;
    if options.pip_as_python_dependency {
        apply_pip_as_python_dependency(&mut records);
    }

    if let Err(err) = write_binary_cache(cache_path, origin, options, &records) {
        tracing::warn!(path = %cache_path.display(), error = %err, "failed to write binary repodata cache");
    }

    Ok(records)
}

/// Intern every record into `pool` under a freshly created repo, wiring up `depends`,
/// `constrains`, and the `track_features`/build-string synthetic self-provides that let a
/// `MatchSpec` target a specific build the same way it targets a bare package name. Returns the
/// new repo's id.
///
/// `records` must outlive `pool` (the pool only stores references), so callers typically own a
/// `Vec<PackageRecord>` returned by [`load_records`] for the lifetime of the solve.
pub fn intern_into_pool<'a>(pool: &mut Pool<'a>, records: &'a [PackageRecord]) -> RepoId {
    let repo_id = pool.new_repo();
    for record in records {
        let solvable_id = pool.add_package(repo_id, record);

        for dep in &record.depends {
            pool.add_dependency(solvable_id, dep.clone());
        }
        for constrain in &record.constrains {
            pool.add_constrains(solvable_id, constrain.clone());
        }

        if !record.track_features.is_empty() {
            pool.add_self_provide(
                solvable_id,
                format!("{}[track_features]", record.name.as_normalized()),
            );
        }
        if !record.build.is_empty() {
            pool.add_self_provide(
                solvable_id,
                format!("{}[{}]", record.name.as_normalized(), record.build),
            );
        }
    }
    repo_id
}

#[cfg(test)]
mod test {
    use rattler_conda_types::{PackageName, VersionWithSource};
    use url::Url;

    use super::*;
    use crate::fetch::cache::CacheHeaders;

    fn origin(etag: &str) -> RepodataOrigin {
        RepodataOrigin {
            url: Url::parse("https://conda.example.com/noarch/repodata.json").unwrap(),
            cache_headers: CacheHeaders {
                etag: Some(etag.to_owned()),
                last_modified: None,
                cache_control: None,
            },
        }
    }

    fn record(name: &str, depends: &[&str]) -> PackageRecord {
        PackageRecord {
            arch: None,
            build: "0".to_string(),
            build_number: 0,
            constrains: Vec::new(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            features: None,
            legacy_bz2_md5: None,
            legacy_bz2_size: None,
            license: None,
            license_family: None,
            md5: None,
            name: PackageName::new_unchecked(name),
            noarch: Default::default(),
            platform: None,
            purls: None,
            python_site_packages_path: None,
            run_exports: None,
            sha256: None,
            size: None,
            subdir: "noarch".to_string(),
            timestamp: None,
            track_features: Vec::new(),
            version: "1.0".parse::<VersionWithSource>().unwrap(),
        }
    }

    const SAMPLE_JSON: &str = r#"{
        "info": {},
        "packages": {
            "foo-1.0-0.tar.bz2": { "name": "foo", "version": "1.0", "build": "0", "build_number": 0, "depends": ["bar"] }
        },
        "packages.conda": {
            "bar-1.0-0.conda": { "name": "bar", "version": "1.0", "build": "0", "build_number": 0 }
        }
    }"#;

    #[test]
    fn pip_as_python_dependency_is_injected_both_ways() {
        let mut records = vec![record("python", &[]), record("pip", &[])];
        apply_pip_as_python_dependency(&mut records);
        assert!(records[0].depends.contains(&"pip".to_string()));
        assert!(records[1].depends.contains(&"python".to_string()));
    }

    #[test]
    fn pip_as_python_dependency_is_idempotent() {
        let mut records = vec![record("python", &["pip >=20"])];
        apply_pip_as_python_dependency(&mut records);
        assert_eq!(records[0].depends.iter().filter(|d| d.starts_with("pip")).count(), 1);
    }

    #[test]
    fn parses_both_package_sections() {
        let options = LoadOptions::default();
        let records = parse_repodata_json(SAMPLE_JSON.as_bytes(), &options).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn tar_bz2_only_skips_conda_section() {
        let options = LoadOptions {
            tar_bz2_only: true,
            ..LoadOptions::default()
        };
        let records = parse_repodata_json(SAMPLE_JSON.as_bytes(), &options).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_normalized(), "foo");
    }

    #[test]
    fn binary_cache_round_trips_and_invalidates_on_origin_change() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("noarch.rkyv");
        let options = LoadOptions::default();
        let origin_a = origin("\"abc\"");

        let first = load_records(&cache_path, &origin_a, SAMPLE_JSON.as_bytes(), &options).unwrap();
        assert_eq!(first.len(), 2);

        // Second load with the same origin and unparsable json must still succeed, proving the
        // binary cache (not the json) was used.
        let second = load_records(&cache_path, &origin_a, b"not valid json", &options);
        assert!(second.is_ok());
        assert_eq!(second.unwrap().len(), 2);

        // A changed origin must force a reparse; unparsable bytes now surface as an error.
        let origin_b = origin("\"def\"");
        let third = load_records(&cache_path, &origin_b, b"not valid json", &options);
        assert!(third.is_err());
    }

    #[test]
    fn binary_cache_invalidates_when_pip_transform_flag_changes() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("noarch.rkyv");
        let origin_a = origin("\"abc\"");

        let with_transform = LoadOptions {
            pip_as_python_dependency: true,
            ..LoadOptions::default()
        };
        let records = load_records(&cache_path, &origin_a, SAMPLE_JSON.as_bytes(), &with_transform).unwrap();
        assert!(records.iter().any(|r| r.name.as_normalized() == "foo"));

        let without_transform = LoadOptions {
            pip_as_python_dependency: false,
            ..LoadOptions::default()
        };
        // Must not reuse the cache built with the transform flag flipped; since the json is
        // invalid this proves it fell back to a (failing) reparse rather than reusing the cache.
        let result = load_records(&cache_path, &origin_a, b"not valid json", &without_transform);
        assert!(result.is_err());
    }

    #[test]
    fn intern_into_pool_wires_dependencies_and_self_provides() {
        let records = vec![record("foo", &["bar"]), {
            let mut r = record("bar", &[]);
            r.track_features = vec!["legacy".to_string()];
            r
        }];
        let mut pool = Pool::new();
        let repo_id = intern_into_pool(&mut pool, &records);
        assert_ne!(repo_id, pool.new_repo());
    }
}
