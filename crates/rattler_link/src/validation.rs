//! Functionality to validate the contents of an extracted Conda package directory.
//!
//! Every extracted Conda package contains a file `info/paths.json` that describes all the files
//! the package contains. [`validate_package_directory`] checks that a directory that is supposed
//! to hold an already-extracted package still matches that manifest, so a cache entry that was
//! corrupted or tampered with (or only partially materialized) is detected instead of silently
//! reused.

use rattler_conda_types::package::{PathType, PathsEntry, PathsJson};
use sha2::{Digest, Sha256};
use std::fs::{File, Metadata};
use std::path::{Path, PathBuf};

/// An error that is returned by [`validate_package_directory`] if the contents of the directory
/// seem to be corrupted.
#[derive(Debug, thiserror::Error)]
pub enum PackageValidationError {
    #[error("failed to read 'paths.json' file")]
    ReadPathsJsonError(#[source] std::io::Error),

    #[error("the path '{0}' seems to be corrupted")]
    CorruptedEntry(PathBuf, #[source] PackageEntryValidationError),
}

/// An error that indicates that a specific file in a package directory seems to be corrupted.
#[derive(Debug, thiserror::Error)]
pub enum PackageEntryValidationError {
    #[error("failed to retrieve file metadata'")]
    GetMetadataFailed(#[source] std::io::Error),

    #[error("the file does not exist")]
    NotFound,

    #[error("expected a symbolic link")]
    ExpectedSymlink,

    #[error("expected a directory")]
    ExpectedDirectory,

    #[error("incorrect size, expected {0} but file on disk is {1}")]
    IncorrectSize(u64, u64),

    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),

    #[error("sha256 hash mismatch, expected '{0}' but file on disk is '{1}'")]
    HashMismatch(String, String),
}

/// Determine whether the files in the specified directory match what is expected according to the
/// `info/paths.json` file in the same directory. Returns the parsed manifest on success so
/// callers (e.g. the package cache) don't have to parse it twice.
pub fn validate_package_directory(
    package_dir: &Path,
) -> Result<((), PathsJson), PackageValidationError> {
    let paths = PathsJson::from_path(&package_dir.join("info/paths.json"))
        .map_err(PackageValidationError::ReadPathsJsonError)?;

    for entry in &paths.paths {
        validate_package_entry(package_dir, entry)
            .map_err(|e| PackageValidationError::CorruptedEntry(entry.relative_path.clone(), e))?;
    }

    Ok(((), paths))
}

/// Determine whether the information in the [`PathsEntry`] matches the file in the package
/// directory.
fn validate_package_entry(
    package_dir: &Path,
    entry: &PathsEntry,
) -> Result<(), PackageEntryValidationError> {
    let path = package_dir.join(&entry.relative_path);

    let metadata = match std::fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PackageEntryValidationError::NotFound)
        }
        Err(e) => return Err(PackageEntryValidationError::GetMetadataFailed(e)),
    };

    match entry.path_type {
        PathType::HardLink => validate_package_hard_link_entry(path, entry, metadata),
        PathType::SoftLink => validate_package_soft_link_entry(path, entry, metadata),
        PathType::Directory => validate_package_directory_entry(path, entry, metadata),
    }
}

fn validate_package_hard_link_entry(
    path: PathBuf,
    entry: &PathsEntry,
    metadata: Metadata,
) -> Result<(), PackageEntryValidationError> {
    debug_assert!(entry.path_type == PathType::HardLink);

    if let Some(size_in_bytes) = entry.size_in_bytes {
        if size_in_bytes != metadata.len() {
            return Err(PackageEntryValidationError::IncorrectSize(
                size_in_bytes,
                metadata.len(),
            ));
        }
    }

    if let Some(hash_str) = entry.sha256.as_deref() {
        let hash = compute_file_sha256(&path)?;

        let mut expected_hash = <sha2::digest::Output<Sha256>>::default();
        hex::decode_to_slice(hash_str, &mut expected_hash).map_err(|_| {
            PackageEntryValidationError::HashMismatch(hash_str.to_owned(), format!("{:x}", hash))
        })?;

        if expected_hash != hash {
            return Err(PackageEntryValidationError::HashMismatch(
                hash_str.to_owned(),
                format!("{:x}", hash),
            ));
        }
    }

    Ok(())
}

fn validate_package_soft_link_entry(
    _path: PathBuf,
    entry: &PathsEntry,
    metadata: Metadata,
) -> Result<(), PackageEntryValidationError> {
    debug_assert!(entry.path_type == PathType::SoftLink);

    if !metadata.is_symlink() {
        return Err(PackageEntryValidationError::ExpectedSymlink);
    }

    Ok(())
}

fn validate_package_directory_entry(
    _path: PathBuf,
    entry: &PathsEntry,
    metadata: Metadata,
) -> Result<(), PackageEntryValidationError> {
    debug_assert!(entry.path_type == PathType::Directory);

    if !metadata.is_dir() {
        Err(PackageEntryValidationError::ExpectedDirectory)
    } else {
        Ok(())
    }
}

/// Compute the SHA256 hash of the file at the specified location.
fn compute_file_sha256(path: &Path) -> Result<sha2::digest::Output<sha2::Sha256>, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::compute_file_sha256;
    use rstest::*;

    #[rstest]
    #[case(
        "1234567890",
        "c775e7b757ede630cd0aa1113bd102661ab38829ca52a6422ab782862f268646"
    )]
    #[case(
        "Hello, world!",
        "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
    )]
    fn test_compute_file_sha256(#[case] input: &str, #[case] expected_hash: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test");
        std::fs::write(&file_path, input).unwrap();
        let hash = compute_file_sha256(&file_path).unwrap();

        assert_eq!(format!("{hash:x}"), expected_hash)
    }
}
