//! Drives a whole [`Transaction`] against a prefix: acquires the prefix lock, applies
//! each operation in order (unlink the outgoing record before linking the incoming one),
//! and on failure unwinds everything already applied by invoking the reverse operation on
//! each completed step, most-recent first.
//!
//! This is the only place in the crate that reasons about a *multi-package* transaction as
//! a unit; [`crate::install::link_package`] and [`crate::install::unlink_package`] only know
//! how to apply or reverse a single package and have no notion of "the rest of the steps".

use std::path::{Path, PathBuf};

use rattler_conda_types::{PrefixRecord, RepoDataRecord};

use crate::install::driver::PostProcessResult;
use crate::install::{
    transaction::{Transaction, TransactionOperation},
    unlink_package, InstallDriver, InstallError, InstallOptions, UnlinkError,
};
use crate::utils::LockFile;

/// An error that occurred while executing a whole [`Transaction`] against a prefix.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Could not acquire the advisory prefix lock.
    #[error("failed to acquire the prefix lock")]
    LockFailed(#[source] anyhow::Error),

    /// A single package failed to link. The error carries the steps that were already
    /// applied before the failure and that have since been rolled back.
    #[error("failed to install '{name}'")]
    LinkFailed {
        /// The name of the package that failed to link.
        name: String,
        /// The underlying error.
        #[source]
        source: InstallError,
    },

    /// A single package failed to unlink.
    #[error("failed to remove '{name}'")]
    UnlinkFailed {
        /// The name of the package that failed to unlink.
        name: String,
        /// The underlying error.
        #[source]
        source: UnlinkError,
    },

    /// Post-processing (unclobbering, empty directory cleanup) failed.
    #[error(transparent)]
    PostProcess(#[from] crate::install::driver::PostProcessingError),

    /// Running the pre-unlink scripts for the transaction failed.
    #[error(transparent)]
    PreProcess(#[from] crate::install::link_script::PrePostLinkError),
}

/// Resolves the already-extracted package directory for a record being installed. The
/// download/extraction backend is an external collaborator; the executor only needs a
/// directory to link from.
pub trait PackageDirResolver<Fut>
where
    Fut: std::future::Future<Output = PathBuf>,
{
    /// Returns the extracted package directory for `record`.
    fn resolve(&self, record: RepoDataRecord) -> Fut;
}

impl<F, Fut> PackageDirResolver<Fut> for F
where
    F: Fn(RepoDataRecord) -> Fut,
    Fut: std::future::Future<Output = PathBuf>,
{
    fn resolve(&self, record: RepoDataRecord) -> Fut {
        self(record)
    }
}

/// A step already applied to the prefix, kept around so it can be reversed if a later
/// step in the same transaction fails.
enum CompletedStep {
    /// A package was linked into the prefix; reversing it means unlinking it.
    Linked(PrefixRecord),
    /// A package was unlinked from the prefix; reversing it means re-linking it from its
    /// original extracted directory.
    Unlinked(RepoDataRecord, PathBuf),
}

/// Applies `transaction` to `target_prefix`, step by step, in the order the steps appear.
///
/// Acquires `<target_prefix>/.mamba.lock` for the duration of the call so concurrent
/// transactions against the same prefix serialize rather than race (§5). If any step
/// fails, every step already completed is reversed in reverse order before the error is
/// returned — the conda-meta record for the failing package is never written, so the
/// prefix is left exactly as it was before the call, modulo filesystem timestamps.
pub async fn execute_transaction<R, Fut>(
    transaction: &Transaction<PrefixRecord, RepoDataRecord>,
    target_prefix: &Path,
    package_dir_for: &R,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
) -> Result<PostProcessResult, ExecutorError>
where
    R: PackageDirResolver<Fut>,
    Fut: std::future::Future<Output = PathBuf>,
{
    let lock_path = target_prefix.join(".mamba.lock");
    let _lock = LockFile::new_async(&lock_path)
        .await
        .map_err(ExecutorError::LockFailed)?;

    install_driver.pre_process(transaction, target_prefix)?;

    let mut completed: Vec<CompletedStep> = Vec::with_capacity(transaction.operations.len());

    for op in &transaction.operations {
        if let Err(err) = apply_operation(
            target_prefix,
            package_dir_for,
            install_driver,
            install_options,
            op,
            &mut completed,
        )
        .await
        {
            rollback(target_prefix, install_driver, install_options, completed).await;
            return Err(err);
        }
    }

    install_driver
        .post_process(transaction, target_prefix)
        .map_err(ExecutorError::PostProcess)
}

async fn apply_operation<R, Fut>(
    target_prefix: &Path,
    package_dir_for: &R,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
    op: &TransactionOperation<PrefixRecord, RepoDataRecord>,
    completed: &mut Vec<CompletedStep>,
) -> Result<(), ExecutorError>
where
    R: PackageDirResolver<Fut>,
    Fut: std::future::Future<Output = PathBuf>,
{
    // Remove the outgoing record first -- dependents are unlinked before the
    // dependencies they relied on (§5 ordering guarantee).
    if let Some(old) = op.record_to_remove() {
        let name = old.repodata_record.package_record.name.as_normalized().to_string();
        install_driver.clobber_registry().unregister_paths(old);
        unlink_package(target_prefix, old)
            .await
            .map_err(|source| ExecutorError::UnlinkFailed {
                name: name.clone(),
                source,
            })?;
        if let Some(package_dir) = old.extracted_package_dir.clone() {
            completed.push(CompletedStep::Unlinked(old.repodata_record.clone(), package_dir));
        } else {
            tracing::warn!(
                "'{name}' has no recorded extracted package directory; it cannot be \
                 re-linked if a later step in this transaction fails"
            );
        }
    }

    let Some(install_record) = op.record_to_install() else {
        return Ok(());
    };
    let record = install_record.clone();
    let name = record.package_record.name.as_normalized().to_string();
    let package_dir = package_dir_for.resolve(record.clone()).await;

    let prefix_record = link_one(
        target_prefix,
        package_dir,
        record,
        install_driver,
        install_options,
    )
    .await
    .map_err(|source| ExecutorError::LinkFailed {
        name: name.clone(),
        source,
    })?;

    completed.push(CompletedStep::Linked(prefix_record));
    Ok(())
}

async fn link_one(
    target_prefix: &Path,
    package_dir: PathBuf,
    repodata_record: RepoDataRecord,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
) -> Result<PrefixRecord, InstallError> {
    let paths = crate::install::link_package(
        &package_dir,
        target_prefix,
        install_driver,
        install_options.clone(),
    )
    .await?;

    let prefix_record = PrefixRecord::from_repodata_record(
        repodata_record,
        None,
        Some(package_dir),
        paths,
        None,
        None,
    );

    let conda_meta_path = target_prefix.join("conda-meta");
    fs_err::tokio::create_dir_all(&conda_meta_path)
        .await
        .map_err(InstallError::FailedToWriteMetadata)?;
    let pkg_meta_path = conda_meta_path.join(prefix_record.file_name());
    let record_for_write = prefix_record.clone();
    tokio::task::spawn_blocking(move || record_for_write.write_to_path(pkg_meta_path, true))
        .await
        .map_err(|_| InstallError::Cancelled)?
        .map_err(InstallError::FailedToWriteMetadata)?;

    Ok(prefix_record)
}

/// Undo every already-applied step, most recently completed first (§7 `LinkFailure`
/// rollback). Failures during rollback are logged rather than propagated: the caller
/// already has the original error and a rollback that itself fails should not mask it,
/// but it must not be silently lost either.
async fn rollback(
    target_prefix: &Path,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
    completed: Vec<CompletedStep>,
) {
    for step in completed.into_iter().rev() {
        match step {
            CompletedStep::Linked(prefix_record) => {
                let name = prefix_record
                    .repodata_record
                    .package_record
                    .name
                    .as_normalized()
                    .to_string();
                install_driver.clobber_registry().unregister_paths(&prefix_record);
                if let Err(source) = unlink_package(target_prefix, &prefix_record).await {
                    tracing::warn!(
                        "rollback: failed to unlink '{name}' after transaction abort: {source}"
                    );
                }
            }
            CompletedStep::Unlinked(record, package_dir) => {
                let name = record.package_record.name.as_normalized().to_string();
                if let Err(source) =
                    link_one(target_prefix, package_dir, record, install_driver, install_options)
                        .await
                {
                    tracing::warn!(
                        "rollback: failed to re-link '{name}' after transaction abort: {source}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rattler_conda_types::{
        PackageName, PackageRecord, Platform, PrefixRecord, RepoDataRecord,
    };
    use url::Url;

    use super::*;
    use crate::install::transaction::{Transaction, TransactionOperation};

    /// Writes a minimal noarch-generic package directory: `info/index.json` and
    /// `info/paths.json` describing a single hardlinked file, plus the file itself.
    fn write_package_dir(dir: &Path, name: &str, version: &str, content: &str) {
        let info_dir = dir.join("info");
        std::fs::create_dir_all(&info_dir).unwrap();
        std::fs::write(
            info_dir.join("index.json"),
            format!(
                r#"{{"name":"{name}","version":"{version}","build":"0","build_number":0,"subdir":"noarch"}}"#
            ),
        )
        .unwrap();
        std::fs::write(
            info_dir.join("paths.json"),
            format!(
                r#"{{"paths_version":1,"paths":[{{"_path":"{name}.txt","path_type":"hardlink"}}]}}"#
            ),
        )
        .unwrap();
        std::fs::write(dir.join(format!("{name}.txt")), content).unwrap();
    }

    fn repodata_record(name: &str, version: &str) -> RepoDataRecord {
        let package_record = PackageRecord::new(
            PackageName::new_unchecked(name),
            version.parse().unwrap(),
            "0".to_string(),
        );
        RepoDataRecord {
            package_record,
            file_name: format!("{name}-{version}-0.conda"),
            url: Url::parse("https://conda.anaconda.org/conda-forge/noarch/dummy.conda").unwrap(),
            channel: "conda-forge".to_string(),
        }
    }

    #[tokio::test]
    async fn installs_every_step_in_order() {
        let prefix = tempfile::tempdir().unwrap();
        let packages = tempfile::tempdir().unwrap();

        let a = repodata_record("pkg-a", "1.0");
        let b = repodata_record("pkg-b", "1.0");
        write_package_dir(&packages.path().join("pkg-a"), "pkg-a", "1.0", "a");
        write_package_dir(&packages.path().join("pkg-b"), "pkg-b", "1.0", "b");

        let transaction = Transaction {
            operations: vec![
                TransactionOperation::Install(a.clone()),
                TransactionOperation::Install(b.clone()),
            ],
            python_info: None,
            platform: Platform::current(),
        };

        let packages_dir = packages.path().to_path_buf();
        let resolver = move |record: RepoDataRecord| {
            let dir = packages_dir.join(record.package_record.name.as_normalized());
            async move { dir }
        };

        execute_transaction(
            &transaction,
            prefix.path(),
            &resolver,
            &InstallDriver::default(),
            &InstallOptions::default(),
        )
        .await
        .unwrap();

        assert!(prefix.path().join("pkg-a.txt").exists());
        assert!(prefix.path().join("pkg-b.txt").exists());
        assert!(prefix
            .path()
            .join("conda-meta/pkg-a-1.0-0.json")
            .exists());
        assert!(prefix
            .path()
            .join("conda-meta/pkg-b-1.0-0.json")
            .exists());
    }

    #[tokio::test]
    async fn failed_step_rolls_back_everything_already_applied() {
        let prefix = tempfile::tempdir().unwrap();
        let packages = tempfile::tempdir().unwrap();

        let a = repodata_record("pkg-a", "1.0");
        // `pkg-b`'s directory is never written, so linking it fails.
        let b = repodata_record("pkg-b", "1.0");
        write_package_dir(&packages.path().join("pkg-a"), "pkg-a", "1.0", "a");

        let transaction = Transaction {
            operations: vec![
                TransactionOperation::Install(a.clone()),
                TransactionOperation::Install(b.clone()),
            ],
            python_info: None,
            platform: Platform::current(),
        };

        let packages_dir = packages.path().to_path_buf();
        let resolver = move |record: RepoDataRecord| {
            let dir = packages_dir.join(record.package_record.name.as_normalized());
            async move { dir }
        };

        let result = execute_transaction(
            &transaction,
            prefix.path(),
            &resolver,
            &InstallDriver::default(),
            &InstallOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(ExecutorError::LinkFailed { .. })));

        // pkg-a was linked before pkg-b failed; rollback must have undone it.
        assert!(!prefix.path().join("pkg-a.txt").exists());
        assert!(!prefix
            .path()
            .join("conda-meta/pkg-a-1.0-0.json")
            .exists());
        assert!(!prefix.path().join("pkg-b.txt").exists());
    }

    #[tokio::test]
    async fn remove_step_is_reapplied_on_later_failure() {
        let prefix = tempfile::tempdir().unwrap();
        let packages = tempfile::tempdir().unwrap();

        let existing_dir = packages.path().join("pkg-a");
        write_package_dir(&existing_dir, "pkg-a", "1.0", "a");
        let existing = repodata_record("pkg-a", "1.0");

        // Link `pkg-a` directly so there is something installed to remove.
        let prefix_record = link_one(
            prefix.path(),
            existing_dir,
            existing.clone(),
            &InstallDriver::default(),
            &InstallOptions::default(),
        )
        .await
        .unwrap();
        assert!(prefix.path().join("pkg-a.txt").exists());

        // `pkg-c` has no package directory, so the install half of this step fails
        // after the remove half of the previous step already succeeded.
        let b = repodata_record("pkg-b", "1.0");
        let c = repodata_record("pkg-c", "1.0");
        write_package_dir(&packages.path().join("pkg-b"), "pkg-b", "1.0", "b");

        let transaction = Transaction {
            operations: vec![
                TransactionOperation::Remove(prefix_record),
                TransactionOperation::Install(b.clone()),
                TransactionOperation::Install(c.clone()),
            ],
            python_info: None,
            platform: Platform::current(),
        };

        let packages_dir = packages.path().to_path_buf();
        let resolver = move |record: RepoDataRecord| {
            let dir = packages_dir.join(record.package_record.name.as_normalized());
            async move { dir }
        };

        let result = execute_transaction(
            &transaction,
            prefix.path(),
            &resolver,
            &InstallDriver::default(),
            &InstallOptions::default(),
        )
        .await;

        assert!(result.is_err());

        // The removed `pkg-a` should have been re-linked by the rollback.
        assert!(prefix.path().join("pkg-a.txt").exists());
        assert!(prefix
            .path()
            .join("conda-meta/pkg-a-1.0-0.json")
            .exists());
        // `pkg-b` was linked then rolled back.
        assert!(!prefix.path().join("pkg-b.txt").exists());
        assert!(!prefix.path().join("pkg-c.txt").exists());
    }
}

