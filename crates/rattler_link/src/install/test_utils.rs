use std::path::{Path, PathBuf};

use rattler_conda_types::{PrefixRecord, RepoDataRecord};
use transaction::{Transaction, TransactionOperation};

use crate::install::{transaction, unlink_package, InstallDriver, InstallOptions};

use super::driver::PostProcessResult;

/// Install a package into the environment and write a `conda-meta` file that
/// contains information about how the file was linked.
pub async fn install_package_to_environment(
    target_prefix: &Path,
    package_dir: PathBuf,
    repodata_record: RepoDataRecord,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
) -> anyhow::Result<()> {
    // Link the contents of the package into our environment. This returns all the
    // paths that were linked.
    let paths = crate::install::link_package(
        &package_dir,
        target_prefix,
        install_driver,
        install_options.clone(),
    )
    .await?;

    // Construct a PrefixRecord for the package
    let prefix_record = PrefixRecord {
        repodata_record,
        package_tarball_full_path: None,
        extracted_package_dir: Some(package_dir),
        files: paths
            .iter()
            .map(|entry| entry.relative_path.clone())
            .collect(),
        paths_data: paths.into(),
        requested_spec: None,
        link: None,
    };

    // Create the conda-meta directory if it doesn't exist yet.
    let target_prefix = target_prefix.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let conda_meta_path = target_prefix.join("conda-meta");
        std::fs::create_dir_all(&conda_meta_path)?;

        // Write the conda-meta information
        let pkg_meta_path = conda_meta_path.join(prefix_record.file_name());
        prefix_record.write_to_path(pkg_meta_path, true)
    })
    .await;
    match result {
        Ok(result) => Ok(result?),
        Err(err) => {
            if let Ok(panic) = err.try_into_panic() {
                std::panic::resume_unwind(panic);
            }
            // The operation has been cancelled, so we can also just ignore everything.
            Ok(())
        }
    }
}

/// Drives one transaction step: unlink the record being removed (if any), resolve the extracted
/// directory of the record being installed (if any) through `package_dir_for` — the
/// download/extraction backend is an external collaborator, this only needs a directory — then
/// link it into the prefix.
pub async fn execute_operation<F, Fut>(
    target_prefix: &Path,
    package_dir_for: &F,
    install_driver: &InstallDriver,
    op: TransactionOperation<PrefixRecord, RepoDataRecord>,
    install_options: &InstallOptions,
) where
    F: Fn(RepoDataRecord) -> Fut,
    Fut: std::future::Future<Output = PathBuf>,
{
    let install_record = op.record_to_install();
    let remove_record = op.record_to_remove();

    if let Some(remove_record) = remove_record {
        install_driver
            .clobber_registry()
            .unregister_paths(remove_record);
        unlink_package(target_prefix, remove_record).await.unwrap();
    }

    let Some(install_record) = install_record else {
        return;
    };
    let record = install_record.clone();
    let package_dir = package_dir_for(record.clone()).await;
    install_package_to_environment(
        target_prefix,
        package_dir,
        record,
        install_driver,
        install_options,
    )
    .await
    .unwrap();
}

pub async fn execute_transaction<F, Fut>(
    transaction: Transaction<PrefixRecord, RepoDataRecord>,
    target_prefix: &Path,
    package_dir_for: &F,
    install_driver: &InstallDriver,
    install_options: &InstallOptions,
) -> PostProcessResult
where
    F: Fn(RepoDataRecord) -> Fut,
    Fut: std::future::Future<Output = PathBuf>,
{
    install_driver
        .pre_process(&transaction, target_prefix)
        .unwrap();

    for op in &transaction.operations {
        execute_operation(
            target_prefix,
            package_dir_for,
            install_driver,
            op.clone(),
            install_options,
        )
        .await;
    }

    install_driver
        .post_process(&transaction, target_prefix)
        .unwrap()
}

pub fn find_prefix_record<'a>(
    prefix_records: &'a [PrefixRecord],
    name: &str,
) -> Option<&'a PrefixRecord> {
    prefix_records
        .iter()
        .find(|r| r.repodata_record.package_record.name.as_normalized() == name)
}
