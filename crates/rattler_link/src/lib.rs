//! Rattler is an experimental library to work with [Conda](http://conda.io) environments. Conda is
//! a cross-platform open-source package management system and environment management system.
//!
//! This crate implements the transaction diffing, linking, unlinking, and executor machinery that
//! brings a prefix from one set of installed packages to another. It deliberately does not know how
//! to download or extract an archive: `rattler_conda_types` supplies the data model, and the
//! download/extraction backend is an external collaborator that hands this crate an already
//! extracted package directory.

pub mod install;
mod package_cache;
pub(crate) mod utils;
mod validation;

pub use install::{
    execute_transaction, link_package, unlink_package, ExecutorError, InstallDriver,
    InstallDriverBuilder, InstallError, InstallOptions, PackageDirResolver,
};
pub use package_cache::{ensure_writable_cache_dir, CacheKey, PackageCache, PackageCacheError};
pub use validation::{PackageEntryValidationError, PackageValidationError};
