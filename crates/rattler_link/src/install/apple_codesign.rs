//! Code signing for Apple Silicon binaries

use super::LinkFileError;
use std::path::Path;
use std::process::Command;

/// Controls the behavior of the [`super::link_package`] function when it encounters a binary that needs
/// to be signed on macOS (both Intel and Apple Silicon).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AppleCodeSignBehavior {
    /// Do nothing (do not attempt to sign any binary)
    DoNothing,
    /// Ignore if the signing fails
    Ignore,
    /// Bubble up the error if the code signing fails (default)
    #[default]
    Fail,
}

/// Sign a binary with an ad-hoc certificate on macOS.
/// This is required for binaries to run on macOS when their signature has been invalidated
/// by prefix replacement (modifying binary content).
pub(crate) fn codesign(destination_path: &Path) -> Result<(), LinkFileError> {
    let output = Command::new("/usr/bin/codesign")
        .arg("-f")
        .arg("-s")
        .arg("-")
        .arg(destination_path)
        .output()
        .map_err(LinkFileError::IoError)?;

    if !output.status.success() {
        tracing::warn!(
            "codesign {} failed: {}",
            destination_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(LinkFileError::FailedToSignAppleBinary);
    }

    Ok(())
}
