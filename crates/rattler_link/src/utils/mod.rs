pub use hash::{compute_file_sha256, HashingWriter, Sha256HashingWriter};
pub use lock_file::LockFile;

mod hash;
mod lock_file;
