#![deny(missing_docs)]

//! `rattler_repodata_gateway` parses `repodata.json` into pool solvables and maintains a binary
//! cache of the result, keyed by an origin fingerprint (url + cache validators). [`fetch`]
//! validates and refreshes the on-disk JSON cache; [`sparse`] parses it on demand; [`loader`]
//! ties the two together and feeds the records into a [`rattler_solver::Pool`].
//!
//! Actually retrieving bytes from a channel is left to the caller: every entry point here takes
//! an async closure rather than a concrete HTTP client, so this crate has no networking
//! dependency of its own.

#[cfg(not(target_arch = "wasm32"))]
pub mod fetch;
pub mod loader;
#[cfg(feature = "sparse")]
pub mod sparse;

mod utils;
