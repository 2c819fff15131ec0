use serde::{Deserialize, Serialize};

/// The half of an [`crate::fetch::RepodataOrigin`] fingerprint that is derived from HTTP-style
/// cache validators. The actual request/response exchange is an external collaborator's
/// responsibility; this struct only remembers what it returned.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct CacheHeaders {
    /// The `ETag` cache header, if the origin supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// The `Last-Modified` cache header, if the origin supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "mod")]
    pub last_modified: Option<String>,

    /// The `Cache-Control` header, if the origin supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl CacheHeaders {
    /// Two sets of cache headers validate the same origin iff `etag` and `last_modified` are
    /// both present and equal. A missing validator never matches, even against another missing
    /// validator, because that would let two genuinely different unvalidated fetches collapse
    /// into a cache hit.
    pub fn validates(&self, other: &CacheHeaders) -> bool {
        self.etag.is_some()
            && self.etag == other.etag
            && self.last_modified.is_some()
            && self.last_modified == other.last_modified
    }
}
