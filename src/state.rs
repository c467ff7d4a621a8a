//! Shared application state.

use std::sync::Arc;

use crate::sha_cache::ShaCache;
use crate::store::Storage;
use crate::upstream::Upstream;

/// State shared by every request handler.
///
/// Only the digest cache is mutable, and it synchronizes internally.
/// Per-request resources (repository handles, tar writers) are owned by
/// individual requests and never stored here.
pub struct AppState {
    /// Store of local package repositories.
    pub storage: Storage,
    /// Canonical base URL injected into tarball links and the registry
    /// root listing.
    pub front_addr: String,
    /// Fallback registry; `None` disables upstream proxying.
    pub upstream: Option<Upstream>,
    /// Archive digest cache.
    pub sha_cache: ShaCache,
}

pub type SharedState = Arc<AppState>;
