//! Runtime and per-package statistics endpoints.

use axum::extract::{OriginalUri, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use git2::Repository;
use serde::Serialize;
use sysinfo::{get_current_pid, System};

use crate::error::{json_response, AppResult};
use crate::server;
use crate::state::SharedState;
use crate::store::StoreError;
use crate::validation;

/// Process memory statistics served at `/-/stats`.
#[derive(Serialize, Debug)]
pub struct MemStats {
    /// Resident set size in bytes.
    pub resident_bytes: u64,
    /// Virtual memory size in bytes.
    pub virtual_bytes: u64,
}

impl MemStats {
    /// Samples the current process.
    pub fn collect() -> Self {
        if let Ok(pid) = get_current_pid() {
            let system = System::new_all();
            if let Some(process) = system.process(pid) {
                return Self {
                    resident_bytes: process.memory(),
                    virtual_bytes: process.virtual_memory(),
                };
            }
        }
        Self {
            resident_bytes: 0,
            virtual_bytes: 0,
        }
    }
}

/// Remote listing for one package repository, the equivalent of
/// `git remote -v`.
#[derive(Serialize, Debug)]
pub struct PackageStats {
    pub remotes: Vec<PackageRemote>,
}

#[derive(Serialize, Debug)]
pub struct PackageRemote {
    pub name: String,
    pub url: String,
}

impl PackageStats {
    /// Collects the repository's configured remotes.
    pub fn collect(repo: &Repository) -> Result<Self, StoreError> {
        let names = repo.remotes()?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            let remote = repo.find_remote(name)?;
            remotes.push(PackageRemote {
                name: name.to_string(),
                url: remote.url().unwrap_or_default().to_string(),
            });
        }
        Ok(Self { remotes })
    }
}

/// `GET /-/stats` — memory metrics for the server process.
pub async fn mem_stats() -> AppResult<Response> {
    json_response(StatusCode::OK, &MemStats::collect())
}

/// `GET /{name}/stats` — git remotes of the package repository, with the
/// usual upstream fallback when the package is not hosted locally.
pub async fn package_stats(
    Path(name): Path<String>,
    OriginalUri(uri): OriginalUri,
    State(state): State<SharedState>,
) -> AppResult<Response> {
    validation::validate_name(&name)?;

    let collected = {
        let state = state.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || {
            let repo = state.storage.open(&name)?;
            PackageStats::collect(&repo)
        })
        .await?
    };

    match collected {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(StoreError::RepoNotFound) => server::upstream_fallback(&state, uri.path()).await,
        Err(err) => Err(err.into()),
    }
}
