//! Package root documents synthesized from version tags.
//!
//! Every tag matching `refs/tags/v*` is treated as an immutable release:
//! the tagged tree's `package.json` becomes the version document, with a
//! `dist` block injected that carries the content-addressed tarball URL
//! and the SHA-1 of the uncompressed tar stream.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use axum::extract::{OriginalUri, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use git2::{Oid, Repository};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::error::{json_response, AppResult};
use crate::server;
use crate::sha_cache::ShaCache;
use crate::state::SharedState;
use crate::store::{self, StoreError};
use crate::validation;

/// CommonJS package root document: every known version of one package.
#[derive(Serialize, Debug)]
pub struct PackageRoot {
    pub name: String,
    #[serde(rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    pub versions: Map<String, Value>,
}

fn version_tag_re() -> &'static Regex {
    static VERSION_TAG: OnceLock<Regex> = OnceLock::new();
    VERSION_TAG.get_or_init(|| Regex::new(r"^refs/tags/v(.*)$").expect("version tag pattern"))
}

#[derive(Debug, thiserror::Error)]
enum ManifestError {
    #[error("tree has no package.json entry")]
    Missing,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("package.json is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Builds the package root document for `name`.
///
/// Tags whose manifest is unreadable, unparsable or missing a string
/// `version` field are logged and skipped; a duplicate version key is
/// logged and overwritten. `dist-tags.latest` is the last version
/// produced in tag-enumeration order (the underlying library's order, not
/// semver). Only a tag-enumeration failure aborts the build.
pub fn build_package_root(
    name: &str,
    front_addr: &str,
    repo: &Repository,
    cache: &ShaCache,
) -> Result<PackageRoot, StoreError> {
    let mut tags: Vec<(String, Oid)> = Vec::new();
    repo.tag_foreach(|id, refname| {
        if let Ok(refname) = std::str::from_utf8(refname) {
            tags.push((refname.to_string(), id));
        }
        true
    })?;

    let mut versions = Map::new();
    let mut latest = None;

    for (refname, id) in tags {
        if !version_tag_re().is_match(&refname) {
            debug!(package = %name, tag = %refname, "skipping non-version tag");
            continue;
        }

        let mut manifest = match read_manifest(repo, id) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(package = %name, tag = %refname, error = %err,
                      "failed to read package manifest, skipping tag");
                continue;
            }
        };

        let Some(version) = manifest
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            warn!(package = %name, tag = %refname, "manifest has no version field, skipping tag");
            continue;
        };

        let shasum = match archive_shasum(repo, id, cache) {
            Ok(shasum) => shasum,
            Err(err) => {
                warn!(package = %name, tag = %refname, error = %err,
                      "failed to compute archive digest, skipping tag");
                continue;
            }
        };

        // Content-addressed: the URL carries the object id, not the
        // version string.
        let tarball = format!("{front_addr}/{name}/-/{id}");
        manifest.insert(
            "dist".to_string(),
            json!({ "tarball": tarball, "shasum": shasum }),
        );

        if versions.contains_key(&version) {
            warn!(package = %name, version = %version, tag = %refname,
                  "duplicate version, overwriting");
        }
        versions.insert(version.clone(), Value::Object(manifest));
        latest = Some(version);
    }

    let mut dist_tags = BTreeMap::new();
    if let Some(latest) = latest {
        dist_tags.insert("latest".to_string(), latest);
    }

    Ok(PackageRoot {
        name: name.to_string(),
        dist_tags,
        versions,
    })
}

/// Reads and parses `package.json` from the tree `id` peels to.
fn read_manifest(repo: &Repository, id: Oid) -> Result<Map<String, Value>, ManifestError> {
    let tree = store::peel_to_tree(repo, id)?;
    let entry = tree.get_name("package.json").ok_or(ManifestError::Missing)?;
    let blob = repo.find_blob(entry.id()).map_err(StoreError::from)?;
    Ok(serde_json::from_slice(blob.content())?)
}

/// Returns the hex SHA-1 of the uncompressed tar archive for `id`,
/// consulting the digest cache first. The tar stream is a pure function
/// of the immutable object graph, so a cached digest stays valid for the
/// process lifetime.
fn archive_shasum(repo: &Repository, id: Oid, cache: &ShaCache) -> Result<String, StoreError> {
    if let Some(shasum) = cache.get(&id) {
        return Ok(shasum);
    }

    let mut hasher = Sha1::new();
    Archive::new(repo, id)?.write_to(&mut hasher)?;
    let shasum = format!("{:x}", hasher.finalize());

    cache.add(id, shasum.clone());
    Ok(shasum)
}

/// `GET /{name}` — package root document for a locally hosted package,
/// or the upstream's answer when the package is not hosted here.
pub async fn package_root(
    Path(name): Path<String>,
    OriginalUri(uri): OriginalUri,
    State(state): State<SharedState>,
) -> AppResult<Response> {
    validation::validate_name(&name)?;
    debug!(package = %name, "building package root");

    let built = {
        let state = state.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || {
            let repo = state.storage.open(&name)?;
            build_package_root(&name, &state.front_addr, &repo, &state.sha_cache)
        })
        .await?
    };

    match built {
        Ok(root) => json_response(StatusCode::OK, &root),
        Err(StoreError::RepoNotFound) => server::upstream_fallback(&state, uri.path()).await,
        Err(err) => Err(err.into()),
    }
}
