//! Storage of bare git repositories, one per package.
//!
//! The rest of the crate never touches git2 error classes directly:
//! failures are classified here into [`StoreError`] variants that the HTTP
//! layer can route on (missing repository vs missing object vs genuine
//! storage failure).

use std::fs;
use std::path::PathBuf;

use git2::{ErrorClass, ErrorCode, ObjectType, Oid, Repository, Tree};

/// Errors produced by the repository store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No repository exists for the requested package name.
    #[error("package repository not found")]
    RepoNotFound,

    /// The requested object is not present in the repository's database.
    #[error("object not found in repository")]
    ObjectNotFound,

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("storage directory unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// A directory of bare git repositories keyed by package name.
///
/// Repositories are opened per request and released when the handle is
/// dropped; no handles are cached, so there is no shared mutable
/// repository state between requests.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Opens the repository stored under `name`.
    ///
    /// A filesystem-level miss maps to [`StoreError::RepoNotFound`], which
    /// the dispatcher uses to decide between the upstream proxy and a
    /// plain 404. Any other failure propagates as a storage error.
    pub fn open(&self, name: &str) -> Result<Repository, StoreError> {
        let path = self.dir.join(name);
        Repository::open(path).map_err(|err| {
            if err.class() == ErrorClass::Os || err.code() == ErrorCode::NotFound {
                StoreError::RepoNotFound
            } else {
                StoreError::Git(err)
            }
        })
    }

    /// Lists the names of all stored repositories, sorted. Non-directory
    /// entries in the storage dir are ignored.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Dereferences `id` through tag and commit objects until a tree is
/// reached.
pub fn peel_to_tree(repo: &Repository, id: Oid) -> Result<Tree<'_>, StoreError> {
    let object = repo.find_object(id, None).map_err(classify_lookup)?;
    let peeled = object.peel(ObjectType::Tree).map_err(classify_lookup)?;
    peeled
        .into_tree()
        .map_err(|_| StoreError::Git(git2::Error::from_str("peeled object is not a tree")))
}

fn classify_lookup(err: git2::Error) -> StoreError {
    if err.code() == ErrorCode::NotFound {
        StoreError::ObjectNotFound
    } else {
        StoreError::Git(err)
    }
}
