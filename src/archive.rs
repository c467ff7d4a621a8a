//! Tar archive streaming of tagged source trees.

use std::io::Write;

use git2::{ObjectType, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};
use tracing::warn;

use crate::store::{self, StoreError};

/// A pending archive of one tree, ready to be streamed.
pub struct Archive<'repo> {
    repo: &'repo Repository,
    tree: Tree<'repo>,
}

impl<'repo> Archive<'repo> {
    /// Peels `id` to its tree and prepares the archive. A missing object
    /// surfaces as [`StoreError::ObjectNotFound`] before any byte is
    /// written, so the download handler can still answer 404.
    pub fn new(repo: &'repo Repository, id: Oid) -> Result<Self, StoreError> {
        let tree = store::peel_to_tree(repo, id)?;
        Ok(Self { repo, tree })
    }

    /// Streams the tree as an uncompressed POSIX tar archive into `sink`.
    ///
    /// One record is emitted per blob, under the fixed `package/` prefix
    /// npm clients expect; directories are implicit in the record paths.
    /// An unreadable blob is logged and skipped so a single bad object
    /// does not blank the archive, while a sink write failure aborts the
    /// traversal and is returned. All header fields other than path, mode
    /// and size are zeroed, making the stream a pure function of the tree.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<(), StoreError> {
        let mut builder = tar::Builder::new(sink);
        let mut sink_err: Option<std::io::Error> = None;

        let walk = self.tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            let name = entry.name().unwrap_or_default();
            let path = format!("package/{dir}{name}");

            let blob = match self.repo.find_blob(entry.id()) {
                Ok(blob) => blob,
                Err(err) => {
                    warn!(path = %path, error = %err, "failed to look up blob, skipping entry");
                    return TreeWalkResult::Ok;
                }
            };

            let mut header = tar::Header::new_gnu();
            header.set_size(blob.size() as u64);
            header.set_mode(entry.filemode() as u32);
            header.set_mtime(0);

            if let Err(err) = builder.append_data(&mut header, &path, blob.content()) {
                sink_err = Some(err);
                return TreeWalkResult::Abort;
            }
            TreeWalkResult::Ok
        });

        if let Some(err) = sink_err {
            return Err(StoreError::Io(err));
        }
        walk?;
        builder.finish().map_err(StoreError::Io)
    }
}
