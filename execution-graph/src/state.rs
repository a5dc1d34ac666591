//! The per-job scratch working directory: created right before a node is
//! invoked, named after the node's content hash so identical jobs share a
//! directory, and removed on drop unless the caller asked to keep it
//! (§5's "save the working directory").

use std::path::{Path, PathBuf};

use common::eyre::Result;

/// Owns one job's scratch working directory under a shared scratch root.
///
/// Multiple `State` values can in principle alias the same on-disk
/// directory (two nodes with equal content hashes); only the first one
/// created for a given hash is the "master" that removes it on drop. This
/// crate never actually creates two `State`s for the same hash within a
/// single run (an executor only invokes a node once, see `executor`'s
/// de-duplication against the results map), so `master` is always `true`
/// in practice — kept as an explicit field rather than assumed, since nothing
/// prevents it structurally and a future remote/worker boundary (not
/// implemented; see `DESIGN.md`) would need exactly this distinction.
#[derive(Debug)]
pub struct State {
    dir: PathBuf,
    master: bool,
    keep: bool,
}

impl State {
    /// Create (or reuse) the scratch directory for a node named by
    /// `node_hash`, under `scratch_root`. `keep` mirrors the run-wide
    /// "save working directory" flag: when `true`, the directory survives
    /// this `State` being dropped.
    pub fn enter(scratch_root: &Path, node_hash: &str, keep: bool) -> Result<Self> {
        let dir = scratch_root.join(node_hash);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            master: true,
            keep,
        })
    }

    /// A non-master alias over an already-created directory. Never removes
    /// it on drop.
    pub fn alias(scratch_root: &Path, node_hash: &str) -> Self {
        Self {
            dir: scratch_root.join(node_hash),
            master: false,
            keep: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if self.master && !self.keep {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }
}
