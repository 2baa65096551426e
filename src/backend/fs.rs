//! A minimal content-addressed filesystem [`Backend`].
//!
//! Each block is written to `root/<hex-hash-prefix>/<hex-hash>` — the same
//! two-level fan-out scheme git and most local CAS implementations use, to
//! keep any single directory from accumulating unbounded entries. This is
//! a standalone-use convenience, not a substitute for a real IPFS-class
//! backend; it exists so the engine can be exercised end-to-end without a
//! network dependency.

use super::{Backend, Cid};
use crate::block::Block;
use crate::error::NoiseFsError;
use std::io;
use std::path::{Path, PathBuf};

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, cid: &Cid) -> PathBuf {
        let hex = cid.as_str();
        let prefix = &hex[..hex.len().min(2)];
        self.root.join(prefix).join(hex)
    }

    fn cid_for(block: &Block) -> Cid {
        Cid::new(hex::encode(block.content_hash()))
    }

    fn map_io_err(cid: &Cid, e: io::Error) -> NoiseFsError {
        match e.kind() {
            io::ErrorKind::NotFound => NoiseFsError::NotFound(cid.to_string()),
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                NoiseFsError::TransientIO(e.to_string())
            }
            _ => NoiseFsError::PermanentIO(e.to_string()),
        }
    }
}

impl Backend for FsBackend {
    fn put(&self, block: &Block) -> Result<Cid, NoiseFsError> {
        let cid = Self::cid_for(block);
        let path = self.path_for(&cid);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::map_io_err(&cid, e))?;
        }
        // Content-addressed: if it already exists, the bytes are identical
        // by construction, so a plain overwrite is always safe and avoids
        // a redundant existence check.
        std::fs::write(&path, block.as_bytes()).map_err(|e| Self::map_io_err(&cid, e))?;
        Ok(cid)
    }

    fn get(&self, cid: &Cid) -> Result<Block, NoiseFsError> {
        let path = self.path_for(cid);
        let bytes = std::fs::read(&path).map_err(|e| Self::map_io_err(cid, e))?;
        Ok(Block::new(bytes))
    }

    fn has(&self, cid: &Cid) -> bool {
        Path::new(&self.path_for(cid)).exists()
    }
}
