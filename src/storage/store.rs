// Durable layout of a node's chain: one sled database with three trees, plus a
// LOCK marker that only exists while a process has the store open.

use crate::error::{LedgerError, Result};
use log::{info, warn};
use sled::{Db, Tree};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key in the blocks tree holding the tip hash
pub const TIP_BLOCK_HASH_KEY: &[u8] = b"lh";
pub const BLOCKS_TREE: &str = "blocks";
pub const UTXO_TREE: &str = "chainstate";
pub const TX_INDEX_TREE: &str = "txindex";

const SLED_DIR: &str = "data";
const LOCK_FILE: &str = "LOCK";

/// Marker file removed again when the last handle to the store goes away
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create the marker. Returns whether a stale one had to be cleared first.
    fn acquire(path: PathBuf) -> Result<(LockFile, bool)> {
        match Self::create(&path) {
            Ok(()) => Ok((LockFile { path }, false)),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                // sled's own lock is already held, so nobody else owns this marker
                warn!(
                    "Found stale lock at {}, previous shutdown was not clean",
                    path.display()
                );
                fs::remove_file(&path)?;
                Self::create(&path)?;
                Ok((LockFile { path }, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock {}: {e}", self.path.display());
        }
    }
}

/// Handle to an open store. Clones share the database and the lock.
#[derive(Clone)]
pub struct Store {
    db: Db,
    blocks: Tree,
    chainstate: Tree,
    tx_index: Tree,
    sync_writes: bool,
    path: PathBuf,
    _lock: Arc<LockFile>,
}

impl Store {
    /// Whether a store has ever been created under `path`
    pub fn exists(path: &Path) -> bool {
        path.join(SLED_DIR).exists()
    }

    /// Open (creating if needed) the store under `path`. Opening is exclusive;
    /// after an unclean shutdown the store is reopened with synchronous writes.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Store> {
        fs::create_dir_all(path)?;

        let db = sled::Config::new()
            .path(path.join(SLED_DIR))
            .open()
            .map_err(|e| open_error(path, e))?;

        let (lock, recovered) = LockFile::acquire(path.join(LOCK_FILE))?;
        if recovered {
            info!("Store at {} recovered, using synchronous writes", path.display());
        }

        let blocks = db.open_tree(BLOCKS_TREE)?;
        let chainstate = db.open_tree(UTXO_TREE)?;
        let tx_index = db.open_tree(TX_INDEX_TREE)?;

        Ok(Store {
            db,
            blocks,
            chainstate,
            tx_index,
            sync_writes: sync_writes || recovered,
            path: path.to_path_buf(),
            _lock: Arc::new(lock),
        })
    }

    pub fn blocks(&self) -> &Tree {
        &self.blocks
    }

    pub fn chainstate(&self) -> &Tree {
        &self.chainstate
    }

    pub fn tx_index(&self) -> &Tree {
        &self.tx_index
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn is_sync_writes(&self) -> bool {
        self.sync_writes
    }

    /// Flush to disk when running with synchronous writes
    pub fn flush_if_sync(&self) -> Result<()> {
        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

// sled reports a database held by another process as a WouldBlock I/O error
fn open_error(path: &Path, e: sled::Error) -> LedgerError {
    match e {
        sled::Error::Io(ref io) if io.kind() == IoErrorKind::WouldBlock => {
            LedgerError::StoreLocked(format!("{}: {e}", path.display()))
        }
        e => LedgerError::Database(format!("Failed to open store: {e}")),
    }
}
