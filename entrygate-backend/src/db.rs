//! sled database handle, tree names and the shared key encoding.

use std::{
    fs,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use entrygate_common::{GateError, GateResult};
use sled::{Db, Tree};

pub const NODES_TREE: &str = "merkle_nodes";
pub const EVENTS_TREE: &str = "events";
pub const NULLIFIERS_TREE: &str = "nullifiers";
pub const TICKETS_TREE: &str = "tickets";

/// One sled database shared by the tree store, the nullifier ledger and the
/// ticket roster. Cloning is cheap; all clones see the same data.
#[derive(Clone)]
pub struct GateDb {
    db: Db,
}

impl GateDb {
    pub fn persistent(path: impl AsRef<Path>) -> GateResult<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    GateError::internal(format!(
                        "failed to create directory for entry db at {}: {err}",
                        path_ref.display()
                    ))
                })?;
            }
        }
        let db = sled::open(path_ref).map_err(|err| {
            GateError::internal(format!(
                "failed to open entry db at {}: {err}",
                path_ref.display()
            ))
        })?;
        Ok(Self { db })
    }

    /// Temporary database removed on drop (tests and local runs).
    pub fn in_memory() -> GateResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|err| storage_error("open in-memory db", err))?;
        Ok(Self { db })
    }

    pub fn tree(&self, name: &str) -> GateResult<Tree> {
        self.db
            .open_tree(name)
            .map_err(|err| storage_error(&format!("open tree {name}"), err))
    }

    pub async fn flush(&self) -> GateResult<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|err| storage_error("flush", err))
    }
}

pub(crate) fn storage_error(context: &str, err: impl std::fmt::Display) -> GateError {
    GateError::internal(format!("entry db {context} error: {err}"))
}

/// Key prefix owned by one event: a big-endian `u16` length followed by the
/// identifier bytes, so no event's prefix is a prefix of another's.
pub(crate) fn event_key(event_id: &str) -> GateResult<Vec<u8>> {
    if event_id.is_empty() {
        return Err(GateError::invalid("event id must not be empty"));
    }
    let len = u16::try_from(event_id.len())
        .map_err(|_| GateError::invalid("event id exceeds 65535 bytes"))?;
    let mut key = Vec::with_capacity(2 + event_id.len());
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(event_id.as_bytes());
    Ok(key)
}

pub(crate) fn scoped_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

pub(crate) fn current_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_prefixes_do_not_collide() {
        let short = event_key("abc").unwrap();
        let long = event_key("abcd").unwrap();
        assert!(!long.starts_with(&short));
        assert!(matches!(event_key(""), Err(GateError::InvalidArgument(_))));
    }

    #[test]
    fn persistent_db_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entry.db");
        let db = GateDb::persistent(&path).unwrap();
        db.tree(EVENTS_TREE).unwrap();
        assert!(path.exists());
    }
}
