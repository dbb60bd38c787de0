//! Append-only ledger of spent `(event, nullifier)` pairs.
//!
//! Uniqueness is enforced by sled's compare-and-swap against an absent key:
//! of any number of concurrent inserts for one pair, exactly one succeeds.

use entrygate_common::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use sled::Tree;

use crate::db::{current_epoch_secs, event_key, scoped_key, storage_error, GateDb, NULLIFIERS_TREE};

pub trait NullifierLedger: Send + Sync {
    fn exists(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<bool>;

    /// Fails with `AlreadyExists` if the pair was recorded before, regardless
    /// of what an earlier `exists` returned.
    fn insert(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<()>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierRecord {
    pub used_at: u64,
}

#[derive(Clone)]
pub struct SledNullifierLedger {
    tree: Tree,
}

impl SledNullifierLedger {
    pub fn new(db: &GateDb) -> GateResult<Self> {
        Ok(Self {
            tree: db.tree(NULLIFIERS_TREE)?,
        })
    }

    pub fn in_memory() -> GateResult<Self> {
        Self::new(&GateDb::in_memory()?)
    }

    /// Admission time of a spent pair, `None` while unspent.
    pub fn used_at(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<Option<u64>> {
        let key = ledger_key(event_id, nullifier_hash)?;
        let Some(raw) = self
            .tree
            .get(key)
            .map_err(|err| storage_error("nullifier lookup", err))?
        else {
            return Ok(None);
        };
        let record: NullifierRecord = serde_json::from_slice(&raw)
            .map_err(|err| GateError::internal(format!("corrupt nullifier record: {err}")))?;
        Ok(Some(record.used_at))
    }
}

impl NullifierLedger for SledNullifierLedger {
    fn exists(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<bool> {
        let key = ledger_key(event_id, nullifier_hash)?;
        self.tree
            .contains_key(key)
            .map_err(|err| storage_error("nullifier contains_key", err))
    }

    fn insert(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<()> {
        let key = ledger_key(event_id, nullifier_hash)?;
        let record = NullifierRecord {
            used_at: current_epoch_secs(),
        };
        let value = serde_json::to_vec(&record)
            .map_err(|err| GateError::internal(format!("failed to encode nullifier: {err}")))?;

        match self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(GateError::AlreadyExists(format!(
                "nullifier already spent for event {event_id}"
            ))),
            Err(err) => Err(storage_error("nullifier insert", err)),
        }
    }
}

fn ledger_key(event_id: &str, nullifier_hash: &[u8]) -> GateResult<Vec<u8>> {
    if nullifier_hash.is_empty() {
        return Err(GateError::invalid("nullifier hash must not be empty"));
    }
    Ok(scoped_key(&event_key(event_id)?, nullifier_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const EVENT: &str = "5a2b8c4d-1e3f-4a5b-9c6d-7e8f9a0b1c2d";

    #[test]
    fn second_insert_is_already_exists() {
        let ledger = SledNullifierLedger::in_memory().unwrap();
        let hash = [7u8; 32];
        assert!(!ledger.exists(EVENT, &hash).unwrap());
        assert_eq!(ledger.used_at(EVENT, &hash).unwrap(), None);

        ledger.insert(EVENT, &hash).unwrap();
        assert!(ledger.exists(EVENT, &hash).unwrap());
        assert!(ledger.used_at(EVENT, &hash).unwrap().is_some());

        let err = ledger.insert(EVENT, &hash).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn uniqueness_is_scoped_to_the_event() {
        let ledger = SledNullifierLedger::in_memory().unwrap();
        let hash = [9u8; 32];
        ledger.insert(EVENT, &hash).unwrap();
        ledger
            .insert("0b1c2d3e-4f5a-4b6c-8d7e-9f0a1b2c3d4e", &hash)
            .unwrap();
    }

    #[test]
    fn rejects_empty_arguments() {
        let ledger = SledNullifierLedger::in_memory().unwrap();
        assert!(matches!(
            ledger.insert("", &[1]),
            Err(GateError::InvalidArgument(_))
        ));
        assert!(matches!(
            ledger.exists(EVENT, &[]),
            Err(GateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        let ledger = Arc::new(SledNullifierLedger::in_memory().unwrap());
        let hash = [3u8; 32];
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.insert(EVENT, &hash))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(GateError::is_already_exists));
    }
}
