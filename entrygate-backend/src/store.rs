//! Persistent Merkle node storage.
//!
//! Nodes live in the `merkle_nodes` tree under
//! `event_key(event) || depth:u8 || index:u64be`; the `events` tree holds one
//! [`EventTreeRecord`] per event. Every rebuild replaces both inside a single
//! multi-tree transaction, so readers observe either the previous tree and
//! root or the new ones, never a mix.

use entrygate_common::{
    layer_width, path_steps, BuiltTree, FieldElement, GateError, GateResult, MerkleNode,
    MerklePath, FIELD_ELEMENT_BYTES, MAX_TREE_DEPTH,
};
use serde::{Deserialize, Serialize};
use sled::{
    transaction::{
        ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
        TransactionalTree,
    },
    Transactional, Tree,
};

use crate::db::{
    current_epoch_secs, event_key, scoped_key, storage_error, GateDb, EVENTS_TREE, NODES_TREE,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTreeRecord {
    /// `None` until a build has published a root.
    pub merkle_root: Option<FieldElement>,
    pub depth: u8,
    pub leaf_count: Option<u64>,
    pub updated_at: u64,
}

/// Root, leaf and authentication path read from the same tree generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathSnapshot {
    pub root: FieldElement,
    pub depth: u8,
    pub leaf_index: u64,
    pub leaf: FieldElement,
    pub path: MerklePath,
}

/// Result of [`TreeStore::publish_tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// A generation with more leaves at the same depth was already committed
    /// and was left in place.
    Superseded { root: FieldElement, leaf_count: u64 },
}

pub trait TreeStore: Send + Sync {
    /// Replaces the event's node set and publishes `tree.root` atomically.
    fn store_batch_with_root(&self, tree: &BuiltTree) -> GateResult<()>;

    /// Like [`TreeStore::store_batch_with_root`], but keeps the stored
    /// generation when it was built from a larger roster at the same depth.
    fn publish_tree(&self, tree: &BuiltTree) -> GateResult<PublishOutcome>;

    /// Replaces the event's node set and leaves the published root untouched.
    fn store_batch(&self, event_id: &str, nodes: &[MerkleNode]) -> GateResult<()>;

    fn get_path(&self, event_id: &str, leaf_index: u64, depth: u8) -> GateResult<MerklePath>;

    fn get_root(&self, event_id: &str) -> GateResult<FieldElement>;

    fn get_leaf(&self, event_id: &str, index: u64) -> GateResult<FieldElement>;

    fn snapshot_path(&self, event_id: &str, leaf_index: u64) -> GateResult<PathSnapshot>;
}

#[derive(Clone, Copy)]
enum RootUpdate {
    Publish(FieldElement, u64),
    PublishIfNewer(FieldElement, u64),
    Keep,
}

#[derive(Clone)]
pub struct SledTreeStore {
    nodes: Tree,
    events: Tree,
}

impl SledTreeStore {
    pub fn new(db: &GateDb) -> GateResult<Self> {
        Ok(Self {
            nodes: db.tree(NODES_TREE)?,
            events: db.tree(EVENTS_TREE)?,
        })
    }

    pub fn in_memory() -> GateResult<Self> {
        Self::new(&GateDb::in_memory()?)
    }

    pub fn event_record(&self, event_id: &str) -> GateResult<Option<EventTreeRecord>> {
        let prefix = event_key(event_id)?;
        let raw = self
            .events
            .get(&prefix)
            .map_err(|err| storage_error("event lookup", err))?;
        raw.map(|bytes| decode_record(&bytes)).transpose()
    }

    fn replace(
        &self,
        event_id: &str,
        depth: u8,
        nodes: &[MerkleNode],
        root: RootUpdate,
    ) -> GateResult<PublishOutcome> {
        let prefix = event_key(event_id)?;
        validate_nodes(depth, nodes)?;
        let encoded: Vec<(Vec<u8>, [u8; FIELD_ELEMENT_BYTES])> = nodes
            .iter()
            .map(|node| (node_key(&prefix, node.depth, node.index), *node.hash.as_bytes()))
            .collect();
        let updated_at = current_epoch_secs();

        let outcome = (&self.nodes, &self.events).transaction(
            |(nodes_tx, events_tx)| -> ConflictableTransactionResult<PublishOutcome, GateError> {
                let previous = read_record(events_tx, &prefix)?;
                if let (RootUpdate::PublishIfNewer(_, leaf_count), Some(previous)) =
                    (root, &previous)
                {
                    if let (Some(stored_root), Some(stored_count)) =
                        (previous.merkle_root, previous.leaf_count)
                    {
                        if previous.depth == depth && stored_count > leaf_count {
                            return Ok(PublishOutcome::Superseded {
                                root: stored_root,
                                leaf_count: stored_count,
                            });
                        }
                    }
                }
                if let Some(previous) = &previous {
                    for level in 0..=previous.depth {
                        let width = layer_width(previous.depth, level)
                            .map_err(ConflictableTransactionError::Abort)?;
                        for index in 0..width {
                            nodes_tx.remove(node_key(&prefix, level, index))?;
                        }
                    }
                }
                for (key, hash) in &encoded {
                    nodes_tx.insert(key.as_slice(), &hash[..])?;
                }

                let (merkle_root, leaf_count) = match root {
                    RootUpdate::Publish(root, leaf_count)
                    | RootUpdate::PublishIfNewer(root, leaf_count) => {
                        (Some(root), Some(leaf_count))
                    }
                    RootUpdate::Keep => previous
                        .as_ref()
                        .map(|record| (record.merkle_root, record.leaf_count))
                        .unwrap_or((None, None)),
                };
                let record = EventTreeRecord {
                    merkle_root,
                    depth,
                    leaf_count,
                    updated_at,
                };
                let bytes = serde_json::to_vec(&record).map_err(|err| {
                    ConflictableTransactionError::Abort(GateError::internal(format!(
                        "failed to encode event record: {err}"
                    )))
                })?;
                events_tx.insert(prefix.as_slice(), bytes)?;
                Ok(PublishOutcome::Published)
            },
        );
        outcome.map_err(|err| transaction_error("tree replace", err))
    }
}

impl TreeStore for SledTreeStore {
    fn store_batch_with_root(&self, tree: &BuiltTree) -> GateResult<()> {
        self.replace(
            &tree.event_id,
            tree.depth,
            &tree.nodes,
            RootUpdate::Publish(tree.root, tree.leaf_count as u64),
        )
        .map(|_| ())
    }

    fn publish_tree(&self, tree: &BuiltTree) -> GateResult<PublishOutcome> {
        self.replace(
            &tree.event_id,
            tree.depth,
            &tree.nodes,
            RootUpdate::PublishIfNewer(tree.root, tree.leaf_count as u64),
        )
    }

    fn store_batch(&self, event_id: &str, nodes: &[MerkleNode]) -> GateResult<()> {
        let depth = nodes.iter().map(|node| node.depth).max().unwrap_or(0);
        self.replace(event_id, depth, nodes, RootUpdate::Keep)
            .map(|_| ())
    }

    fn get_path(&self, event_id: &str, leaf_index: u64, depth: u8) -> GateResult<MerklePath> {
        let prefix = event_key(event_id)?;
        let outcome = (&self.nodes, &self.events).transaction(
            |(nodes_tx, events_tx)| -> ConflictableTransactionResult<MerklePath, GateError> {
                if read_record(events_tx, &prefix)?.is_none() {
                    return abort(GateError::not_found(format!(
                        "no tree stored for event {event_id}"
                    )));
                }
                collect_path(nodes_tx, &prefix, leaf_index, depth)
            },
        );
        outcome.map_err(|err| transaction_error("path read", err))
    }

    fn get_root(&self, event_id: &str) -> GateResult<FieldElement> {
        let record = self
            .event_record(event_id)?
            .ok_or_else(|| GateError::not_found(format!("no tree stored for event {event_id}")))?;
        record.merkle_root.ok_or_else(|| {
            GateError::not_found(format!("event {event_id} has no published merkle root"))
        })
    }

    fn get_leaf(&self, event_id: &str, index: u64) -> GateResult<FieldElement> {
        let prefix = event_key(event_id)?;
        let raw = self
            .nodes
            .get(node_key(&prefix, 0, index))
            .map_err(|err| storage_error("leaf lookup", err))?
            .ok_or_else(|| {
                GateError::not_found(format!("event {event_id} has no stored leaf {index}"))
            })?;
        decode_hash(&raw)
    }

    fn snapshot_path(&self, event_id: &str, leaf_index: u64) -> GateResult<PathSnapshot> {
        let prefix = event_key(event_id)?;
        let outcome = (&self.nodes, &self.events).transaction(
            |(nodes_tx, events_tx)| -> ConflictableTransactionResult<PathSnapshot, GateError> {
                let record = match read_record(events_tx, &prefix)? {
                    Some(record) => record,
                    None => {
                        return abort(GateError::not_found(format!(
                            "no tree stored for event {event_id}"
                        )))
                    }
                };
                let root = match record.merkle_root {
                    Some(root) => root,
                    None => {
                        return abort(GateError::not_found(format!(
                            "event {event_id} has no published merkle root"
                        )))
                    }
                };
                let leaf = match read_node(nodes_tx, &prefix, 0, leaf_index)? {
                    Some(leaf) => leaf,
                    None => {
                        return abort(GateError::not_found(format!(
                            "event {event_id} has no stored leaf {leaf_index}"
                        )))
                    }
                };
                let path = collect_path(nodes_tx, &prefix, leaf_index, record.depth)?;
                Ok(PathSnapshot {
                    root,
                    depth: record.depth,
                    leaf_index,
                    leaf,
                    path,
                })
            },
        );
        outcome.map_err(|err| transaction_error("path snapshot", err))
    }
}

fn validate_nodes(depth: u8, nodes: &[MerkleNode]) -> GateResult<()> {
    if depth > MAX_TREE_DEPTH {
        return Err(GateError::invalid(format!(
            "tree depth {depth} exceeds maximum {MAX_TREE_DEPTH}"
        )));
    }
    for node in nodes {
        if node.depth > depth || node.index >= layer_width(depth, node.depth)? {
            return Err(GateError::invalid(format!(
                "node ({}, {}) lies outside a depth-{depth} tree",
                node.depth, node.index
            )));
        }
    }
    Ok(())
}

fn node_key(prefix: &[u8], depth: u8, index: u64) -> Vec<u8> {
    let mut suffix = [0u8; 9];
    suffix[0] = depth;
    suffix[1..].copy_from_slice(&index.to_be_bytes());
    scoped_key(prefix, &suffix)
}

fn abort<T>(err: GateError) -> ConflictableTransactionResult<T, GateError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn transaction_error(context: &str, err: TransactionError<GateError>) -> GateError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => storage_error(context, err),
    }
}

fn read_record(
    events_tx: &TransactionalTree,
    prefix: &[u8],
) -> ConflictableTransactionResult<Option<EventTreeRecord>, GateError> {
    match events_tx.get(prefix)? {
        Some(raw) => decode_record(&raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn read_node(
    nodes_tx: &TransactionalTree,
    prefix: &[u8],
    depth: u8,
    index: u64,
) -> ConflictableTransactionResult<Option<FieldElement>, GateError> {
    match nodes_tx.get(node_key(prefix, depth, index))? {
        Some(raw) => decode_hash(&raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn collect_path(
    nodes_tx: &TransactionalTree,
    prefix: &[u8],
    leaf_index: u64,
    depth: u8,
) -> ConflictableTransactionResult<MerklePath, GateError> {
    let steps = path_steps(leaf_index, depth).map_err(ConflictableTransactionError::Abort)?;
    let mut path = MerklePath::default();
    for step in steps {
        let sibling = match read_node(nodes_tx, prefix, step.level, step.sibling_index)? {
            Some(hash) => hash,
            None => {
                return abort(GateError::not_found(format!(
                    "sibling node ({}, {}) is not stored",
                    step.level, step.sibling_index
                )))
            }
        };
        path.path_elements.push(sibling);
        path.path_indices.push(step.side);
    }
    Ok(path)
}

fn decode_record(raw: &[u8]) -> GateResult<EventTreeRecord> {
    serde_json::from_slice(raw)
        .map_err(|err| GateError::internal(format!("corrupt event record: {err}")))
}

fn decode_hash(raw: &[u8]) -> GateResult<FieldElement> {
    let bytes: [u8; FIELD_ELEMENT_BYTES] = raw.try_into().map_err(|_| {
        GateError::internal(format!(
            "stored node hash has {} bytes, expected {FIELD_ELEMENT_BYTES}",
            raw.len()
        ))
    })?;
    FieldElement::from_canonical_bytes(bytes)
        .map_err(|err| GateError::internal(format!("corrupt node hash: {err}")))
}
