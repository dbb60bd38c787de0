//! Fixed-depth binary Merkle tree over identity commitments.
//!
//! The tree always has `2^depth` leaf slots; unused slots hold the all-zero
//! padding leaf. Nodes are produced layer by layer so the backend can persist
//! every level for authentication-path queries.

use serde::{Deserialize, Serialize};

use crate::{
    error::{GateError, GateResult},
    field::FieldElement,
    hasher::FieldHasher,
};

/// Upper bound on tree depth (2^20 leaf slots).
pub const MAX_TREE_DEPTH: u8 = 20;

/// Filler for leaf slots beyond the roster. Never a valid commitment.
pub const PADDING_LEAF: FieldElement = FieldElement::ZERO;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    pub depth: u8,
    pub index: u64,
    pub hash: FieldElement,
}

/// Result of [`MerkleTreeBuilder::build`]: every node of one event's tree,
/// ordered by depth then index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltTree {
    pub event_id: String,
    pub depth: u8,
    pub leaf_count: usize,
    pub nodes: Vec<MerkleNode>,
    pub root: FieldElement,
}

impl BuiltTree {
    pub fn node(&self, depth: u8, index: u64) -> Option<&MerkleNode> {
        if index >= layer_width(self.depth, depth).ok()? {
            return None;
        }
        let mut offset = 0u64;
        for level in 0..depth {
            offset += layer_width(self.depth, level).ok()?;
        }
        self.nodes.get((offset + index) as usize)
    }

    pub fn leaf(&self, index: u64) -> Option<FieldElement> {
        self.node(0, index).map(|node| node.hash)
    }

    /// In-memory authentication path, same layout as the store returns.
    pub fn path(&self, leaf_index: u64) -> GateResult<MerklePath> {
        let mut path = MerklePath::default();
        for step in path_steps(leaf_index, self.depth)? {
            let sibling = self.node(step.level, step.sibling_index).ok_or_else(|| {
                GateError::not_found(format!(
                    "node ({}, {}) missing from built tree",
                    step.level, step.sibling_index
                ))
            })?;
            path.path_elements.push(sibling.hash);
            path.path_indices.push(step.side);
        }
        Ok(path)
    }
}

/// Sibling hashes and side bits from leaf level to just below the root.
///
/// `path_indices[k]` is 0 when the running node is a left child at level `k`
/// and 1 when it is a right child.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
}

impl MerklePath {
    pub fn len(&self) -> usize {
        self.path_elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_elements.is_empty()
    }

    /// Folds `leaf` up the path with `hash2`, as the circuit does.
    pub fn compute_root(
        &self,
        leaf: &FieldElement,
        hasher: &mut FieldHasher,
    ) -> GateResult<FieldElement> {
        if self.path_elements.len() != self.path_indices.len() {
            return Err(GateError::invalid(format!(
                "path has {} elements but {} indices",
                self.path_elements.len(),
                self.path_indices.len()
            )));
        }
        let mut current = *leaf;
        for (sibling, side) in self.path_elements.iter().zip(&self.path_indices) {
            current = match side {
                0 => hasher.hash_pair(&current, sibling)?,
                1 => hasher.hash_pair(sibling, &current)?,
                other => {
                    return Err(GateError::invalid(format!(
                        "path index must be 0 or 1, got {other}"
                    )))
                }
            };
        }
        Ok(current)
    }
}

/// One level of an authentication-path walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathStep {
    pub level: u8,
    pub sibling_index: u64,
    pub side: u8,
}

/// Sibling positions for `leaf_index` in a tree of `depth` levels:
/// sibling at `current ^ 1`, side `current & 1`, then `current /= 2`.
pub fn path_steps(leaf_index: u64, depth: u8) -> GateResult<Vec<PathStep>> {
    if depth > MAX_TREE_DEPTH {
        return Err(GateError::invalid(format!(
            "depth {depth} exceeds maximum {MAX_TREE_DEPTH}"
        )));
    }
    if leaf_index >= 1u64 << depth {
        return Err(GateError::invalid(format!(
            "leaf index {leaf_index} out of range for depth {depth}"
        )));
    }
    let mut current = leaf_index;
    let mut steps = Vec::with_capacity(depth as usize);
    for level in 0..depth {
        steps.push(PathStep {
            level,
            sibling_index: current ^ 1,
            side: (current & 1) as u8,
        });
        current /= 2;
    }
    Ok(steps)
}

/// Number of nodes on `level` of a tree of height `depth`.
pub fn layer_width(depth: u8, level: u8) -> GateResult<u64> {
    if depth > MAX_TREE_DEPTH {
        return Err(GateError::invalid(format!(
            "depth {depth} exceeds maximum {MAX_TREE_DEPTH}"
        )));
    }
    if level > depth {
        return Err(GateError::invalid(format!(
            "level {level} lies above the root of a depth-{depth} tree"
        )));
    }
    Ok(1u64 << (depth - level))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleTreeBuilder {
    depth: u8,
}

impl MerkleTreeBuilder {
    /// Depths above [`MAX_TREE_DEPTH`] are clamped rather than rejected.
    pub fn new(depth: u8) -> Self {
        Self {
            depth: depth.min(MAX_TREE_DEPTH),
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn build(&self, event_id: &str, leaves: &[FieldElement]) -> GateResult<BuiltTree> {
        if event_id.is_empty() {
            return Err(GateError::invalid("event id must not be empty"));
        }
        let capacity = self.capacity() as usize;
        if leaves.len() > capacity {
            return Err(GateError::invalid(format!(
                "{} leaves exceed tree capacity {} (depth {})",
                leaves.len(),
                capacity,
                self.depth
            )));
        }

        let mut hasher = FieldHasher::new()?;
        let mut layer = Vec::with_capacity(capacity);
        layer.extend_from_slice(leaves);
        layer.resize(capacity, PADDING_LEAF);

        let mut nodes = Vec::with_capacity(capacity * 2 - 1);
        push_layer(&mut nodes, 0, &layer);

        for level in 1..=self.depth {
            let next = layer
                .chunks_exact(2)
                .map(|pair| hasher.hash_pair(&pair[0], &pair[1]))
                .collect::<GateResult<Vec<_>>>()?;
            push_layer(&mut nodes, level, &next);
            layer = next;
        }

        Ok(BuiltTree {
            event_id: event_id.to_string(),
            depth: self.depth,
            leaf_count: leaves.len(),
            nodes,
            root: layer[0],
        })
    }
}

fn push_layer(nodes: &mut Vec<MerkleNode>, depth: u8, layer: &[FieldElement]) {
    nodes.extend(layer.iter().enumerate().map(|(index, hash)| MerkleNode {
        depth,
        index: index as u64,
        hash: *hash,
    }));
}
