//! Shared primitives for anonymous event entry: field elements, the
//! circom-compatible Poseidon hasher, the fixed-depth Merkle builder, the
//! roster ordering contract and the proof's public-signal encoding.

pub mod error;
pub mod field;
pub mod hasher;
pub mod merkle;
pub mod roster;
pub mod signals;

pub use error::{GateError, GateResult};
pub use field::{field_modulus, FieldElement, FIELD_ELEMENT_BYTES, FIELD_MODULUS_DECIMAL};
pub use hasher::FieldHasher;
pub use merkle::{
    layer_width, path_steps, BuiltTree, MerkleNode, MerklePath, MerkleTreeBuilder, PathStep,
    MAX_TREE_DEPTH, PADDING_LEAF,
};
pub use roster::{leaf_index_for_user, order_roster, TicketRecord};
pub use signals::{
    ensure_event_binding, event_id_to_field, parse_signal, PublicSignals, PUBLIC_SIGNAL_COUNT,
};
