use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Barrier,
};

use anyhow::{Context, Result};
use entrygate_common::{
    event_id_to_field, order_roster, BuiltTree, FieldElement, FieldHasher, MerkleTreeBuilder,
    PublicSignals, TicketRecord,
};
use entrygate_verifier::{CheckerError, ProofChecker};
use once_cell::sync::OnceCell;

pub const SAMPLE_EVENT_ID: &str = "8b1f6a52-3e0c-4d7e-9a11-2f5c8e0d4b71";
pub const SAMPLE_DEPTH: u8 = 3;

/// Shape of a snarkjs Groth16 proof. The values are not a real proof; only a
/// scripted checker should ever see it.
pub const SAMPLE_PROOF_JSON: &str = r#"{"pi_a":["1","2","1"],"pi_b":[["1","0"],["2","0"],["1","0"]],"pi_c":["3","4","1"],"protocol":"groth16","curve":"bn128"}"#;

static FIXTURES: OnceCell<EventFixtures> = OnceCell::new();

/// The sample event's roster and the tree it must produce.
pub struct EventFixtures {
    roster: Vec<TicketRecord>,
    tree: BuiltTree,
}

impl EventFixtures {
    pub fn roster(&self) -> &[TicketRecord] {
        &self.roster
    }

    pub fn tree(&self) -> &BuiltTree {
        &self.tree
    }

    pub fn root(&self) -> FieldElement {
        self.tree.root
    }

    /// Signals an honest wallet would publish for `user_id` on the sample event.
    pub fn signals_for(&self, user_id: &str) -> String {
        signals_json(
            &self.tree.root,
            SAMPLE_EVENT_ID,
            &nullifier_for(user_id, SAMPLE_EVENT_ID),
        )
    }
}

pub fn fixtures() -> &'static EventFixtures {
    FIXTURES.get_or_init(|| build_fixtures().expect("failed to build entrygate test fixtures"))
}

fn build_fixtures() -> Result<EventFixtures> {
    let roster = sample_roster();
    let tree = try_expected_tree(SAMPLE_EVENT_ID, &roster, SAMPLE_DEPTH)
        .context("build sample event tree")?;
    Ok(EventFixtures { roster, tree })
}

/// Six tickets inserted out of mint order; `erin` holds two of them.
pub fn sample_roster() -> Vec<TicketRecord> {
    [
        ("tkt-004", "dave", 1_700_000_300),
        ("tkt-001", "alice", 1_700_000_100),
        ("tkt-003", "carol", 1_700_000_200),
        ("tkt-002", "bob", 1_700_000_100),
        ("tkt-006", "erin", 1_700_000_500),
        ("tkt-005", "erin", 1_700_000_400),
    ]
    .into_iter()
    .map(|(ticket_id, user_id, minted_at)| TicketRecord {
        ticket_id: ticket_id.to_string(),
        user_id: user_id.to_string(),
        minted_at,
    })
    .collect()
}

/// Tree the backend must publish for `tickets`, computed independently of
/// any store.
pub fn expected_tree(event_id: &str, tickets: &[TicketRecord], depth: u8) -> BuiltTree {
    try_expected_tree(event_id, tickets, depth).expect("expected tree")
}

fn try_expected_tree(event_id: &str, tickets: &[TicketRecord], depth: u8) -> Result<BuiltTree> {
    let mut ordered = tickets.to_vec();
    order_roster(&mut ordered);
    let mut hasher = FieldHasher::new()?;
    let leaves = ordered
        .iter()
        .map(|ticket| hasher.identity_commitment(&ticket.user_id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MerkleTreeBuilder::new(depth).build(event_id, &leaves)?)
}

/// Deterministic stand-in for the circuit's nullifier of `user_id` at `event_id`.
pub fn nullifier_for(user_id: &str, event_id: &str) -> FieldElement {
    let mut hasher = FieldHasher::new().expect("poseidon parameters");
    let commitment = hasher
        .identity_commitment(user_id)
        .expect("identity commitment");
    let event = event_id_to_field(event_id).expect("hex event id");
    hasher.hash_pair(&commitment, &event).expect("nullifier hash")
}

pub fn signals_json(root: &FieldElement, event_id: &str, nullifier: &FieldElement) -> String {
    PublicSignals {
        merkle_root: *root,
        event_id: event_id_to_field(event_id).expect("hex event id"),
        nullifier_hash: *nullifier,
    }
    .to_json()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Script {
    Accept,
    Reject,
    Fail,
}

/// Proof checker with a fixed answer and a call counter.
pub struct ScriptedChecker {
    script: Script,
    calls: AtomicUsize,
    rendezvous: Option<Barrier>,
}

impl ScriptedChecker {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            rendezvous: None,
        }
    }

    pub fn accepting() -> Self {
        Self::scripted(Script::Accept)
    }

    pub fn rejecting() -> Self {
        Self::scripted(Script::Reject)
    }

    pub fn failing() -> Self {
        Self::scripted(Script::Fail)
    }

    /// Accepting checker that holds each call until `parties` calls are in
    /// flight, forcing concurrent requests past the ledger pre-check together.
    pub fn with_rendezvous(parties: usize) -> Self {
        Self {
            rendezvous: Some(Barrier::new(parties)),
            ..Self::accepting()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofChecker for ScriptedChecker {
    fn verify(&self, _proof_json: &str, _public_signals_json: &str) -> Result<bool, CheckerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait();
        }
        match self.script {
            Script::Accept => Ok(true),
            Script::Reject => Ok(false),
            Script::Fail => Err(CheckerError::Command {
                command: "scripted".into(),
                message: "verifier unavailable".into(),
            }),
        }
    }
}
