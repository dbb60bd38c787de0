//! Entry verification and tree maintenance.
//!
//! `verify` runs a fixed sequence: parse signals, bind them to the requested
//! event, compare roots, pre-check the ledger, run the proof checker, then
//! claim the nullifier. Only the final claim writes; every earlier exit leaves
//! the ledger untouched.

use std::{fmt, sync::Arc};

use entrygate_common::{
    ensure_event_binding, event_id_to_field, leaf_index_for_user, order_roster, FieldElement,
    FieldHasher, GateError, GateResult, MerklePath, MerkleTreeBuilder, PublicSignals,
    TicketRecord,
};
use entrygate_verifier::ProofChecker;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    nullifier::NullifierLedger,
    roster::TicketRoster,
    store::{PublishOutcome, TreeStore},
};

pub const REASON_ROOT_MISMATCH: &str = "merkle root mismatch";
pub const REASON_ALREADY_CHECKED_IN: &str = "already checked in";
pub const REASON_PROOF_INVALID: &str = "proof verification failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    RootMismatch,
    AlreadyCheckedIn,
    ProofInvalid,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RootMismatch => REASON_ROOT_MISMATCH,
            RejectReason::AlreadyCheckedIn => REASON_ALREADY_CHECKED_IN,
            RejectReason::ProofInvalid => REASON_PROOF_INVALID,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::RootMismatch => "MERKLE_ROOT_MISMATCH",
            RejectReason::AlreadyCheckedIn => "NULLIFIER_REPLAY",
            RejectReason::ProofInvalid => "PROOF_INVALID",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Rejected(RejectReason),
}

/// One check-in attempt. `proof` and `public_signals` are the raw JSON
/// documents produced by the wallet.
#[derive(Clone, Debug, Deserialize)]
pub struct EntryRequest {
    pub event_id: String,
    pub proof: String,
    pub public_signals: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub event_id: String,
    pub root: FieldElement,
    pub depth: u8,
    pub leaf_count: usize,
}

/// What a holder's wallet needs to prove membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HolderPath {
    pub root: FieldElement,
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
    pub leaf: FieldElement,
    pub leaf_index: u64,
}

impl HolderPath {
    pub fn merkle_path(&self) -> MerklePath {
        MerklePath {
            path_elements: self.path_elements.clone(),
            path_indices: self.path_indices.clone(),
        }
    }
}

pub struct EntryPipeline {
    store: Arc<dyn TreeStore>,
    ledger: Arc<dyn NullifierLedger>,
    roster: Arc<dyn TicketRoster>,
    checker: Arc<dyn ProofChecker>,
    builder: MerkleTreeBuilder,
}

impl EntryPipeline {
    pub fn new(
        store: Arc<dyn TreeStore>,
        ledger: Arc<dyn NullifierLedger>,
        roster: Arc<dyn TicketRoster>,
        checker: Arc<dyn ProofChecker>,
        builder: MerkleTreeBuilder,
    ) -> Self {
        Self {
            store,
            ledger,
            roster,
            checker,
            builder,
        }
    }

    pub fn store(&self) -> &dyn TreeStore {
        self.store.as_ref()
    }

    pub fn tree_depth(&self) -> u8 {
        self.builder.depth()
    }

    pub async fn verify(
        &self,
        request: &EntryRequest,
        cancel: &CancellationToken,
    ) -> GateResult<Verdict> {
        let event_id = request.event_id.as_str();
        if event_id.is_empty() {
            return Err(GateError::invalid("event id must not be empty"));
        }
        ensure_live(cancel, "before parsing public signals")?;

        let signals = PublicSignals::parse_json(&request.public_signals)?;
        debug!(event_id, "public signals parsed");

        ensure_event_binding(&signals, event_id)?;
        debug!(event_id, "proof bound to requested event");
        ensure_live(cancel, "before root binding")?;

        let stored_root = self.store.get_root(event_id)?;
        if stored_root != signals.merkle_root {
            warn!(
                event_id,
                proof_root = %signals.merkle_root,
                %stored_root,
                "rejecting entry: merkle root mismatch"
            );
            return Ok(Verdict::Rejected(RejectReason::RootMismatch));
        }

        let nullifier = signals.nullifier_hash.as_bytes();
        if self.ledger.exists(event_id, nullifier)? {
            warn!(event_id, nullifier = %signals.nullifier_hash, "rejecting entry: nullifier already spent");
            return Ok(Verdict::Rejected(RejectReason::AlreadyCheckedIn));
        }
        ensure_live(cancel, "before proof verification")?;

        if !self.check_proof(request, cancel).await? {
            warn!(event_id, "rejecting entry: proof verification failed");
            return Ok(Verdict::Rejected(RejectReason::ProofInvalid));
        }
        ensure_live(cancel, "before recording nullifier")?;

        match self.ledger.insert(event_id, nullifier) {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                warn!(event_id, nullifier = %signals.nullifier_hash, "rejecting entry: lost nullifier race");
                return Ok(Verdict::Rejected(RejectReason::AlreadyCheckedIn));
            }
            Err(err) => {
                error!(event_id, error = %err, "nullifier ledger insert failed");
                return Err(err);
            }
        }

        info!(event_id, nullifier = %signals.nullifier_hash, "entry admitted");
        Ok(Verdict::Verified)
    }

    async fn check_proof(
        &self,
        request: &EntryRequest,
        cancel: &CancellationToken,
    ) -> GateResult<bool> {
        let checker = Arc::clone(&self.checker);
        let proof = request.proof.clone();
        let public_signals = request.public_signals.clone();
        let task = tokio::task::spawn_blocking(move || checker.verify(&proof, &public_signals));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled(
                "cancelled during proof verification".into(),
            )),
            joined = task => match joined {
                Ok(Ok(valid)) => Ok(valid),
                Ok(Err(err)) => {
                    error!(event_id = %request.event_id, error = %err, "proof checker failed");
                    Err(GateError::internal(format!("proof checker failed: {err}")))
                }
                Err(err) => Err(GateError::internal(format!("proof checker task failed: {err}"))),
            },
        }
    }

    /// Rebuilds the event tree from the current roster and publishes its root.
    /// Rebuilding an unchanged roster republishes the same root. A rebuild
    /// that loses a race to one built from a larger roster reports the stored
    /// generation instead of overwriting it.
    pub async fn build_merkle_tree(
        &self,
        event_id: &str,
        cancel: &CancellationToken,
    ) -> GateResult<TreeSummary> {
        // Trees for ids that cannot be bound into a proof would never verify.
        event_id_to_field(event_id)?;
        ensure_live(cancel, "before reading roster")?;

        let tickets = self.ordered_roster(event_id)?;
        let builder = self.builder;
        let store = Arc::clone(&self.store);
        let task_cancel = cancel.clone();
        let owned_event = event_id.to_string();
        let (tree, outcome) = tokio::task::spawn_blocking(move || {
            let mut hasher = FieldHasher::new()?;
            let leaves = tickets
                .iter()
                .map(|ticket| hasher.identity_commitment(&ticket.user_id))
                .collect::<GateResult<Vec<_>>>()?;
            let tree = builder.build(&owned_event, &leaves)?;
            ensure_live(&task_cancel, "before publishing tree")?;
            let outcome = store.publish_tree(&tree)?;
            Ok::<_, GateError>((tree, outcome))
        })
        .await
        .map_err(|err| GateError::internal(format!("tree build task failed: {err}")))??;

        match outcome {
            PublishOutcome::Published => {
                info!(
                    event_id,
                    root = %tree.root,
                    depth = tree.depth,
                    leaves = tree.leaf_count,
                    "merkle tree rebuilt"
                );
                Ok(TreeSummary {
                    event_id: tree.event_id,
                    root: tree.root,
                    depth: tree.depth,
                    leaf_count: tree.leaf_count,
                })
            }
            PublishOutcome::Superseded { root, leaf_count } => {
                debug!(
                    event_id,
                    built_leaves = tree.leaf_count,
                    stored_leaves = leaf_count,
                    "larger tree already published; keeping it"
                );
                Ok(TreeSummary {
                    event_id: tree.event_id,
                    root,
                    depth: tree.depth,
                    leaf_count: leaf_count as usize,
                })
            }
        }
    }

    /// Path for the holder's first ticket in mint order.
    pub async fn get_merkle_path(
        &self,
        event_id: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> GateResult<HolderPath> {
        event_id_to_field(event_id)?;
        ensure_live(cancel, "before path lookup")?;

        let tickets = self.ordered_roster(event_id)?;
        let leaf_index = leaf_index_for_user(&tickets, user_id).ok_or_else(|| {
            GateError::not_found(format!("user {user_id} holds no ticket for event {event_id}"))
        })?;

        let snapshot = self.store.snapshot_path(event_id, leaf_index)?;
        let expected_leaf = FieldHasher::new()?.identity_commitment(user_id)?;
        if snapshot.leaf != expected_leaf {
            warn!(event_id, leaf_index, "stored leaf does not match holder; tree is stale");
            return Err(GateError::not_found(format!(
                "event {event_id} tree does not yet include user {user_id}; rebuild pending"
            )));
        }
        debug!(event_id, leaf_index, "merkle path served");

        Ok(HolderPath {
            root: snapshot.root,
            path_elements: snapshot.path.path_elements,
            path_indices: snapshot.path.path_indices,
            leaf: snapshot.leaf,
            leaf_index,
        })
    }

    fn ordered_roster(&self, event_id: &str) -> GateResult<Vec<TicketRecord>> {
        let mut tickets = self.roster.list_tickets_for_event(event_id)?;
        order_roster(&mut tickets);
        Ok(tickets)
    }
}

fn ensure_live(cancel: &CancellationToken, stage: &str) -> GateResult<()> {
    if cancel.is_cancelled() {
        return Err(GateError::Cancelled(format!("request cancelled {stage}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nullifier::SledNullifierLedger, roster::SledTicketRoster, store::SledTreeStore};
    use entrygate_common::{BuiltTree, MerkleNode};
    use entrygate_test_fixtures::{
        expected_tree, nullifier_for, sample_roster, signals_json, ScriptedChecker,
        SAMPLE_EVENT_ID, SAMPLE_PROOF_JSON,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every store call so tests can assert which steps touched storage.
    struct CountingStore {
        inner: SledTreeStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl TreeStore for CountingStore {
        fn store_batch_with_root(&self, tree: &BuiltTree) -> GateResult<()> {
            self.tick();
            self.inner.store_batch_with_root(tree)
        }

        fn publish_tree(&self, tree: &BuiltTree) -> GateResult<PublishOutcome> {
            self.tick();
            self.inner.publish_tree(tree)
        }

        fn store_batch(&self, event_id: &str, nodes: &[MerkleNode]) -> GateResult<()> {
            self.tick();
            self.inner.store_batch(event_id, nodes)
        }

        fn get_path(&self, event_id: &str, leaf_index: u64, depth: u8) -> GateResult<MerklePath> {
            self.tick();
            self.inner.get_path(event_id, leaf_index, depth)
        }

        fn get_root(&self, event_id: &str) -> GateResult<FieldElement> {
            self.tick();
            self.inner.get_root(event_id)
        }

        fn get_leaf(&self, event_id: &str, index: u64) -> GateResult<FieldElement> {
            self.tick();
            self.inner.get_leaf(event_id, index)
        }

        fn snapshot_path(
            &self,
            event_id: &str,
            leaf_index: u64,
        ) -> GateResult<crate::store::PathSnapshot> {
            self.tick();
            self.inner.snapshot_path(event_id, leaf_index)
        }
    }

    struct CountingLedger {
        inner: SledNullifierLedger,
        calls: AtomicUsize,
    }

    impl NullifierLedger for CountingLedger {
        fn exists(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(event_id, nullifier_hash)
        }

        fn insert(&self, event_id: &str, nullifier_hash: &[u8]) -> GateResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.insert(event_id, nullifier_hash)
        }
    }

    struct Harness {
        pipeline: EntryPipeline,
        store: Arc<CountingStore>,
        ledger: Arc<CountingLedger>,
        checker: Arc<ScriptedChecker>,
    }

    const DEPTH: u8 = 3;

    fn harness(checker: ScriptedChecker) -> Harness {
        let roster = SledTicketRoster::in_memory().unwrap();
        for ticket in sample_roster() {
            roster.record_ticket(SAMPLE_EVENT_ID, &ticket).unwrap();
        }
        let store = Arc::new(CountingStore {
            inner: SledTreeStore::in_memory().unwrap(),
            calls: AtomicUsize::new(0),
        });
        let ledger = Arc::new(CountingLedger {
            inner: SledNullifierLedger::in_memory().unwrap(),
            calls: AtomicUsize::new(0),
        });
        let checker = Arc::new(checker);
        let pipeline = EntryPipeline::new(
            store.clone(),
            ledger.clone(),
            Arc::new(roster),
            checker.clone(),
            MerkleTreeBuilder::new(DEPTH),
        );
        Harness {
            pipeline,
            store,
            ledger,
            checker,
        }
    }

    fn request_for(root: &FieldElement, event_id: &str, user_id: &str) -> EntryRequest {
        EntryRequest {
            event_id: SAMPLE_EVENT_ID.to_string(),
            proof: SAMPLE_PROOF_JSON.to_string(),
            public_signals: signals_json(root, event_id, &nullifier_for(user_id, event_id)),
        }
    }

    async fn built(h: &Harness) -> TreeSummary {
        h.pipeline
            .build_merkle_tree(SAMPLE_EVENT_ID, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn build_is_idempotent_and_matches_roster_order() {
        let h = harness(ScriptedChecker::accepting());
        let first = built(&h).await;
        let second = built(&h).await;
        assert_eq!(first, second);

        let expected = expected_tree(SAMPLE_EVENT_ID, &sample_roster(), DEPTH);
        assert_eq!(first.root, expected.root);
        assert_eq!(first.leaf_count, sample_roster().len());
    }

    #[tokio::test]
    async fn cancelled_build_publishes_nothing() {
        let h = harness(ScriptedChecker::accepting());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = h
            .pipeline
            .build_merkle_tree(SAMPLE_EVENT_ID, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Cancelled(_)));
        assert_eq!(h.store.calls(), 0);
        assert!(matches!(
            h.store.inner.get_root(SAMPLE_EVENT_ID),
            Err(GateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn build_rejects_event_ids_that_cannot_bind_a_proof() {
        let h = harness(ScriptedChecker::accepting());
        for event_id in ["", "-", "not-hex-event"] {
            let err = h
                .pipeline
                .build_merkle_tree(event_id, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, GateError::InvalidArgument(_)), "{event_id}");
            let err = h
                .pipeline
                .get_merkle_path(event_id, "alice", &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, GateError::InvalidArgument(_)), "{event_id}");
        }
        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn rebuild_from_older_roster_keeps_newer_tree() {
        let h = harness(ScriptedChecker::accepting());
        let newest = built(&h).await;

        // A second pipeline over the same store whose roster snapshot lags.
        let lagging_roster = SledTicketRoster::in_memory().unwrap();
        for ticket in sample_roster().into_iter().take(3) {
            lagging_roster.record_ticket(SAMPLE_EVENT_ID, &ticket).unwrap();
        }
        let lagging = EntryPipeline::new(
            h.store.clone(),
            h.ledger.clone(),
            Arc::new(lagging_roster),
            h.checker.clone(),
            MerkleTreeBuilder::new(DEPTH),
        );
        let summary = lagging
            .build_merkle_tree(SAMPLE_EVENT_ID, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, newest);
        assert_eq!(h.store.inner.get_root(SAMPLE_EVENT_ID).unwrap(), newest.root);
        let last = sample_roster().pop().unwrap();
        h.pipeline
            .get_merkle_path(SAMPLE_EVENT_ID, &last.user_id, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn valid_entry_then_replay() {
        let h = harness(ScriptedChecker::accepting());
        let summary = built(&h).await;
        let cancel = CancellationToken::new();
        let request = request_for(&summary.root, SAMPLE_EVENT_ID, "alice");

        assert_eq!(
            h.pipeline.verify(&request, &cancel).await.unwrap(),
            Verdict::Verified
        );
        assert_eq!(
            h.pipeline.verify(&request, &cancel).await.unwrap(),
            Verdict::Rejected(RejectReason::AlreadyCheckedIn)
        );
        assert_eq!(h.checker.calls(), 1);
    }

    #[tokio::test]
    async fn foreign_event_fails_before_any_storage_access() {
        let h = harness(ScriptedChecker::accepting());
        let summary = built(&h).await;
        let store_calls = h.store.calls();
        let ledger_calls = h.ledger.calls.load(Ordering::SeqCst);

        let foreign = "1c7d2e90-5a4b-4c3d-8e2f-0a1b2c3d4e5f";
        let request = request_for(&summary.root, foreign, "alice");
        let err = h
            .pipeline
            .verify(&request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::InvalidArgument(_)));
        assert_eq!(h.store.calls(), store_calls);
        assert_eq!(h.ledger.calls.load(Ordering::SeqCst), ledger_calls);
        assert_eq!(h.checker.calls(), 0);
    }

    #[tokio::test]
    async fn stale_root_is_rejected_without_checking_proof() {
        let h = harness(ScriptedChecker::accepting());
        built(&h).await;
        let stale = FieldElement::from_decimal("12345").unwrap();
        let verdict = h
            .pipeline
            .verify(
                &request_for(&stale, SAMPLE_EVENT_ID, "alice"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Rejected(RejectReason::RootMismatch));
        assert_eq!(verdict_reason(verdict), Some(REASON_ROOT_MISMATCH));
        assert_eq!(h.checker.calls(), 0);
    }

    fn verdict_reason(verdict: Verdict) -> Option<&'static str> {
        match verdict {
            Verdict::Verified => None,
            Verdict::Rejected(reason) => Some(reason.as_str()),
        }
    }

    #[tokio::test]
    async fn invalid_proof_leaves_nullifier_unspent() {
        let h = harness(ScriptedChecker::rejecting());
        let summary = built(&h).await;
        let request = request_for(&summary.root, SAMPLE_EVENT_ID, "bob");
        let verdict = h
            .pipeline
            .verify(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Rejected(RejectReason::ProofInvalid));

        let nullifier = nullifier_for("bob", SAMPLE_EVENT_ID);
        assert!(!h
            .ledger
            .inner
            .exists(SAMPLE_EVENT_ID, nullifier.as_bytes())
            .unwrap());
    }

    #[tokio::test]
    async fn checker_failure_is_internal() {
        let h = harness(ScriptedChecker::failing());
        let summary = built(&h).await;
        let err = h
            .pipeline
            .verify(
                &request_for(&summary.root, SAMPLE_EVENT_ID, "carol"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Internal(_)));
    }

    #[tokio::test]
    async fn malformed_signals_are_invalid_argument() {
        let h = harness(ScriptedChecker::accepting());
        built(&h).await;
        let oversized = format!(r#"["1", "{}", "3"]"#, "9".repeat(80));
        for signals in [r#"["1", "2"]"#.to_string(), oversized] {
            let request = EntryRequest {
                event_id: SAMPLE_EVENT_ID.to_string(),
                proof: SAMPLE_PROOF_JSON.to_string(),
                public_signals: signals,
            };
            let err = h
                .pipeline
                .verify(&request, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, GateError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn cancelled_request_records_nothing() {
        let h = harness(ScriptedChecker::accepting());
        let summary = built(&h).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = request_for(&summary.root, SAMPLE_EVENT_ID, "alice");
        let err = h.pipeline.verify(&request, &cancel).await.unwrap_err();
        assert!(matches!(err, GateError::Cancelled(_)));

        assert_eq!(
            h.pipeline
                .verify(&request, &CancellationToken::new())
                .await
                .unwrap(),
            Verdict::Verified
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_proofs_admit_once() {
        let h = Arc::new(harness(ScriptedChecker::with_rendezvous(2)));
        let summary = built(&h).await;
        let request = request_for(&summary.root, SAMPLE_EVENT_ID, "dave");

        let spawn = |h: Arc<Harness>, request: EntryRequest| {
            tokio::spawn(async move {
                h.pipeline
                    .verify(&request, &CancellationToken::new())
                    .await
                    .unwrap()
            })
        };
        let first = spawn(h.clone(), request.clone());
        let second = spawn(h.clone(), request);
        let mut verdicts = vec![first.await.unwrap(), second.await.unwrap()];
        verdicts.sort_by_key(|v| matches!(v, Verdict::Rejected(_)));

        assert_eq!(
            verdicts,
            vec![
                Verdict::Verified,
                Verdict::Rejected(RejectReason::AlreadyCheckedIn)
            ]
        );
        assert_eq!(h.checker.calls(), 2);
    }

    #[tokio::test]
    async fn holder_path_recomputes_published_root() {
        let h = harness(ScriptedChecker::accepting());
        let summary = built(&h).await;
        let cancel = CancellationToken::new();
        let mut hasher = FieldHasher::new().unwrap();

        for ticket in sample_roster() {
            let path = h
                .pipeline
                .get_merkle_path(SAMPLE_EVENT_ID, &ticket.user_id, &cancel)
                .await
                .unwrap();
            assert_eq!(path.root, summary.root);
            assert_eq!(path.path_elements.len(), DEPTH as usize);
            assert_eq!(
                path.leaf,
                hasher.identity_commitment(&ticket.user_id).unwrap()
            );
            assert_eq!(
                path.merkle_path().compute_root(&path.leaf, &mut hasher).unwrap(),
                summary.root
            );
        }
    }

    #[tokio::test]
    async fn path_for_unknown_holder_is_not_found() {
        let h = harness(ScriptedChecker::accepting());
        built(&h).await;
        let err = h
            .pipeline
            .get_merkle_path(SAMPLE_EVENT_ID, "nobody", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
    }

    #[tokio::test]
    async fn verify_before_any_build_is_not_found() {
        let h = harness(ScriptedChecker::accepting());
        let root = FieldElement::from_decimal("1").unwrap();
        let err = h
            .pipeline
            .verify(
                &request_for(&root, SAMPLE_EVENT_ID, "alice"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
    }
}
