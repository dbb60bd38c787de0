use serde_json::json;
use entrygate_test_fixtures::{fixtures, SAMPLE_DEPTH, SAMPLE_EVENT_ID, SAMPLE_PROOF_JSON};

fn main() {
    let fixtures = fixtures();
    let holders: Vec<_> = fixtures
        .roster()
        .iter()
        .map(|ticket| {
            json!({
                "ticket_id": ticket.ticket_id,
                "user_id": ticket.user_id,
                "minted_at": ticket.minted_at,
                "public_signals": fixtures.signals_for(&ticket.user_id),
            })
        })
        .collect();

    let payload = json!({
        "event_id": SAMPLE_EVENT_ID,
        "depth": SAMPLE_DEPTH,
        "root": fixtures.root(),
        "proof": SAMPLE_PROOF_JSON,
        "holders": holders,
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&payload).expect("serialize payload")
    );
}
