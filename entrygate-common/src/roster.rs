//! Ticket roster rows and the leaf-ordering contract.
//!
//! Leaf `i` of an event tree belongs to the `i`-th ticket when tickets are
//! sorted by mint time, then ticket id. Tree builds and path lookups both go
//! through [`order_roster`]; any other ordering yields paths for the wrong leaf.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: String,
    pub user_id: String,
    /// Unix seconds.
    pub minted_at: u64,
}

pub fn order_roster(tickets: &mut [TicketRecord]) {
    tickets.sort_by(|a, b| {
        a.minted_at
            .cmp(&b.minted_at)
            .then_with(|| a.ticket_id.cmp(&b.ticket_id))
    });
}

/// Leaf index of the first ticket `user_id` holds in an ordered roster.
pub fn leaf_index_for_user(ordered: &[TicketRecord], user_id: &str) -> Option<u64> {
    ordered
        .iter()
        .position(|ticket| ticket.user_id == user_id)
        .map(|index| index as u64)
}
