//! Ticket roster: which holders belong to which event.

use entrygate_common::{GateError, GateResult, TicketRecord};
use sled::Tree;

use crate::db::{event_key, scoped_key, storage_error, GateDb, TICKETS_TREE};

pub trait TicketRoster: Send + Sync {
    /// Unordered; callers sort with `order_roster`.
    fn list_tickets_for_event(&self, event_id: &str) -> GateResult<Vec<TicketRecord>>;
}

/// Roster rows keyed by `event_key(event) || ticket_id`.
#[derive(Clone)]
pub struct SledTicketRoster {
    tree: Tree,
}

impl SledTicketRoster {
    pub fn new(db: &GateDb) -> GateResult<Self> {
        Ok(Self {
            tree: db.tree(TICKETS_TREE)?,
        })
    }

    pub fn in_memory() -> GateResult<Self> {
        Self::new(&GateDb::in_memory()?)
    }

    /// Records an issued ticket and reports whether the row is new.
    /// Re-recording an identical row is a no-op; reusing a ticket id for a
    /// different row is `AlreadyExists`.
    pub fn record_ticket(&self, event_id: &str, ticket: &TicketRecord) -> GateResult<bool> {
        if ticket.ticket_id.is_empty() {
            return Err(GateError::invalid("ticket id must not be empty"));
        }
        if ticket.user_id.is_empty() {
            return Err(GateError::invalid("user id must not be empty"));
        }
        let key = scoped_key(&event_key(event_id)?, ticket.ticket_id.as_bytes());
        let value = serde_json::to_vec(ticket)
            .map_err(|err| GateError::internal(format!("failed to encode ticket: {err}")))?;

        let swapped = self
            .tree
            .compare_and_swap(&key, None as Option<&[u8]>, Some(value))
            .map_err(|err| storage_error("ticket insert", err))?;
        let Err(conflict) = swapped else {
            return Ok(true);
        };
        let existing: Option<TicketRecord> = conflict
            .current
            .map(|raw| serde_json::from_slice(&raw))
            .transpose()
            .map_err(|err| GateError::internal(format!("corrupt ticket record: {err}")))?;
        if existing.as_ref() == Some(ticket) {
            return Ok(false);
        }
        Err(GateError::AlreadyExists(format!(
            "ticket {} already issued for event {event_id}",
            ticket.ticket_id
        )))
    }

    /// Withdraws `ticket` if the stored row still matches it. Returns whether
    /// a row was removed.
    pub fn remove_ticket(&self, event_id: &str, ticket: &TicketRecord) -> GateResult<bool> {
        let key = scoped_key(&event_key(event_id)?, ticket.ticket_id.as_bytes());
        let value = serde_json::to_vec(ticket)
            .map_err(|err| GateError::internal(format!("failed to encode ticket: {err}")))?;
        let swapped = self
            .tree
            .compare_and_swap(&key, Some(value), None as Option<&[u8]>)
            .map_err(|err| storage_error("ticket removal", err))?;
        Ok(swapped.is_ok())
    }
}

impl TicketRoster for SledTicketRoster {
    fn list_tickets_for_event(&self, event_id: &str) -> GateResult<Vec<TicketRecord>> {
        let prefix = event_key(event_id)?;
        self.tree
            .scan_prefix(&prefix)
            .map(|item| {
                let (_, raw) = item.map_err(|err| storage_error("ticket scan", err))?;
                serde_json::from_slice(&raw)
                    .map_err(|err| GateError::internal(format!("corrupt ticket record: {err}")))
            })
            .collect()
    }
}
