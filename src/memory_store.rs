// In-memory implementation of every collaborator.
//
// Drawings are kept as packed records so reads and writes go through the same
// encode/decode path a persistent store would use.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::DrawError;
use crate::settlement::PrizeCredit;
use crate::state::{Drawing, DrawingId, DrawingSummary, ParticipantId, Ticket, UnixTimestamp};
use crate::store::{
    BalanceService, Clock, DrawingStore, Finalization, ProfileDirectory, TicketLedger,
    TransitionOutcome,
};

#[derive(Default)]
struct Inner {
    drawings: BTreeMap<DrawingId, Vec<u8>>,
    tickets: Vec<Ticket>,
    names: HashMap<ParticipantId, String>,
    credits: Vec<PrizeCredit>,
    credit_attempts: usize,
    failing_credits: HashSet<ParticipantId>,
    failing_snapshots: HashSet<DrawingId>,
    snapshot_delay: Option<Duration>,
    finalize_delay: Option<Duration>,
    finalize_calls: usize,
}

/// Drawing store, ticket ledger, balance service and profile directory in one
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, DrawError> {
        self.inner
            .lock()
            .map_err(|_| DrawError::Storage("memory store lock poisoned".to_string()))
    }

    pub fn insert_drawing(&self, drawing: &Drawing) -> Result<(), DrawError> {
        let packed = drawing.pack()?;
        self.lock()?.drawings.insert(drawing.id, packed);
        Ok(())
    }

    /// Current stored state of a drawing
    pub fn drawing(&self, id: DrawingId) -> Result<Option<Drawing>, DrawError> {
        let inner = self.lock()?;
        match inner.drawings.get(&id) {
            Some(raw) => Ok(Some(Drawing::unpack(raw)?)),
            None => Ok(None),
        }
    }

    /// Issue `count` tickets to `owner`, continuing the drawing's serial sequence
    pub fn issue_tickets(
        &self,
        drawing_id: DrawingId,
        owner: &str,
        count: u64,
        created_at: UnixTimestamp,
    ) -> Result<Vec<u64>, DrawError> {
        let mut inner = self.lock()?;
        let mut next_serial = inner
            .tickets
            .iter()
            .filter(|t| t.drawing_id == drawing_id)
            .map(|t| t.serial)
            .max()
            .unwrap_or(0);
        let mut serials = Vec::with_capacity(count as usize);
        for _ in 0..count {
            next_serial += 1;
            let id = inner.tickets.len() as u64 + 1;
            inner.tickets.push(Ticket {
                id,
                owner: ParticipantId::new(owner),
                drawing_id,
                serial: next_serial,
                created_at,
            });
            serials.push(next_serial);
        }
        Ok(serials)
    }

    pub fn set_display_name(&self, id: &str, name: &str) -> Result<(), DrawError> {
        self.lock()?
            .names
            .insert(ParticipantId::new(id), name.to_string());
        Ok(())
    }

    /// Make every credit to `participant` fail
    pub fn fail_credits_for(&self, participant: &str) -> Result<(), DrawError> {
        self.lock()?
            .failing_credits
            .insert(ParticipantId::new(participant));
        Ok(())
    }

    /// Make ticket snapshots of one drawing fail
    pub fn fail_snapshots_for(&self, drawing_id: DrawingId) -> Result<(), DrawError> {
        self.lock()?.failing_snapshots.insert(drawing_id);
        Ok(())
    }

    /// Delay every ticket snapshot by `delay`
    pub fn delay_snapshots(&self, delay: Duration) -> Result<(), DrawError> {
        self.lock()?.snapshot_delay = Some(delay);
        Ok(())
    }

    /// Hold every conditional update for `delay` after it has been applied
    pub fn delay_finalize(&self, delay: Duration) -> Result<(), DrawError> {
        self.lock()?.finalize_delay = Some(delay);
        Ok(())
    }

    /// Credits the balance service accepted
    pub fn credits(&self) -> Result<Vec<PrizeCredit>, DrawError> {
        Ok(self.lock()?.credits.clone())
    }

    /// Credit calls received, accepted or not
    pub fn credit_attempts(&self) -> Result<usize, DrawError> {
        Ok(self.lock()?.credit_attempts)
    }

    pub fn finalize_calls(&self) -> Result<usize, DrawError> {
        Ok(self.lock()?.finalize_calls)
    }
}

impl DrawingStore for MemoryStore {
    async fn list_due(&self, now: UnixTimestamp) -> Result<Vec<DrawingSummary>, DrawError> {
        let inner = self.lock()?;
        let mut due = Vec::new();
        for raw in inner.drawings.values() {
            let drawing = Drawing::unpack(raw)?;
            if drawing.is_due(now) {
                due.push(drawing.summary());
            }
        }
        due.sort_by_key(|d| (d.end_date, d.id));
        Ok(due)
    }

    async fn load(&self, id: DrawingId) -> Result<Option<Drawing>, DrawError> {
        self.drawing(id)
    }

    async fn finalize_if_active(
        &self,
        id: DrawingId,
        finalization: Finalization,
    ) -> Result<TransitionOutcome, DrawError> {
        let outcome = self.apply_finalization(id, finalization)?;
        let delay = self.lock()?.finalize_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(outcome)
    }
}

impl MemoryStore {
    fn apply_finalization(
        &self,
        id: DrawingId,
        finalization: Finalization,
    ) -> Result<TransitionOutcome, DrawError> {
        // Read, check and write under one lock
        let mut inner = self.lock()?;
        inner.finalize_calls += 1;
        let raw = inner
            .drawings
            .get(&id)
            .ok_or(DrawError::DrawingNotFound(id))?;
        let mut drawing = Drawing::unpack(raw)?;

        if !drawing.status.can_transition_to(finalization.status) {
            debug!(
                "Drawing {}: conditional update rejected, status is {}",
                id, drawing.status
            );
            return Ok(TransitionOutcome::AlreadyFinal(drawing.status));
        }

        drawing.status = finalization.status;
        drawing.draw_results = Some(finalization.record);
        drawing.winners = finalization.winners;
        let packed = drawing.pack()?;
        inner.drawings.insert(id, packed);
        Ok(TransitionOutcome::Applied)
    }
}

impl TicketLedger for MemoryStore {
    async fn snapshot(
        &self,
        drawing_id: DrawingId,
        cutoff: UnixTimestamp,
    ) -> Result<Vec<Ticket>, DrawError> {
        let delay = self.lock()?.snapshot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.lock()?;
        if inner.failing_snapshots.contains(&drawing_id) {
            return Err(DrawError::Ledger(format!(
                "ticket read for drawing {} failed",
                drawing_id
            )));
        }
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .iter()
            .filter(|t| t.drawing_id == drawing_id && t.created_at <= cutoff)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.serial);
        Ok(tickets)
    }
}

impl BalanceService for MemoryStore {
    async fn credit(&self, credit: &PrizeCredit) -> Result<(), DrawError> {
        let mut inner = self.lock()?;
        inner.credit_attempts += 1;
        if inner.failing_credits.contains(&credit.participant) {
            return Err(DrawError::Credit(format!(
                "balance service rejected {} for {}",
                credit.amount, credit.participant
            )));
        }
        inner.credits.push(credit.clone());
        Ok(())
    }
}

impl ProfileDirectory for MemoryStore {
    async fn display_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, DrawError> {
        let inner = self.lock()?;
        let names = ids
            .iter()
            .filter_map(|id| inner.names.get(id).map(|name| (id.clone(), name.clone())))
            .collect();
        Ok(names)
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(ts: UnixTimestamp) -> Self {
        Self(crate::utils::timestamp_to_datetime(ts))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw_result::{CancellationRecord, DrawRecord};
    use crate::state::DrawingStatus;

    fn cancellation() -> Finalization {
        Finalization {
            status: DrawingStatus::Cancelled,
            record: DrawRecord::Cancelled(CancellationRecord::not_enough_participants(
                "t".to_string(),
                2,
                5,
            )),
            winners: vec![],
        }
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let store = MemoryStore::new();
        store.insert_drawing(&Drawing::new(1, "Once", 10)).unwrap();

        let first = store.finalize_if_active(1, cancellation()).await.unwrap();
        let second = store.finalize_if_active(1, cancellation()).await.unwrap();
        assert_eq!(first, TransitionOutcome::Applied);
        assert_eq!(
            second,
            TransitionOutcome::AlreadyFinal(DrawingStatus::Cancelled)
        );
        assert_eq!(
            store.drawing(1).unwrap().unwrap().status,
            DrawingStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_finalize_missing_drawing() {
        let store = MemoryStore::new();
        let err = store.finalize_if_active(3, cancellation()).await.unwrap_err();
        assert!(matches!(err, DrawError::DrawingNotFound(3)));
    }

    #[tokio::test]
    async fn test_list_due_orders_by_end_date() {
        let store = MemoryStore::new();
        store.insert_drawing(&Drawing::new(1, "Later", 50)).unwrap();
        store.insert_drawing(&Drawing::new(2, "Earlier", 20)).unwrap();
        store.insert_drawing(&Drawing::new(3, "Future", 500)).unwrap();
        let mut done = Drawing::new(4, "Done", 10);
        done.status = DrawingStatus::Completed;
        store.insert_drawing(&done).unwrap();

        let due = store.list_due(100).await.unwrap();
        assert_eq!(due.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_snapshot_applies_cutoff_and_order() {
        let store = MemoryStore::new();
        store.issue_tickets(1, "A", 2, 10).unwrap();
        store.issue_tickets(2, "B", 1, 10).unwrap();
        store.issue_tickets(1, "C", 1, 99).unwrap();

        let tickets = store.snapshot(1, 50).await.unwrap();
        assert_eq!(
            tickets.iter().map(|t| t.serial).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(tickets.iter().all(|t| t.owner.as_str() == "A"));
    }
}
