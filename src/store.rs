// Giveaway Draw Engine - Collaborator interfaces
//
// The engine never owns a global client. Every external system is passed in
// through one of these traits.
#![allow(async_fn_in_trait)]

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::draw_result::DrawRecord;
use crate::error::DrawError;
use crate::settlement::PrizeCredit;
use crate::state::{
    Drawing, DrawingId, DrawingStatus, DrawingSummary, ParticipantId, Ticket, UnixTimestamp,
};

/// Terminal state written in a single conditional update
#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub status: DrawingStatus,
    pub record: DrawRecord,
    pub winners: Vec<ParticipantId>,
}

/// Result of a conditional `active -> terminal` update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This caller moved the drawing out of `active`
    Applied,
    /// Someone else got there first; nothing was written
    AlreadyFinal(DrawingStatus),
}

/// Persistent drawing records
pub trait DrawingStore {
    /// Active drawings with `end_date <= now`, oldest end date first
    async fn list_due(&self, now: UnixTimestamp) -> Result<Vec<DrawingSummary>, DrawError>;

    async fn load(&self, id: DrawingId) -> Result<Option<Drawing>, DrawError>;

    /// Write status, result and winners only if the drawing is still `active`.
    /// Must be atomic: two concurrent callers can never both see `Applied`.
    async fn finalize_if_active(
        &self,
        id: DrawingId,
        finalization: Finalization,
    ) -> Result<TransitionOutcome, DrawError>;
}

/// Read side of the ticket ledger
pub trait TicketLedger {
    /// Tickets of one drawing with `created_at <= cutoff`, ordered by serial
    async fn snapshot(
        &self,
        drawing_id: DrawingId,
        cutoff: UnixTimestamp,
    ) -> Result<Vec<Ticket>, DrawError>;
}

/// External account service prizes are paid into
pub trait BalanceService {
    async fn credit(&self, credit: &PrizeCredit) -> Result<(), DrawError>;
}

/// User profile lookup for display names
pub trait ProfileDirectory {
    async fn display_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, DrawError>;
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Profile lookup that knows nobody; every participant gets the `User<id>` fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProfiles;

impl ProfileDirectory for NoProfiles {
    async fn display_names(
        &self,
        _ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, DrawError> {
        Ok(HashMap::new())
    }
}

impl<T: DrawingStore> DrawingStore for &T {
    async fn list_due(&self, now: UnixTimestamp) -> Result<Vec<DrawingSummary>, DrawError> {
        (**self).list_due(now).await
    }

    async fn load(&self, id: DrawingId) -> Result<Option<Drawing>, DrawError> {
        (**self).load(id).await
    }

    async fn finalize_if_active(
        &self,
        id: DrawingId,
        finalization: Finalization,
    ) -> Result<TransitionOutcome, DrawError> {
        (**self).finalize_if_active(id, finalization).await
    }
}

impl<T: TicketLedger> TicketLedger for &T {
    async fn snapshot(
        &self,
        drawing_id: DrawingId,
        cutoff: UnixTimestamp,
    ) -> Result<Vec<Ticket>, DrawError> {
        (**self).snapshot(drawing_id, cutoff).await
    }
}

impl<T: BalanceService> BalanceService for &T {
    async fn credit(&self, credit: &PrizeCredit) -> Result<(), DrawError> {
        (**self).credit(credit).await
    }
}

impl<T: ProfileDirectory> ProfileDirectory for &T {
    async fn display_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, DrawError> {
        (**self).display_names(ids).await
    }
}

impl<T: Clock> Clock for &T {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Await an external call, failing with `DrawError::Timeout` after `limit`
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T, DrawError>
where
    F: Future<Output = Result<T, DrawError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DrawError::Timeout {
            operation,
            after_ms: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DrawError>(1)
        };
        let err = bounded(Duration::from_millis(100), "slow call", slow)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DrawError::Timeout {
                operation: "slow call",
                after_ms: 100
            }
        ));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let value = bounded(Duration::from_secs(1), "fast call", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = bounded(Duration::from_secs(1), "failing call", async {
            Err::<u8, _>(DrawError::Storage("down".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }
}
