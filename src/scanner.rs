// Giveaway Draw Engine - Expiry scanner
//
// Finds drawings whose entry window has closed and drives each one through
// draw, conditional persistence and settlement. A failure is contained to
// the drawing it happened in.
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::draw_result::{CancellationRecord, DrawRecord, DrawResult};
use crate::engine::{DrawEngine, DrawOutcome};
use crate::error::DrawError;
use crate::settlement::{SettlementDistributor, SettlementReport};
use crate::state::{DrawingId, DrawingStatus, DrawingSummary, ParticipantId};
use crate::store::{
    bounded, BalanceService, Clock, DrawingStore, Finalization, ProfileDirectory, TicketLedger,
    TransitionOutcome,
};
use crate::utils::format_time;

/// What happened to one drawing during a run
#[derive(Debug, Clone, PartialEq)]
pub enum DrawingRun {
    Completed {
        drawing_id: DrawingId,
        result: DrawResult,
        settlement: SettlementReport,
    },
    Cancelled {
        drawing_id: DrawingId,
        participant_count: usize,
        minimum_required: usize,
    },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// Already final or not yet due when re-read; nothing was written
    Skipped,
    Failed,
}

/// Per-drawing line of a batch report
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DrawingReport {
    pub drawing_id: DrawingId,
    pub name: String,
    pub success: bool,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winners: Option<Vec<ParticipantId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_participants: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prizes_distributed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DrawingReport {
    fn blank(summary: &DrawingSummary, outcome: RunOutcome, elapsed: Duration) -> Self {
        Self {
            drawing_id: summary.id,
            name: summary.title.clone(),
            success: outcome != RunOutcome::Failed,
            outcome,
            winners: None,
            total_participants: None,
            prizes_distributed: None,
            settlement: None,
            message: None,
            error_code: None,
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn from_run(
        summary: &DrawingSummary,
        run: Result<DrawingRun, DrawError>,
        elapsed: Duration,
    ) -> Self {
        match run {
            Ok(DrawingRun::Completed {
                result, settlement, ..
            }) => Self {
                winners: Some(result.winners()),
                total_participants: Some(result.total_participants),
                prizes_distributed: Some(settlement.is_complete()),
                settlement: Some(settlement),
                ..Self::blank(summary, RunOutcome::Completed, elapsed)
            },
            Ok(DrawingRun::Cancelled {
                participant_count,
                minimum_required,
                ..
            }) => Self {
                total_participants: Some(participant_count as u64),
                message: Some(format!(
                    "not enough participants: {} of {} required",
                    participant_count, minimum_required
                )),
                ..Self::blank(summary, RunOutcome::Cancelled, elapsed)
            },
            Err(e @ DrawError::AlreadyFinal { .. }) | Err(e @ DrawError::DrawingNotEnded(_)) => {
                Self {
                    message: Some(e.to_string()),
                    ..Self::blank(summary, RunOutcome::Skipped, elapsed)
                }
            }
            Err(e) => Self {
                error_code: Some(e.code().to_string()),
                error: Some(e.to_string()),
                ..Self::blank(summary, RunOutcome::Failed, elapsed)
            },
        }
    }
}

/// Output of one scan
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub success: bool,
    pub processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    pub skipped_count: usize,
    pub results: Vec<DrawingReport>,
    pub executed_at: String,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn new(results: Vec<DrawingReport>, executed_at: String, elapsed: Duration) -> Self {
        let count = |outcome: RunOutcome| results.iter().filter(|r| r.outcome == outcome).count();
        Self {
            success: true,
            processed: results.len(),
            success_count: results.iter().filter(|r| r.success).count(),
            failed_count: count(RunOutcome::Failed),
            cancelled_count: count(RunOutcome::Cancelled),
            skipped_count: count(RunOutcome::Skipped),
            executed_at,
            duration_ms: elapsed.as_millis() as u64,
            results,
        }
    }
}

pub struct ExpiryScanner<S, L, B, P, C> {
    store: S,
    ledger: L,
    profiles: P,
    clock: C,
    distributor: SettlementDistributor<B>,
    engine: DrawEngine,
    config: EngineConfig,
}

impl<S, L, B, P, C> ExpiryScanner<S, L, B, P, C>
where
    S: DrawingStore,
    L: TicketLedger,
    B: BalanceService,
    P: ProfileDirectory,
    C: Clock,
{
    pub fn new(
        store: S,
        ledger: L,
        balances: B,
        profiles: P,
        clock: C,
        config: EngineConfig,
    ) -> Result<Self, DrawError> {
        config.validate()?;
        Ok(Self {
            store,
            ledger,
            profiles,
            clock,
            distributor: SettlementDistributor::new(balances, config.io_timeout),
            engine: DrawEngine::new(config),
            config,
        })
    }

    /// Process every due drawing, or only `forced` when given.
    ///
    /// Only a failure to find the drawings to work on is returned as an error;
    /// per-drawing failures are entries in the report.
    pub async fn scan(&self, forced: Option<DrawingId>) -> Result<BatchReport, DrawError> {
        let started = Instant::now();
        let executed_at = self.clock.now();
        let limit = self.config.io_timeout;

        let due = match forced {
            Some(id) => {
                let drawing = bounded(limit, "drawing load", self.store.load(id))
                    .await?
                    .ok_or(DrawError::DrawingNotFound(id))?;
                info!("Forced run requested for drawing {}", id);
                vec![drawing.summary()]
            }
            None => {
                bounded(
                    limit,
                    "due drawing listing",
                    self.store.list_due(executed_at.timestamp()),
                )
                .await?
            }
        };

        if due.is_empty() {
            info!("No expired drawings found");
        } else {
            info!("Found {} expired drawings", due.len());
        }

        let mut results = Vec::with_capacity(due.len());
        for summary in due.iter() {
            info!("Processing drawing {} ({})", summary.id, summary.title);
            let drawing_started = Instant::now();
            let run = self.run_drawing(summary.id, forced.is_some()).await;
            if let Err(e) = &run {
                match e {
                    DrawError::AlreadyFinal { .. } | DrawError::DrawingNotEnded(_) => {
                        warn!("Skipping drawing {}: {}", summary.id, e)
                    }
                    _ => error!("Drawing {} failed: {}", summary.id, e),
                }
            }
            results.push(DrawingReport::from_run(
                summary,
                run,
                drawing_started.elapsed(),
            ));
        }

        let report = BatchReport::new(results, format_time(executed_at), started.elapsed());
        info!(
            "Scan finished. Success: {}/{}, failed: {}",
            report.success_count, report.processed, report.failed_count
        );
        Ok(report)
    }

    /// Draw, persist and settle one drawing.
    ///
    /// `forced` runs skip the end-date check; their snapshot cutoff is the
    /// earlier of the end date and now.
    pub async fn run_drawing(&self, id: DrawingId, forced: bool) -> Result<DrawingRun, DrawError> {
        let limit = self.config.io_timeout;

        // Fresh read, the listing may be stale
        let drawing = bounded(limit, "drawing load", self.store.load(id))
            .await?
            .ok_or(DrawError::DrawingNotFound(id))?;
        if drawing.status.is_terminal() {
            return Err(DrawError::AlreadyFinal {
                id,
                status: drawing.status,
            });
        }

        let now = self.clock.now();
        let cutoff = if forced {
            drawing.end_date.min(now.timestamp())
        } else if drawing.has_ended(now.timestamp()) {
            drawing.end_date
        } else {
            return Err(DrawError::DrawingNotEnded(id));
        };

        let tickets = bounded(limit, "ticket snapshot", self.ledger.snapshot(id, cutoff)).await?;
        info!("Drawing {}: loaded {} tickets", id, tickets.len());

        let owners: Vec<ParticipantId> = tickets
            .iter()
            .map(|t| t.owner.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names = match bounded(limit, "profile lookup", self.profiles.display_names(&owners))
            .await
        {
            Ok(names) => names,
            Err(e) => {
                warn!("Drawing {}: display names unavailable: {}", id, e);
                HashMap::new()
            }
        };

        let generated_at = format_time(now);
        let outcome = self
            .engine
            .draw(&drawing, &tickets, &names, &generated_at, &mut OsRng)?;

        match outcome {
            DrawOutcome::Cancelled {
                participant_count,
                minimum_required,
            } => {
                let record = DrawRecord::Cancelled(CancellationRecord::not_enough_participants(
                    generated_at,
                    participant_count as u64,
                    minimum_required as u64,
                ));
                self.finalize(
                    id,
                    Finalization {
                        status: DrawingStatus::Cancelled,
                        record,
                        winners: Vec::new(),
                    },
                )
                .await?;
                info!("Drawing {} cancelled", id);
                Ok(DrawingRun::Cancelled {
                    drawing_id: id,
                    participant_count,
                    minimum_required,
                })
            }
            DrawOutcome::Completed(result) => {
                self.finalize(
                    id,
                    Finalization {
                        status: DrawingStatus::Completed,
                        record: DrawRecord::Completed(result.clone()),
                        winners: result.winners(),
                    },
                )
                .await?;
                info!("Drawing {} completed, settling prizes", id);

                let settlement = self
                    .distributor
                    .distribute(&drawing, &result.ranked_winners())
                    .await;
                Ok(DrawingRun::Completed {
                    drawing_id: id,
                    result,
                    settlement,
                })
            }
        }
    }

    async fn finalize(&self, id: DrawingId, finalization: Finalization) -> Result<(), DrawError> {
        let record = finalization.record.clone();
        let transition = match bounded(
            self.config.io_timeout,
            "drawing state write",
            self.store.finalize_if_active(id, finalization),
        )
        .await
        {
            Ok(transition) => transition,
            Err(timeout @ DrawError::Timeout { .. }) => {
                warn!("Drawing {}: state write timed out, re-reading to confirm", id);
                return self.confirm_write(id, &record, timeout).await;
            }
            Err(e) => return Err(e),
        };
        match transition {
            TransitionOutcome::Applied => Ok(()),
            TransitionOutcome::AlreadyFinal(status) => {
                warn!(
                    "Drawing {} was finalized concurrently as {}; discarding this draw",
                    id, status
                );
                Err(DrawError::AlreadyFinal { id, status })
            }
        }
    }

    /// Decide from the stored record whether a timed-out write landed.
    ///
    /// The record carries this run's audit seed and timestamp, so equality
    /// means the write was ours. A drawing still active keeps the timeout
    /// error and stays eligible for the next run.
    async fn confirm_write(
        &self,
        id: DrawingId,
        record: &DrawRecord,
        timeout: DrawError,
    ) -> Result<(), DrawError> {
        let stored = match bounded(self.config.io_timeout, "drawing load", self.store.load(id)).await
        {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(DrawError::DrawingNotFound(id)),
            Err(e) => {
                error!("Drawing {}: could not confirm state write: {}", id, e);
                return Err(timeout);
            }
        };

        if stored.draw_results.as_ref() == Some(record) {
            info!("Drawing {}: timed-out state write was applied", id);
            Ok(())
        } else if stored.status.is_terminal() {
            warn!(
                "Drawing {} was finalized as {} by another run; discarding this draw",
                id, stored.status
            );
            Err(DrawError::AlreadyFinal {
                id,
                status: stored.status,
            })
        } else {
            Err(timeout)
        }
    }
}
