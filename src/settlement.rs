// Giveaway Draw Engine - Prize settlement
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::state::{Drawing, DrawingId, ParticipantId};
use crate::store::{bounded, BalanceService};
use crate::utils::prize_amount;

/// One credit request sent to the balance service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PrizeCredit {
    pub drawing_id: DrawingId,
    pub place: u8,
    pub participant: ParticipantId,
    pub amount: u64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The prize schedule has no entry for the place
    NoPrizeTier,
    /// The entry computes to nothing (e.g. percentage with an empty jackpot)
    ZeroAmount,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SkippedPrize {
    pub place: u8,
    pub participant: ParticipantId,
    pub reason: SkipReason,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FailedCredit {
    pub credit: PrizeCredit,
    pub error: String,
}

/// Per-winner outcome of a settlement run
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub credited: Vec<PrizeCredit>,
    pub skipped: Vec<SkippedPrize>,
    pub failed: Vec<FailedCredit>,
}

impl SettlementReport {
    /// Every computed prize reached the balance service
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_credited(&self) -> u64 {
        self.credited.iter().map(|c| c.amount).sum()
    }
}

/// Credits computed prizes to winners, one at a time
pub struct SettlementDistributor<B> {
    balances: B,
    io_timeout: Duration,
}

impl<B: BalanceService> SettlementDistributor<B> {
    pub fn new(balances: B, io_timeout: Duration) -> Self {
        Self {
            balances,
            io_timeout,
        }
    }

    /// Compute credits for ranked winners without contacting anyone
    pub fn plan(
        drawing: &Drawing,
        ranked_winners: &[(u8, ParticipantId)],
    ) -> (Vec<PrizeCredit>, Vec<SkippedPrize>) {
        let mut credits = Vec::new();
        let mut skipped = Vec::new();

        for (place, winner) in ranked_winners {
            let tier = match drawing.prize_for_place(*place) {
                Some(tier) => tier,
                None => {
                    skipped.push(SkippedPrize {
                        place: *place,
                        participant: winner.clone(),
                        reason: SkipReason::NoPrizeTier,
                    });
                    continue;
                }
            };

            let amount = prize_amount(tier, drawing.jackpot_current_amount);
            if amount == 0 {
                skipped.push(SkippedPrize {
                    place: *place,
                    participant: winner.clone(),
                    reason: SkipReason::ZeroAmount,
                });
                continue;
            }

            credits.push(PrizeCredit {
                drawing_id: drawing.id,
                place: *place,
                participant: winner.clone(),
                amount,
                currency: drawing.currency.clone(),
            });
        }

        (credits, skipped)
    }

    /// Credit every winner. A failed credit is logged and recorded; the
    /// remaining winners are still paid. Never returns an error.
    pub async fn distribute(
        &self,
        drawing: &Drawing,
        ranked_winners: &[(u8, ParticipantId)],
    ) -> SettlementReport {
        let (credits, skipped) = Self::plan(drawing, ranked_winners);
        for skip in skipped.iter() {
            warn!(
                "Drawing {}: no prize for place {} ({:?})",
                drawing.id, skip.place, skip.reason
            );
        }

        let mut report = SettlementReport {
            skipped,
            ..SettlementReport::default()
        };

        for credit in credits {
            info!(
                "Drawing {}: crediting {} {} to {} for place {}",
                drawing.id, credit.amount, credit.currency, credit.participant, credit.place
            );
            match bounded(self.io_timeout, "prize credit", self.balances.credit(&credit)).await {
                Ok(()) => report.credited.push(credit),
                Err(e) => {
                    error!(
                        "Drawing {}: credit for place {} to {} failed: {}",
                        drawing.id, credit.place, credit.participant, e
                    );
                    report.failed.push(FailedCredit {
                        credit,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Drawing {}: settlement credited {}, skipped {}, failed {}",
            drawing.id,
            report.credited.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PrizeTier;
    use crate::utils::MICRO_PERCENT;

    fn winners(n: u8) -> Vec<(u8, ParticipantId)> {
        (1..=n)
            .map(|place| (place, ParticipantId::new(format!("W{}", place))))
            .collect()
    }

    #[test]
    fn test_plan_percentage_prize() {
        let mut drawing = Drawing::new(9, "Jackpot", 0);
        drawing.prizes = vec![PrizeTier::percentage(1, 30 * MICRO_PERCENT)];
        drawing.jackpot_current_amount = Some(1000);

        let (credits, skipped) = SettlementDistributor::<NoopBalances>::plan(&drawing, &winners(1));
        assert!(skipped.is_empty());
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].amount, 300);
        assert_eq!(credits[0].currency, "ar");
    }

    #[test]
    fn test_plan_skips_missing_and_zero_tiers() {
        let mut drawing = Drawing::new(9, "Partial", 0);
        drawing.prizes = vec![
            PrizeTier::fixed(1, 500),
            PrizeTier::percentage(2, 20 * MICRO_PERCENT),
            PrizeTier::fixed(3, 0),
        ];

        let (credits, skipped) = SettlementDistributor::<NoopBalances>::plan(&drawing, &winners(4));
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].place, 1);
        assert_eq!(
            skipped.iter().map(|s| (s.place, s.reason)).collect::<Vec<_>>(),
            vec![
                (2, SkipReason::ZeroAmount),
                (3, SkipReason::ZeroAmount),
                (4, SkipReason::NoPrizeTier),
            ]
        );
    }

    struct NoopBalances;

    impl BalanceService for NoopBalances {
        async fn credit(&self, _credit: &PrizeCredit) -> Result<(), crate::error::DrawError> {
            Ok(())
        }
    }

    /// Rejects every credit to one participant
    struct RejectingBalances(ParticipantId);

    impl BalanceService for RejectingBalances {
        async fn credit(&self, credit: &PrizeCredit) -> Result<(), crate::error::DrawError> {
            if credit.participant == self.0 {
                return Err(crate::error::DrawError::Credit("account frozen".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_credit_does_not_stop_later_places() {
        let mut drawing = Drawing::new(9, "Full podium", 0);
        drawing.prizes = (1..=5).map(|place| PrizeTier::fixed(place, 100 * place as u64)).collect();
        let distributor = SettlementDistributor::new(
            RejectingBalances(ParticipantId::new("W3")),
            Duration::from_secs(1),
        );

        let report = distributor.distribute(&drawing, &winners(5)).await;
        assert_eq!(
            report.credited.iter().map(|c| c.place).collect::<Vec<_>>(),
            vec![1, 2, 4, 5]
        );
        assert_eq!(
            report.failed.iter().map(|f| f.credit.place).collect::<Vec<_>>(),
            vec![3]
        );
        assert_eq!(report.failed[0].credit.participant, ParticipantId::new("W3"));
        assert!(report.failed[0].error.contains("account frozen"));
        assert!(report.skipped.is_empty());
        assert!(!report.is_complete());
        assert_eq!(report.total_credited(), 100 + 200 + 400 + 500);
    }

    #[tokio::test]
    async fn test_distribute_empty_winner_list() {
        let drawing = Drawing::new(9, "Nobody", 0);
        let distributor = SettlementDistributor::new(NoopBalances, Duration::from_secs(1));
        let report = distributor.distribute(&drawing, &[]).await;
        assert_eq!(report, SettlementReport::default());
        assert!(report.is_complete());
    }
}
