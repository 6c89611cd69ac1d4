// Giveaway Draw Engine - Processor
use log::{info, warn};

use crate::error::DrawError;
use crate::instruction::DrawInstruction;
use crate::response::{DrawSuccess, Response};
use crate::scanner::{DrawingRun, ExpiryScanner};
use crate::state::DrawingId;
use crate::store::{BalanceService, Clock, DrawingStore, ProfileDirectory, TicketLedger};

/// Entry point for both callable units
pub struct Processor<S, L, B, P, C> {
    scanner: ExpiryScanner<S, L, B, P, C>,
}

impl<S, L, B, P, C> Processor<S, L, B, P, C>
where
    S: DrawingStore,
    L: TicketLedger,
    B: BalanceService,
    P: ProfileDirectory,
    C: Clock,
{
    pub fn new(scanner: ExpiryScanner<S, L, B, P, C>) -> Self {
        Self { scanner }
    }

    /// Decode a raw request and run it. Always produces a response.
    pub async fn process(&self, instruction_data: &[u8]) -> Response {
        match DrawInstruction::unpack(instruction_data) {
            Ok(instruction) => self.process_instruction(instruction).await,
            Err(e) => {
                warn!("Rejecting request: {}", e);
                Response::error(&e)
            }
        }
    }

    pub async fn process_instruction(&self, instruction: DrawInstruction) -> Response {
        match instruction {
            DrawInstruction::RunDraw { drawing_id } => {
                info!("Instruction: Run Draw");
                self.process_run_draw(drawing_id).await
            }
            DrawInstruction::RunExpired { drawing_id } => {
                info!("Instruction: Run Expired");
                self.process_run_expired(drawing_id).await
            }
        }
    }

    async fn process_run_draw(&self, drawing_id: DrawingId) -> Response {
        match self.scanner.run_drawing(drawing_id, true).await {
            Ok(DrawingRun::Completed {
                drawing_id,
                result,
                settlement,
            }) => Response::draw(DrawSuccess {
                success: true,
                drawing_id,
                total_participants: result.total_participants,
                total_tickets: result.total_tickets,
                winners: result.winners(),
                prizes_distributed: settlement.is_complete(),
                draw_result: result,
                settlement,
            }),
            Ok(DrawingRun::Cancelled {
                participant_count,
                minimum_required,
                ..
            }) => Response::cancelled(participant_count as u64, minimum_required as u64),
            Err(e) => {
                if let DrawError::AlreadyFinal { .. } = e {
                    warn!("Drawing {}: draw rejected, {}", drawing_id, e);
                } else {
                    warn!("Drawing {}: draw failed, {}", drawing_id, e);
                }
                Response::error(&e)
            }
        }
    }

    async fn process_run_expired(&self, forced: Option<DrawingId>) -> Response {
        match self.scanner.scan(forced).await {
            Ok(report) => Response::batch(report),
            Err(e) => {
                warn!("Expiry scan aborted: {}", e);
                Response::error(&e)
            }
        }
    }
}
