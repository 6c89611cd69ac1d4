// Giveaway Draw Engine - Winner selection
//
// Pure computation over a ticket snapshot. All randomness comes from the
// caller's CSPRNG; nothing here touches storage.
use std::collections::{HashMap, HashSet};

use log::{debug, info};
use rand::{CryptoRng, RngCore};

use crate::config::EngineConfig;
use crate::draw_result::{
    DrawResult, EliminationStage, Entrant, Placement, PlacementStage, QualificationStage,
    ALGORITHM_NAME, ALGORITHM_VERSION,
};
use crate::error::DrawError;
use crate::randomness::{generate_audit_seed, secure_shuffle};
use crate::state::{Drawing, ParticipantId, Ticket};

/// Places decided by the final shuffle; the rest are decided by removal order
pub const PODIUM_PLACES: usize = 3;

/// A distinct ticket owner in one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    /// Serials in ascending order
    pub serials: Vec<u64>,
}

impl Participant {
    pub fn ticket_count(&self) -> u64 {
        self.serials.len() as u64
    }
}

/// What a draw produced
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    Completed(DrawResult),
    /// Business outcome, not an error
    Cancelled {
        participant_count: usize,
        minimum_required: usize,
    },
}

/// Participants and ticket totals after snapshot filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantPool {
    /// Ordered by each participant's lowest serial
    pub participants: Vec<Participant>,
    pub total_tickets: u64,
}

pub struct DrawEngine {
    config: EngineConfig,
}

impl DrawEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Run the three-stage draw for one drawing.
    ///
    /// `tickets` may contain tickets issued after the drawing's end date; they
    /// are excluded here regardless of what the ledger returned. `names` maps
    /// participants to display names; missing entries fall back to `User<id>`.
    pub fn draw<R>(
        &self,
        drawing: &Drawing,
        tickets: &[Ticket],
        names: &HashMap<ParticipantId, String>,
        generated_at: &str,
        rng: &mut R,
    ) -> Result<DrawOutcome, DrawError>
    where
        R: RngCore + CryptoRng,
    {
        let pool = Self::collect_participants(drawing, tickets)?;
        let participant_count = pool.participants.len();

        info!(
            "Drawing {}: {} tickets from {} participants",
            drawing.id, pool.total_tickets, participant_count
        );

        if participant_count < self.config.min_participants {
            info!(
                "Drawing {}: {} participants, {} required. Cancelling",
                drawing.id, participant_count, self.config.min_participants
            );
            return Ok(DrawOutcome::Cancelled {
                participant_count,
                minimum_required: self.config.min_participants,
            });
        }

        let audit_seed = generate_audit_seed(rng);
        debug!("Drawing {}: audit seed {}", drawing.id, audit_seed);

        let display = |id: &ParticipantId| {
            names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("User{}", id))
        };

        let qualified = self
            .qualify(&pool.participants, rng)
            .into_iter()
            .map(|(idx, serial)| {
                let participant = &pool.participants[idx];
                Entrant {
                    participant_id: participant.id.clone(),
                    display_name: display(&participant.id),
                    ticket_serial: serial,
                    ticket_count: participant.ticket_count(),
                }
            })
            .collect::<Vec<_>>();
        info!(
            "Drawing {}: qualification selected {} participants",
            drawing.id,
            qualified.len()
        );

        let (finalists, eliminated) = self.eliminate(&qualified, rng);
        info!(
            "Drawing {}: {} finalists, {} eliminated",
            drawing.id,
            finalists.len(),
            eliminated.len()
        );

        let placements = Self::place(&finalists, rng);
        for placement in placements.iter() {
            info!(
                "Drawing {}: place {} -> {} (ticket #{})",
                drawing.id, placement.place, placement.participant_id, placement.ticket_serial
            );
        }

        Ok(DrawOutcome::Completed(DrawResult {
            generated_at: generated_at.to_string(),
            total_participants: participant_count as u64,
            total_tickets: pool.total_tickets,
            algorithm: ALGORITHM_NAME.to_string(),
            algorithm_version: ALGORITHM_VERSION,
            audit_seed,
            qualification: QualificationStage { qualified },
            elimination: EliminationStage {
                finalists,
                eliminated,
            },
            placement: PlacementStage { placements },
        }))
    }

    /// Group the eligible part of a snapshot by owner
    pub fn collect_participants(
        drawing: &Drawing,
        tickets: &[Ticket],
    ) -> Result<ParticipantPool, DrawError> {
        let mut eligible: Vec<&Ticket> = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if ticket.drawing_id != drawing.id {
                return Err(DrawError::MalformedSnapshot(format!(
                    "ticket {} belongs to drawing {}, not {}",
                    ticket.id, ticket.drawing_id, drawing.id
                )));
            }
            if ticket.created_at <= drawing.end_date {
                eligible.push(ticket);
            }
        }

        let late = tickets.len() - eligible.len();
        if late > 0 {
            debug!(
                "Drawing {}: ignoring {} tickets issued after the end date",
                drawing.id, late
            );
        }

        eligible.sort_by_key(|t| t.serial);
        if let Some(pair) = eligible.windows(2).find(|w| w[0].serial == w[1].serial) {
            return Err(DrawError::MalformedSnapshot(format!(
                "serial {} issued twice in drawing {}",
                pair[0].serial, drawing.id
            )));
        }

        let mut index: HashMap<&ParticipantId, usize> = HashMap::new();
        let mut participants: Vec<Participant> = Vec::new();
        for ticket in eligible.iter() {
            let slot = *index.entry(&ticket.owner).or_insert_with(|| {
                participants.push(Participant {
                    id: ticket.owner.clone(),
                    serials: Vec::new(),
                });
                participants.len() - 1
            });
            participants[slot].serials.push(ticket.serial);
        }

        Ok(ParticipantPool {
            participants,
            total_tickets: eligible.len() as u64,
        })
    }

    /// Stage 1: shuffle one entry per ticket, keep each owner's first sighting.
    /// Returns `(participant index, serial that selected them)` in selection order.
    fn qualify<R>(&self, participants: &[Participant], rng: &mut R) -> Vec<(usize, u64)>
    where
        R: RngCore + CryptoRng,
    {
        let mut entries: Vec<(usize, u64)> = participants
            .iter()
            .enumerate()
            .flat_map(|(idx, p)| p.serials.iter().map(move |serial| (idx, *serial)))
            .collect();
        secure_shuffle(&mut entries, rng);

        let mut seen: HashSet<usize> = HashSet::new();
        let mut qualified = Vec::with_capacity(self.config.max_qualifiers);
        for (idx, serial) in entries {
            if qualified.len() == self.config.max_qualifiers {
                break;
            }
            if seen.insert(idx) {
                qualified.push((idx, serial));
            }
        }
        qualified
    }

    /// Stage 2: shuffle qualifiers and keep the first `finalist_count`
    fn eliminate<R>(&self, qualified: &[Entrant], rng: &mut R) -> (Vec<Entrant>, Vec<Entrant>)
    where
        R: RngCore + CryptoRng,
    {
        let mut order = qualified.to_vec();
        secure_shuffle(&mut order, rng);
        let cut = self.config.finalist_count.min(order.len());
        let eliminated = order.split_off(cut);
        (order, eliminated)
    }

    /// Stage 3: finalists beyond the podium are removed at random and take
    /// the lowest places, first removed last. The podium is shuffled again
    /// for places 1..=3.
    fn place<R>(finalists: &[Entrant], rng: &mut R) -> Vec<Placement>
    where
        R: RngCore + CryptoRng,
    {
        let total = finalists.len();
        let mut pool = finalists.to_vec();
        secure_shuffle(&mut pool, rng);

        let removals = total.saturating_sub(PODIUM_PLACES);
        let removed: Vec<Entrant> = pool.drain(..removals).collect();

        let mut podium = pool;
        secure_shuffle(&mut podium, rng);

        let to_placement = |place: usize, entrant: Entrant| Placement {
            // finalist_count is validated to fit in a u8
            place: place as u8,
            participant_id: entrant.participant_id,
            display_name: entrant.display_name,
            ticket_serial: entrant.ticket_serial,
        };

        let mut placements: Vec<Placement> = podium
            .into_iter()
            .enumerate()
            .map(|(i, entrant)| to_placement(i + 1, entrant))
            .collect();
        placements.extend(
            removed
                .into_iter()
                .enumerate()
                .map(|(i, entrant)| to_placement(total - i, entrant)),
        );
        placements.sort_by_key(|p| p.place);
        placements
    }
}
