// Giveaway Draw Engine - Persisted draw results
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::error::DrawError;
use crate::state::ParticipantId;

/// Name recorded with every result produced by this engine
pub const ALGORITHM_NAME: &str = "weighted-unique-shuffle";

/// Schema version written by this build. Older versions remain readable.
pub const ALGORITHM_VERSION: u16 = 1;

/// Error code stored with a cancellation record
pub const NOT_ENOUGH_PARTICIPANTS: &str = "NOT_ENOUGH_PARTICIPANTS";

/// A participant as seen by one stage of the draw
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Entrant {
    pub participant_id: ParticipantId,
    pub display_name: String,
    /// Ticket that produced the qualification
    pub ticket_serial: u64,
    /// Tickets the participant held in the snapshot
    pub ticket_count: u64,
}

/// Stage 1: ticket-weighted unique sampling
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QualificationStage {
    /// In selection order
    pub qualified: Vec<Entrant>,
}

impl QualificationStage {
    pub fn winning_serials(&self) -> Vec<u64> {
        self.qualified.iter().map(|e| e.ticket_serial).collect()
    }
}

/// Stage 2: qualifiers narrowed to finalists
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EliminationStage {
    pub finalists: Vec<Entrant>,
    pub eliminated: Vec<Entrant>,
}

/// A ranked winner
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub place: u8,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub ticket_serial: u64,
}

/// Stage 3: finalists ranked into places
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlacementStage {
    /// Sorted by place, 1 first
    pub placements: Vec<Placement>,
}

/// Result of a completed draw
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DrawResult {
    /// RFC 3339 generation time
    pub generated_at: String,
    pub total_participants: u64,
    pub total_tickets: u64,
    pub algorithm: String,
    pub algorithm_version: u16,
    /// Hex-encoded random value kept for traceability only
    pub audit_seed: String,
    pub qualification: QualificationStage,
    pub elimination: EliminationStage,
    pub placement: PlacementStage,
}

impl DrawResult {
    /// Winners ordered by place
    pub fn winners(&self) -> Vec<ParticipantId> {
        self.placement
            .placements
            .iter()
            .map(|p| p.participant_id.clone())
            .collect()
    }

    /// Places paired with their winner, for settlement
    pub fn ranked_winners(&self) -> Vec<(u8, ParticipantId)> {
        self.placement
            .placements
            .iter()
            .map(|p| (p.place, p.participant_id.clone()))
            .collect()
    }
}

/// Record stored for a drawing cancelled for low participation
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CancellationRecord {
    pub generated_at: String,
    pub algorithm_version: u16,
    pub error: String,
    pub total_participants: u64,
    pub minimum_required: u64,
}

impl CancellationRecord {
    pub fn not_enough_participants(
        generated_at: String,
        total_participants: u64,
        minimum_required: u64,
    ) -> Self {
        Self {
            generated_at,
            algorithm_version: ALGORITHM_VERSION,
            error: NOT_ENOUGH_PARTICIPANTS.to_string(),
            total_participants,
            minimum_required,
        }
    }
}

/// The `draw_results` blob stored on a drawing
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrawRecord {
    Completed(DrawResult),
    Cancelled(CancellationRecord),
}

impl DrawRecord {
    pub fn algorithm_version(&self) -> u16 {
        match self {
            DrawRecord::Completed(result) => result.algorithm_version,
            DrawRecord::Cancelled(record) => record.algorithm_version,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DrawError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a stored blob, refusing schema versions newer than this build
    pub fn from_json(value: serde_json::Value) -> Result<Self, DrawError> {
        let version = value
            .get("algorithm_version")
            .and_then(|v| v.as_u64())
            .ok_or(DrawError::UnsupportedResultVersion(0))?;
        let version =
            u16::try_from(version).map_err(|_| DrawError::UnsupportedResultVersion(u16::MAX))?;
        if version == 0 || version > ALGORITHM_VERSION {
            return Err(DrawError::UnsupportedResultVersion(version));
        }
        Ok(serde_json::from_value(value)?)
    }
}
