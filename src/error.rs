// Giveaway Draw Engine - Errors
use thiserror::Error;

use crate::state::{DrawingId, DrawingStatus};

/// Errors that may be returned by the draw engine and its collaborators
#[derive(Error, Debug)]
pub enum DrawError {
    /// Request payload could not be decoded
    #[error("Invalid instruction data: {0}")]
    InvalidInstructionData(String),

    /// No drawing exists with the requested id
    #[error("Drawing {0} not found")]
    DrawingNotFound(DrawingId),

    /// Drawing already left the active state
    #[error("Drawing {id} is already {status}")]
    AlreadyFinal {
        id: DrawingId,
        status: DrawingStatus,
    },

    /// Entry window is still open
    #[error("Drawing {0} has not ended yet")]
    DrawingNotEnded(DrawingId),

    /// Ticket snapshot violates the ledger contract
    #[error("Malformed ticket snapshot: {0}")]
    MalformedSnapshot(String),

    /// Prize schedule entry has neither an amount nor a percentage
    #[error("Invalid prize tier for place {0}")]
    InvalidPrizeTier(u8),

    /// Engine configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Stored draw result uses a schema this build does not understand
    #[error("Unsupported draw result version {0}")]
    UnsupportedResultVersion(u16),

    /// Drawing store read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Ticket ledger read failed
    #[error("Ticket ledger error: {0}")]
    Ledger(String),

    /// Balance service rejected a credit
    #[error("Credit failed: {0}")]
    Credit(String),

    /// External call did not finish in time
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },

    /// Packed record could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] std::io::Error),

    /// Draw result JSON could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DrawError {
    /// Stable machine-readable code surfaced in responses and reports
    pub fn code(&self) -> &'static str {
        match self {
            DrawError::InvalidInstructionData(_) => "INVALID_REQUEST",
            DrawError::DrawingNotFound(_) => "DRAWING_NOT_FOUND",
            DrawError::AlreadyFinal { .. } => "ALREADY_COMPLETED",
            DrawError::DrawingNotEnded(_) => "NOT_ENDED",
            DrawError::MalformedSnapshot(_) => "MALFORMED_SNAPSHOT",
            DrawError::InvalidPrizeTier(_) => "INVALID_PRIZE_TIER",
            DrawError::InvalidConfig(_) => "INVALID_CONFIG",
            DrawError::UnsupportedResultVersion(_) => "UNSUPPORTED_RESULT_VERSION",
            DrawError::Storage(_) => "STORAGE_ERROR",
            DrawError::Ledger(_) => "LEDGER_ERROR",
            DrawError::Credit(_) => "CREDIT_FAILED",
            DrawError::Timeout { .. } => "TIMEOUT",
            DrawError::Codec(_) => "CODEC_ERROR",
            DrawError::Json(_) => "JSON_ERROR",
        }
    }

    /// Transport-level status code for a callable unit failing with this error
    pub fn status_code(&self) -> u16 {
        match self {
            DrawError::InvalidInstructionData(_) => 400,
            DrawError::DrawingNotFound(_) => 404,
            DrawError::AlreadyFinal { .. } | DrawError::DrawingNotEnded(_) => 409,
            DrawError::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_final_maps_to_conflict() {
        let err = DrawError::AlreadyFinal {
            id: 7,
            status: DrawingStatus::Completed,
        };
        assert_eq!(err.code(), "ALREADY_COMPLETED");
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.to_string(), "Drawing 7 is already completed");
    }

    #[test]
    fn test_timeout_message() {
        let err = DrawError::Timeout {
            operation: "ticket snapshot",
            after_ms: 250,
        };
        assert_eq!(err.to_string(), "ticket snapshot timed out after 250 ms");
        assert_eq!(err.code(), "TIMEOUT");
    }
}
