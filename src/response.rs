// Giveaway Draw Engine - Callable unit responses
use serde::{Deserialize, Serialize};

use crate::draw_result::{DrawResult, NOT_ENOUGH_PARTICIPANTS};
use crate::error::DrawError;
use crate::scanner::BatchReport;
use crate::settlement::SettlementReport;
use crate::state::{DrawingId, ParticipantId};

/// Body of a successful single draw
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DrawSuccess {
    pub success: bool,
    pub drawing_id: DrawingId,
    pub total_participants: u64,
    pub total_tickets: u64,
    pub winners: Vec<ParticipantId>,
    pub draw_result: DrawResult,
    pub prizes_distributed: bool,
    pub settlement: SettlementReport,
}

/// Body of a draw cancelled for low participation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DrawCancelled {
    pub success: bool,
    pub error: String,
    pub total_participants: u64,
    pub minimum_required: u64,
}

/// Body of any rejected or failed call
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ResponseBody {
    Draw(Box<DrawSuccess>),
    Cancelled(DrawCancelled),
    Batch(BatchReport),
    Error(ErrorBody),
}

/// Transport-neutral response: an HTTP-like status code and a JSON body
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub body: ResponseBody,
}

impl Response {
    pub fn draw(body: DrawSuccess) -> Self {
        Self {
            status_code: 200,
            body: ResponseBody::Draw(Box::new(body)),
        }
    }

    pub fn cancelled(total_participants: u64, minimum_required: u64) -> Self {
        Self {
            status_code: 400,
            body: ResponseBody::Cancelled(DrawCancelled {
                success: false,
                error: NOT_ENOUGH_PARTICIPANTS.to_string(),
                total_participants,
                minimum_required,
            }),
        }
    }

    pub fn batch(report: BatchReport) -> Self {
        Self {
            status_code: 200,
            body: ResponseBody::Batch(report),
        }
    }

    pub fn error(err: &DrawError) -> Self {
        Self {
            status_code: err.status_code(),
            body: ResponseBody::Error(ErrorBody {
                success: false,
                error: err.code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DrawError> {
        Ok(serde_json::to_value(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DrawingStatus;

    #[test]
    fn test_cancelled_body() {
        let response = Response::cancelled(4, 5);
        assert_eq!(response.status_code, 400);
        let json = response.to_json().unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "NOT_ENOUGH_PARTICIPANTS");
        assert_eq!(json["total_participants"], 4);
        assert_eq!(json["minimum_required"], 5);
    }

    #[test]
    fn test_already_completed_body() {
        let response = Response::error(&DrawError::AlreadyFinal {
            id: 3,
            status: DrawingStatus::Cancelled,
        });
        assert!(!response.is_success());
        let json = response.to_json().unwrap();
        assert_eq!(json["error"], "ALREADY_COMPLETED");
        assert_eq!(json["success"], false);
    }
}
