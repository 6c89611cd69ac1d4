// Giveaway Draw Engine - Instructions
use serde::{Deserialize, Serialize};

use crate::error::DrawError;
use crate::state::DrawingId;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DrawInstruction {
    /// Draw one drawing now and settle its prizes
    ///
    /// Fails with `ALREADY_COMPLETED` if the drawing is no longer active
    RunDraw {
        drawing_id: DrawingId,
    },

    /// Draw every active drawing whose end date has passed
    ///
    /// With `drawing_id`, only that drawing is processed, even before its end date
    RunExpired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        drawing_id: Option<DrawingId>,
    },
}

impl DrawInstruction {
    /// Unpacks a JSON request. An empty body is a plain expiry scan.
    pub fn unpack(input: &[u8]) -> Result<Self, DrawError> {
        if input.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::RunExpired { drawing_id: None });
        }
        serde_json::from_slice(input).map_err(|e| DrawError::InvalidInstructionData(e.to_string()))
    }

    /// Packs a DrawInstruction into a JSON request body
    pub fn pack(&self) -> Result<Vec<u8>, DrawError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_run_draw() {
        let ix = DrawInstruction::unpack(br#"{"action":"run_draw","drawing_id":12}"#).unwrap();
        assert_eq!(ix, DrawInstruction::RunDraw { drawing_id: 12 });
    }

    #[test]
    fn test_unpack_empty_body_is_scan() {
        assert_eq!(
            DrawInstruction::unpack(b"").unwrap(),
            DrawInstruction::RunExpired { drawing_id: None }
        );
        assert_eq!(
            DrawInstruction::unpack(b" \n").unwrap(),
            DrawInstruction::RunExpired { drawing_id: None }
        );
    }

    #[test]
    fn test_unpack_forced_scan() {
        let ix = DrawInstruction::unpack(br#"{"action":"run_expired","drawing_id":3}"#).unwrap();
        assert_eq!(ix, DrawInstruction::RunExpired { drawing_id: Some(3) });
    }

    #[test]
    fn test_unpack_rejects_unknown_action() {
        let err = DrawInstruction::unpack(br#"{"action":"refund"}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(DrawInstruction::unpack(br#"{"action":"run_draw"}"#).is_err());
    }

    #[test]
    fn test_pack_matches_unpack() {
        let ix = DrawInstruction::RunDraw { drawing_id: 5 };
        assert_eq!(DrawInstruction::unpack(&ix.pack().unwrap()).unwrap(), ix);
    }
}
