// Giveaway Draw Engine - State
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::draw_result::DrawRecord;
use crate::error::DrawError;
use crate::utils::{MICRO_PERCENT, MICRO_PERCENT_DIGITS};

/// Seconds since the Unix epoch
pub type UnixTimestamp = i64;

/// Identifier of a drawing
pub type DrawingId = u64;

/// Identifier of a ticket owner (platform user id)
#[derive(
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a drawing
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawingStatus {
    /// Open for entries, or ended and waiting for the draw
    Active,
    /// Winners drawn and persisted
    Completed,
    /// Not enough participants, no winners
    Cancelled,
}

impl DrawingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DrawingStatus::Active)
    }

    /// Only `active` may move, and only into a terminal state
    pub fn can_transition_to(self, next: DrawingStatus) -> bool {
        self == DrawingStatus::Active && next.is_terminal()
    }
}

impl TryFrom<u8> for DrawingStatus {
    type Error = &'static str;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(DrawingStatus::Active),
            1 => Ok(DrawingStatus::Completed),
            2 => Ok(DrawingStatus::Cancelled),
            _ => Err("Invalid drawing status"),
        }
    }
}

impl From<DrawingStatus> for u8 {
    fn from(status: DrawingStatus) -> Self {
        match status {
            DrawingStatus::Active => 0,
            DrawingStatus::Completed => 1,
            DrawingStatus::Cancelled => 2,
        }
    }
}

impl fmt::Display for DrawingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrawingStatus::Active => "active",
            DrawingStatus::Completed => "completed",
            DrawingStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How the payout for one place is computed
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrizeAward {
    /// Flat amount in the drawing's currency
    Fixed { amount: u64 },
    /// Share of the jackpot in millionths of a percent (30% = 30_000_000)
    Percentage { micro_percent: u64 },
}

/// One entry of a drawing's prize schedule
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "RawPrizeTier", into = "RawPrizeTier")]
pub struct PrizeTier {
    pub place: u8,
    pub award: PrizeAward,
}

impl PrizeTier {
    pub fn fixed(place: u8, amount: u64) -> Self {
        Self {
            place,
            award: PrizeAward::Fixed { amount },
        }
    }

    pub fn percentage(place: u8, micro_percent: u64) -> Self {
        Self {
            place,
            award: PrizeAward::Percentage { micro_percent },
        }
    }
}

/// Stored shape of a prize entry: `{place, amount?, percentage?}`
#[derive(Serialize, Deserialize)]
struct RawPrizeTier {
    place: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percentage: Option<f64>,
}

impl TryFrom<RawPrizeTier> for PrizeTier {
    type Error = DrawError;

    fn try_from(raw: RawPrizeTier) -> Result<Self, Self::Error> {
        match (raw.amount, raw.percentage) {
            (Some(amount), _) if amount > 0 => Ok(PrizeTier::fixed(raw.place, amount)),
            (_, Some(pct)) => parse_micro_percent(pct)
                .map(|micro_percent| PrizeTier::percentage(raw.place, micro_percent))
                .ok_or(DrawError::InvalidPrizeTier(raw.place)),
            (Some(amount), None) => Ok(PrizeTier::fixed(raw.place, amount)),
            (None, None) => Err(DrawError::InvalidPrizeTier(raw.place)),
        }
    }
}

impl From<PrizeTier> for RawPrizeTier {
    fn from(tier: PrizeTier) -> Self {
        match tier.award {
            PrizeAward::Fixed { amount } => RawPrizeTier {
                place: tier.place,
                amount: Some(amount),
                percentage: None,
            },
            PrizeAward::Percentage { micro_percent } => RawPrizeTier {
                place: tier.place,
                amount: None,
                percentage: Some(micro_percent as f64 / MICRO_PERCENT as f64),
            },
        }
    }
}

/// Parse a stored percentage into exact millionths of a percent.
///
/// Works on the shortest decimal form of the value, so `33.335` becomes
/// `33_335_000` with no binary rounding. Values outside `0..=100` or with
/// more than six decimals are rejected.
fn parse_micro_percent(pct: f64) -> Option<u64> {
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    // Also catches -0.0, which would print with a sign
    if pct == 0.0 {
        return Some(0);
    }
    let text = pct.to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let whole: u64 = whole.parse().ok()?;
    let (kept, rest) = frac.split_at(frac.len().min(MICRO_PERCENT_DIGITS));
    if rest.bytes().any(|b| b != b'0') {
        return None;
    }
    let mut micro = whole.checked_mul(MICRO_PERCENT)?;
    let mut scale = MICRO_PERCENT;
    for digit in kept.bytes() {
        scale /= 10;
        micro += u64::from(digit.checked_sub(b'0')?) * scale;
    }
    Some(micro)
}

/// Drawing record
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Drawing {
    /// Unique drawing id
    pub id: DrawingId,
    /// Human title
    pub title: String,
    /// End of the entry window
    pub end_date: UnixTimestamp,
    /// Current state
    pub status: DrawingStatus,
    /// Currency prizes are credited in
    pub currency: String,
    /// Prize schedule, one entry per place
    pub prizes: Vec<PrizeTier>,
    /// Pooled amount percentage prizes are computed from
    pub jackpot_current_amount: Option<u64>,
    /// Persisted draw outcome (set once)
    pub draw_results: Option<DrawRecord>,
    /// Ranked winners, place 1 first
    pub winners: Vec<ParticipantId>,
}

impl Drawing {
    /// Create a new active drawing with no result
    pub fn new(id: DrawingId, title: impl Into<String>, end_date: UnixTimestamp) -> Self {
        Self {
            id,
            title: title.into(),
            end_date,
            status: DrawingStatus::Active,
            currency: "ar".to_string(),
            prizes: Vec::new(),
            jackpot_current_amount: None,
            draw_results: None,
            winners: Vec::new(),
        }
    }

    /// Check if the entry window has closed
    pub fn has_ended(&self, current_time: UnixTimestamp) -> bool {
        current_time >= self.end_date
    }

    /// Active and past its end date
    pub fn is_due(&self, current_time: UnixTimestamp) -> bool {
        self.status == DrawingStatus::Active && self.has_ended(current_time)
    }

    pub fn prize_for_place(&self, place: u8) -> Option<&PrizeTier> {
        self.prizes.iter().find(|tier| tier.place == place)
    }

    pub fn summary(&self) -> DrawingSummary {
        DrawingSummary {
            id: self.id,
            title: self.title.clone(),
            end_date: self.end_date,
        }
    }

    /// Encode into the packed record layout
    pub fn pack(&self) -> Result<Vec<u8>, DrawError> {
        Ok(self.try_to_vec()?)
    }

    /// Decode a packed record
    pub fn unpack(src: &[u8]) -> Result<Self, DrawError> {
        Ok(Self::try_from_slice(src)?)
    }
}

/// Listing row for due drawings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DrawingSummary {
    pub id: DrawingId,
    pub title: String,
    pub end_date: UnixTimestamp,
}

/// One entry in a drawing
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    /// Ledger id of the ticket
    pub id: u64,
    /// Participant who owns the ticket
    pub owner: ParticipantId,
    /// Drawing the ticket was issued for
    pub drawing_id: DrawingId,
    /// Serial number, unique within the drawing
    pub serial: u64,
    /// Issuance time
    pub created_at: UnixTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(DrawingStatus::Active.can_transition_to(DrawingStatus::Completed));
        assert!(DrawingStatus::Active.can_transition_to(DrawingStatus::Cancelled));
        assert!(!DrawingStatus::Active.can_transition_to(DrawingStatus::Active));
        assert!(!DrawingStatus::Completed.can_transition_to(DrawingStatus::Cancelled));
        assert!(!DrawingStatus::Cancelled.can_transition_to(DrawingStatus::Completed));
    }

    #[test]
    fn test_status_byte_mapping() {
        for status in [
            DrawingStatus::Active,
            DrawingStatus::Completed,
            DrawingStatus::Cancelled,
        ] {
            let byte: u8 = status.into();
            assert_eq!(DrawingStatus::try_from(byte), Ok(status));
        }
        assert!(DrawingStatus::try_from(9).is_err());
    }

    #[test]
    fn test_prize_tier_prefers_fixed_amount() {
        let tier: PrizeTier =
            serde_json::from_str(r#"{"place":1,"amount":1000,"percentage":30}"#).unwrap();
        assert_eq!(tier, PrizeTier::fixed(1, 1000));
    }

    #[test]
    fn test_prize_tier_percentage_is_exact() {
        let tier: PrizeTier = serde_json::from_str(r#"{"place":2,"percentage":12.5}"#).unwrap();
        assert_eq!(tier, PrizeTier::percentage(2, 12_500_000));

        let json = serde_json::to_value(tier).unwrap();
        assert_eq!(json["percentage"], 12.5);
        assert!(json.get("amount").is_none());
    }

    #[test]
    fn test_prize_tier_zero_amount_falls_back_to_percentage() {
        let tier: PrizeTier =
            serde_json::from_str(r#"{"place":3,"amount":0,"percentage":15}"#).unwrap();
        assert_eq!(tier, PrizeTier::percentage(3, 15_000_000));
    }

    #[test]
    fn test_prize_tier_rejects_empty_entry() {
        assert!(serde_json::from_str::<PrizeTier>(r#"{"place":4}"#).is_err());
        assert!(serde_json::from_str::<PrizeTier>(r#"{"place":4,"percentage":120}"#).is_err());
        assert!(serde_json::from_str::<PrizeTier>(r#"{"place":4,"percentage":-1}"#).is_err());
    }

    #[test]
    fn test_prize_tier_keeps_fractional_percentages() {
        let tier: PrizeTier = serde_json::from_str(r#"{"place":1,"percentage":33.335}"#).unwrap();
        assert_eq!(tier, PrizeTier::percentage(1, 33_335_000));

        let tier: PrizeTier = serde_json::from_str(r#"{"place":2,"percentage":0.004}"#).unwrap();
        assert_eq!(tier, PrizeTier::percentage(2, 4_000));

        let tier: PrizeTier = serde_json::from_str(r#"{"place":3,"percentage":100}"#).unwrap();
        assert_eq!(tier, PrizeTier::percentage(3, 100_000_000));

        let json = serde_json::to_value(PrizeTier::percentage(1, 33_335_000)).unwrap();
        assert_eq!(json["percentage"], 33.335);
    }

    #[test]
    fn test_prize_tier_rejects_sub_micro_percentages() {
        let err = serde_json::from_str::<PrizeTier>(r#"{"place":5,"percentage":0.0000001}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_drawing_pack_unpack() {
        let mut drawing = Drawing::new(42, "Weekly", 1_700_000_000);
        drawing.prizes = vec![PrizeTier::percentage(1, 30_000_000), PrizeTier::fixed(2, 500)];
        drawing.jackpot_current_amount = Some(5000);

        let packed = drawing.pack().unwrap();
        let unpacked = Drawing::unpack(&packed).unwrap();
        assert_eq!(unpacked, drawing);
        assert!(Drawing::unpack(&packed[..packed.len() - 1]).is_err());
    }

    #[test]
    fn test_is_due() {
        let mut drawing = Drawing::new(1, "Daily", 100);
        assert!(!drawing.is_due(99));
        assert!(drawing.is_due(100));
        drawing.status = DrawingStatus::Completed;
        assert!(!drawing.is_due(200));
    }
}
