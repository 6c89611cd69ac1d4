// Giveaway Draw Engine - Utility Functions
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::state::{PrizeAward, PrizeTier, UnixTimestamp};

/// Percentage units in 1%
pub const MICRO_PERCENT: u64 = 1_000_000;

/// Decimal places of a percentage kept exactly
pub const MICRO_PERCENT_DIGITS: usize = 6;

/// Percentage units in 100%
pub const MICRO_PERCENT_DENOMINATOR: u64 = 100 * MICRO_PERCENT;

/// `floor(amount * percentage / 100)` with the percentage in millionths of a percent
pub fn calculate_share(amount: u64, micro_percent: u64) -> u64 {
    let share = (amount as u128 * micro_percent as u128) / MICRO_PERCENT_DENOMINATOR as u128;
    // Shares above 100% only come from a hand-built tier
    u64::try_from(share).unwrap_or(u64::MAX)
}

/// Payout for one prize tier. A percentage tier without a jackpot pays nothing.
pub fn prize_amount(tier: &PrizeTier, jackpot: Option<u64>) -> u64 {
    match tier.award {
        PrizeAward::Fixed { amount } => amount,
        PrizeAward::Percentage { micro_percent } => {
            jackpot.map_or(0, |pool| calculate_share(pool, micro_percent))
        }
    }
}

/// RFC 3339 rendering used in stored results and reports
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert a stored timestamp for display; out-of-range values clamp to the epoch
pub fn timestamp_to_datetime(ts: UnixTimestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}
