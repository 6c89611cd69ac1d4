// Giveaway Draw Engine - Configuration
use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::error::DrawError;

/// Tunables for the draw and the scanner around it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Distinct participants required for a draw to run
    pub min_participants: usize,
    /// Cap on participants selected in the qualification stage
    pub max_qualifiers: usize,
    /// Qualifiers kept after elimination, and the number of ranked places
    pub finalist_count: usize,
    /// Bound on each ticket read, state write and credit call
    pub io_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_participants: 5,
            max_qualifiers: 20,
            finalist_count: 5,
            io_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DRAW_MIN_PARTICIPANTS`, `DRAW_MAX_QUALIFIERS`,
    /// `DRAW_FINALIST_COUNT` and `DRAW_IO_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, DrawError> {
        let defaults = Self::default();
        let config = Self {
            min_participants: read_var("DRAW_MIN_PARTICIPANTS", defaults.min_participants),
            max_qualifiers: read_var("DRAW_MAX_QUALIFIERS", defaults.max_qualifiers),
            finalist_count: read_var("DRAW_FINALIST_COUNT", defaults.finalist_count),
            io_timeout: Duration::from_millis(read_var(
                "DRAW_IO_TIMEOUT_MS",
                defaults.io_timeout.as_millis() as u64,
            )),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DrawError> {
        if self.min_participants == 0 {
            return Err(DrawError::InvalidConfig("min_participants must be at least 1"));
        }
        if self.finalist_count == 0 || self.finalist_count > u8::MAX as usize {
            return Err(DrawError::InvalidConfig("finalist_count must be between 1 and 255"));
        }
        if self.max_qualifiers < self.finalist_count {
            return Err(DrawError::InvalidConfig(
                "max_qualifiers cannot be lower than finalist_count",
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(DrawError::InvalidConfig("io_timeout must be positive"));
        }
        Ok(())
    }
}

fn read_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_participants, 5);
        assert_eq!(config.max_qualifiers, 20);
        assert_eq!(config.finalist_count, 5);
    }

    #[test]
    fn test_validate_rejects_inverted_stage_sizes() {
        let config = EngineConfig {
            max_qualifiers: 3,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(DrawError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = EngineConfig {
            io_timeout: Duration::from_millis(0),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("DRAW_IO_TIMEOUT_MS", "1500");
        env::set_var("DRAW_MAX_QUALIFIERS", "not-a-number");
        let config = EngineConfig::from_env().unwrap();
        env::remove_var("DRAW_IO_TIMEOUT_MS");
        env::remove_var("DRAW_MAX_QUALIFIERS");

        assert_eq!(config.io_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_qualifiers, 20);
    }
}
