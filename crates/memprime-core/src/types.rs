//! Shared type definitions: backup slots and retry policies

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// One of the four configurable backup destinations.
///
/// Each slot maps to a fixed key in the location registry store. The set is
/// closed: a destination can only ever live in one of these four slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupSlot {
    Location1,
    Location2,
    Location3,
    Location4,
}

impl BackupSlot {
    /// All slots, in the order destinations are visited during a run.
    pub const ALL: [BackupSlot; 4] = [
        BackupSlot::Location1,
        BackupSlot::Location2,
        BackupSlot::Location3,
        BackupSlot::Location4,
    ];

    /// The key this slot is persisted under in the registry store.
    pub fn key(&self) -> &'static str {
        match self {
            BackupSlot::Location1 => "backup_location_slot_1",
            BackupSlot::Location2 => "backup_location_slot_2",
            BackupSlot::Location3 => "backup_location_slot_3",
            BackupSlot::Location4 => "backup_location_slot_4",
        }
    }

    /// 1-based slot number as shown to the user.
    pub fn index(&self) -> u8 {
        match self {
            BackupSlot::Location1 => 1,
            BackupSlot::Location2 => 2,
            BackupSlot::Location3 => 3,
            BackupSlot::Location4 => 4,
        }
    }

    /// Look up a slot by its 1-based number.
    pub fn from_index(index: u8) -> Result<Self, Error> {
        match index {
            1 => Ok(BackupSlot::Location1),
            2 => Ok(BackupSlot::Location2),
            3 => Ok(BackupSlot::Location3),
            4 => Ok(BackupSlot::Location4),
            other => Err(Error::invalid_slot(other.to_string())),
        }
    }

    /// Look up a slot by its registry store key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.key() == key)
    }
}

impl fmt::Display for BackupSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "location {}", self.index())
    }
}

/// Retry delay strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry immediately with no delay
    #[default]
    None,

    /// Wait a fixed delay between attempts
    FixedDelay,

    /// Double the delay after every failed attempt
    ExponentialBackoff,
}

/// Policy controlling how an operation is retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy of `attempts` back-to-back tries with no delay.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            strategy: RetryStrategy::None,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keys_match_registry_layout() {
        assert_eq!(BackupSlot::Location1.key(), "backup_location_slot_1");
        assert_eq!(BackupSlot::Location4.key(), "backup_location_slot_4");
    }

    #[test]
    fn slot_round_trips_through_index_and_key() {
        for slot in BackupSlot::ALL {
            assert_eq!(BackupSlot::from_index(slot.index()).unwrap(), slot);
            assert_eq!(BackupSlot::from_key(slot.key()), Some(slot));
        }
    }

    #[test]
    fn slot_rejects_out_of_range_index() {
        assert!(BackupSlot::from_index(0).is_err());
        assert!(BackupSlot::from_index(5).is_err());
    }

    #[test]
    fn slots_order_matches_visit_order() {
        let mut sorted = BackupSlot::ALL;
        sorted.sort();
        assert_eq!(sorted, BackupSlot::ALL);
    }

    #[test]
    fn immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.strategy, RetryStrategy::None);
        assert_eq!(policy.initial_delay_ms, 0);
    }

    #[test]
    fn retry_policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_yaml_ng::from_str("max_attempts: 5").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, RetryStrategy::None);
        assert_eq!(policy.initial_delay_ms, 250);
    }
}
