//! Document identity generation.
//!
//! Identities are strings. The plain timestamp strategy reproduces the
//! historical behaviour and can collide when two documents are stored within
//! the clock's resolution; the default strategy appends a per-generator
//! sequence number so every identity from one generator is distinct.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DocumentId;

/// How document identities are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// `<secs>.<nanos>` of the wall clock. Collides within one clock tick.
    Timestamp,
    /// `<secs>.<nanos>-<seq>`, where `seq` increases on every call.
    #[default]
    TimestampSeq,
    /// UUID v7 (time ordered, random tail).
    Uuid,
}

impl IdStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdStrategy::Timestamp => "timestamp",
            IdStrategy::TimestampSeq => "timestamp-seq",
            IdStrategy::Uuid => "uuid",
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(IdStrategy::Timestamp),
            "timestamp-seq" => Ok(IdStrategy::TimestampSeq),
            "uuid" => Ok(IdStrategy::Uuid),
            other => Err(ConfigError::UnknownIdStrategy(other.to_string())),
        }
    }
}

/// Stateful identity generator. One per relay.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    strategy: IdStrategy,
    seq: u64,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self { strategy, seq: 0 }
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// Generate the next identity from the current wall clock.
    pub fn next_id(&mut self) -> DocumentId {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.next_id_at(since_epoch)
    }

    /// Generate the next identity as if the clock read `since_epoch`.
    ///
    /// The UUID strategy ignores the supplied time.
    pub fn next_id_at(&mut self, since_epoch: Duration) -> DocumentId {
        match self.strategy {
            IdStrategy::Timestamp => DocumentId::new(format_timestamp(since_epoch)),
            IdStrategy::TimestampSeq => {
                self.seq += 1;
                DocumentId::new(format!("{}-{:06}", format_timestamp(since_epoch), self.seq))
            }
            IdStrategy::Uuid => DocumentId::new(uuid::Uuid::now_v7().to_string()),
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}

fn format_timestamp(since_epoch: Duration) -> String {
    format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_strategy_parse_roundtrip() {
        for strategy in [IdStrategy::Timestamp, IdStrategy::TimestampSeq, IdStrategy::Uuid] {
            assert_eq!(strategy.as_str().parse::<IdStrategy>().unwrap(), strategy);
        }
        assert!(matches!(
            "random".parse::<IdStrategy>(),
            Err(ConfigError::UnknownIdStrategy(_))
        ));
    }

    #[test]
    fn test_strategy_serde_kebab_case() {
        let json = serde_json::to_string(&IdStrategy::TimestampSeq).unwrap();
        assert_eq!(json, "\"timestamp-seq\"");
    }

    #[test]
    fn test_timestamp_format() {
        let mut ids = IdGenerator::new(IdStrategy::Timestamp);
        let id = ids.next_id_at(Duration::new(1_760_000_000, 42));
        assert_eq!(id.as_str(), "1760000000.000000042");
    }

    #[test]
    fn test_timestamp_distinct_ticks_are_unique() {
        let mut ids = IdGenerator::new(IdStrategy::Timestamp);
        let a = ids.next_id_at(Duration::new(10, 1));
        let b = ids.next_id_at(Duration::new(10, 2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_same_tick_collides() {
        // Known limitation of the plain timestamp strategy.
        let mut ids = IdGenerator::new(IdStrategy::Timestamp);
        let tick = Duration::new(10, 1);
        assert_eq!(ids.next_id_at(tick), ids.next_id_at(tick));
    }

    #[test]
    fn test_timestamp_seq_same_tick_is_unique() {
        let mut ids = IdGenerator::new(IdStrategy::TimestampSeq);
        let tick = Duration::new(10, 1);
        let a = ids.next_id_at(tick);
        let b = ids.next_id_at(tick);
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "10.000000001-000001");
        assert_eq!(b.as_str(), "10.000000001-000002");
    }

    #[test]
    fn test_burst_is_unique() {
        for strategy in [IdStrategy::TimestampSeq, IdStrategy::Uuid] {
            let mut ids = IdGenerator::new(strategy);
            let seen: HashSet<DocumentId> = (0..10_000).map(|_| ids.next_id()).collect();
            assert_eq!(seen.len(), 10_000, "{strategy} produced a duplicate");
        }
    }

    #[test]
    fn test_default_is_timestamp_seq() {
        assert_eq!(IdGenerator::default().strategy(), IdStrategy::TimestampSeq);
    }
}
