//! Proptest generators for property-based testing.

use proptest::prelude::*;

use docbridge_core::{IdStrategy, Payload};

/// Generate payload bytes of at most `max_len`, including empty payloads.
pub fn payload(max_len: usize) -> impl Strategy<Value = Payload> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Payload::from)
}

/// Generate a non-empty sequence of payloads.
pub fn payload_sequence(max_count: usize, max_len: usize) -> impl Strategy<Value = Vec<Payload>> {
    prop::collection::vec(payload(max_len), 1..=max_count.max(1))
}

/// Generate a topic name without wildcards.
pub fn topic_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}(/[a-zA-Z0-9_]{1,8}){0,3}".prop_map(String::from)
}

/// Generate an identity strategy.
pub fn id_strategy() -> impl Strategy<Value = IdStrategy> {
    prop_oneof![
        Just(IdStrategy::Timestamp),
        Just(IdStrategy::TimestampSeq),
        Just(IdStrategy::Uuid),
    ]
}

/// An identity strategy that never repeats within one generator.
pub fn unique_id_strategy() -> impl Strategy<Value = IdStrategy> {
    prop_oneof![Just(IdStrategy::TimestampSeq), Just(IdStrategy::Uuid)]
}
