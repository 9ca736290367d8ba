//! Snowflake-style identifiers for endpoint records.
//!
//! Layout (most significant first): 41 bits of milliseconds since
//! [`EPOCH_MS`], 10 bits of node id, 12 bits of per-millisecond sequence.
//! Ids from one generator are strictly increasing.

use std::sync::Mutex;

use chrono::Utc;

/// 2024-01-01T00:00:00Z.
pub const EPOCH_MS: i64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug)]
struct State {
    last_ms: i64,
    sequence: u64,
}

/// Generates unique, time-ordered ids for one node.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// Create a generator. Node ids wrap into the 10-bit node field.
    pub fn new(node: u16) -> Self {
        Self {
            node: u64::from(node & MAX_NODE),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    /// Next id.
    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now().timestamp_millis() - EPOCH_MS;

        if now <= state.last_ms {
            // Same millisecond or clock stepped back: stay on the last tick.
            now = state.last_ms;
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted, borrow the next millisecond.
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        ((now as u64) << (NODE_BITS + SEQUENCE_BITS))
            | (self.node << SEQUENCE_BITS)
            | state.sequence
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let gen = SnowflakeGenerator::new(3);
        let ids: Vec<u64> = (0..10_000).map(|_| gen.next_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn test_node_is_encoded() {
        let gen = SnowflakeGenerator::new(5);
        let id = gen.next_id();
        assert_eq!((id >> SEQUENCE_BITS) & u64::from(MAX_NODE), 5);
    }
}
