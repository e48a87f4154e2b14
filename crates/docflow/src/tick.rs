//! Revision sequencing.
//!
//! Every mutation (essential write, re-expansion, retirement) draws a new
//! [`TickSeq`]. Cells remember when they last changed and when they were
//! last verified, which is what lets a stale cell skip its definition when
//! none of its inputs moved.

use serde::{Deserialize, Serialize};

/// Ordering within and across ticks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TickSeq {
    /// Action batch number.
    pub tick: u64,
    /// Sequence within the batch.
    pub seq: u32,
}

impl TickSeq {
    /// Stamp of everything that existed before the first mutation.
    pub const ZERO: TickSeq = TickSeq { tick: 0, seq: 0 };

    pub fn new(tick: u64, seq: u32) -> Self {
        Self { tick, seq }
    }
}

/// Issues strictly increasing [`TickSeq`] values.
#[derive(Debug, Default)]
pub struct TickCounter {
    current_tick: u64,
    current_seq: u32,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch.
    pub fn next_tick(&mut self) {
        self.current_tick += 1;
        self.current_seq = 0;
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Issue the next stamp.
    pub fn next(&mut self) -> TickSeq {
        let ts = TickSeq::new(self.current_tick, self.current_seq);
        self.current_seq += 1;
        ts
    }

    /// The stamp `next` would issue. Anything issued later compares `>=`.
    pub fn current(&self) -> TickSeq {
        TickSeq::new(self.current_tick, self.current_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_increase_across_ticks() {
        let mut ticks = TickCounter::new();
        let a = ticks.next();
        let watermark = ticks.current();
        ticks.next_tick();
        let b = ticks.next();
        assert!(a < watermark);
        assert!(b >= watermark);
        assert_eq!(b, TickSeq::new(1, 0));
        assert!(TickSeq::ZERO <= a);
    }
}
