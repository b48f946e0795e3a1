use crate::regs::{CounterIndex, NUM_COUNTERS};
use derive_more::{Index, IntoIterator};

/// Point-in-time copy of the ten hardware counters.
///
/// The copy is not atomic as a set: a counter may advance between the reads of two slots unless
/// counting was stopped first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Index, IntoIterator)]
pub struct CounterSnapshot {
    #[index]
    #[into_iterator(ref)]
    counts: [u64; NUM_COUNTERS],
}

impl CounterSnapshot {
    /// Value captured for counter `idx`.
    pub fn get(&self, idx: CounterIndex) -> u64 {
        self.counts[idx.get()]
    }

    /// Store `value` as the count of `idx`.
    pub fn set(&mut self, idx: CounterIndex, value: u64) {
        self.counts[idx.get()] = value;
    }

    /// All captured values, PMC0 first.
    pub fn counts(&self) -> &[u64; NUM_COUNTERS] {
        &self.counts
    }
}

impl std::fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for idx in CounterIndex::ALL.iter() {
            writeln!(f, "{} = {}", idx, self.get(*idx))?;
        }
        Ok(())
    }
}
