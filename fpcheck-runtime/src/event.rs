// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// The anomalies a single checked operation can exhibit. The declaration
/// order is load-bearing: trap checks scan kinds in this order, and the
/// report emits the per-kind counters in this order.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    InfinityPos = 0,
    InfinityNeg,
    Nan,
    DivisionZero,
    Cancellation,
    Comparison,
    Underflow,
    LatentInfinityPos,
    LatentInfinityNeg,
    LatentUnderflow,
}

impl EventKind {
    pub const COUNT: usize = 10;

    /// Every kind, in declaration order.
    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::InfinityPos,
        EventKind::InfinityNeg,
        EventKind::Nan,
        EventKind::DivisionZero,
        EventKind::Cancellation,
        EventKind::Comparison,
        EventKind::Underflow,
        EventKind::LatentInfinityPos,
        EventKind::LatentInfinityNeg,
        EventKind::LatentUnderflow,
    ];

    /// Human-readable name used in trap diagnostics. A static string to keep
    /// the trap path free of allocation.
    pub fn display_name(self) -> &'static str {
        match self {
            EventKind::InfinityPos => "infinity(+)",
            EventKind::InfinityNeg => "infinity(-)",
            EventKind::Nan => "nan",
            EventKind::DivisionZero => "division by zero",
            EventKind::Cancellation => "cancellation",
            EventKind::Comparison => "comparison",
            EventKind::Underflow => "underflow",
            EventKind::LatentInfinityPos => "latent infinity(+)",
            EventKind::LatentInfinityNeg => "latent infinity(-)",
            EventKind::LatentUnderflow => "latent underflow",
        }
    }
}

/// The set of kinds observed for one checked operation. Multiple kinds can
/// co-occur, e.g. `1.0 / 0.0` is both a division by zero and a positive
/// infinity.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct EventSet(u32);

impl EventSet {
    pub const EMPTY: EventSet = EventSet(0);

    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= 1 << kind as u32;
    }

    #[must_use]
    pub fn with(mut self, kind: EventKind) -> EventSet {
        self.insert(kind);
        self
    }

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & (1 << kind as u32) != 0
    }

    /// The fast-path guard: when no kind is set the caller skips the
    /// aggregation table entirely.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

/// One 64-bit occurrence counter per event kind. Field names match the
/// counter names in the exported report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventCounts {
    pub infinity_pos: u64,
    pub infinity_neg: u64,
    pub nan: u64,
    pub division_zero: u64,
    pub cancellation: u64,
    pub comparison: u64,
    pub underflow: u64,
    pub latent_infinity_pos: u64,
    pub latent_infinity_neg: u64,
    pub latent_underflow: u64,
}

impl EventCounts {
    /// Counts for a freshly observed location: 1 for each set kind.
    pub fn seeded(flags: EventSet) -> EventCounts {
        let mut counts = EventCounts::default();
        counts.add(flags);
        counts
    }

    /// Adds 1 to the counter of every kind present in `flags`.
    pub fn add(&mut self, flags: EventSet) {
        for kind in flags.iter() {
            *self.counter_mut(kind) += 1;
        }
    }

    pub fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::InfinityPos => self.infinity_pos,
            EventKind::InfinityNeg => self.infinity_neg,
            EventKind::Nan => self.nan,
            EventKind::DivisionZero => self.division_zero,
            EventKind::Cancellation => self.cancellation,
            EventKind::Comparison => self.comparison,
            EventKind::Underflow => self.underflow,
            EventKind::LatentInfinityPos => self.latent_infinity_pos,
            EventKind::LatentInfinityNeg => self.latent_infinity_neg,
            EventKind::LatentUnderflow => self.latent_underflow,
        }
    }

    fn counter_mut(&mut self, kind: EventKind) -> &mut u64 {
        match kind {
            EventKind::InfinityPos => &mut self.infinity_pos,
            EventKind::InfinityNeg => &mut self.infinity_neg,
            EventKind::Nan => &mut self.nan,
            EventKind::DivisionZero => &mut self.division_zero,
            EventKind::Cancellation => &mut self.cancellation,
            EventKind::Comparison => &mut self.comparison,
            EventKind::Underflow => &mut self.underflow,
            EventKind::LatentInfinityPos => &mut self.latent_infinity_pos,
            EventKind::LatentInfinityNeg => &mut self.latent_infinity_neg,
            EventKind::LatentUnderflow => &mut self.latent_underflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let set = EventSet::EMPTY;
        assert!(set.is_empty());
        for kind in EventKind::ALL {
            assert!(!set.contains(kind));
        }
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn test_set_insert_and_iter_order() {
        let set = EventSet::EMPTY
            .with(EventKind::LatentUnderflow)
            .with(EventKind::Nan)
            .with(EventKind::DivisionZero);
        assert!(!set.is_empty());
        assert!(set.contains(EventKind::Nan));
        assert!(!set.contains(EventKind::Underflow));
        // Iteration follows declaration order, not insertion order.
        let kinds: Vec<_> = set.iter().collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Nan,
                EventKind::DivisionZero,
                EventKind::LatentUnderflow
            ]
        );
    }

    #[test]
    fn test_seeded_counts() {
        let flags = EventSet::EMPTY
            .with(EventKind::Nan)
            .with(EventKind::DivisionZero);
        let counts = EventCounts::seeded(flags);
        assert_eq!(counts.nan, 1);
        assert_eq!(counts.division_zero, 1);
        assert_eq!(counts.infinity_pos, 0);
        assert_eq!(counts.comparison, 0);
    }

    #[test]
    fn test_add_accumulates() {
        let mut counts = EventCounts::seeded(EventSet::EMPTY.with(EventKind::Cancellation));
        counts.add(EventSet::EMPTY.with(EventKind::Cancellation));
        counts.add(
            EventSet::EMPTY
                .with(EventKind::Cancellation)
                .with(EventKind::Underflow),
        );
        assert_eq!(counts.cancellation, 3);
        assert_eq!(counts.underflow, 1);
        assert_eq!(counts.get(EventKind::Cancellation), 3);
        assert_eq!(counts.get(EventKind::Nan), 0);
    }
}
