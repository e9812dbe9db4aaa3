//! Single-bit toggle wires and the destination-side synchronizer.
//!
//! A [`ToggleWire`] is the only value shared between the two domains. The
//! source flips it once per event with release ordering. The destination never
//! acts on the raw wire: a [`ToggleSync`] samples it once per destination tick
//! into a shift register and only the last stage is trusted. Events are
//! recovered by comparing the two most recent trusted samples, so a slow
//! destination still sees every flip as long as the source flips at most once
//! between destination observations.
//!
//! ```text
//!  wire ──► [s0] ──► [s1] ──► ... ──► [s(n-1)] ──► [prev]
//!                                         └─── xor ───┘ ──► edge
//! ```

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{RingError, RingResult};

/// Minimum number of destination samples before a wire value is trusted.
pub const MIN_SYNC_STAGES: u32 = 2;
/// Upper bound keeps the shift register inside a `u32`.
pub const MAX_SYNC_STAGES: u32 = 16;

/// Event bit written by exactly one domain and observed by the other.
#[derive(Debug)]
pub struct ToggleWire {
    level: AtomicBool,
}

impl Default for ToggleWire {
    fn default() -> Self {
        Self::new()
    }
}

impl ToggleWire {
    pub fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
        }
    }

    /// Signals one event. Everything written before the flip becomes visible
    /// to a destination that observes the new level.
    #[inline]
    pub fn flip(&self) {
        self.level.fetch_xor(true, Ordering::Release);
    }

    /// Raw level as seen by the destination. Callers outside a synchronizer
    /// should not branch on this value.
    #[inline]
    pub fn level(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }
}

/// Destination-side delay line for one [`ToggleWire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToggleSync {
    stages: u32,
    shift: u32,
}

impl ToggleSync {
    /// Creates a synchronizer trusting a sample after `stages` destination ticks.
    pub fn new(stages: u32) -> RingResult<Self> {
        if !(MIN_SYNC_STAGES..=MAX_SYNC_STAGES).contains(&stages) {
            return Err(RingError::InvalidStages {
                requested: stages,
                minimum: MIN_SYNC_STAGES,
                maximum: MAX_SYNC_STAGES,
            });
        }
        Ok(Self { stages, shift: 0 })
    }

    pub fn stages(&self) -> u32 {
        self.stages
    }

    /// Shifts one sample of `wire` into the delay line and reports whether the
    /// trusted output changed on this tick.
    #[inline]
    pub fn sample(&mut self, wire: &ToggleWire) -> bool {
        let mask = (1u32 << (self.stages + 1)) - 1;
        self.shift = ((self.shift << 1) | wire.level() as u32) & mask;
        self.edge()
    }

    /// Trusted output level.
    #[inline]
    pub fn output(&self) -> bool {
        (self.shift >> (self.stages - 1)) & 1 == 1
    }

    /// Whether the two most recent trusted samples differ.
    #[inline]
    pub fn edge(&self) -> bool {
        let newest = self.shift >> (self.stages - 1);
        (newest ^ (newest >> 1)) & 1 == 1
    }

    /// True when every stage already agrees with the wire, i.e. sampling would
    /// not change any register bit.
    pub fn is_settled(&self, wire: &ToggleWire) -> bool {
        let mask = (1u32 << (self.stages + 1)) - 1;
        let expect = if wire.level() { mask } else { 0 };
        self.shift == expect
    }

    /// Raw shift register, exposed for register-level snapshots.
    pub fn register(&self) -> u32 {
        self.shift
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn rejects_short_delay_line() {
        assert!(matches!(
            ToggleSync::new(1),
            Err(RingError::InvalidStages { requested: 1, .. })
        ));
        assert!(ToggleSync::new(MAX_SYNC_STAGES + 1).is_err());
        assert!(ToggleSync::new(MIN_SYNC_STAGES).is_ok());
    }

    #[test]
    fn edge_surfaces_after_fixed_latency() {
        for stages in MIN_SYNC_STAGES..=5 {
            let wire = ToggleWire::new();
            let mut sync = ToggleSync::new(stages).unwrap();
            wire.flip();
            let mut seen_at = None;
            for tick in 1..=stages + 2 {
                if sync.sample(&wire) {
                    assert!(seen_at.is_none(), "edge must be a single-tick pulse");
                    seen_at = Some(tick);
                }
            }
            assert_eq!(seen_at, Some(stages), "stages={stages}");
            assert!(sync.output());
        }
    }

    #[test]
    fn idle_wire_leaves_register_untouched() {
        let wire = ToggleWire::new();
        let mut sync = ToggleSync::new(3).unwrap();
        for _ in 0..64 {
            assert!(!sync.sample(&wire));
            assert_eq!(sync.register(), 0);
        }
        assert!(sync.is_settled(&wire));

        wire.flip();
        assert!(!sync.is_settled(&wire));
        for _ in 0..4 {
            sync.sample(&wire);
        }
        let settled = sync.register();
        assert!(sync.is_settled(&wire));
        for _ in 0..64 {
            assert!(!sync.sample(&wire));
            assert_eq!(sync.register(), settled);
        }
    }

    #[test]
    fn randomized_rates_never_lose_or_duplicate_events() {
        // The source may only flip again after the destination has reported the
        // previous edge, mirroring the per-slot handshake of the ring.
        let mut rng = StdRng::seed_from_u64(0x7066_6c69_7021);
        for _ in 0..32 {
            let stages = rng.gen_range(MIN_SYNC_STAGES..=4);
            let wire = ToggleWire::new();
            let mut sync = ToggleSync::new(stages).unwrap();
            let mut flips = 0u32;
            let mut edges = 0u32;
            let mut transitions = 0u32;
            for _ in 0..2_000 {
                if flips == edges && rng.gen_bool(0.3) {
                    wire.flip();
                    flips += 1;
                }
                let dest_ticks = rng.gen_range(0..4);
                for _ in 0..dest_ticks {
                    let before = sync.output();
                    if sync.sample(&wire) {
                        edges += 1;
                    }
                    if sync.output() != before {
                        transitions += 1;
                    }
                }
            }
            for _ in 0..stages {
                let before = sync.output();
                if sync.sample(&wire) {
                    edges += 1;
                }
                if sync.output() != before {
                    transitions += 1;
                }
            }
            assert_eq!(flips, edges);
            assert_eq!(edges, transitions, "every output change is exactly one edge");
        }
    }
}
