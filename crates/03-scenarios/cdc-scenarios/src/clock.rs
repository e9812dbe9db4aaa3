//! Two free-running clocks with unrelated, jittered periods.
//!
//! Domain A runs at period 1.0 and domain B at `1.0 / ratio`. Every period is
//! stretched or shrunk by up to `jitter` of itself and domain B starts at a
//! random phase, so edge alignment between the two is never repeatable except
//! through the seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    A,
    B,
}

#[derive(Clone, Debug)]
pub struct ClockSim {
    rng: StdRng,
    period_a: f64,
    period_b: f64,
    jitter: f64,
    next_a: f64,
    next_b: f64,
}

impl ClockSim {
    pub fn new(ratio: f64, jitter: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let period_b = 1.0 / ratio;
        let phase = rng.gen_range(0.0..period_b);
        Self {
            rng,
            period_a: 1.0,
            period_b,
            jitter,
            next_a: 0.0,
            next_b: phase,
        }
    }

    /// Returns the domain owning the next clock edge. Ties go to A.
    pub fn next_edge(&mut self) -> Domain {
        if self.next_a <= self.next_b {
            self.next_a += self.jittered(self.period_a);
            Domain::A
        } else {
            self.next_b += self.jittered(self.period_b);
            Domain::B
        }
    }

    fn jittered(&mut self, period: f64) -> f64 {
        if self.jitter == 0.0 {
            return period;
        }
        let skew = self.rng.gen_range(-self.jitter..self.jitter);
        period * (1.0 + skew)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(clock: &mut ClockSim, edges: usize) -> (usize, usize) {
        let mut a = 0;
        let mut b = 0;
        for _ in 0..edges {
            match clock.next_edge() {
                Domain::A => a += 1,
                Domain::B => b += 1,
            }
        }
        (a, b)
    }

    #[test]
    fn ratio_sets_relative_edge_rate() {
        let mut clock = ClockSim::new(3.0, 0.0, 1);
        let (a, b) = count(&mut clock, 4_000);
        assert!((2_950..=3_050).contains(&b), "b edges {b}");
        assert!((950..=1_050).contains(&a), "a edges {a}");
    }

    #[test]
    fn jitter_keeps_average_rate() {
        let mut clock = ClockSim::new(0.5, 0.4, 9);
        let (a, b) = count(&mut clock, 9_000);
        let ratio = b as f64 / a as f64;
        assert!((0.45..0.55).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn same_seed_same_schedule() {
        let mut first = ClockSim::new(1.7, 0.3, 42);
        let mut second = ClockSim::new(1.7, 0.3, 42);
        for _ in 0..500 {
            assert_eq!(first.next_edge(), second.next_edge());
        }
    }
}
