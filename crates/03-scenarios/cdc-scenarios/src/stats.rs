use std::sync::Arc;

use cdc_skid::Status;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioStats {
    pub a_ticks: u64,
    pub b_ticks: u64,
    pub issued: u64,
    pub acks: u64,
    pub errors: u64,
    pub retries: u64,
    pub upstream_stalls: u64,
    pub downstream_stalls: u64,
    pub tokens: u32,
    pub max_occupancy: u32,
    pub max_outstanding: u32,
    pub violations: u32,
}

impl ScenarioStats {
    pub fn responses(&self) -> u64 {
        self.acks + self.errors + self.retries
    }

    pub fn apply(&mut self, event: StatEvent) {
        match event {
            StatEvent::TickA => self.a_ticks = self.a_ticks.wrapping_add(1),
            StatEvent::TickB => self.b_ticks = self.b_ticks.wrapping_add(1),
            StatEvent::Issued => self.issued += 1,
            StatEvent::Response(Status::Ok) => self.acks += 1,
            StatEvent::Response(Status::Error) => self.errors += 1,
            StatEvent::Response(Status::Retry) => self.retries += 1,
            StatEvent::UpstreamStall => self.upstream_stalls += 1,
            StatEvent::DownstreamStall => self.downstream_stalls += 1,
            StatEvent::Token => self.tokens += 1,
            StatEvent::Occupancy(n) => self.max_occupancy = self.max_occupancy.max(n),
            StatEvent::Outstanding(n) => self.max_outstanding = self.max_outstanding.max(n),
            StatEvent::Violations(n) => self.violations += n,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatEvent {
    TickA,
    TickB,
    Issued,
    Response(Status),
    UpstreamStall,
    DownstreamStall,
    Token,
    Occupancy(u32),
    Outstanding(u32),
    Violations(u32),
}

/// Destination for scenario counters, shared by both domains.
pub trait StatsSink: Send + Sync {
    fn record(&self, event: StatEvent);
    fn snapshot(&self) -> ScenarioStats;

    fn record_all(&self, events: &[StatEvent]) {
        for event in events {
            self.record(*event);
        }
    }
}

#[derive(Clone, Default)]
pub struct ArcStatsSink {
    inner: Arc<Mutex<ScenarioStats>>,
}

impl ArcStatsSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsSink for ArcStatsSink {
    fn record(&self, event: StatEvent) {
        self.inner.lock().apply(event);
    }

    fn snapshot(&self) -> ScenarioStats {
        *self.inner.lock()
    }

    fn record_all(&self, events: &[StatEvent]) {
        let mut stats = self.inner.lock();
        for event in events {
            stats.apply(*event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_clones_share_counters() {
        let sink = ArcStatsSink::new();
        let other = sink.clone();
        sink.record(StatEvent::TickA);
        other.record_all(&[
            StatEvent::TickB,
            StatEvent::Response(Status::Ok),
            StatEvent::Response(Status::Retry),
            StatEvent::Occupancy(3),
            StatEvent::Occupancy(2),
        ]);
        let stats = sink.snapshot();
        assert_eq!(stats.a_ticks, 1);
        assert_eq!(stats.b_ticks, 1);
        assert_eq!(stats.responses(), 2);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.max_occupancy, 3);
    }
}
