//! Deterministic single-threaded scenario runner.
//!
//! Both domains live on the calling thread; [`ClockSim`] decides which one
//! owns each successive clock edge. The same seed always yields the same
//! interleaving, so any failing run can be replayed exactly.

use cdc_skid::{channel, Completion, Transaction};
use tracing::{debug, info};

use crate::clock::{ClockSim, Domain};
use crate::config::ScenarioConfig;
use crate::domain::{idle_register_changes, InitiatorDomain, TargetDomain};
use crate::error::{ScenarioError, ScenarioResult};
use crate::requester::{expected_cancellations, script, Requester};
use crate::responder::{Bram, BusEvent, Monitor, StallSchedule};
use crate::stats::{ScenarioStats, StatEvent, StatsSink};

/// Everything a check needs to judge one run.
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub config: ScenarioConfig,
    pub stats: ScenarioStats,
    /// Requests in acceptance order, as the requester offered them.
    pub issued: Vec<Transaction>,
    /// Responses in delivery order.
    pub responses: Vec<Completion>,
    pub downstream: Vec<BusEvent>,
    pub groups_cancelled: u32,
    pub expected_cancellations: u32,
    /// Idle-window ticks on which some register still changed.
    pub idle_register_changes: u32,
    pub downstream_protocol_errors: u32,
}

/// Memory responder configured from the scenario.
pub(crate) fn build_responder(config: &ScenarioConfig) -> Monitor<Bram> {
    let stall = config.kind.stall_probability();
    let stalls = if stall > 0.0 {
        StallSchedule::random(stall, config.seed.rotate_left(32) ^ 0x5DEE_CE66)
    } else {
        StallSchedule::Never
    };
    Monitor::new(Bram::new(config.latency).with_stalls(stalls))
}

pub struct ScenarioEngine<S> {
    config: ScenarioConfig,
    initiator: InitiatorDomain<S>,
    target: TargetDomain<S>,
    clock: ClockSim,
    sink: S,
    expected_cancellations: u32,
    ticks: u64,
}

impl<S: StatsSink + Clone> ScenarioEngine<S> {
    pub fn new(config: ScenarioConfig, sink: S) -> ScenarioResult<Self> {
        config.validate()?;
        let (initiator, target) = channel(config.crossing.clone())?;
        let steps = script(&config.kind);
        let expected_cancellations = expected_cancellations(&steps);
        let requester = Requester::with_script(steps);
        let clock = ClockSim::new(config.ratio, config.jitter, config.seed);
        Ok(Self {
            initiator: InitiatorDomain::new(initiator, requester, sink.clone()),
            target: TargetDomain::new(target, build_responder(&config), sink.clone()),
            clock,
            sink,
            expected_cancellations,
            ticks: 0,
            config,
        })
    }

    pub fn initiator(&self) -> &InitiatorDomain<S> {
        &self.initiator
    }

    pub fn target(&self) -> &TargetDomain<S> {
        &self.target
    }

    /// Advances whichever domain owns the next clock edge.
    pub fn step(&mut self) -> Domain {
        self.ticks += 1;
        let domain = self.clock.next_edge();
        match domain {
            Domain::A => self.initiator.tick(),
            Domain::B => self.target.tick(),
        };
        domain
    }

    pub fn is_settled(&self) -> bool {
        self.initiator.is_finished() && self.target.is_finished()
    }

    /// Runs the script to completion, then samples the idle window.
    pub fn run(mut self) -> ScenarioResult<ScenarioReport> {
        info!(
            scenario = self.config.kind.name(),
            depth = self.config.crossing.depth,
            ratio = self.config.ratio,
            seed = self.config.seed,
            "scenario starting"
        );
        while !self.is_settled() {
            if self.ticks >= self.config.max_ticks {
                return Err(ScenarioError::Timeout { ticks: self.ticks });
            }
            self.step();
            if let Some(violation) = self.initiator.fault().or(self.target.fault()) {
                return Err(ScenarioError::Fault(violation));
            }
        }
        debug!(ticks = self.ticks, "scenario settled");

        let changes =
            idle_register_changes(&mut self.initiator, &mut self.target, self.config.idle_ticks);
        let responses = self.initiator.requester().responses().to_vec();
        Ok(finish_report(
            self.config,
            self.initiator,
            self.target,
            &self.sink,
            responses,
            self.expected_cancellations,
            changes,
        ))
    }
}

pub(crate) fn finish_report<S: StatsSink>(
    config: ScenarioConfig,
    initiator: InitiatorDomain<S>,
    target: TargetDomain<S>,
    sink: &S,
    responses: Vec<Completion>,
    expected_cancellations: u32,
    idle_register_changes: u32,
) -> ScenarioReport {
    let (initiator, requester) = initiator.into_parts();
    let (target, monitor) = target.into_parts();
    sink.record(StatEvent::Violations(
        initiator.stats().violations + target.stats().violations,
    ));
    let downstream_protocol_errors = monitor.protocol_errors();
    ScenarioReport {
        config,
        stats: sink.snapshot(),
        issued: requester.issued().to_vec(),
        responses,
        downstream: monitor.into_events(),
        groups_cancelled: initiator.groups_cancelled(),
        expected_cancellations,
        idle_register_changes,
        downstream_protocol_errors,
    }
}
