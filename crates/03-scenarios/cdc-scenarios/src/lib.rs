//! End-to-end scenarios for the crossing: scripted requesters, memory
//! responders, a relative-clock scheduler and the checks run over each result.

mod checks;
mod clock;
mod config;
mod domain;
mod engine;
mod error;
mod requester;
mod responder;
mod stats;
mod threaded;

pub use checks::{
    verify_cancellation, verify_credit_bound, verify_idle_quiescence, verify_no_loss,
    verify_order, verify_protocol, verify_report, CheckResult,
};
pub use clock::{ClockSim, Domain};
pub use config::{ScenarioConfig, ScenarioKind};
pub use domain::{idle_register_changes, InitiatorDomain, TargetDomain};
pub use engine::{ScenarioEngine, ScenarioReport};
pub use error::{ScenarioError, ScenarioResult};
pub use requester::{expected_cancellations, script, traffic, Requester, Step};
pub use responder::{Bram, BusEvent, Monitor, Responder, StallSchedule};
pub use stats::{ArcStatsSink, ScenarioStats, StatEvent, StatsSink};
pub use threaded::run_threaded;

/// Runs `config` on the deterministic scheduler with a fresh stats sink.
pub fn run_scenario(config: ScenarioConfig) -> ScenarioResult<ScenarioReport> {
    ScenarioEngine::new(config, ArcStatsSink::new())?.run()
}
