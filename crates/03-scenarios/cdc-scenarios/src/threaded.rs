//! Runs each domain on its own OS thread.
//!
//! Nothing paces the two threads against each other; the only coupling is the
//! slot ring itself. The script reaches domain A over a channel and
//! completions come back out the same way.

use std::thread;
use std::time::Duration;

use cdc_skid::{channel, spawn_domain, Completion};
use crossbeam_channel::unbounded;
use tracing::{debug, info};

use crate::config::ScenarioConfig;
use crate::domain::{idle_register_changes, InitiatorDomain, TargetDomain};
use crate::engine::{build_responder, finish_report, ScenarioReport};
use crate::error::{ScenarioError, ScenarioResult};
use crate::requester::{expected_cancellations, script, Requester};
use crate::stats::StatsSink;

const WATCHDOG_PERIOD: Duration = Duration::from_millis(1);
const SETTLE_TICKS: u32 = 1_000;

pub fn run_threaded<S>(config: ScenarioConfig, sink: S) -> ScenarioResult<ScenarioReport>
where
    S: StatsSink + Clone + 'static,
{
    config.validate()?;
    let (initiator, target) = channel(config.crossing.clone())?;
    let steps = script(&config.kind);
    let expected = expected_cancellations(&steps);

    let (step_tx, step_rx) = unbounded();
    let (done_tx, done_rx) = unbounded::<Completion>();
    let domain_a = InitiatorDomain::new(initiator, Requester::new(), sink.clone())
        .with_feed(step_rx)
        .with_outbox(done_tx);
    let domain_b = TargetDomain::new(target, build_responder(&config), sink.clone());

    info!(
        scenario = config.kind.name(),
        depth = config.crossing.depth,
        "threaded scenario starting"
    );
    // Queue the whole script up front so domain A never sees a gap between
    // a request and the abandon that follows it.
    for step in steps {
        if step_tx.send(step).is_err() {
            break;
        }
    }
    drop(step_tx);

    let handle_b = spawn_domain(domain_b).map_err(|e| ScenarioError::Thread(e.to_string()))?;
    let handle_a = match spawn_domain(domain_a) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = handle_b.stop_and_join();
            return Err(ScenarioError::Thread(e.to_string()));
        }
    };

    let mut timed_out = false;
    while !handle_a.is_finished() {
        if sink.snapshot().a_ticks >= config.max_ticks {
            timed_out = true;
            handle_a.stop();
            break;
        }
        thread::sleep(WATCHDOG_PERIOD);
    }

    let joined_a = handle_a.join();
    let joined_b = handle_b.stop_and_join();
    let mut domain_a =
        joined_a.map_err(|_| ScenarioError::Thread("initiator thread panicked".into()))?;
    let mut domain_b =
        joined_b.map_err(|_| ScenarioError::Thread("target thread panicked".into()))?;

    if let Some(violation) = domain_a.fault().or(domain_b.fault()) {
        return Err(ScenarioError::Fault(violation));
    }
    if timed_out {
        return Err(ScenarioError::Timeout {
            ticks: sink.snapshot().a_ticks,
        });
    }

    // Domain B may still be a tick away from idle when it is stopped.
    let mut settle = 0;
    while !(domain_a.is_finished() && domain_b.is_finished()) {
        if settle == SETTLE_TICKS {
            return Err(ScenarioError::Timeout {
                ticks: sink.snapshot().a_ticks,
            });
        }
        domain_a.tick();
        domain_b.tick();
        settle += 1;
    }
    debug!(settle, "threaded scenario settled");

    let responses: Vec<Completion> = done_rx.try_iter().collect();
    let changes = idle_register_changes(&mut domain_a, &mut domain_b, config.idle_ticks);
    Ok(finish_report(
        config, domain_a, domain_b, &sink, responses, expected, changes,
    ))
}
