//! Post-run checks over a [`ScenarioReport`].

use cdc_skid::Transaction;

use crate::engine::ScenarioReport;
use crate::responder::{Bram, BusEvent};

pub type CheckResult = Result<(), String>;

/// Downstream sees requests in issue order and the requester gets the
/// responses an in-order memory would give.
pub fn verify_order(report: &ScenarioReport) -> CheckResult {
    let crossing = &report.config.crossing;
    let masked: Vec<Transaction> = report
        .issued
        .iter()
        .map(|request| crossing.mask_transaction(request))
        .collect();
    let forwarded = accepted(&report.downstream);
    if let Some(idx) = first_mismatch(&forwarded, &masked) {
        return Err(format!(
            "downstream request {idx} was {:?}, expected {:?}",
            forwarded.get(idx),
            masked.get(idx)
        ));
    }

    let mut model = Bram::new(1);
    for (idx, (request, got)) in masked.iter().zip(&report.responses).enumerate() {
        let want = crossing.mask_completion(&model.access(request));
        if want != *got {
            return Err(format!("response {idx} was {got:?}, expected {want:?}"));
        }
    }
    Ok(())
}

/// Every accepted request produced exactly one response.
pub fn verify_no_loss(report: &ScenarioReport) -> CheckResult {
    let issued = report.issued.len();
    let forwarded = accepted(&report.downstream).len();
    let completed = report
        .downstream
        .iter()
        .filter(|event| matches!(event, BusEvent::Completed(_)))
        .count();
    if forwarded != issued {
        return Err(format!("{issued} issued but {forwarded} forwarded"));
    }
    if completed != forwarded {
        return Err(format!("{forwarded} forwarded but {completed} completed"));
    }
    if report.responses.len() != issued {
        return Err(format!(
            "{issued} issued but {} responses delivered",
            report.responses.len()
        ));
    }
    if report.stats.responses() != issued as u64 {
        return Err(format!(
            "stats counted {} responses for {issued} requests",
            report.stats.responses()
        ));
    }
    Ok(())
}

/// Neither the ring nor the downstream bus ever held more than `depth`
/// transactions.
pub fn verify_credit_bound(report: &ScenarioReport) -> CheckResult {
    let depth = report.config.crossing.depth;
    if report.stats.max_occupancy > depth {
        return Err(format!(
            "ring occupancy reached {} with depth {depth}",
            report.stats.max_occupancy
        ));
    }
    if report.stats.max_outstanding > depth {
        return Err(format!(
            "credit allowed {} outstanding with depth {depth}",
            report.stats.max_outstanding
        ));
    }

    let mut outstanding = 0u32;
    for (idx, event) in report.downstream.iter().enumerate() {
        match event {
            BusEvent::Accepted(_) => {
                outstanding += 1;
                if outstanding > depth {
                    return Err(format!(
                        "event {idx}: {outstanding} outstanding downstream with depth {depth}"
                    ));
                }
            }
            BusEvent::Completed(_) => {
                outstanding = outstanding
                    .checked_sub(1)
                    .ok_or_else(|| format!("event {idx}: completion with nothing outstanding"))?;
            }
            BusEvent::Token => {}
        }
    }
    Ok(())
}

/// One token per abandoned group, each issued only once the group's
/// in-flight requests have completed.
pub fn verify_cancellation(report: &ScenarioReport) -> CheckResult {
    let mut outstanding = 0i64;
    let mut tokens = 0u32;
    for (idx, event) in report.downstream.iter().enumerate() {
        match event {
            BusEvent::Accepted(_) => outstanding += 1,
            BusEvent::Completed(_) => outstanding -= 1,
            BusEvent::Token => {
                if outstanding != 0 {
                    return Err(format!(
                        "event {idx}: token sent with {outstanding} requests in flight"
                    ));
                }
                tokens += 1;
            }
        }
    }
    if tokens != report.groups_cancelled {
        return Err(format!(
            "{tokens} tokens downstream but {} groups cancelled upstream",
            report.groups_cancelled
        ));
    }
    if tokens != report.expected_cancellations {
        return Err(format!(
            "{tokens} tokens downstream, expected {}",
            report.expected_cancellations
        ));
    }
    Ok(())
}

/// No register toggled while both domains had nothing to do.
pub fn verify_idle_quiescence(report: &ScenarioReport) -> CheckResult {
    match report.idle_register_changes {
        0 => Ok(()),
        n => Err(format!("registers changed on {n} idle ticks")),
    }
}

/// Neither side of the crossing saw or produced a handshake violation.
pub fn verify_protocol(report: &ScenarioReport) -> CheckResult {
    if report.downstream_protocol_errors > 0 {
        return Err(format!(
            "crossing broke the downstream handshake {} times",
            report.downstream_protocol_errors
        ));
    }
    if report.stats.violations > 0 {
        return Err(format!(
            "crossing flagged {} violations",
            report.stats.violations
        ));
    }
    Ok(())
}

/// Runs every check, in a fixed order.
pub fn verify_report(report: &ScenarioReport) -> Vec<(&'static str, CheckResult)> {
    vec![
        ("order", verify_order(report)),
        ("no-loss", verify_no_loss(report)),
        ("credit-bound", verify_credit_bound(report)),
        ("cancellation", verify_cancellation(report)),
        ("idle-quiescence", verify_idle_quiescence(report)),
        ("protocol", verify_protocol(report)),
    ]
}

fn accepted(events: &[BusEvent]) -> Vec<Transaction> {
    events
        .iter()
        .filter_map(|event| match event {
            BusEvent::Accepted(request) => Some(*request),
            _ => None,
        })
        .collect()
}

fn first_mismatch(left: &[Transaction], right: &[Transaction]) -> Option<usize> {
    let common = left.len().min(right.len());
    (0..common)
        .find(|&idx| left[idx] != right[idx])
        .or((left.len() != right.len()).then_some(common))
}
