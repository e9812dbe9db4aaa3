//! Upstream requester driving domain A from a script.

use std::collections::VecDeque;

use cdc_skid::{Completion, RequestPins, ResponsePins, Transaction};

use crate::config::ScenarioKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Request(Transaction),
    /// Wait for every outstanding response, then close the group.
    Close,
    /// Drop the group at once, leaving responses outstanding.
    Abandon,
}

/// Requester honouring the registered stall: a strobe is accepted exactly when
/// the stall sampled on the previous tick was low, and a refused request is
/// held unchanged.
#[derive(Clone, Debug)]
pub struct Requester {
    script: VecDeque<Step>,
    last: ResponsePins,
    issued: Vec<Transaction>,
    responses: Vec<Completion>,
    stalls: u64,
    abandons: u32,
    abandoned: bool,
}

impl Default for Requester {
    fn default() -> Self {
        Self::new()
    }
}

impl Requester {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            last: ResponsePins::ready(),
            issued: Vec::new(),
            responses: Vec::new(),
            stalls: 0,
            abandons: 0,
            abandoned: false,
        }
    }

    pub fn with_script(steps: impl IntoIterator<Item = Step>) -> Self {
        let mut requester = Self::new();
        requester.extend(steps);
        requester
    }

    pub fn push(&mut self, step: Step) {
        self.script.push_back(step);
    }

    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.script.extend(steps);
    }

    pub fn issued(&self) -> &[Transaction] {
        &self.issued
    }

    pub fn responses(&self) -> &[Completion] {
        &self.responses
    }

    pub fn outstanding(&self) -> usize {
        self.issued.len() - self.responses.len()
    }

    /// Ticks spent holding a refused request.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn abandons(&self) -> u32 {
        self.abandons
    }

    /// Script exhausted and every issued request answered.
    pub fn is_done(&self) -> bool {
        self.script.is_empty() && self.outstanding() == 0
    }

    /// Pins to drive on the coming tick. An abandoned group stays closed
    /// while its remaining responses drain.
    pub fn drive(&self) -> RequestPins {
        let hold_open = self.outstanding() > 0 && !self.abandoned;
        match self.script.front() {
            Some(Step::Request(request)) => RequestPins::strobe(*request),
            Some(Step::Abandon) => RequestPins::idle(),
            Some(Step::Close) | None if hold_open => RequestPins::open(),
            Some(Step::Close) | None => RequestPins::idle(),
        }
    }

    /// Records the tick's outcome. `out` is what the crossing registered in
    /// response to `pins`. Returns the completion delivered this tick.
    pub fn observe(&mut self, pins: &RequestPins, out: ResponsePins) -> Option<Completion> {
        match self.script.front() {
            Some(Step::Request(_)) if pins.strobe => {
                if self.last.stall {
                    self.stalls += 1;
                } else {
                    self.issued.push(pins.request);
                    self.script.pop_front();
                    self.abandoned = false;
                }
            }
            Some(Step::Close) if !pins.active => {
                self.script.pop_front();
            }
            Some(Step::Abandon) => {
                self.abandons += 1;
                self.abandoned = true;
                self.script.pop_front();
            }
            _ => {}
        }

        let completion = out.completion();
        if let Some(completion) = completion {
            self.responses.push(completion);
        }
        self.last = out;
        completion
    }
}

/// Deterministic request mix: every third request writes, the rest read, over
/// a small address window so reads observe earlier writes.
pub fn traffic(seq: u64) -> Transaction {
    let address = seq.wrapping_mul(7) % 32;
    let request = if seq % 3 == 0 {
        Transaction::write(address, seq.wrapping_mul(0x9E37_79B9).wrapping_add(1))
    } else {
        Transaction::read(address)
    };
    request.with_tags(seq, address, seq % 4)
}

/// Builds the requester script for `kind`.
pub fn script(kind: &ScenarioKind) -> Vec<Step> {
    let mut seq = 0u64;
    let mut next = || {
        let request = traffic(seq);
        seq += 1;
        Step::Request(request)
    };
    let mut steps = Vec::new();
    match *kind {
        ScenarioKind::Flood { requests } | ScenarioKind::Backpressure { requests, .. } => {
            steps.extend((0..requests).map(|_| next()));
            steps.push(Step::Close);
        }
        ScenarioKind::Burst { bursts, burst_size } => {
            for _ in 0..bursts {
                steps.extend((0..burst_size).map(|_| next()));
                steps.push(Step::Close);
            }
        }
        ScenarioKind::Cancel {
            groups, group_size, ..
        } => {
            for _ in 0..groups {
                steps.extend((0..group_size).map(|_| next()));
                steps.push(Step::Abandon);
            }
        }
    }
    steps
}

/// Abandons that directly follow a request, each of which leaves at least
/// that request outstanding and so must produce one cancellation.
pub fn expected_cancellations(steps: &[Step]) -> u32 {
    steps
        .windows(2)
        .filter(|pair| matches!(pair, [Step::Request(_), Step::Abandon]))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_request_while_stalled() {
        let mut requester = Requester::with_script([
            Step::Request(Transaction::read(1)),
            Step::Request(Transaction::read(2)),
        ]);

        let pins = requester.drive();
        assert_eq!(pins.request.address, 1);
        requester.observe(&pins, ResponsePins::ready().with_stall(true));
        assert_eq!(requester.issued().len(), 1);

        let pins = requester.drive();
        assert_eq!(pins.request.address, 2);
        requester.observe(&pins, ResponsePins::ready());
        assert_eq!(requester.issued().len(), 1, "stall was high");
        assert_eq!(requester.stalls(), 1);

        let pins = requester.drive();
        assert_eq!(pins.request.address, 2, "held unchanged");
        requester.observe(&pins, ResponsePins::ready());
        assert_eq!(requester.issued().len(), 2);
    }

    #[test]
    fn close_waits_for_responses() {
        let mut requester =
            Requester::with_script([Step::Request(Transaction::read(1)), Step::Close]);
        let pins = requester.drive();
        requester.observe(&pins, ResponsePins::ready());

        let pins = requester.drive();
        assert!(pins.active && !pins.strobe, "group held open");
        requester.observe(&pins, ResponsePins::complete(Completion::ok(1)));

        let pins = requester.drive();
        assert!(!pins.active);
        requester.observe(&pins, ResponsePins::ready());
        assert!(requester.is_done());
    }

    #[test]
    fn abandoned_group_stays_closed_while_draining() {
        let mut requester =
            Requester::with_script([Step::Request(Transaction::read(1)), Step::Abandon]);
        let pins = requester.drive();
        requester.observe(&pins, ResponsePins::ready());

        let pins = requester.drive();
        assert!(!pins.active);
        requester.observe(&pins, ResponsePins::ready().with_stall(true));
        assert_eq!(requester.abandons(), 1);
        assert_eq!(requester.outstanding(), 1);
        assert!(!requester.drive().active, "no reopen while draining");
    }

    #[test]
    fn cancel_script_counts_expected_drops() {
        let steps = script(&ScenarioKind::Cancel {
            groups: 3,
            group_size: 2,
            stall_probability: 0.5,
        });
        assert_eq!(steps.len(), 9);
        assert_eq!(expected_cancellations(&steps), 3);
        assert_eq!(
            expected_cancellations(&script(&ScenarioKind::Flood { requests: 5 })),
            0
        );
    }
}
