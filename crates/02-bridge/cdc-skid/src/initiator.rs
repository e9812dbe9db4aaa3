//! Initiator-facing half of the crossing (domain A).
//!
//! Accepts requests from the upstream requester into the slot ring, retires
//! replies in issue order and owns the cancellation state machine. Every
//! public method runs on domain A only.

use cdc_ring::{Retired, RingWriter};
use smallvec::SmallVec;
use tracing::{error, trace, warn};

use crate::bus::{Completion, Entry, Reply, RequestPins, ResponsePins, Status, Transaction};
use crate::cancel::{CancelPropagator, CancelState};
use crate::config::CdcConfig;
use crate::error::{ProtocolViolation, SkidError, SkidResult};

/// Outcome of offering one request to the crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// The request owns a slot and will produce exactly one response.
    Accepted,
    /// No slot is free; nothing changed, retry on a later tick.
    Stalled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitiatorStats {
    pub accepted: u64,
    pub stalled: u64,
    pub retired: u64,
    pub violations: u32,
    pub max_occupancy: u32,
}

pub struct InitiatorPort {
    config: CdcConfig,
    ring: RingWriter<Entry, Reply>,
    cancel: CancelPropagator,
    outputs: ResponsePins,
    held: Option<Transaction>,
    group_active: bool,
    /// Last accepted request asked the target to keep the bus.
    lock_held: bool,
    release_owed: bool,
    releases_in_ring: u32,
    fault: Option<ProtocolViolation>,
    stats: InitiatorStats,
}

impl InitiatorPort {
    pub(crate) fn new(config: CdcConfig, ring: RingWriter<Entry, Reply>) -> Self {
        Self {
            config,
            ring,
            cancel: CancelPropagator::new(),
            outputs: ResponsePins::ready(),
            held: None,
            group_active: false,
            lock_held: false,
            release_owed: false,
            releases_in_ring: 0,
            fault: None,
            stats: InitiatorStats::default(),
        }
    }

    pub fn config(&self) -> &CdcConfig {
        &self.config
    }

    /// Accepted requests and control entries not yet retired.
    pub fn occupancy(&self) -> u32 {
        self.ring.occupancy()
    }

    pub fn cancel_state(&self) -> CancelState {
        self.cancel.state()
    }

    pub fn groups_cancelled(&self) -> u32 {
        self.cancel.groups_cancelled()
    }

    pub fn stats(&self) -> InitiatorStats {
        self.stats
    }

    /// Registered response pins as driven toward the upstream requester.
    pub fn outputs(&self) -> ResponsePins {
        self.outputs
    }

    /// Latched violation, strict mode only.
    pub fn fault(&self) -> Option<ProtocolViolation> {
        self.fault
    }

    pub fn check(&self) -> SkidResult<()> {
        match self.fault {
            Some(violation) => Err(SkidError::Protocol(violation)),
            None => Ok(()),
        }
    }

    /// Whether a request offered now would be refused.
    pub fn is_stalled(&self) -> bool {
        self.fault.is_some() || self.cancel.blocks_requests() || self.ring.is_full()
    }

    /// Nothing in flight and no synchronizer about to change.
    pub fn is_idle(&self) -> bool {
        self.ring.is_empty()
            && !self.release_owed
            && self.cancel.state() == CancelState::Normal
            && self.outputs.completion_count() == 0
            && self.ring.is_settled()
    }

    /// Offers `request` to the forward channel.
    pub fn enqueue(&mut self, request: Transaction) -> Enqueue {
        if self.is_stalled() {
            self.stats.stalled += 1;
            self.outputs.stall = true;
            return Enqueue::Stalled;
        }

        let request = self.config.mask_transaction(&request);
        let outcome = match self.ring.try_push(Entry::Request(request)) {
            Ok(()) => {
                self.lock_held = request.lock;
                self.stats.accepted += 1;
                self.stats.max_occupancy = self.stats.max_occupancy.max(self.ring.occupancy());
                trace!(
                    cursor = self.ring.write_cursor().wrapping_sub(1),
                    address = request.address,
                    write = request.write,
                    "request enqueued"
                );
                Enqueue::Accepted
            }
            Err(_) => {
                self.stats.stalled += 1;
                Enqueue::Stalled
            }
        };
        self.outputs.stall = self.is_stalled();
        outcome
    }

    /// Abandons the current group. Requests already accepted still complete;
    /// a cancellation token follows them through the ring.
    pub fn cancel_group(&mut self) {
        self.close_group();
        self.push_owed();
        self.outputs.stall = self.is_stalled();
    }

    /// One domain-A tick without upstream pins: samples the backward
    /// synchronizers and retires at most one response.
    pub fn poll_response(&mut self) -> Option<Completion> {
        if self.fault.is_some() {
            return None;
        }
        let completion = self.retire_one();
        self.push_owed();
        self.outputs.stall = self.is_stalled();
        completion
    }

    /// Task-level drain: samples the backward synchronizers once and retires
    /// up to `max` responses in issue order. The response pins carry the last
    /// one retired.
    pub fn drain_responses(&mut self, max: usize) -> SmallVec<[Completion; 8]> {
        let mut drained = SmallVec::new();
        if self.fault.is_some() {
            return drained;
        }
        self.cancel.settle();
        self.ring.sample();
        while drained.len() < max && self.ring.front_ready() {
            if let Some(completion) = self.retire_ready() {
                drained.push(completion);
            }
        }
        self.drive_response(drained.last().copied());
        self.push_owed();
        self.outputs.stall = self.is_stalled();
        drained
    }

    /// One domain-A clock edge with the upstream requester's pins sampled.
    /// Returns the registered response pins for the next tick.
    pub fn tick(&mut self, input: &RequestPins) -> ResponsePins {
        if self.fault.is_some() {
            return self.outputs;
        }
        let was_stalled = self.outputs.stall;
        self.retire_one();
        self.apply_input(input, was_stalled);
        self.push_owed();
        self.outputs.stall = self.is_stalled();
        self.outputs
    }

    /// Register-level view used to check quiescence.
    pub fn registers(&self) -> Vec<u64> {
        let mut regs: Vec<u64> = self.ring.registers().into_iter().map(u64::from).collect();
        regs.push(self.cancel.state() as u64);
        regs.extend([
            self.outputs.stall as u64,
            self.outputs.ack as u64,
            self.outputs.err as u64,
            self.outputs.retry as u64,
            self.outputs.data,
            self.outputs.tag_data,
            self.held.is_some() as u64,
            self.group_active as u64,
            self.lock_held as u64,
            self.fault.is_some() as u64,
        ]);
        regs
    }

    fn retire_one(&mut self) -> Option<Completion> {
        self.cancel.settle();
        self.ring.sample();
        let completion = self.retire_ready();
        self.drive_response(completion);
        completion
    }

    /// Retires the oldest slot if its reply has arrived. Tokens are consumed
    /// without producing a completion.
    fn retire_ready(&mut self) -> Option<Completion> {
        match self.ring.retire() {
            Some(Retired {
                reply: Reply::Completion(completion),
                ..
            }) => {
                self.stats.retired += 1;
                trace!(
                    cursor = self.ring.retire_cursor().wrapping_sub(1),
                    status = ?completion.status,
                    "response retired"
                );
                Some(completion)
            }
            Some(Retired {
                request,
                reply: Reply::CancelAck,
            }) => {
                debug_assert_eq!(request, Entry::Cancel);
                self.cancel.token_acknowledged();
                None
            }
            Some(Retired {
                request,
                reply: Reply::Released,
            }) => {
                debug_assert_eq!(request, Entry::Release);
                self.releases_in_ring = self.releases_in_ring.saturating_sub(1);
                None
            }
            None => None,
        }
    }

    fn drive_response(&mut self, completion: Option<Completion>) {
        let status = completion.map(|c| c.status);
        self.outputs.ack = status == Some(Status::Ok);
        self.outputs.err = status == Some(Status::Error);
        self.outputs.retry = status == Some(Status::Retry);
        match completion {
            Some(completion) => {
                self.outputs.data = completion.data;
                self.outputs.tag_data = completion.tag_data;
            }
            None if self.config.low_power => {
                self.outputs.data = 0;
                self.outputs.tag_data = 0;
            }
            None => {}
        }
    }

    fn apply_input(&mut self, input: &RequestPins, was_stalled: bool) {
        let closing = self.group_active && (!input.active || input.cancel);
        self.group_active = input.active && !input.cancel;
        if closing {
            self.close_group();
        }

        if !input.strobe {
            self.held = None;
            return;
        }
        if !self.group_active {
            self.violation(ProtocolViolation::StrobeOutsideGroup);
            return;
        }

        if was_stalled {
            if let Some(held) = self.held {
                if held != input.request {
                    self.violation(ProtocolViolation::RequestChangedWhileStalled);
                    return;
                }
            }
            self.held = Some(input.request);
            self.stats.stalled += 1;
            return;
        }

        self.held = None;
        let outcome = self.enqueue(input.request);
        debug_assert_eq!(
            outcome,
            Enqueue::Accepted,
            "request refused although stall was low"
        );
    }

    /// Ends the current group. Unretired requests turn the close into a
    /// cancellation; a clean close after a locked request owes a release.
    fn close_group(&mut self) {
        let outstanding = self.ring.occupancy() - self.releases_in_ring;
        self.cancel.group_closed(outstanding);
        if outstanding == 0 && self.lock_held {
            self.release_owed = true;
        }
        self.lock_held = false;
    }

    /// Pushes any control entry the ring is owed.
    fn push_owed(&mut self) {
        if self.cancel.wants_token() && self.ring.try_push(Entry::Cancel).is_ok() {
            self.cancel.token_enqueued();
        }
        if self.release_owed && self.ring.try_push(Entry::Release).is_ok() {
            trace!("lock release enqueued");
            self.release_owed = false;
            self.releases_in_ring += 1;
        }
    }

    fn violation(&mut self, violation: ProtocolViolation) {
        self.stats.violations += 1;
        if self.config.strict {
            error!(%violation, "initiator side faulted");
            self.fault = Some(violation);
            self.outputs.stall = true;
        } else {
            warn!(%violation, "dropping offending request");
            self.held = None;
        }
    }
}
