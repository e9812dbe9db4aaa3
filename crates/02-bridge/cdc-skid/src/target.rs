//! Target-facing half of the crossing (domain B).
//!
//! Presents ring entries to the downstream responder one per tick, subject to
//! credit and the responder's stall, and writes completions back into the
//! slot each request came from. Completions are matched to the oldest
//! outstanding request; the downstream bus carries no reorder tags.

use cdc_ring::RingReader;
use tracing::{debug, error, trace, warn};

use crate::bus::{Completion, Entry, Reply, RequestPins, ResponsePins, Transaction};
use crate::config::CdcConfig;
use crate::credit::CreditCounter;
use crate::error::{ProtocolViolation, SkidError, SkidResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetStats {
    pub forwarded: u64,
    pub completed: u64,
    pub downstream_stalls: u64,
    pub tokens: u32,
    pub violations: u32,
    pub max_outstanding: u32,
}

pub struct TargetPort {
    config: CdcConfig,
    ring: RingReader<Entry, Reply>,
    credit: CreditCounter,
    outputs: RequestPins,
    locked: bool,
    fault: Option<ProtocolViolation>,
    stats: TargetStats,
}

impl TargetPort {
    pub(crate) fn new(config: CdcConfig, ring: RingReader<Entry, Reply>) -> Self {
        let credit = CreditCounter::new(config.depth);
        Self {
            config,
            ring,
            credit,
            outputs: RequestPins::idle(),
            locked: false,
            fault: None,
            stats: TargetStats::default(),
        }
    }

    pub fn config(&self) -> &CdcConfig {
        &self.config
    }

    /// Forwarded requests still waiting for a downstream completion.
    pub fn outstanding(&self) -> u32 {
        self.credit.outstanding()
    }

    pub fn credit(&self) -> CreditCounter {
        self.credit
    }

    pub fn stats(&self) -> TargetStats {
        self.stats
    }

    /// Registered request pins as driven toward the downstream responder.
    pub fn outputs(&self) -> RequestPins {
        self.outputs
    }

    pub fn fault(&self) -> Option<ProtocolViolation> {
        self.fault
    }

    pub fn check(&self) -> SkidResult<()> {
        match self.fault {
            Some(violation) => Err(SkidError::Protocol(violation)),
            None => Ok(()),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.outputs.strobe
            && !self.outputs.cancel
            && self.ring.in_flight() == 0
            && self.ring.peek().is_none()
            && self.ring.is_settled()
    }

    /// One domain-B clock edge with the downstream responder's pins sampled.
    /// Returns the registered request pins for the next tick.
    pub fn tick(&mut self, reply: &ResponsePins) -> RequestPins {
        if self.fault.is_some() {
            return self.outputs;
        }

        self.ring.sample();
        self.outputs.cancel = false;

        self.collect_completion(reply);
        if self.fault.is_some() {
            self.outputs.strobe = false;
            return self.outputs;
        }
        self.collect_acceptance(reply);
        self.present_next();

        debug_assert_eq!(self.credit.outstanding(), self.ring.in_flight());
        self.outputs
    }

    /// Register-level view used to check quiescence.
    pub fn registers(&self) -> Vec<u64> {
        let mut regs: Vec<u64> = self.ring.registers().into_iter().map(u64::from).collect();
        let request = &self.outputs.request;
        regs.extend([
            self.credit.available() as u64,
            self.outputs.active as u64,
            self.outputs.strobe as u64,
            self.outputs.cancel as u64,
            request.address,
            request.data,
            request.byte_select as u64,
            request.tag_data,
            request.tag_address,
            request.tag_cycle,
            request.write as u64 | (request.lock as u64) << 1,
            request.burst_type as u64 | (request.burst_extension as u64) << 8,
            self.locked as u64,
            self.fault.is_some() as u64,
        ]);
        regs
    }

    fn collect_completion(&mut self, reply: &ResponsePins) {
        let completion = match reply.completion_count() {
            0 => return,
            1 => match reply.completion() {
                Some(completion) => completion,
                None => return,
            },
            _ => {
                self.violation(ProtocolViolation::AmbiguousCompletion);
                if self.fault.is_some() || self.ring.in_flight() == 0 {
                    return;
                }
                Completion::error().with_tag(reply.tag_data)
            }
        };

        if self.ring.in_flight() == 0 {
            self.violation(ProtocolViolation::UnexpectedCompletion);
            return;
        }

        let completion = self.config.mask_completion(&completion);
        if self.ring.reply(Reply::Completion(completion)).is_err() {
            unreachable!("in-flight request vanished before its completion");
        }
        self.credit.release();
        self.stats.completed += 1;
        trace!(
            cursor = self.ring.reply_cursor().wrapping_sub(1),
            status = ?completion.status,
            "completion returned"
        );
    }

    fn collect_acceptance(&mut self, reply: &ResponsePins) {
        if !self.outputs.strobe {
            return;
        }
        if reply.stall {
            self.stats.downstream_stalls += 1;
            return;
        }

        let consumed = self.ring.advance();
        debug_assert!(consumed, "presented request missing from the ring");
        let spent = self.credit.take();
        debug_assert!(spent, "request presented without credit");

        self.locked = self.outputs.request.lock;
        self.outputs.strobe = false;
        self.stats.forwarded += 1;
        self.stats.max_outstanding = self.stats.max_outstanding.max(self.credit.outstanding());
        trace!(
            cursor = self.ring.read_cursor().wrapping_sub(1),
            address = self.outputs.request.address,
            "request forwarded"
        );
    }

    fn present_next(&mut self) {
        if !self.outputs.strobe {
            match self.ring.peek().copied() {
                Some(Entry::Request(request)) if self.credit.has_credit() => {
                    self.outputs.strobe = true;
                    self.outputs.request = request;
                }
                Some(Entry::Cancel) if self.ring.in_flight() == 0 => self.close_cancelled_group(),
                Some(Entry::Release) if self.ring.in_flight() == 0 => self.release_lock(),
                _ => {}
            }
        }

        self.outputs.active = !self.outputs.cancel
            && (self.outputs.strobe || self.ring.in_flight() > 0 || self.locked);
        if self.config.low_power && !self.outputs.strobe {
            self.outputs.request = Transaction::default();
        }
    }

    fn close_cancelled_group(&mut self) {
        let consumed = self.ring.advance();
        debug_assert!(consumed);
        if self.ring.reply(Reply::CancelAck).is_err() {
            unreachable!("token consumed but not in flight");
        }
        self.locked = false;
        self.outputs.cancel = true;
        self.stats.tokens += 1;
        debug!("cancellation token closed the downstream group");
    }

    fn release_lock(&mut self) {
        let consumed = self.ring.advance();
        debug_assert!(consumed);
        if self.ring.reply(Reply::Released).is_err() {
            unreachable!("release consumed but not in flight");
        }
        self.locked = false;
        debug!("locked group closed downstream");
    }

    fn violation(&mut self, violation: ProtocolViolation) {
        self.stats.violations += 1;
        if self.config.strict {
            error!(%violation, "target side faulted");
            self.fault = Some(violation);
        } else {
            warn!(%violation, "recovering from downstream violation");
        }
    }
}
