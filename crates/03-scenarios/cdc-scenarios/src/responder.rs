//! Downstream responders used as crossing targets.

use std::collections::{HashMap, VecDeque};

use cdc_skid::{Completion, RequestPins, ResponsePins, Transaction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Target-side bus participant, ticked once per domain-B edge.
pub trait Responder: Send {
    /// Samples the pins the crossing presents and drives the reply for this
    /// tick. A completion may only answer a request accepted on an earlier
    /// tick.
    fn respond(&mut self, presented: &RequestPins) -> ResponsePins;

    /// No accepted request is awaiting completion.
    fn is_quiet(&self) -> bool;
}

/// When a responder refuses the presented request.
#[derive(Clone, Debug)]
pub enum StallSchedule {
    Never,
    Random { probability: f64, rng: StdRng },
    Pattern { pattern: Vec<bool>, cursor: usize },
}

impl StallSchedule {
    pub fn random(probability: f64, seed: u64) -> Self {
        StallSchedule::Random {
            probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Replays `pattern` cyclically; an empty pattern never stalls.
    pub fn pattern(pattern: Vec<bool>) -> Self {
        StallSchedule::Pattern { pattern, cursor: 0 }
    }

    fn next_stall(&mut self) -> bool {
        match self {
            StallSchedule::Never => false,
            StallSchedule::Random { probability, rng } => rng.gen_bool(*probability),
            StallSchedule::Pattern { pattern, cursor } => {
                if pattern.is_empty() {
                    return false;
                }
                let stall = pattern[*cursor % pattern.len()];
                *cursor += 1;
                stall
            }
        }
    }
}

/// Fixed-latency word memory.
///
/// Unwritten words read back as their own address. Writes honour byte
/// selects and complete with zero data. Accesses beyond `size` words complete
/// with an error.
#[derive(Clone, Debug)]
pub struct Bram {
    memory: HashMap<u64, u64>,
    size: Option<u64>,
    latency: u32,
    now: u64,
    pipeline: VecDeque<(u64, Completion)>,
    stall: StallSchedule,
}

impl Bram {
    pub fn new(latency: u32) -> Self {
        Self {
            memory: HashMap::new(),
            size: None,
            latency: latency.max(1),
            now: 0,
            pipeline: VecDeque::new(),
            stall: StallSchedule::Never,
        }
    }

    pub fn with_size(mut self, words: u64) -> Self {
        self.size = Some(words);
        self
    }

    pub fn with_stalls(mut self, stall: StallSchedule) -> Self {
        self.stall = stall;
        self
    }

    pub fn read_word(&self, address: u64) -> u64 {
        self.memory.get(&address).copied().unwrap_or(address)
    }

    /// Performs `request` against memory immediately, bypassing the pipeline.
    pub fn access(&mut self, request: &Transaction) -> Completion {
        if matches!(self.size, Some(words) if request.address >= words) {
            return Completion::error().with_tag(request.tag_data);
        }
        let completion = if request.write {
            let lanes = lane_mask(request.byte_select);
            let word = self.read_word(request.address);
            self.memory
                .insert(request.address, (word & !lanes) | (request.data & lanes));
            Completion::ok(0)
        } else {
            Completion::ok(self.read_word(request.address))
        };
        completion.with_tag(request.tag_data)
    }
}

impl Responder for Bram {
    fn respond(&mut self, presented: &RequestPins) -> ResponsePins {
        self.now += 1;
        let mut reply = ResponsePins::ready();
        if matches!(self.pipeline.front(), Some(&(due, _)) if due <= self.now) {
            if let Some((_, completion)) = self.pipeline.pop_front() {
                reply = ResponsePins::complete(completion);
            }
        }

        let stall = self.stall.next_stall();
        if presented.strobe && !stall {
            let completion = self.access(&presented.request);
            self.pipeline
                .push_back((self.now + self.latency as u64, completion));
        }
        reply.with_stall(stall)
    }

    fn is_quiet(&self) -> bool {
        self.pipeline.is_empty()
    }
}

fn lane_mask(byte_select: u8) -> u64 {
    (0..8)
        .filter(|lane| byte_select & (1 << lane) != 0)
        .fold(0, |mask, lane| mask | 0xFF << (lane * 8))
}

/// What a bus monitor saw on the downstream bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Accepted(Transaction),
    Completed(Completion),
    Token,
}

/// Passive observer wrapped around a responder.
#[derive(Clone, Debug)]
pub struct Monitor<R> {
    inner: R,
    events: Vec<BusEvent>,
    stalls: u64,
    outstanding: u32,
    max_outstanding: u32,
    protocol_errors: u32,
}

impl<R: Responder> Monitor<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            events: Vec::new(),
            stalls: 0,
            outstanding: 0,
            max_outstanding: 0,
            protocol_errors: 0,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<BusEvent> {
        self.events
    }

    /// Ticks on which the presented request was refused.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn max_outstanding(&self) -> u32 {
        self.max_outstanding
    }

    /// Strobes outside an open group, or cancel with the group still open.
    pub fn protocol_errors(&self) -> u32 {
        self.protocol_errors
    }

    pub fn tokens(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, BusEvent::Token))
            .count()
    }
}

impl<R: Responder> Responder for Monitor<R> {
    fn respond(&mut self, presented: &RequestPins) -> ResponsePins {
        if presented.cancel {
            if presented.active {
                self.protocol_errors += 1;
            }
            self.events.push(BusEvent::Token);
        }
        if presented.strobe && !presented.active {
            self.protocol_errors += 1;
        }

        let reply = self.inner.respond(presented);
        if let Some(completion) = reply.completion() {
            self.events.push(BusEvent::Completed(completion));
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        if presented.strobe {
            if reply.stall {
                self.stalls += 1;
            } else {
                self.events.push(BusEvent::Accepted(presented.request));
                self.outstanding += 1;
                self.max_outstanding = self.max_outstanding.max(self.outstanding);
            }
        }
        reply
    }

    fn is_quiet(&self) -> bool {
        self.inner.is_quiet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bram_merges_byte_lanes() {
        let mut bram = Bram::new(1);
        bram.access(&Transaction::write(4, 0x1122_3344));
        bram.access(&Transaction::write(4, 0xAAAA_AAAA).with_byte_select(0b0010));
        assert_eq!(bram.read_word(4), 0x1122_AA44);
        assert_eq!(bram.read_word(5), 5, "unwritten word reads as its address");
        assert_eq!(bram.access(&Transaction::read(4)), Completion::ok(0x1122_AA44));
    }

    #[test]
    fn bram_errors_beyond_its_size() {
        let mut bram = Bram::new(1).with_size(16);
        assert_eq!(bram.access(&Transaction::read(15)).status, cdc_skid::Status::Ok);
        assert_eq!(
            bram.access(&Transaction::read(16).with_tags(3, 0, 0)),
            Completion::error().with_tag(3)
        );
    }

    #[test]
    fn bram_completes_after_latency() {
        let mut bram = Bram::new(3);
        let strobe = RequestPins::strobe(Transaction::read(9));
        assert!(!bram.respond(&strobe).stall);
        let idle = RequestPins::open();
        assert_eq!(bram.respond(&idle).completion(), None);
        assert_eq!(bram.respond(&idle).completion(), None);
        assert!(!bram.is_quiet());
        assert_eq!(bram.respond(&idle).completion(), Some(Completion::ok(9)));
        assert!(bram.is_quiet());
    }

    #[test]
    fn pattern_schedule_cycles() {
        let mut schedule = StallSchedule::pattern(vec![true, false, false]);
        let seen: Vec<bool> = (0..6).map(|_| schedule.next_stall()).collect();
        assert_eq!(seen, vec![true, false, false, true, false, false]);
        assert!(!StallSchedule::pattern(Vec::new()).next_stall());
    }

    #[test]
    fn monitor_logs_accepts_completions_and_tokens() {
        let bram = Bram::new(1).with_stalls(StallSchedule::pattern(vec![true, false]));
        let mut monitor = Monitor::new(bram);
        let strobe = RequestPins::strobe(Transaction::read(2));

        assert!(monitor.respond(&strobe).stall);
        assert!(!monitor.respond(&strobe).stall);
        monitor.respond(&RequestPins::open());
        monitor.respond(&RequestPins {
            cancel: true,
            ..RequestPins::idle()
        });

        assert_eq!(
            monitor.events(),
            &[
                BusEvent::Accepted(Transaction::read(2)),
                BusEvent::Completed(Completion::ok(2)),
                BusEvent::Token,
            ]
        );
        assert_eq!(monitor.stalls(), 1);
        assert_eq!(monitor.max_outstanding(), 1);
        assert_eq!(monitor.protocol_errors(), 0);
    }
}
