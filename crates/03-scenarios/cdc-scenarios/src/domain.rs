//! One crossing half together with the bus participant on its side.

use cdc_skid::{Completion, DomainEngine, InitiatorPort, ProtocolViolation, TargetPort};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::trace;

use crate::requester::{Requester, Step};
use crate::responder::{Bram, Monitor, Responder};
use crate::stats::{StatEvent, StatsSink};

/// Domain A: the initiator port driven by a scripted requester.
pub struct InitiatorDomain<S> {
    port: InitiatorPort,
    requester: Requester,
    sink: S,
    feed: Option<Receiver<Step>>,
    outbox: Option<Sender<Completion>>,
}

impl<S: StatsSink> InitiatorDomain<S> {
    pub fn new(port: InitiatorPort, requester: Requester, sink: S) -> Self {
        Self {
            port,
            requester,
            sink,
            feed: None,
            outbox: None,
        }
    }

    /// Pulls further script steps from `feed` until its sender hangs up.
    pub fn with_feed(mut self, feed: Receiver<Step>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Forwards every delivered completion to `outbox`.
    pub fn with_outbox(mut self, outbox: Sender<Completion>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn port(&self) -> &InitiatorPort {
        &self.port
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn fault(&self) -> Option<ProtocolViolation> {
        self.port.fault()
    }

    /// Script and feed exhausted, every response delivered, port idle.
    pub fn is_finished(&self) -> bool {
        self.feed.is_none() && self.requester.is_done() && self.port.is_idle()
    }

    /// One domain-A tick. Returns the number of bus events it produced.
    pub fn tick(&mut self) -> usize {
        self.pull_feed();

        let issued = self.requester.issued().len();
        let stalls = self.requester.stalls();
        let pins = self.requester.drive();
        let out = self.port.tick(&pins);
        let completion = self.requester.observe(&pins, out);

        let mut events = Vec::with_capacity(5);
        events.push(StatEvent::TickA);
        events.push(StatEvent::Occupancy(self.port.occupancy()));
        let mut work = 0;
        if self.requester.issued().len() > issued {
            events.push(StatEvent::Issued);
            work += 1;
        }
        if self.requester.stalls() > stalls {
            events.push(StatEvent::UpstreamStall);
        }
        if let Some(completion) = completion {
            events.push(StatEvent::Response(completion.status));
            work += 1;
            if let Some(outbox) = &self.outbox {
                if outbox.send(completion).is_err() {
                    trace!("completion receiver dropped");
                    self.outbox = None;
                }
            }
        }
        self.sink.record_all(&events);
        work
    }

    fn pull_feed(&mut self) {
        let Some(feed) = &self.feed else {
            return;
        };
        loop {
            match feed.try_recv() {
                Ok(step) => self.requester.push(step),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.feed = None;
                    return;
                }
            }
        }
    }

    pub fn into_parts(self) -> (InitiatorPort, Requester) {
        (self.port, self.requester)
    }
}

impl<S: StatsSink> DomainEngine for InitiatorDomain<S> {
    fn poll(&mut self) -> usize {
        self.tick()
    }

    fn name(&self) -> &'static str {
        "initiator"
    }

    fn is_done(&self) -> bool {
        self.is_finished() || self.fault().is_some()
    }
}

/// Domain B: the target port in front of a monitored memory responder.
pub struct TargetDomain<S> {
    port: TargetPort,
    responder: Monitor<Bram>,
    sink: S,
}

impl<S: StatsSink> TargetDomain<S> {
    pub fn new(port: TargetPort, responder: Monitor<Bram>, sink: S) -> Self {
        Self {
            port,
            responder,
            sink,
        }
    }

    pub fn port(&self) -> &TargetPort {
        &self.port
    }

    pub fn responder(&self) -> &Monitor<Bram> {
        &self.responder
    }

    pub fn fault(&self) -> Option<ProtocolViolation> {
        self.port.fault()
    }

    pub fn is_finished(&self) -> bool {
        self.responder.is_quiet() && self.port.is_idle()
    }

    /// One domain-B tick. Returns the number of bus events it produced.
    pub fn tick(&mut self) -> usize {
        let presented = self.port.outputs();
        let stalls = self.responder.stalls();
        let reply = self.responder.respond(&presented);
        self.port.tick(&reply);

        let mut events = Vec::with_capacity(4);
        events.push(StatEvent::TickB);
        events.push(StatEvent::Outstanding(self.port.outstanding()));
        let mut work = reply.completion_count() as usize;
        if presented.cancel {
            events.push(StatEvent::Token);
            work += 1;
        }
        if self.responder.stalls() > stalls {
            events.push(StatEvent::DownstreamStall);
        } else if presented.strobe {
            work += 1;
        }
        self.sink.record_all(&events);
        work
    }

    pub fn into_parts(self) -> (TargetPort, Monitor<Bram>) {
        (self.port, self.responder)
    }
}

impl<S: StatsSink> DomainEngine for TargetDomain<S> {
    fn poll(&mut self) -> usize {
        self.tick()
    }

    fn name(&self) -> &'static str {
        "target"
    }
}

/// Ticks both domains `ticks` times with nothing to do and counts the ticks
/// on which any register changed.
pub fn idle_register_changes<S: StatsSink>(
    initiator: &mut InitiatorDomain<S>,
    target: &mut TargetDomain<S>,
    ticks: u32,
) -> u32 {
    let mut a_regs = initiator.port.registers();
    let mut b_regs = target.port.registers();
    let mut changes = 0;
    for _ in 0..ticks {
        initiator.tick();
        target.tick();
        let a_now = initiator.port.registers();
        let b_now = target.port.registers();
        if a_now != a_regs || b_now != b_regs {
            changes += 1;
        }
        a_regs = a_now;
        b_regs = b_now;
    }
    changes
}
