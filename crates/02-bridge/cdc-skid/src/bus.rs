//! Pipelined request/response bus contract shared by both sides of the crossing.
//!
//! A requester drives [`RequestPins`] and samples [`ResponsePins`]; a responder
//! does the reverse. The crossing's initiator side is a responder toward its
//! upstream requester and its target side is a requester toward the
//! downstream responder, so the same two pin bundles describe both domains.

use serde::{Deserialize, Serialize};

/// One bus transaction. Immutable once accepted by the crossing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub address: u64,
    pub data: u64,
    /// One bit per byte lane of `data`.
    pub byte_select: u8,
    pub tag_data: u64,
    pub tag_address: u64,
    pub tag_cycle: u64,
    pub write: bool,
    /// Keeps the downstream group open between transactions.
    pub lock: bool,
    /// Cycle type identifier (3 bits).
    pub burst_type: u8,
    /// Burst type extension (2 bits).
    pub burst_extension: u8,
}

impl Transaction {
    /// Full-width read of `address`.
    pub fn read(address: u64) -> Self {
        Self {
            address,
            byte_select: u8::MAX,
            ..Self::default()
        }
    }

    /// Full-width write of `data` to `address`.
    pub fn write(address: u64, data: u64) -> Self {
        Self {
            address,
            data,
            byte_select: u8::MAX,
            write: true,
            ..Self::default()
        }
    }

    pub fn with_byte_select(mut self, byte_select: u8) -> Self {
        self.byte_select = byte_select;
        self
    }

    pub fn with_tags(mut self, tag_data: u64, tag_address: u64, tag_cycle: u64) -> Self {
        self.tag_data = tag_data;
        self.tag_address = tag_address;
        self.tag_cycle = tag_cycle;
        self
    }

    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_burst(mut self, burst_type: u8, burst_extension: u8) -> Self {
        self.burst_type = burst_type;
        self.burst_extension = burst_extension;
        self
    }
}

/// Terminal status of one completed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error,
    Retry,
}

/// Response to one request, passed through the crossing untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Completion {
    pub status: Status,
    pub data: u64,
    pub tag_data: u64,
}

impl Completion {
    pub fn ok(data: u64) -> Self {
        Self {
            status: Status::Ok,
            data,
            tag_data: 0,
        }
    }

    pub fn error() -> Self {
        Self {
            status: Status::Error,
            data: 0,
            tag_data: 0,
        }
    }

    pub fn retry() -> Self {
        Self {
            status: Status::Retry,
            data: 0,
            tag_data: 0,
        }
    }

    pub fn with_tag(mut self, tag_data: u64) -> Self {
        self.tag_data = tag_data;
        self
    }
}

/// Signals driven by a requester for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequestPins {
    /// Group open.
    pub active: bool,
    /// This tick carries a request.
    pub strobe: bool,
    pub request: Transaction,
    /// Group terminated by a cancellation token. Only asserted together with
    /// `active == false`.
    pub cancel: bool,
}

impl RequestPins {
    /// Group closed, nothing strobed.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Group open, nothing strobed this tick.
    pub fn open() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    /// Group open and `request` strobed this tick.
    pub fn strobe(request: Transaction) -> Self {
        Self {
            active: true,
            strobe: true,
            request,
            cancel: false,
        }
    }
}

/// Signals driven by a responder for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResponsePins {
    /// The responder cannot accept a request this tick.
    pub stall: bool,
    pub ack: bool,
    pub err: bool,
    pub retry: bool,
    pub data: u64,
    pub tag_data: u64,
}

impl ResponsePins {
    /// Ready, no completion.
    pub fn ready() -> Self {
        Self::default()
    }

    /// Drives `completion` on the response pins.
    pub fn complete(completion: Completion) -> Self {
        let mut pins = Self {
            data: completion.data,
            tag_data: completion.tag_data,
            ..Self::default()
        };
        match completion.status {
            Status::Ok => pins.ack = true,
            Status::Error => pins.err = true,
            Status::Retry => pins.retry = true,
        }
        pins
    }

    pub fn with_stall(mut self, stall: bool) -> Self {
        self.stall = stall;
        self
    }

    /// Number of completion strobes asserted; anything above one is ambiguous.
    pub fn completion_count(&self) -> u32 {
        self.ack as u32 + self.err as u32 + self.retry as u32
    }

    /// Decodes the completion carried this tick, if exactly one status is set.
    pub fn completion(&self) -> Option<Completion> {
        let status = match (self.ack, self.err, self.retry) {
            (true, false, false) => Status::Ok,
            (false, true, false) => Status::Error,
            (false, false, true) => Status::Retry,
            _ => return None,
        };
        Some(Completion {
            status,
            data: self.data,
            tag_data: self.tag_data,
        })
    }
}

/// Ring resident travelling from domain A to domain B.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    Request(Transaction),
    /// Sentinel closing the current group after an abnormal termination.
    Cancel,
    /// A locked group closed normally; the target may release the bus.
    Release,
}

/// Ring resident travelling back from domain B to domain A.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Completion(Completion),
    /// The target side closed the group downstream.
    CancelAck,
    /// The target side dropped the lock it was holding.
    Released,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_pins_round_trip_each_status() {
        for completion in [
            Completion::ok(0xAB).with_tag(3),
            Completion::error(),
            Completion::retry(),
        ] {
            let pins = ResponsePins::complete(completion);
            assert_eq!(pins.completion_count(), 1);
            assert_eq!(pins.completion(), Some(completion));
        }
    }

    #[test]
    fn conflicting_status_bits_decode_to_nothing() {
        let pins = ResponsePins {
            ack: true,
            err: true,
            ..ResponsePins::default()
        };
        assert_eq!(pins.completion_count(), 2);
        assert_eq!(pins.completion(), None);
        assert_eq!(ResponsePins::ready().completion(), None);
    }
}
