//! Fixed-depth slot ring split between two independently clocked halves.
//!
//! Layout:
//!
//! ```text
//!            forward wire ─────────────────────────►
//!  writer  ┌────────┬────────┬────────┬────────┐  reader
//!  (dom A) │ slot 0 │ slot 1 │  ...   │ slot N │  (dom B)
//!          │ req    │ req    │        │ req    │
//!          │ reply  │ reply  │        │ reply  │
//!          └────────┴────────┴────────┴────────┘
//!            ◄───────────────────────── backward wire
//! ```
//!
//! Every slot owns a request cell, a reply cell and a pair of [`ToggleWire`]s.
//! The [`RingWriter`] fills the request cell and flips the forward wire; the
//! [`RingReader`] fills the reply cell and flips the backward wire. A half
//! never reads a cell written by the other half before the paired wire edge
//! has passed through its own [`ToggleSync`]. Because each wire flips at most
//! once per slot round trip, no event can be lost however slow either side is.
//!
//! Cursors are wrapping `u32` counters; the slot index is `cursor % depth`.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::toggle::{ToggleSync, ToggleWire};
use crate::{RingError, RingResult};

/// Smallest ring that still allows one slot in flight while the next fills.
pub const MIN_DEPTH: u32 = 2;
/// Upper bound on slots; per-tick sampling is linear in depth.
pub const MAX_DEPTH: u32 = 4096;

/// Geometry of a slot ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of slots, i.e. the maximum number of entries in flight.
    pub depth: u32,
    /// Destination samples taken before a wire level is trusted.
    pub sync_stages: u32,
}

struct SlotCell<Req, Rsp> {
    request: UnsafeCell<Option<Req>>,
    reply: UnsafeCell<Option<Rsp>>,
    forward: ToggleWire,
    backward: ToggleWire,
}

impl<Req, Rsp> SlotCell<Req, Rsp> {
    fn new() -> Self {
        Self {
            request: UnsafeCell::new(None),
            reply: UnsafeCell::new(None),
            forward: ToggleWire::new(),
            backward: ToggleWire::new(),
        }
    }
}

struct Shared<Req, Rsp> {
    slots: Box<[SlotCell<Req, Rsp>]>,
}

// SAFETY: request cells are written only by the writer while the slot is free
// and read by the reader only after the forward edge; reply cells are written
// only by the reader before the backward flip and read by the writer only after
// that edge. The wires carry release/acquire ordering for the cell contents, so
// no cell is ever accessed from both halves at once.
unsafe impl<Req: Send, Rsp: Send> Send for Shared<Req, Rsp> {}
// SAFETY: see above; shared references never alias a cell under mutation.
unsafe impl<Req: Send, Rsp: Send> Sync for Shared<Req, Rsp> {}

/// Request and reply handed back when the writer retires its oldest slot.
#[derive(Debug, PartialEq, Eq)]
pub struct Retired<Req, Rsp> {
    pub request: Req,
    pub reply: Rsp,
}

/// Builds a ring and returns its two halves.
pub fn slot_ring<Req, Rsp>(
    config: RingConfig,
) -> RingResult<(RingWriter<Req, Rsp>, RingReader<Req, Rsp>)> {
    validate_config(&config)?;
    let RingConfig { depth, sync_stages } = config;

    let slots = (0..depth).map(|_| SlotCell::new()).collect::<Vec<_>>();
    let shared = Arc::new(Shared {
        slots: slots.into_boxed_slice(),
    });

    let syncs = |stages: u32| -> RingResult<Box<[ToggleSync]>> {
        (0..depth)
            .map(|_| ToggleSync::new(stages))
            .collect::<RingResult<Vec<_>>>()
            .map(Vec::into_boxed_slice)
    };

    let writer = RingWriter {
        shared: Arc::clone(&shared),
        depth,
        write: 0,
        retire: 0,
        filled: vec![false; depth as usize].into_boxed_slice(),
        acknowledged: vec![false; depth as usize].into_boxed_slice(),
        backward: syncs(sync_stages)?,
    };
    let reader = RingReader {
        shared,
        depth,
        read: 0,
        reply: 0,
        ready: vec![false; depth as usize].into_boxed_slice(),
        forward: syncs(sync_stages)?,
    };
    Ok((writer, reader))
}

fn validate_config(config: &RingConfig) -> RingResult<()> {
    if !(MIN_DEPTH..=MAX_DEPTH).contains(&config.depth) {
        return Err(RingError::InvalidDepth {
            requested: config.depth,
            minimum: MIN_DEPTH,
            maximum: MAX_DEPTH,
        });
    }
    ToggleSync::new(config.sync_stages)?;
    Ok(())
}

/// Domain A half: fills slots and retires them once replies come back.
pub struct RingWriter<Req, Rsp> {
    shared: Arc<Shared<Req, Rsp>>,
    depth: u32,
    write: u32,
    retire: u32,
    filled: Box<[bool]>,
    acknowledged: Box<[bool]>,
    backward: Box<[ToggleSync]>,
}

impl<Req, Rsp> RingWriter<Req, Rsp> {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Slots written but not yet retired.
    pub fn occupancy(&self) -> u32 {
        self.write.wrapping_sub(self.retire)
    }

    /// True when the next write slot is still owned by an earlier entry.
    pub fn is_full(&self) -> bool {
        self.filled[self.index(self.write)]
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn write_cursor(&self) -> u32 {
        self.write
    }

    pub fn retire_cursor(&self) -> u32 {
        self.retire
    }

    /// Writes `request` into the next slot and signals it to the reader.
    ///
    /// Hands the value back untouched when the slot is still in use.
    pub fn try_push(&mut self, request: Req) -> Result<(), Req> {
        let idx = self.index(self.write);
        if self.filled[idx] {
            return Err(request);
        }

        let cell = &self.shared.slots[idx];
        // SAFETY: `filled[idx] == false` means the previous occupant was
        // retired, which only happens after its backward edge; the reader has
        // finished with this slot and will not touch it before the flip below.
        unsafe {
            *cell.request.get() = Some(request);
        }
        self.filled[idx] = true;
        self.write = self.write.wrapping_add(1);
        cell.forward.flip();
        Ok(())
    }

    /// Advances every backward synchronizer by one tick. Returns the number of
    /// replies that became visible.
    pub fn sample(&mut self) -> u32 {
        let mut arrived = 0;
        for (idx, sync) in self.backward.iter_mut().enumerate() {
            if sync.sample(&self.shared.slots[idx].backward) {
                debug_assert!(
                    self.filled[idx] && !self.acknowledged[idx],
                    "backward edge on slot {idx} without an outstanding entry"
                );
                self.acknowledged[idx] = true;
                arrived += 1;
            }
        }
        arrived
    }

    /// True when the oldest outstanding slot has a reply waiting.
    pub fn front_ready(&self) -> bool {
        !self.is_empty() && self.acknowledged[self.index(self.retire)]
    }

    /// Borrows the reply of the oldest slot without retiring it.
    pub fn peek_reply(&self) -> Option<&Rsp> {
        if !self.front_ready() {
            return None;
        }
        let idx = self.index(self.retire);
        // SAFETY: the backward edge has been observed, so the reader wrote the
        // reply before flipping and no longer touches the slot.
        unsafe { (*self.shared.slots[idx].reply.get()).as_ref() }
    }

    /// Retires the oldest slot once its reply is visible, freeing it for reuse.
    pub fn retire(&mut self) -> Option<Retired<Req, Rsp>> {
        if !self.front_ready() {
            return None;
        }
        let idx = self.index(self.retire);
        let cell = &self.shared.slots[idx];
        // SAFETY: both handshakes for this slot are complete; only the writer
        // can reach it until the next `try_push`.
        let (request, reply) = unsafe {
            (
                (*cell.request.get()).take(),
                (*cell.reply.get()).take(),
            )
        };
        self.filled[idx] = false;
        self.acknowledged[idx] = false;
        self.retire = self.retire.wrapping_add(1);
        match (request, reply) {
            (Some(request), Some(reply)) => Some(Retired { request, reply }),
            _ => unreachable!("slot {idx} acknowledged without request/reply pair"),
        }
    }

    /// True when no synchronizer would change on the next sample.
    pub fn is_settled(&self) -> bool {
        self.backward
            .iter()
            .enumerate()
            .all(|(idx, sync)| sync.is_settled(&self.shared.slots[idx].backward))
    }

    /// Flattened register view: cursors followed by one word per slot.
    pub fn registers(&self) -> Vec<u32> {
        let mut regs = Vec::with_capacity(2 + self.depth as usize);
        regs.push(self.write);
        regs.push(self.retire);
        for idx in 0..self.depth as usize {
            regs.push(
                self.filled[idx] as u32
                    | (self.acknowledged[idx] as u32) << 1
                    | self.backward[idx].register() << 2,
            );
        }
        regs
    }

    #[inline]
    fn index(&self, cursor: u32) -> usize {
        (cursor % self.depth) as usize
    }
}

/// Domain B half: observes filled slots in order and writes replies back.
pub struct RingReader<Req, Rsp> {
    shared: Arc<Shared<Req, Rsp>>,
    depth: u32,
    read: u32,
    reply: u32,
    ready: Box<[bool]>,
    forward: Box<[ToggleSync]>,
}

impl<Req, Rsp> RingReader<Req, Rsp> {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Entries consumed but not yet answered.
    pub fn in_flight(&self) -> u32 {
        self.read.wrapping_sub(self.reply)
    }

    pub fn read_cursor(&self) -> u32 {
        self.read
    }

    pub fn reply_cursor(&self) -> u32 {
        self.reply
    }

    /// Advances every forward synchronizer by one tick. Returns the number of
    /// entries that became visible.
    pub fn sample(&mut self) -> u32 {
        let mut arrived = 0;
        for (idx, sync) in self.forward.iter_mut().enumerate() {
            if sync.sample(&self.shared.slots[idx].forward) {
                debug_assert!(!self.ready[idx], "forward edge on unconsumed slot {idx}");
                self.ready[idx] = true;
                arrived += 1;
            }
        }
        arrived
    }

    /// Borrows the next unconsumed entry once its forward edge is trusted.
    pub fn peek(&self) -> Option<&Req> {
        let idx = self.index(self.read);
        if !self.ready[idx] {
            return None;
        }
        // SAFETY: the forward edge was observed, so the writer stored the
        // request before flipping and will not touch it until it sees our
        // backward flip for this slot.
        unsafe { (*self.shared.slots[idx].request.get()).as_ref() }
    }

    /// Marks the front entry consumed. Returns false when nothing was ready.
    pub fn advance(&mut self) -> bool {
        let idx = self.index(self.read);
        if !self.ready[idx] {
            return false;
        }
        self.ready[idx] = false;
        self.read = self.read.wrapping_add(1);
        true
    }

    /// Answers the oldest consumed entry and signals the writer.
    ///
    /// Hands the reply back when no consumed entry is awaiting one.
    pub fn reply(&mut self, reply: Rsp) -> Result<(), Rsp> {
        if self.in_flight() == 0 {
            return Err(reply);
        }
        let idx = self.index(self.reply);
        let cell = &self.shared.slots[idx];
        // SAFETY: the writer does not read the reply cell before observing the
        // backward flip issued just below.
        unsafe {
            *cell.reply.get() = Some(reply);
        }
        self.reply = self.reply.wrapping_add(1);
        cell.backward.flip();
        Ok(())
    }

    /// True when no synchronizer would change on the next sample.
    pub fn is_settled(&self) -> bool {
        self.forward
            .iter()
            .enumerate()
            .all(|(idx, sync)| sync.is_settled(&self.shared.slots[idx].forward))
    }

    /// Flattened register view: cursors followed by one word per slot.
    pub fn registers(&self) -> Vec<u32> {
        let mut regs = Vec::with_capacity(2 + self.depth as usize);
        regs.push(self.read);
        regs.push(self.reply);
        for idx in 0..self.depth as usize {
            regs.push(self.ready[idx] as u32 | self.forward[idx].register() << 1);
        }
        regs
    }

    #[inline]
    fn index(&self, cursor: u32) -> usize {
        (cursor % self.depth) as usize
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    const STAGES: u32 = 2;

    fn ring(depth: u32) -> (RingWriter<u32, u32>, RingReader<u32, u32>) {
        slot_ring(RingConfig {
            depth,
            sync_stages: STAGES,
        })
        .expect("create slot ring")
    }

    fn settle(writer: &mut RingWriter<u32, u32>, reader: &mut RingReader<u32, u32>) {
        for _ in 0..STAGES {
            writer.sample();
            reader.sample();
        }
    }

    #[test]
    fn rejects_bad_geometry() {
        let err = slot_ring::<u32, u32>(RingConfig {
            depth: 1,
            sync_stages: 2,
        })
        .err();
        assert_eq!(
            err,
            Some(RingError::InvalidDepth {
                requested: 1,
                minimum: MIN_DEPTH,
                maximum: MAX_DEPTH
            })
        );
        assert!(matches!(
            slot_ring::<u32, u32>(RingConfig {
                depth: 4,
                sync_stages: 1
            }),
            Err(RingError::InvalidStages { .. })
        ));
    }

    #[test]
    fn entry_is_hidden_until_synchronized() {
        let (mut writer, mut reader) = ring(4);
        writer.try_push(7).unwrap();
        assert!(reader.peek().is_none());
        assert_eq!(reader.sample(), 0, "one sample is never trusted");
        assert!(reader.peek().is_none());
        assert_eq!(reader.sample(), 1);
        assert_eq!(reader.peek(), Some(&7));
    }

    #[test]
    fn backpressure_is_structural() {
        let (mut writer, mut reader) = ring(3);
        for value in 0..3 {
            writer.try_push(value).unwrap();
        }
        assert!(writer.is_full());
        assert_eq!(writer.try_push(99), Err(99), "full ring hands value back");
        assert_eq!(writer.occupancy(), 3);

        settle(&mut writer, &mut reader);
        assert!(reader.advance());
        reader.reply(100).unwrap();
        assert_eq!(
            writer.try_push(99),
            Err(99),
            "slot stays owned until the writer retires it"
        );

        settle(&mut writer, &mut reader);
        let retired = writer.retire().expect("reply visible");
        assert_eq!(
            retired,
            Retired {
                request: 0,
                reply: 100
            }
        );
        writer.try_push(99).unwrap();
    }

    #[test]
    fn replies_retire_in_fill_order() {
        let (mut writer, mut reader) = ring(4);
        for value in 10..14 {
            writer.try_push(value).unwrap();
        }
        settle(&mut writer, &mut reader);

        let mut consumed = Vec::new();
        while let Some(&value) = reader.peek() {
            consumed.push(value);
            reader.advance();
        }
        assert_eq!(consumed, vec![10, 11, 12, 13]);
        assert_eq!(reader.in_flight(), 4);

        for value in &consumed {
            reader.reply(value * 2).unwrap();
        }
        assert_eq!(reader.reply(0), Err(0));
        settle(&mut writer, &mut reader);

        let mut retired = Vec::new();
        while let Some(slot) = writer.retire() {
            retired.push((slot.request, slot.reply));
        }
        assert_eq!(retired, vec![(10, 20), (11, 22), (12, 24), (13, 26)]);
        assert!(writer.is_empty());
    }

    #[test]
    fn many_laps_do_not_leak_slots() {
        let (mut writer, mut reader) = ring(2);
        for value in 0..10_000u32 {
            writer.try_push(value).unwrap();
            settle(&mut writer, &mut reader);
            assert_eq!(reader.peek(), Some(&value));
            reader.advance();
            reader.reply(value ^ 0xFFFF).unwrap();
            settle(&mut writer, &mut reader);
            let slot = writer.retire().expect("reply visible");
            assert_eq!(slot.reply, value ^ 0xFFFF);
        }
        assert!(writer.is_empty());
        assert!(writer.is_settled());
        assert!(reader.is_settled());
    }

    #[test]
    fn idle_halves_keep_registers_stable() {
        let (mut writer, mut reader) = ring(4);
        writer.try_push(1).unwrap();
        settle(&mut writer, &mut reader);
        reader.advance();
        reader.reply(2).unwrap();
        settle(&mut writer, &mut reader);
        writer.retire().unwrap();
        settle(&mut writer, &mut reader);

        let w = writer.registers();
        let r = reader.registers();
        for _ in 0..100 {
            writer.sample();
            reader.sample();
        }
        assert_eq!(writer.registers(), w);
        assert_eq!(reader.registers(), r);
    }

    #[test]
    fn threads_preserve_order() {
        const COUNT: u32 = 20_000;
        let (mut writer, mut reader) = ring(8);

        let producer = thread::spawn(move || {
            let mut next = 0u32;
            let mut retired = 0u32;
            while retired < COUNT {
                writer.sample();
                while let Some(slot) = writer.retire() {
                    assert_eq!(slot.request, retired);
                    assert_eq!(slot.reply, retired.wrapping_mul(3));
                    retired += 1;
                }
                if next < COUNT && writer.try_push(next).is_ok() {
                    next += 1;
                }
                thread::yield_now();
            }
        });

        let consumer = thread::spawn(move || {
            let mut answered = 0u32;
            while answered < COUNT {
                reader.sample();
                if let Some(&value) = reader.peek() {
                    assert_eq!(value, answered);
                    reader.advance();
                    reader.reply(value.wrapping_mul(3)).unwrap();
                    answered += 1;
                }
                thread::yield_now();
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    }
}

#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use crate::toggle::{ToggleSync, ToggleWire};
    use loom::sync::atomic::{AtomicU32, Ordering};
    use loom::sync::Arc;
    use loom::thread;

    #[derive(Debug)]
    struct LoomSlot {
        payload: AtomicU32,
        reply: AtomicU32,
        forward: ToggleWire,
        backward: ToggleWire,
    }

    impl LoomSlot {
        fn new() -> Self {
            Self {
                payload: AtomicU32::new(0),
                reply: AtomicU32::new(0),
                forward: ToggleWire::new(),
                backward: ToggleWire::new(),
            }
        }
    }

    #[test]
    #[ignore]
    fn slow_loom_single_slot_round_trip() {
        loom::model(|| {
            let slot = Arc::new(LoomSlot::new());
            let writer = Arc::clone(&slot);
            let reader = Arc::clone(&slot);

            let writer_thread = thread::spawn(move || {
                writer.payload.store(41, Ordering::Relaxed);
                writer.forward.flip();
                let mut sync = ToggleSync::new(2).unwrap();
                loop {
                    if sync.sample(&writer.backward) {
                        break;
                    }
                    thread::yield_now();
                }
                assert_eq!(writer.reply.load(Ordering::Relaxed), 42);
            });

            let reader_thread = thread::spawn(move || {
                let mut sync = ToggleSync::new(2).unwrap();
                loop {
                    if sync.sample(&reader.forward) {
                        break;
                    }
                    thread::yield_now();
                }
                let value = reader.payload.load(Ordering::Relaxed);
                assert_eq!(value, 41);
                reader.reply.store(value + 1, Ordering::Relaxed);
                reader.backward.flip();
            });

            writer_thread.join().unwrap();
            reader_thread.join().unwrap();
        });
    }
}
