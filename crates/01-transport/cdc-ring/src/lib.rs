//! Single-bit crossing primitives shared by both halves of a domain crossing.
//!
//! * [`ToggleWire`] / [`ToggleSync`] – event bit plus the destination-side
//!   delay line that decides when a flip may be trusted.
//! * [`slot_ring`] – fixed-depth slot arena whose per-slot toggle pairs carry
//!   the forward (filled) and backward (answered) handshakes.
//! * [`RingError`] – construction-time validation errors.

mod error;
mod slot_ring;
pub mod toggle;

pub use error::{RingError, RingResult};
pub use slot_ring::{
    slot_ring, RingConfig, RingReader, RingWriter, Retired, MAX_DEPTH, MIN_DEPTH,
};
pub use toggle::{ToggleSync, ToggleWire, MAX_SYNC_STAGES, MIN_SYNC_STAGES};
