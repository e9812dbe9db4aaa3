//! Clock-domain-crossing skid buffer.
//!
//! Two independently paced domains exchange pipelined bus transactions
//! through a fixed-depth slot ring:
//! * [`InitiatorPort`] – domain A; accepts upstream requests, retires
//!   responses in issue order, owns group cancellation.
//! * [`TargetPort`] – domain B; forwards requests downstream under a credit
//!   budget and returns completions.
//! * [`channel`] – builds both halves from a validated [`CdcConfig`].
//! * [`runtime`] – thread runner driving either half on its own clock.

mod bus;
mod cancel;
mod channel;
mod config;
mod credit;
mod error;
mod initiator;
pub mod runtime;
mod target;

pub use bus::{Completion, Entry, Reply, RequestPins, ResponsePins, Status, Transaction};
pub use cancel::{CancelPropagator, CancelState};
pub use channel::channel;
pub use config::CdcConfig;
pub use credit::CreditCounter;
pub use error::{ProtocolViolation, SkidError, SkidResult};
pub use initiator::{Enqueue, InitiatorPort, InitiatorStats};
pub use runtime::{spawn_domain, DomainEngine, DomainHandle};
pub use target::{TargetPort, TargetStats};
