//! Group cancellation state machine, owned by the initiator domain.
//!
//! ```text
//!   Normal ──(group closes with work outstanding)──► DropPending
//!     ▲                                                  │ token enqueued
//!     │                                                  ▼
//!   DropComplete ◄──────(token mirrored back)────── DropInFlight
//! ```
//!
//! The token rides the same ring as data, so it can only reach the target
//! side after every request accepted before it.

use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CancelState {
    #[default]
    Normal,
    DropPending,
    DropInFlight,
    DropComplete,
}

#[derive(Clone, Debug, Default)]
pub struct CancelPropagator {
    state: CancelState,
    groups_cancelled: u32,
}

impl CancelPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CancelState {
        self.state
    }

    /// Number of groups that completed the full drop handshake.
    pub fn groups_cancelled(&self) -> u32 {
        self.groups_cancelled
    }

    /// New requests must stall while a drop is being propagated.
    pub fn blocks_requests(&self) -> bool {
        matches!(
            self.state,
            CancelState::DropPending | CancelState::DropInFlight
        )
    }

    /// The upstream group closed. `outstanding` is the number of accepted
    /// requests whose responses have not been retired yet.
    pub fn group_closed(&mut self, outstanding: u32) {
        if self.state == CancelState::Normal && outstanding > 0 {
            debug!(outstanding, "group closed early; cancellation pending");
            self.state = CancelState::DropPending;
        }
    }

    /// True while a token is owed to the ring.
    pub fn wants_token(&self) -> bool {
        self.state == CancelState::DropPending
    }

    pub fn token_enqueued(&mut self) {
        debug_assert_eq!(self.state, CancelState::DropPending);
        debug!("cancellation token enqueued");
        self.state = CancelState::DropInFlight;
    }

    /// The target side mirrored the token back.
    pub fn token_acknowledged(&mut self) {
        debug_assert_eq!(self.state, CancelState::DropInFlight);
        debug!("cancellation acknowledged by target");
        self.state = CancelState::DropComplete;
        self.groups_cancelled = self.groups_cancelled.wrapping_add(1);
    }

    /// Called at the start of every tick.
    pub fn settle(&mut self) {
        if self.state == CancelState::DropComplete {
            self.state = CancelState::Normal;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_close_stays_normal() {
        let mut cancel = CancelPropagator::new();
        cancel.group_closed(0);
        assert_eq!(cancel.state(), CancelState::Normal);
        assert!(!cancel.blocks_requests());
    }

    #[test]
    fn walks_every_state_once() {
        let mut cancel = CancelPropagator::new();
        cancel.group_closed(3);
        assert_eq!(cancel.state(), CancelState::DropPending);
        assert!(cancel.blocks_requests());
        assert!(cancel.wants_token());

        cancel.group_closed(3);
        assert_eq!(
            cancel.state(),
            CancelState::DropPending,
            "repeated close does not stack"
        );

        cancel.token_enqueued();
        assert_eq!(cancel.state(), CancelState::DropInFlight);
        assert!(cancel.blocks_requests());
        assert!(!cancel.wants_token());

        cancel.token_acknowledged();
        assert_eq!(cancel.state(), CancelState::DropComplete);
        assert!(!cancel.blocks_requests());

        cancel.settle();
        assert_eq!(cancel.state(), CancelState::Normal);
        assert_eq!(cancel.groups_cancelled(), 1);
    }
}
