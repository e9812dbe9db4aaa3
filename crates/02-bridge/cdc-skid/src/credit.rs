/// Remaining allowance of forwarded-but-uncompleted transactions.
///
/// Lives entirely in the target domain. The ring already bounds occupancy
/// structurally; the counter makes the bound explicit at the point where
/// requests leave the crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditCounter {
    available: u32,
    limit: u32,
}

impl CreditCounter {
    pub fn new(limit: u32) -> Self {
        Self {
            available: limit,
            limit,
        }
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn outstanding(&self) -> u32 {
        self.limit - self.available
    }

    pub fn has_credit(&self) -> bool {
        self.available > 0
    }

    /// Spends one credit. Returns false when the budget is exhausted.
    pub fn take(&mut self) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        true
    }

    /// Returns one credit.
    ///
    /// # Panics
    ///
    /// Panics when the counter would exceed its limit; that can only happen if
    /// a completion was matched to a request that was never forwarded.
    pub fn release(&mut self) {
        assert!(
            self.available < self.limit,
            "credit overflow: {} of {} already available",
            self.available,
            self.limit
        );
        self.available += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_until_exhausted_then_release() {
        let mut credit = CreditCounter::new(3);
        assert!(credit.take());
        assert!(credit.take());
        assert!(credit.take());
        assert!(!credit.take(), "budget exhausted");
        assert_eq!(credit.outstanding(), 3);
        credit.release();
        assert!(credit.has_credit());
        assert_eq!(credit.available(), 1);
    }

    #[test]
    #[should_panic(expected = "credit overflow")]
    fn release_above_limit_is_fatal() {
        let mut credit = CreditCounter::new(2);
        credit.release();
    }
}
