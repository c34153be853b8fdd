//! Shared scan-effort budget for one page.
//!
//! Effort is measured in COUNT units: every SCAN call costs the COUNT hint
//! it was sent with, whatever it returned. A restrictive MATCH can make the
//! store walk `count` entries and return none of them, so the hint is the
//! honest measure of work done store-side.
//!
//! The budget is shared by all shards in iteration order. Once a call no
//! longer fits, the budget stays closed for the rest of the page, so later
//! shards aren't started even if a smaller call would have fitted.

/// Tracks COUNT units spent against a per-page threshold.
#[derive(Debug, Clone)]
pub struct ScanBudget {
    limit: u64,
    spent: u64,
    closed: bool,
}

impl ScanBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            spent: 0,
            closed: false,
        }
    }

    /// Returns true if a call costing `count` still fits. The first `false`
    /// closes the budget for the remainder of the page.
    pub fn has_room(&mut self, count: u64) -> bool {
        if !self.closed && self.spent.saturating_add(count) > self.limit {
            self.closed = true;
        }
        !self.closed
    }

    /// Records a call costing `count`.
    pub fn spend(&mut self, count: u64) {
        self.spent = self.spent.saturating_add(count);
    }

    /// Units left before the threshold.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.spent)
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }

    /// Returns true once a call has been refused.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
