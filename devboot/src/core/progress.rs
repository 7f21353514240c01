//! Bounded progress counter.
//!
//! The wrapped tools print free text, not a progress protocol, so the counter
//! only ever trusts classifier output up to `total` and snaps to `total` when
//! the invocation completes.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    current: u64,
    total: u64,
}

impl ProgressState {
    pub fn new(total: u64) -> Result<Self, EngineError> {
        if total == 0 {
            return Err(EngineError::InvalidTotal { total });
        }
        Ok(Self { current: 0, total })
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Advance by `units`, clamped to `total`. Returns the new position.
    pub fn advance(&mut self, units: u64) -> u64 {
        self.current = self.current.saturating_add(units).min(self.total);
        self.current
    }

    pub fn finish(&mut self) {
        self.current = self.total;
    }

    /// Start over for a new invocation.
    pub fn reset(&mut self, total: u64) -> Result<(), EngineError> {
        *self = Self::new(total)?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.current == self.total
    }
}
