use crate::error::{Result, TaxError};
use crate::model::ledger::LedgerSnapshot;

/// Durable storage for the ledger. Implementations may block; callers offload them.
pub trait LedgerRepository: Send + Sync {
    /// Returns the stored ledger, or an empty snapshot if nothing was stored yet.
    fn load(&self) -> Result<LedgerSnapshot>;
    /// Replaces the stored ledger as a whole.
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;

    /// Reads the stored ledger, hands it to `apply` and stores what `apply` returns.
    /// `apply` gets `None` when the stored data is corrupt. Other read errors abort
    /// without writing. Stores shared between processes hold a lock across all three steps.
    fn modify<F>(&self, apply: F) -> Result<LedgerSnapshot>
    where
        F: FnOnce(Option<LedgerSnapshot>) -> LedgerSnapshot,
    {
        let stored = match self.load() {
            Ok(snapshot) => Some(snapshot),
            Err(TaxError::Corrupt { .. }) => None,
            Err(e) => return Err(e),
        };
        let next = apply(stored);
        self.save(&next)?;
        Ok(next)
    }
}
