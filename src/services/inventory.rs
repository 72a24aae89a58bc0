//! Inventory ledger: sole arbiter of copy availability
//!
//! Every change to `copies_on_loan` goes through here, inside the caller's
//! transaction. The atomic compare-and-increment itself lives in the store; the
//! ledger checks the counters it gets back and reports breaches loudly.

use crate::{
    error::AppResult,
    models::CatalogItem,
    repository::{Release, Reservation, StoreTx},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Claim one copy of `item_id`.
    ///
    /// `Unavailable` is a normal outcome and leaves the counters untouched.
    pub async fn try_reserve(&self, tx: &mut dyn StoreTx, item_id: i32) -> AppResult<Reservation> {
        let outcome = tx.try_reserve(item_id).await?;

        match &outcome {
            Reservation::Reserved(item) => {
                if let Err(e) = item.check_invariant() {
                    tracing::error!(item_id, alert = true, "Reservation overbooked item: {}", e);
                    return Err(e);
                }
                tracing::debug!(
                    item_id,
                    copies_on_loan = item.copies_on_loan,
                    total_copies = item.total_copies,
                    "Copy reserved"
                );
            }
            Reservation::Unavailable => {
                tracing::debug!(item_id, "No copy available");
            }
        }

        Ok(outcome)
    }

    /// Give back the copy held by a loan that is being returned.
    ///
    /// Callers invoke this once per return transition.
    pub async fn release(&self, tx: &mut dyn StoreTx, item_id: i32) -> AppResult<CatalogItem> {
        match tx.release(item_id).await? {
            Release::Released(item) => {
                item.check_invariant()?;
                tracing::debug!(item_id, copies_on_loan = item.copies_on_loan, "Copy released");
                Ok(item)
            }
            Release::AlreadyZero(item) => {
                tracing::warn!(
                    item_id,
                    "Released a copy of an item with no copies on loan, counter kept at zero"
                );
                Ok(item)
            }
        }
    }
}
