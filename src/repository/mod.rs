//! Persistence layer for catalog copy counts and loan records
//!
//! Services never see a concrete backend: they hold an `Arc<dyn Store>` and
//! run every multi-step change inside one [`StoreTx`]. Dropping a transaction
//! without calling [`StoreTx::commit`] undoes all of its effects.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{CatalogItem, CreateItem, Loan, LoanQuery, LoanStatus, NewLoan},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of an atomic compare-and-increment on `copies_on_loan`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// One copy claimed, with the item as it stands after the increment
    Reserved(CatalogItem),
    /// Every copy is already on loan, nothing was changed
    Unavailable,
}

/// Outcome of decrementing `copies_on_loan`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    Released(CatalogItem),
    /// Counter was already zero and stayed there
    AlreadyZero(CatalogItem),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn ping(&self) -> AppResult<()>;

    async fn get_item(&self, id: i32) -> AppResult<CatalogItem>;

    async fn insert_item(&self, item: &CreateItem) -> AppResult<CatalogItem>;

    async fn get_loan(&self, id: i32) -> AppResult<Option<Loan>>;

    /// Loans matching the filter, most recent first
    async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>>;

    async fn count_loans_by_status(&self) -> AppResult<Vec<(LoanStatus, i64)>>;
}

/// One transaction. Row locks taken here are held until commit or drop.
#[async_trait]
pub trait StoreTx: Send {
    /// Claim one copy if `copies_on_loan < total_copies`, in a single atomic step
    async fn try_reserve(&mut self, item_id: i32) -> AppResult<Reservation>;

    /// Give one copy back, floored at zero
    async fn release(&mut self, item_id: i32) -> AppResult<Release>;

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    /// Lock a loan for update
    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>>;

    /// Write back a loan previously locked in this transaction
    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()>;

    /// Lock every Active loan due before `now` and every Overdue loan,
    /// skipping loans another transaction already holds
    async fn lock_overdue_candidates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
