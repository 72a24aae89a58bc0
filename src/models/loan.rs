//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::enums::LoanStatus;
use crate::error::{AppError, AppResult};

/// Loan record. Never deleted, returned loans stay as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub item_id: i32,
    pub borrower_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine_amount: Decimal,
}

impl Loan {
    /// Move to `next`, rejecting anything outside the transition table
    pub fn transition(&mut self, next: LoanStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "Loan {} cannot go from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Active and past due. Pending returns are never flagged overdue.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Active && self.due_at < now
    }

    pub fn matches(&self, query: &LoanQuery) -> bool {
        query.borrower_id.map_or(true, |id| id == self.borrower_id)
            && query.item_id.map_or(true, |id| id == self.item_id)
            && query.status.map_or(true, |s| s == self.status)
    }
}

/// Raw loan row, status kept as its SMALLINT code
#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    pub id: i32,
    pub item_id: i32,
    pub borrower_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: i16,
    pub fine_amount: Decimal,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id,
            item_id: row.item_id,
            borrower_id: row.borrower_id,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
            status: LoanStatus::try_from(row.status)?,
            fine_amount: row.fine_amount,
        })
    }
}

/// Loan about to be inserted, after a copy has been reserved
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub item_id: i32,
    pub borrower_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Create loan request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLoan {
    pub item_id: i32,
    /// Defaults to the requesting actor for members
    pub borrower_id: Option<i32>,
    /// Defaults to the configured loan period
    pub loan_period_days: Option<i64>,
}

/// Filter for listing loans
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub borrower_id: Option<i32>,
    pub item_id: Option<i32>,
    pub status: Option<LoanStatus>,
}

/// Loan counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanStats {
    pub active: i64,
    pub pending_return: i64,
    pub overdue: i64,
    pub returned: i64,
}

impl LoanStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (LoanStatus, i64)>) -> Self {
        let mut stats = Self::default();
        for (status, count) in counts {
            match status {
                LoanStatus::Active => stats.active += count,
                LoanStatus::PendingReturn => stats.pending_return += count,
                LoanStatus::Overdue => stats.overdue += count,
                LoanStatus::Returned => stats.returned += count,
            }
        }
        stats
    }

    pub fn outstanding(&self) -> i64 {
        self.active + self.pending_return + self.overdue
    }
}
