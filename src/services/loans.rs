//! Loan lifecycle service
//!
//! Owns the loan state machine:
//!
//! ```text
//! (none) --create--> Active --request_return--> PendingReturn --approve--> Returned
//!                      |  \--recompute_overdue--> Overdue -------approve--> Returned
//!                      \----------------approve / direct return----------> Returned
//! ```
//!
//! Every transition that touches a copy counter runs in the same store
//! transaction as the loan write, under a deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use super::{fines::FinePolicy, inventory::InventoryLedger};
use crate::{
    clock::Clock,
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{Actor, CreateLoan, Loan, LoanQuery, LoanStats, LoanStatus, NewLoan},
    repository::{Reservation, Store, StoreTx},
};

/// How a loan reached `Returned`, for logs only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnKind {
    Approved,
    Direct,
}

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    ledger: InventoryLedger,
    fines: FinePolicy,
    clock: Arc<dyn Clock>,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, config: LoansConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger: InventoryLedger::new(),
            fines: FinePolicy::new(config.daily_fine_rate),
            clock,
            config,
        }
    }

    /// Create a new loan (borrow one copy of an item)
    pub async fn create_loan(&self, actor: &Actor, request: CreateLoan) -> AppResult<Loan> {
        let borrower_id = self.resolve_borrower(actor, request.borrower_id)?;
        let period_days = self.loan_period(request.loan_period_days)?;
        let item_id = request.item_id;

        let loan = self
            .within_deadline("create loan", async {
                let mut tx = self.store.begin().await?;

                if let Reservation::Unavailable = self.ledger.try_reserve(&mut *tx, item_id).await? {
                    return Err(AppError::ItemUnavailable { item_id });
                }

                let now = self.clock.now();
                let loan = tx
                    .insert_loan(&NewLoan {
                        item_id,
                        borrower_id,
                        borrowed_at: now,
                        due_at: now + Duration::days(period_days),
                    })
                    .await?;

                Ok((tx, loan))
            })
            .await?;

        tracing::info!(
            loan_id = loan.id,
            item_id,
            borrower_id,
            actor_id = actor.id,
            due_at = %loan.due_at,
            "Loan created"
        );
        Ok(loan)
    }

    /// Borrower asks to give the copy back; staff confirm later
    pub async fn request_return(&self, actor: &Actor, loan_id: i32) -> AppResult<Loan> {
        let loan = self
            .within_deadline("request return", async {
                let mut tx = self.store.begin().await?;
                let mut loan = tx
                    .lock_loan(loan_id)
                    .await?
                    .ok_or_else(|| unknown_loan(loan_id))?;

                if loan.borrower_id != actor.id {
                    return Err(AppError::NotOwner {
                        loan_id,
                        actor_id: actor.id,
                    });
                }

                loan.transition(LoanStatus::PendingReturn)?;
                tx.update_loan(&loan).await?;
                Ok((tx, loan))
            })
            .await?;

        tracing::info!(loan_id, borrower_id = loan.borrower_id, "Return requested");
        Ok(loan)
    }

    /// Staff confirm a return from any outstanding status
    pub async fn approve_return(&self, actor: &Actor, loan_id: i32) -> AppResult<Loan> {
        self.complete_return(actor, loan_id, ReturnKind::Approved).await
    }

    /// Staff check a copy in at the desk, without a prior return request
    pub async fn direct_return(&self, actor: &Actor, loan_id: i32) -> AppResult<Loan> {
        self.complete_return(actor, loan_id, ReturnKind::Direct).await
    }

    async fn complete_return(&self, actor: &Actor, loan_id: i32, kind: ReturnKind) -> AppResult<Loan> {
        actor.require_staff()?;

        let loan = self
            .within_deadline("return loan", async {
                let mut tx = self.store.begin().await?;
                let mut loan = tx
                    .lock_loan(loan_id)
                    .await?
                    .ok_or_else(|| unknown_loan(loan_id))?;

                // Source must be outstanding, which also guarantees a single release per loan
                let previous = loan.status;
                loan.transition(LoanStatus::Returned)?;

                let now = self.clock.now();
                loan.returned_at = Some(now);
                loan.fine_amount = self.fines.fine_for(loan.due_at, now);

                tx.update_loan(&loan).await?;
                self.ledger.release(&mut *tx, loan.item_id).await?;

                tracing::debug!(loan_id, from = %previous, "Loan closing");
                Ok((tx, loan))
            })
            .await?;

        tracing::info!(
            loan_id,
            item_id = loan.item_id,
            actor_id = actor.id,
            kind = ?kind,
            fine = %loan.fine_amount,
            "Loan returned"
        );
        Ok(loan)
    }

    /// Flag Active loans past due as Overdue and refresh provisional fines.
    ///
    /// Returns how many loans changed status. Running it again at the same
    /// instant changes nothing.
    pub async fn recompute_overdue(&self) -> AppResult<u64> {
        let (transitioned, refreshed) = self
            .within_deadline("recompute overdue", async {
                let now = self.clock.now();
                let mut tx = self.store.begin().await?;
                let candidates = tx.lock_overdue_candidates(now).await?;

                let mut transitioned = 0u64;
                let mut refreshed = 0u64;
                for mut loan in candidates {
                    let fine = self.fines.fine_for(loan.due_at, now);
                    match loan.status {
                        LoanStatus::Active if loan.is_overdue_at(now) => {
                            loan.transition(LoanStatus::Overdue)?;
                            loan.fine_amount = fine;
                            tx.update_loan(&loan).await?;
                            transitioned += 1;
                        }
                        LoanStatus::Overdue if fine > loan.fine_amount => {
                            loan.fine_amount = fine;
                            tx.update_loan(&loan).await?;
                            refreshed += 1;
                        }
                        _ => {}
                    }
                }

                Ok((tx, (transitioned, refreshed)))
            })
            .await?;

        if transitioned > 0 || refreshed > 0 {
            tracing::info!(transitioned, refreshed, "Overdue loans recomputed");
        }
        Ok(transitioned)
    }

    /// List loans. Members only ever see their own.
    pub async fn list_loans(&self, actor: &Actor, query: LoanQuery) -> AppResult<Vec<Loan>> {
        let mut query = query;
        if !actor.is_staff() {
            match query.borrower_id {
                Some(id) if id != actor.id => {
                    return Err(AppError::Forbidden(
                        "Members can only list their own loans".to_string(),
                    ));
                }
                _ => query.borrower_id = Some(actor.id),
            }
        }
        self.store.list_loans(&query).await
    }

    pub async fn get_loan(&self, actor: &Actor, loan_id: i32) -> AppResult<Loan> {
        let loan = self
            .store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", loan_id)))?;

        if !actor.is_staff() && loan.borrower_id != actor.id {
            return Err(AppError::NotOwner {
                loan_id,
                actor_id: actor.id,
            });
        }
        Ok(loan)
    }

    pub async fn stats(&self, actor: &Actor) -> AppResult<LoanStats> {
        actor.require_staff()?;
        let counts = self.store.count_loans_by_status().await?;
        Ok(LoanStats::from_counts(counts))
    }

    /// Members borrow for themselves; staff borrow on behalf of someone else.
    /// Staff accounts are not borrowers, so staff must name a borrower other
    /// than themselves. This is a local policy of this service.
    fn resolve_borrower(&self, actor: &Actor, borrower_id: Option<i32>) -> AppResult<i32> {
        match (actor.is_staff(), borrower_id) {
            (false, None) => Ok(actor.id),
            (false, Some(id)) if id == actor.id => Ok(id),
            (false, Some(_)) => Err(AppError::Forbidden(
                "Members can only borrow for themselves".to_string(),
            )),
            (true, None) => Err(AppError::Validation(
                "borrower_id is required when staff create a loan".to_string(),
            )),
            (true, Some(id)) if id == actor.id => Err(AppError::Forbidden(
                "Staff accounts cannot borrow items".to_string(),
            )),
            (true, Some(id)) => Ok(id),
        }
    }

    fn loan_period(&self, requested: Option<i64>) -> AppResult<i64> {
        let days = requested.unwrap_or(self.config.default_loan_period_days);
        if days < 1 || days > self.config.max_loan_period_days {
            return Err(AppError::Validation(format!(
                "loan_period_days must be between 1 and {}",
                self.config.max_loan_period_days
            )));
        }
        Ok(days)
    }

    /// Run a transaction body under the configured deadline, then commit.
    ///
    /// On expiry the body is dropped, which rolls its transaction back, so a
    /// `Timeout` always means nothing was written. The commit runs outside the
    /// deadline: once sent, its outcome belongs to the store.
    async fn within_deadline<T, F>(&self, operation: &str, body: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<(Box<dyn StoreTx>, T)>>,
    {
        let limit = StdDuration::from_millis(self.config.transaction_timeout_ms);
        let (tx, value) = match tokio::time::timeout(limit, body).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(operation, timeout_ms = self.config.transaction_timeout_ms, "Transaction timed out");
                return Err(AppError::Timeout(format!("{} exceeded {:?}", operation, limit)));
            }
        };

        tx.commit().await?;
        Ok(value)
    }
}

/// Transitions on a loan that does not exist are rejected like terminal ones
fn unknown_loan(loan_id: i32) -> AppError {
    AppError::InvalidState(format!("Loan {} does not exist", loan_id))
}

/// Spawn the periodic overdue sweep
pub fn spawn_overdue_sweep(loans: LoansService, every: StdDuration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = loans.recompute_overdue().await {
                tracing::error!(transient = e.is_transient(), "Overdue sweep failed: {}", e);
            }
        }
    })
}
