//! PostgreSQL store
//!
//! Reservation is one conditional `UPDATE ... WHERE copies_on_loan < total_copies`;
//! loan transitions lock their row with `SELECT ... FOR UPDATE`. The schema's
//! CHECK constraint on `catalog_items` is the last line against overbooking.

mod items;
mod loans;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::{Release, Reservation, Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, CreateItem, Loan, LoanQuery, LoanStatus, NewLoan},
};

/// SQLSTATE for check_violation
const CHECK_VIOLATION: &str = "23514";

/// Map driver errors, singling out CHECK violations on the copy counters
pub(crate) fn map_db_err(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some(CHECK_VIOLATION) {
            return AppError::InvariantViolation(db.message().to_string());
        }
    }
    AppError::Database(e)
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_db_err)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_item(&self, id: i32) -> AppResult<CatalogItem> {
        items::get_by_id(&self.pool, id).await
    }

    async fn insert_item(&self, item: &CreateItem) -> AppResult<CatalogItem> {
        items::create(&self.pool, item).await
    }

    async fn get_loan(&self, id: i32) -> AppResult<Option<Loan>> {
        loans::get_by_id(&self.pool, id).await
    }

    async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>> {
        loans::list(&self.pool, query).await
    }

    async fn count_loans_by_status(&self) -> AppResult<Vec<(LoanStatus, i64)>> {
        loans::count_by_status(&self.pool).await
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn try_reserve(&mut self, item_id: i32) -> AppResult<Reservation> {
        items::try_reserve(&mut self.tx, item_id).await
    }

    async fn release(&mut self, item_id: i32) -> AppResult<Release> {
        items::release(&mut self.tx, item_id).await
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        loans::insert(&mut self.tx, loan).await
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        loans::lock(&mut self.tx, id).await
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        loans::update(&mut self.tx, loan).await
    }

    async fn lock_overdue_candidates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        loans::lock_overdue_candidates(&mut self.tx, now).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(map_db_err)
    }
}
