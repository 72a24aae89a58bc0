//! In-memory store
//!
//! Each item and loan sits behind its own async mutex, which plays the part of a
//! row lock: a transaction takes the guard on first touch and keeps it until
//! commit or drop. Reservations on one item therefore serialize while different
//! items never contend. A transaction dropped without commit restores every row
//! it touched and discards the loans it inserted.

use std::collections::{hash_map::Entry, HashMap};
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Release, Reservation, Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, CreateItem, Loan, LoanQuery, LoanStatus, NewLoan},
};

type Row<T> = Arc<Mutex<T>>;

fn row_of<T>(table: &DashMap<i32, Row<T>>, id: i32) -> Option<Row<T>> {
    table.get(&id).map(|r| Arc::clone(r.value()))
}

fn snapshot<T>(table: &DashMap<i32, Row<T>>) -> Vec<(i32, Row<T>)> {
    table
        .iter()
        .map(|r| (*r.key(), Arc::clone(r.value())))
        .collect()
}

fn is_overdue_candidate(loan: &Loan, now: DateTime<Utc>) -> bool {
    loan.is_overdue_at(now) || loan.status == LoanStatus::Overdue
}

#[derive(Default)]
struct Tables {
    items: DashMap<i32, Row<CatalogItem>>,
    loans: DashMap<i32, Row<Loan>>,
    item_seq: AtomicI32,
    loan_seq: AtomicI32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        Ok(Box::new(MemoryTx {
            tables: Arc::clone(&self.tables),
            items: HashMap::new(),
            loans: HashMap::new(),
            inserted: Vec::new(),
            committed: false,
        }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_item(&self, id: i32) -> AppResult<CatalogItem> {
        let row = row_of(&self.tables.items, id)
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
        let item = row.lock().await.clone();
        Ok(item)
    }

    async fn insert_item(&self, item: &CreateItem) -> AppResult<CatalogItem> {
        let now = Utc::now();
        let id = self.tables.item_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let created = CatalogItem {
            id,
            title: item.title.clone(),
            total_copies: item.total_copies,
            copies_on_loan: 0,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .items
            .insert(id, Arc::new(Mutex::new(created.clone())));
        Ok(created)
    }

    async fn get_loan(&self, id: i32) -> AppResult<Option<Loan>> {
        match row_of(&self.tables.loans, id) {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>> {
        let mut loans = Vec::new();
        for (_, row) in snapshot(&self.tables.loans) {
            let loan = row.lock().await;
            if loan.matches(query) {
                loans.push(loan.clone());
            }
        }
        loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    async fn count_loans_by_status(&self) -> AppResult<Vec<(LoanStatus, i64)>> {
        let mut counts: HashMap<LoanStatus, i64> = HashMap::new();
        for (_, row) in snapshot(&self.tables.loans) {
            let status = row.lock().await.status;
            *counts.entry(status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

/// Row held by a transaction, with its value at lock time for rollback
struct Locked<T> {
    guard: OwnedMutexGuard<T>,
    original: T,
}

impl<T: Clone> Locked<T> {
    fn new(guard: OwnedMutexGuard<T>) -> Self {
        let original = guard.clone();
        Self { guard, original }
    }
}

pub struct MemoryTx {
    tables: Arc<Tables>,
    items: HashMap<i32, Locked<CatalogItem>>,
    loans: HashMap<i32, Locked<Loan>>,
    inserted: Vec<Loan>,
    committed: bool,
}

impl MemoryTx {
    async fn lock_item(&mut self, id: i32) -> AppResult<&mut CatalogItem> {
        let locked = match self.items.entry(id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let row = row_of(&self.tables.items, id)
                    .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
                e.insert(Locked::new(row.lock_owned().await))
            }
        };
        Ok(&mut *locked.guard)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn try_reserve(&mut self, item_id: i32) -> AppResult<Reservation> {
        let item = self.lock_item(item_id).await?;
        if item.copies_on_loan >= item.total_copies {
            return Ok(Reservation::Unavailable);
        }
        item.copies_on_loan += 1;
        item.updated_at = Utc::now();
        Ok(Reservation::Reserved(item.clone()))
    }

    async fn release(&mut self, item_id: i32) -> AppResult<Release> {
        let item = self.lock_item(item_id).await?;
        if item.copies_on_loan <= 0 {
            item.copies_on_loan = 0;
            return Ok(Release::AlreadyZero(item.clone()));
        }
        item.copies_on_loan -= 1;
        item.updated_at = Utc::now();
        Ok(Release::Released(item.clone()))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        if !self.tables.items.contains_key(&loan.item_id) {
            return Err(AppError::NotFound(format!("Item {} not found", loan.item_id)));
        }
        let id = self.tables.loan_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Loan {
            id,
            item_id: loan.item_id,
            borrower_id: loan.borrower_id,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            returned_at: None,
            status: LoanStatus::Active,
            fine_amount: Decimal::ZERO,
        };
        self.inserted.push(created.clone());
        Ok(created)
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        if let Some(loan) = self.inserted.iter().find(|l| l.id == id) {
            return Ok(Some(loan.clone()));
        }
        let locked = match self.loans.entry(id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => match row_of(&self.tables.loans, id) {
                Some(row) => e.insert(Locked::new(row.lock_owned().await)),
                None => return Ok(None),
            },
        };
        Ok(Some(locked.guard.clone()))
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        if let Some(locked) = self.loans.get_mut(&loan.id) {
            *locked.guard = loan.clone();
            return Ok(());
        }
        if let Some(pending) = self.inserted.iter_mut().find(|l| l.id == loan.id) {
            *pending = loan.clone();
            return Ok(());
        }
        Err(AppError::Internal(format!(
            "Loan {} was updated without being locked",
            loan.id
        )))
    }

    async fn lock_overdue_candidates(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let mut candidates = Vec::new();
        for (id, row) in snapshot(&self.tables.loans) {
            if let Some(locked) = self.loans.get(&id) {
                if is_overdue_candidate(&locked.guard, now) {
                    candidates.push(locked.guard.clone());
                }
                continue;
            }
            // Held by another transaction: skip it, like FOR UPDATE SKIP LOCKED
            let Ok(guard) = row.try_lock_owned() else {
                continue;
            };
            if is_overdue_candidate(&guard, now) {
                candidates.push(guard.clone());
                self.loans.insert(id, Locked::new(guard));
            }
        }
        candidates.sort_by_key(|l| l.id);
        Ok(candidates)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut this = self;
        let inserted = std::mem::take(&mut this.inserted);
        for loan in inserted {
            this.tables.loans.insert(loan.id, Arc::new(Mutex::new(loan)));
        }
        this.committed = true;
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for locked in self.items.values_mut() {
            *locked.guard = locked.original.clone();
        }
        for locked in self.loans.values_mut() {
            *locked.guard = locked.original.clone();
        }
    }
}
