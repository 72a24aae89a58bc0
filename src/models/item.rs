//! Catalog item model: a title counted in copies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Catalog item with its copy counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CatalogItem {
    pub id: i32,
    pub title: String,
    pub total_copies: i32,
    /// Copies currently held by outstanding loans
    pub copies_on_loan: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    pub fn available(&self) -> i32 {
        (self.total_copies - self.copies_on_loan).max(0)
    }

    /// `0 <= copies_on_loan <= total_copies`
    ///
    /// A breach means the atomic reservation path is broken; it is reported,
    /// never corrected here.
    pub fn check_invariant(&self) -> AppResult<()> {
        if self.copies_on_loan < 0 || self.copies_on_loan > self.total_copies {
            return Err(AppError::InvariantViolation(format!(
                "item {} has {} copies on loan out of {}",
                self.id, self.copies_on_loan, self.total_copies
            )));
        }
        Ok(())
    }
}

/// Registration of a catalog item, as handed over by catalog management
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 500))]
    pub title: String,
    #[validate(range(min = 0))]
    pub total_copies: i32,
}

/// Availability view of an item
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemAvailability {
    pub item_id: i32,
    pub total_copies: i32,
    pub copies_on_loan: i32,
    pub available: i32,
}

impl From<&CatalogItem> for ItemAvailability {
    fn from(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id,
            total_copies: item.total_copies,
            copies_on_loan: item.copies_on_loan,
            available: item.available(),
        }
    }
}
