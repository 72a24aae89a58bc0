//! Data models for the circulation server

pub mod enums;
pub mod item;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use enums::{LoanStatus, Role};
pub use item::{CatalogItem, CreateItem, ItemAvailability};
pub use loan::{CreateLoan, Loan, LoanQuery, LoanStats, NewLoan};
pub use user::{Actor, UserClaims};
