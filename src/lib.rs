//! Library circulation server
//!
//! Tracks loans of catalog items counted in copies: members borrow and ask to
//! return, staff approve returns, and the number of copies out on loan never
//! exceeds an item's total, even under concurrent borrow requests.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
