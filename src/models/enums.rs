//! Shared domain enums

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

// ---------------------------------------------------------------------------
// LoanStatus
// ---------------------------------------------------------------------------

/// Status of a loan record.
///
/// Stored as SMALLINT. The set is closed: every move between statuses goes
/// through [`LoanStatus::can_transition_to`], and `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum LoanStatus {
    Active = 0,
    PendingReturn = 1,
    Overdue = 2,
    Returned = 3,
}

impl LoanStatus {
    /// Statuses in which a copy is off the shelf
    pub const OUTSTANDING: [LoanStatus; 3] = [
        LoanStatus::Active,
        LoanStatus::PendingReturn,
        LoanStatus::Overdue,
    ];

    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Active,
        LoanStatus::PendingReturn,
        LoanStatus::Overdue,
        LoanStatus::Returned,
    ];

    pub fn is_outstanding(self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }

    /// Transition table of the loan state machine
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Active, PendingReturn)
                | (Active, Overdue)
                | (Active, Returned)
                | (PendingReturn, Returned)
                | (Overdue, Returned)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::PendingReturn => "pending_return",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }
}

impl TryFrom<i16> for LoanStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(LoanStatus::Active),
            1 => Ok(LoanStatus::PendingReturn),
            2 => Ok(LoanStatus::Overdue),
            3 => Ok(LoanStatus::Returned),
            other => Err(AppError::Internal(format!("Unknown loan status code {}", other))),
        }
    }
}

impl From<LoanStatus> for i16 {
    fn from(s: LoanStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Role of the actor behind a request, as issued by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
    Admin,
}

impl Role {
    /// Librarians and admins share every circulation privilege
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Librarian => "librarian",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "librarian" => Ok(Role::Librarian),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
