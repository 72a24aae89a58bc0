//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::loan::{CreateLoan, Loan, LoanQuery, LoanStats},
};

use super::AuthenticatedUser;

/// Create loan request
#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    /// Catalog item to borrow
    pub item_id: i32,
    /// Borrower, required when staff borrow on behalf of a member
    pub borrower_id: Option<i32>,
    /// Loan period in days (default from configuration)
    #[validate(range(min = 1))]
    pub loan_period_days: Option<i64>,
}

/// Result of an overdue sweep
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RecomputeResponse {
    /// Loans moved from active to overdue
    pub transitioned: u64,
}

/// List loans, filtered by borrower, item or status
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans", body = Vec<Loan>),
        (status = 403, description = "Members may only list their own loans")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_loans(&claims.actor(), query).await?;
    Ok(Json(loans))
}

/// Get one loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan", body = Loan),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.get_loan(&claims.actor(), loan_id).await?;
    Ok(Json(loan))
}

/// Create a new loan (borrow one copy of an item)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "No copy available", body = crate::error::ErrorResponse),
        (status = 503, description = "Transient failure, safe to retry", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let loan = state
        .services
        .loans
        .create_loan(
            &claims.actor(),
            CreateLoan {
                item_id: request.item_id,
                borrower_id: request.borrower_id,
                loan_period_days: request.loan_period_days,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Ask to return a borrowed item (borrower only)
#[utoipa::path(
    post,
    path = "/loans/{id}/request-return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Return pending staff approval", body = Loan),
        (status = 403, description = "Not the borrower"),
        (status = 409, description = "Loan is not active")
    )
)]
pub async fn request_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state
        .services
        .loans
        .request_return(&claims.actor(), loan_id)
        .await?;
    Ok(Json(loan))
}

/// Approve a return (staff only)
#[utoipa::path(
    post,
    path = "/loans/{id}/approve-return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Item returned", body = Loan),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Loan already returned or unknown")
    )
)]
pub async fn approve_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state
        .services
        .loans
        .approve_return(&claims.actor(), loan_id)
        .await?;
    Ok(Json(loan))
}

/// Check an item in at the desk (staff only)
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Item returned", body = Loan),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Loan already returned or unknown")
    )
)]
pub async fn direct_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<Loan>> {
    let loan = state
        .services
        .loans
        .direct_return(&claims.actor(), loan_id)
        .await?;
    Ok(Json(loan))
}

/// Run the overdue sweep now (staff only)
#[utoipa::path(
    post,
    path = "/loans/overdue/recompute",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep done", body = RecomputeResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn recompute_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<RecomputeResponse>> {
    claims.actor().require_staff()?;

    let transitioned = state.services.loans.recompute_overdue().await?;
    Ok(Json(RecomputeResponse { transitioned }))
}

/// Loan counts by status (staff only)
#[utoipa::path(
    get,
    path = "/loans/stats",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loan counts", body = LoanStats),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_loan_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<LoanStats>> {
    let stats = state.services.loans.stats(&claims.actor()).await?;
    Ok(Json(stats))
}
