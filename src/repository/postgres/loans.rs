//! Loan records

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::map_db_err;
use crate::{
    error::{AppError, AppResult},
    models::{loan::LoanRow, Loan, LoanQuery, LoanStatus, NewLoan},
};

pub(super) async fn get_by_id(pool: &Pool<Postgres>, id: i32) -> AppResult<Option<Loan>> {
    sqlx::query_as::<_, LoanRow>(
        r#"
        SELECT id, item_id, borrower_id, borrowed_at, due_at, returned_at, status, fine_amount
        FROM loans
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_err)?
    .map(Loan::try_from)
    .transpose()
}

pub(super) async fn list(pool: &Pool<Postgres>, query: &LoanQuery) -> AppResult<Vec<Loan>> {
    let rows = sqlx::query_as::<_, LoanRow>(
        r#"
        SELECT id, item_id, borrower_id, borrowed_at, due_at, returned_at, status, fine_amount
        FROM loans
        WHERE ($1::INTEGER IS NULL OR borrower_id = $1)
          AND ($2::INTEGER IS NULL OR item_id = $2)
          AND ($3::SMALLINT IS NULL OR status = $3)
        ORDER BY borrowed_at DESC, id DESC
        "#,
    )
    .bind(query.borrower_id)
    .bind(query.item_id)
    .bind(query.status.map(i16::from))
    .fetch_all(pool)
    .await
    .map_err(map_db_err)?;

    rows.into_iter().map(Loan::try_from).collect()
}

pub(super) async fn count_by_status(pool: &Pool<Postgres>) -> AppResult<Vec<(LoanStatus, i64)>> {
    let rows: Vec<(i16, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM loans GROUP BY status")
            .fetch_all(pool)
            .await
            .map_err(map_db_err)?;

    rows.into_iter()
        .map(|(status, count)| Ok((LoanStatus::try_from(status)?, count)))
        .collect()
}

pub(super) async fn insert(conn: &mut PgConnection, loan: &NewLoan) -> AppResult<Loan> {
    let row = sqlx::query_as::<_, LoanRow>(
        r#"
        INSERT INTO loans (item_id, borrower_id, borrowed_at, due_at, status, fine_amount)
        VALUES ($1, $2, $3, $4, $5, 0)
        RETURNING id, item_id, borrower_id, borrowed_at, due_at, returned_at, status, fine_amount
        "#,
    )
    .bind(loan.item_id)
    .bind(loan.borrower_id)
    .bind(loan.borrowed_at)
    .bind(loan.due_at)
    .bind(i16::from(LoanStatus::Active))
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_err)?;

    Loan::try_from(row)
}

pub(super) async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<Loan>> {
    sqlx::query_as::<_, LoanRow>(
        r#"
        SELECT id, item_id, borrower_id, borrowed_at, due_at, returned_at, status, fine_amount
        FROM loans
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_err)?
    .map(Loan::try_from)
    .transpose()
}

pub(super) async fn update(conn: &mut PgConnection, loan: &Loan) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE loans SET status = $2, returned_at = $3, fine_amount = $4 WHERE id = $1",
    )
    .bind(loan.id)
    .bind(i16::from(loan.status))
    .bind(loan.returned_at)
    .bind(loan.fine_amount)
    .execute(&mut *conn)
    .await
    .map_err(map_db_err)?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Loan {} not found", loan.id)));
    }
    Ok(())
}

pub(super) async fn lock_overdue_candidates(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> AppResult<Vec<Loan>> {
    let rows = sqlx::query_as::<_, LoanRow>(
        r#"
        SELECT id, item_id, borrower_id, borrowed_at, due_at, returned_at, status, fine_amount
        FROM loans
        WHERE (status = $1 AND due_at < $2) OR status = $3
        ORDER BY id
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(i16::from(LoanStatus::Active))
    .bind(now)
    .bind(i16::from(LoanStatus::Overdue))
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_err)?;

    rows.into_iter().map(Loan::try_from).collect()
}
