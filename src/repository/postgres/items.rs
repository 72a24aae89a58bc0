//! Catalog copy counters

use sqlx::{FromRow, PgConnection, Pool, Postgres};

use super::map_db_err;
use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, CreateItem},
    repository::{Release, Reservation},
};

#[derive(FromRow)]
struct ReleasedRow {
    #[sqlx(flatten)]
    item: CatalogItem,
    previous: i32,
}

pub(super) async fn get_by_id(pool: &Pool<Postgres>, id: i32) -> AppResult<CatalogItem> {
    sqlx::query_as::<_, CatalogItem>(
        r#"
        SELECT id, title, total_copies, copies_on_loan, created_at, updated_at
        FROM catalog_items
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_err)?
    .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
}

pub(super) async fn create(pool: &Pool<Postgres>, item: &CreateItem) -> AppResult<CatalogItem> {
    sqlx::query_as::<_, CatalogItem>(
        r#"
        INSERT INTO catalog_items (title, total_copies, copies_on_loan)
        VALUES ($1, $2, 0)
        RETURNING id, title, total_copies, copies_on_loan, created_at, updated_at
        "#,
    )
    .bind(&item.title)
    .bind(item.total_copies)
    .fetch_one(pool)
    .await
    .map_err(map_db_err)
}

/// Conditional increment: the guard and the write are the same statement, so
/// two transactions racing for the last copy serialize on the row and the
/// loser matches zero rows.
pub(super) async fn try_reserve(conn: &mut PgConnection, item_id: i32) -> AppResult<Reservation> {
    let reserved = sqlx::query_as::<_, CatalogItem>(
        r#"
        UPDATE catalog_items
        SET copies_on_loan = copies_on_loan + 1, updated_at = NOW()
        WHERE id = $1 AND copies_on_loan < total_copies
        RETURNING id, title, total_copies, copies_on_loan, created_at, updated_at
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_err)?;

    if let Some(item) = reserved {
        return Ok(Reservation::Reserved(item));
    }

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM catalog_items WHERE id = $1)")
            .bind(item_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_db_err)?;

    if exists {
        Ok(Reservation::Unavailable)
    } else {
        Err(AppError::NotFound(format!("Item {} not found", item_id)))
    }
}

pub(super) async fn release(conn: &mut PgConnection, item_id: i32) -> AppResult<Release> {
    let row = sqlx::query_as::<_, ReleasedRow>(
        r#"
        UPDATE catalog_items AS c
        SET copies_on_loan = GREATEST(c.copies_on_loan - 1, 0), updated_at = NOW()
        FROM (
            SELECT id, copies_on_loan FROM catalog_items WHERE id = $1 FOR UPDATE
        ) AS prev
        WHERE c.id = prev.id
        RETURNING c.id, c.title, c.total_copies, c.copies_on_loan, c.created_at, c.updated_at,
                  prev.copies_on_loan AS previous
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_err)?
    .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_id)))?;

    if row.previous == 0 {
        Ok(Release::AlreadyZero(row.item))
    } else {
        Ok(Release::Released(row.item))
    }
}
