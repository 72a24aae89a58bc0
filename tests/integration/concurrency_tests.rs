//! Concurrent borrowing and returning against shared copy counters

use std::time::Duration;

use circulation_server::{
    config::LoansConfig,
    models::{CreateLoan, LoanQuery, LoanStatus},
    repository::Store,
    AppError,
};

use crate::common::{member, staff, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrows_never_exceed_total_copies() {
    let h = Harness::new();
    let item_id = h.item(5).await.id;

    let mut handles = Vec::new();
    for borrower in 1..=32 {
        let loans = h.services.loans.clone();
        handles.push(tokio::spawn(async move {
            loans
                .create_loan(
                    &member(borrower),
                    CreateLoan {
                        item_id,
                        borrower_id: None,
                        loan_period_days: Some(14),
                    },
                )
                .await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(AppError::ItemUnavailable { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(granted, 5);
    assert_eq!(h.copies_on_loan(item_id).await, 5);
    let loans = h
        .services
        .loans
        .list_loans(&staff(), LoanQuery::default())
        .await
        .unwrap();
    assert_eq!(loans.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_approvals_release_the_copy_once() {
    let h = Harness::new();
    let item = h.item(2).await;
    let loan_id = h.borrow(&member(1), item.id).await.unwrap().id;
    h.borrow(&member(2), item.id).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loans = h.services.loans.clone();
        handles.push(tokio::spawn(async move {
            loans.approve_return(&staff(), loan_id).await
        }));
    }

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(loan) => {
                assert_eq!(loan.status, LoanStatus::Returned);
                approved += 1;
            }
            Err(AppError::InvalidState(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(approved, 1);
    assert_eq!(h.copies_on_loan(item.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn borrow_and_return_storm_keeps_counts_consistent() {
    let h = Harness::new();
    let items = [h.item(3).await, h.item(1).await];

    let mut handles = Vec::new();
    for borrower in 1..=24 {
        let loans = h.services.loans.clone();
        let item_id = items[borrower as usize % items.len()].id;
        handles.push(tokio::spawn(async move {
            let actor = member(borrower);
            let loan = loans
                .create_loan(
                    &actor,
                    CreateLoan {
                        item_id,
                        borrower_id: None,
                        loan_period_days: Some(7),
                    },
                )
                .await;
            if let Ok(loan) = loan {
                if borrower % 2 == 0 {
                    loans.direct_return(&staff(), loan.id).await.unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for item in &items {
        let outstanding = h
            .services
            .loans
            .list_loans(
                &staff(),
                LoanQuery {
                    item_id: Some(item.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_iter()
            .filter(|l| l.status.is_outstanding())
            .count() as i32;

        let availability = h.services.catalog.availability(item.id).await.unwrap();
        assert_eq!(availability.copies_on_loan, outstanding);
        assert!(availability.copies_on_loan <= availability.total_copies);
    }
}

#[tokio::test]
async fn different_items_do_not_contend() {
    let h = Harness::new();
    let busy = h.item(1).await;
    let free = h.item(1).await;

    let mut held = h.store.begin().await.unwrap();
    held.try_reserve(busy.id).await.unwrap();

    let loan = tokio::time::timeout(Duration::from_secs(1), h.borrow(&member(1), free.id))
        .await
        .expect("borrowing another item must not wait on the held row")
        .unwrap();
    assert_eq!(loan.item_id, free.id);

    drop(held);
    assert_eq!(h.copies_on_loan(busy.id).await, 0);
}

#[tokio::test]
async fn blocked_borrow_times_out_and_rolls_back() {
    let h = Harness::with_config(LoansConfig {
        transaction_timeout_ms: 50,
        ..LoansConfig::default()
    });
    let item = h.item(2).await;

    let mut held = h.store.begin().await.unwrap();
    held.try_reserve(item.id).await.unwrap();

    let result = h.borrow(&member(1), item.id).await;
    match result {
        Err(e @ AppError::Timeout(_)) => assert!(e.is_transient()),
        other => panic!("expected a timeout, got {:?}", other),
    }

    // The held reservation never committed either
    drop(held);
    assert_eq!(h.copies_on_loan(item.id).await, 0);

    // Retrying once the row is free succeeds
    h.borrow(&member(1), item.id).await.unwrap();
    assert_eq!(h.copies_on_loan(item.id).await, 1);
}
