//! Loan lifecycle scenarios over the in-memory store

use chrono::Duration;
use rust_decimal::Decimal;

use circulation_server::{
    config::LoansConfig,
    models::{CreateLoan, LoanQuery, LoanStatus},
    AppError,
};

use crate::common::{member, staff, Harness, LIBRARIAN_ID};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn last_copy_goes_to_first_borrower_until_returned() {
    let h = Harness::new();
    let item = h.item(1).await;
    let (alice, bob) = (member(1), member(2));

    let loan = h.borrow(&alice, item.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(h.copies_on_loan(item.id).await, 1);

    let denied = h.borrow(&bob, item.id).await;
    assert!(matches!(denied, Err(AppError::ItemUnavailable { item_id }) if item_id == item.id));
    assert_eq!(h.copies_on_loan(item.id).await, 1);

    let returned = h.services.loans.approve_return(&staff(), loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(h.copies_on_loan(item.id).await, 0);

    let second = h.borrow(&bob, item.id).await.unwrap();
    assert_eq!(second.borrower_id, 2);
    assert_eq!(h.copies_on_loan(item.id).await, 1);
}

#[tokio::test]
async fn loan_three_days_late_is_overdue_with_fine() {
    let h = Harness::new();
    let item = h.item(2).await;
    let loan = h.borrow_for(&member(1), item.id, 7).await.unwrap();

    h.clock.advance(Duration::days(10));
    assert_eq!(h.services.loans.recompute_overdue().await.unwrap(), 1);

    let loan = h.services.loans.get_loan(&staff(), loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Overdue);
    assert_eq!(loan.fine_amount, dec("1.50"));
    // Overdue loans still hold their copy
    assert_eq!(h.copies_on_loan(item.id).await, 1);
}

#[tokio::test]
async fn recompute_is_idempotent_at_a_fixed_instant() {
    let h = Harness::new();
    let item = h.item(3).await;
    let late = h.borrow_for(&member(1), item.id, 7).await.unwrap();
    h.borrow_for(&member(2), item.id, 30).await.unwrap();

    h.clock.advance(Duration::days(8));
    assert_eq!(h.services.loans.recompute_overdue().await.unwrap(), 1);
    let first = h.services.loans.get_loan(&staff(), late.id).await.unwrap();

    assert_eq!(h.services.loans.recompute_overdue().await.unwrap(), 0);
    let second = h.services.loans.get_loan(&staff(), late.id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn fines_never_decrease_as_time_passes() {
    let h = Harness::new();
    let item = h.item(1).await;
    let loan = h.borrow_for(&member(1), item.id, 3).await.unwrap();

    let mut last = Decimal::ZERO;
    for _ in 0..10 {
        h.clock.advance(Duration::hours(13));
        h.services.loans.recompute_overdue().await.unwrap();
        let fine = h.services.loans.get_loan(&staff(), loan.id).await.unwrap().fine_amount;
        assert!(fine >= last, "fine went from {} to {}", last, fine);
        last = fine;
    }

    // 130 hours in, 58 hours past due: two whole days
    assert_eq!(last, dec("1.00"));
}

#[tokio::test]
async fn final_fine_is_charged_at_return_time() {
    let h = Harness::new();
    let item = h.item(1).await;
    let loan = h.borrow_for(&member(1), item.id, 7).await.unwrap();

    h.clock.advance(Duration::days(10));
    h.services.loans.recompute_overdue().await.unwrap();

    h.clock.advance(Duration::days(2));
    let returned = h.services.loans.approve_return(&staff(), loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.returned_at, Some(h.now()));
    assert_eq!(returned.fine_amount, dec("2.50"));
}

#[tokio::test]
async fn on_time_return_owes_nothing() {
    let h = Harness::new();
    let item = h.item(1).await;
    let loan = h.borrow_for(&member(1), item.id, 7).await.unwrap();

    h.clock.advance(Duration::days(6));
    let returned = h.services.loans.direct_return(&staff(), loan.id).await.unwrap();
    assert_eq!(returned.fine_amount, Decimal::ZERO);
    assert_eq!(h.copies_on_loan(item.id).await, 0);
}

#[tokio::test]
async fn member_request_then_staff_approval() {
    let h = Harness::new();
    let item = h.item(1).await;
    let alice = member(1);
    let loan = h.borrow(&alice, item.id).await.unwrap();

    let pending = h.services.loans.request_return(&alice, loan.id).await.unwrap();
    assert_eq!(pending.status, LoanStatus::PendingReturn);
    // Copy stays out until staff confirm
    assert_eq!(h.copies_on_loan(item.id).await, 1);

    let by_member = h.services.loans.approve_return(&member(2), loan.id).await;
    assert!(matches!(by_member, Err(AppError::Forbidden(_))));
    let by_borrower = h.services.loans.approve_return(&alice, loan.id).await;
    assert!(matches!(by_borrower, Err(AppError::Forbidden(_))));

    let returned = h.services.loans.approve_return(&staff(), loan.id).await.unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(h.copies_on_loan(item.id).await, 0);
}

#[tokio::test]
async fn only_the_borrower_may_request_a_return() {
    let h = Harness::new();
    let item = h.item(1).await;
    let loan = h.borrow(&member(1), item.id).await.unwrap();

    let result = h.services.loans.request_return(&member(2), loan.id).await;
    assert!(matches!(
        result,
        Err(AppError::NotOwner { loan_id, actor_id: 2 }) if loan_id == loan.id
    ));
    let unchanged = h.services.loans.get_loan(&staff(), loan.id).await.unwrap();
    assert_eq!(unchanged.status, LoanStatus::Active);
}

#[tokio::test]
async fn return_request_needs_an_active_loan() {
    let h = Harness::new();
    let item = h.item(2).await;
    let alice = member(1);

    let pending = h.borrow(&alice, item.id).await.unwrap();
    h.services.loans.request_return(&alice, pending.id).await.unwrap();
    let again = h.services.loans.request_return(&alice, pending.id).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    let late = h.borrow_for(&alice, item.id, 1).await.unwrap();
    h.clock.advance(Duration::days(3));
    h.services.loans.recompute_overdue().await.unwrap();
    let overdue = h.services.loans.request_return(&alice, late.id).await;
    assert!(matches!(overdue, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn sweep_leaves_pending_returns_alone() {
    let h = Harness::new();
    let item = h.item(1).await;
    let alice = member(1);
    let loan = h.borrow_for(&alice, item.id, 2).await.unwrap();
    h.services.loans.request_return(&alice, loan.id).await.unwrap();

    h.clock.advance(Duration::days(5));
    assert_eq!(h.services.loans.recompute_overdue().await.unwrap(), 0);
    let still = h.services.loans.get_loan(&alice, loan.id).await.unwrap();
    assert_eq!(still.status, LoanStatus::PendingReturn);

    let returned = h.services.loans.approve_return(&staff(), loan.id).await.unwrap();
    assert_eq!(returned.fine_amount, dec("1.50"));
}

#[tokio::test]
async fn returned_loans_are_terminal() {
    let h = Harness::new();
    let item = h.item(2).await;
    let first = h.borrow(&member(1), item.id).await.unwrap();
    h.borrow(&member(2), item.id).await.unwrap();

    h.services.loans.approve_return(&staff(), first.id).await.unwrap();
    assert_eq!(h.copies_on_loan(item.id).await, 1);

    let approve = h.services.loans.approve_return(&staff(), first.id).await;
    assert!(matches!(approve, Err(AppError::InvalidState(_))));
    let direct = h.services.loans.direct_return(&staff(), first.id).await;
    assert!(matches!(direct, Err(AppError::InvalidState(_))));
    let request = h.services.loans.request_return(&member(1), first.id).await;
    assert!(matches!(request, Err(AppError::InvalidState(_))));

    // The second loan still holds its copy
    assert_eq!(h.copies_on_loan(item.id).await, 1);
}

#[tokio::test]
async fn transitions_on_unknown_loans_are_rejected() {
    let h = Harness::new();

    let approve = h.services.loans.approve_return(&staff(), 404).await;
    assert!(matches!(approve, Err(AppError::InvalidState(_))));
    let request = h.services.loans.request_return(&member(1), 404).await;
    assert!(matches!(request, Err(AppError::InvalidState(_))));

    let read = h.services.loans.get_loan(&staff(), 404).await;
    assert!(matches!(read, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn borrowing_an_unknown_item_writes_nothing() {
    let h = Harness::new();

    let result = h.borrow(&member(1), 77).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    let loans = h
        .services
        .loans
        .list_loans(&staff(), LoanQuery::default())
        .await
        .unwrap();
    assert!(loans.is_empty());
}

#[tokio::test]
async fn item_without_copies_is_never_lendable() {
    let h = Harness::new();
    let item = h.item(0).await;

    let result = h.borrow(&member(1), item.id).await;
    assert!(matches!(result, Err(AppError::ItemUnavailable { .. })));
    assert_eq!(h.copies_on_loan(item.id).await, 0);
}

#[tokio::test]
async fn staff_borrow_on_behalf_of_members() {
    let h = Harness::new();
    let item = h.item(3).await;
    let loans = &h.services.loans;

    let loan = loans
        .create_loan(
            &staff(),
            CreateLoan {
                item_id: item.id,
                borrower_id: Some(9),
                loan_period_days: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(loan.borrower_id, 9);
    assert_eq!(loan.due_at - loan.borrowed_at, Duration::days(21));

    let no_borrower = loans
        .create_loan(
            &staff(),
            CreateLoan {
                item_id: item.id,
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(no_borrower, Err(AppError::Validation(_))));

    let for_themselves = loans
        .create_loan(
            &staff(),
            CreateLoan {
                item_id: item.id,
                borrower_id: Some(LIBRARIAN_ID),
                loan_period_days: None,
            },
        )
        .await;
    assert!(matches!(for_themselves, Err(AppError::Forbidden(_))));

    let for_someone_else = loans
        .create_loan(
            &member(1),
            CreateLoan {
                item_id: item.id,
                borrower_id: Some(2),
                loan_period_days: None,
            },
        )
        .await;
    assert!(matches!(for_someone_else, Err(AppError::Forbidden(_))));

    assert_eq!(h.copies_on_loan(item.id).await, 1);
}

#[tokio::test]
async fn loan_period_must_be_within_bounds() {
    let h = Harness::with_config(LoansConfig {
        max_loan_period_days: 30,
        ..LoansConfig::default()
    });
    let item = h.item(1).await;

    assert!(matches!(
        h.borrow_for(&member(1), item.id, 0).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.borrow_for(&member(1), item.id, 31).await,
        Err(AppError::Validation(_))
    ));
    assert_eq!(h.copies_on_loan(item.id).await, 0);

    let loan = h.borrow_for(&member(1), item.id, 30).await.unwrap();
    assert_eq!(loan.due_at - loan.borrowed_at, Duration::days(30));
}

#[tokio::test]
async fn members_only_see_their_own_loans() {
    let h = Harness::new();
    let item = h.item(3).await;
    let (alice, bob) = (member(1), member(2));
    let mine = h.borrow(&alice, item.id).await.unwrap();
    let theirs = h.borrow(&bob, item.id).await.unwrap();

    let listed = h
        .services
        .loans
        .list_loans(&alice, LoanQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);

    let snooping = h
        .services
        .loans
        .list_loans(
            &alice,
            LoanQuery {
                borrower_id: Some(2),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(snooping, Err(AppError::Forbidden(_))));

    let read = h.services.loans.get_loan(&alice, theirs.id).await;
    assert!(matches!(read, Err(AppError::NotOwner { .. })));
}

#[tokio::test]
async fn staff_filter_loans_by_status_and_item() {
    let h = Harness::new();
    let first = h.item(2).await;
    let second = h.item(2).await;

    let done = h.borrow(&member(1), first.id).await.unwrap();
    h.borrow(&member(2), first.id).await.unwrap();
    h.borrow(&member(3), second.id).await.unwrap();
    h.services.loans.direct_return(&staff(), done.id).await.unwrap();

    let returned = h
        .services
        .loans
        .list_loans(
            &staff(),
            LoanQuery {
                status: Some(LoanStatus::Returned),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].id, done.id);

    let on_first = h
        .services
        .loans
        .list_loans(
            &staff(),
            LoanQuery {
                item_id: Some(first.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(on_first.len(), 2);
}

#[tokio::test]
async fn stats_count_loans_by_status() {
    let h = Harness::new();
    let item = h.item(4).await;
    let alice = member(1);

    let returned = h.borrow(&alice, item.id).await.unwrap();
    let pending = h.borrow(&alice, item.id).await.unwrap();
    h.borrow(&alice, item.id).await.unwrap();
    h.borrow_for(&alice, item.id, 1).await.unwrap();

    h.services.loans.direct_return(&staff(), returned.id).await.unwrap();
    h.services.loans.request_return(&alice, pending.id).await.unwrap();
    h.clock.advance(Duration::days(2));
    h.services.loans.recompute_overdue().await.unwrap();

    let stats = h.services.loans.stats(&staff()).await.unwrap();
    assert_eq!(
        (stats.active, stats.pending_return, stats.overdue, stats.returned),
        (1, 1, 1, 1)
    );
    assert_eq!(i64::from(h.copies_on_loan(item.id).await), stats.outstanding());

    assert!(matches!(
        h.services.loans.stats(&alice).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn availability_reflects_outstanding_loans() {
    let h = Harness::new();
    let item = h.item(3).await;
    h.borrow(&member(1), item.id).await.unwrap();

    let availability = h.services.catalog.availability(item.id).await.unwrap();
    assert_eq!(availability.total_copies, 3);
    assert_eq!(availability.copies_on_loan, 1);
    assert_eq!(availability.available, 2);
}
