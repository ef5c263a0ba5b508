mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{at, date, tenant, Dorm};
use dormitory_backend::error::AppError;
use dormitory_backend::models::{
    Bill, BillResponse, BillStatus, BillsQuery, CreateBillRequest, SubmitPaymentRequest,
    UpdateBillRequest,
};
use dormitory_backend::storage::{BillFilter, PersistenceStore};

fn bill_request(room_id: Uuid, month: (i32, u32), w_after: Decimal, e_after: Decimal) -> CreateBillRequest {
    CreateBillRequest {
        room_id,
        month: Some(date(month.0, month.1, 1)),
        w_before: None,
        w_after,
        e_before: None,
        e_after,
        due_date: None,
    }
}

fn assert_additive(bill: &Bill) {
    let sum = bill.rent + bill.service + bill.water_cost + bill.electric_cost + bill.fine;
    assert!((bill.total - sum).abs() <= dec!(0.01), "total {} != {}", bill.total, sum);
    assert!(bill.w_after >= bill.w_before);
    assert!(bill.e_after >= bill.e_before);
}

#[tokio::test]
async fn test_checkin_before_cutoff_bills_next_month_once() {
    let dorm = Dorm::new();
    let (room, booking) = dorm
        .occupied("101", &tenant(), at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;

    let eligibility = dorm
        .bills
        .check_eligibility(&dorm.admin, room.id, date(2025, 2, 14))
        .await
        .unwrap();
    assert!(eligibility.eligible);
    assert_eq!(eligibility.month, date(2025, 2, 1));
    assert_eq!(eligibility.cutoff, at(2025, 1, 25, 23) + chrono::Duration::seconds(59 * 60 + 59));

    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();
    assert_eq!(bill.month, date(2025, 2, 1));
    assert_eq!(bill.booking_id, Some(booking.id));
    assert_eq!(bill.due_date, date(2025, 2, 5));
    assert_eq!(bill.bill_status, BillStatus::Unpaid);

    // Второй счёт за тот же цикл
    let err = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(150), dec!(260)),
            at(2025, 2, 2, 9),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let eligibility = dorm
        .bills
        .check_eligibility(&dorm.admin, room.id, date(2025, 2, 1))
        .await
        .unwrap();
    assert!(!eligibility.eligible);

    let feb = dorm
        .store
        .list_bills(&BillFilter {
            room_id: Some(room.id),
            month: Some(date(2025, 2, 1)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(feb.len(), 1);
}

#[tokio::test]
async fn test_checkin_after_cutoff_starts_a_month_later() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("102", &tenant(), at(2025, 1, 28, 9), dec!(0), dec!(0))
        .await;

    let eligibility = dorm
        .bills
        .check_eligibility(&dorm.admin, room.id, date(2025, 2, 1))
        .await
        .unwrap();
    assert!(!eligibility.eligible);
    assert!(eligibility.reason.unwrap().contains("2025-03"));

    let err = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(10), dec!(10)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    dorm.bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 3), dec!(10), dec!(10)),
            at(2025, 3, 1, 9),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_room_without_active_booking_is_not_billable() {
    let dorm = Dorm::new();
    let room = dorm.room("103", dec!(3000)).await;
    let err = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(10), dec!(10)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let missing_month = CreateBillRequest {
        month: None,
        ..bill_request(room.id, (2025, 2), dec!(10), dec!(10))
    };
    assert!(matches!(
        dorm.bills
            .create_bill(&dorm.admin, missing_month, at(2025, 2, 1, 9))
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_bill_pricing_with_inclusive_vat() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("104", &tenant(), at(2025, 1, 10, 9), dec!(0), dec!(0))
        .await;

    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            CreateBillRequest {
                w_before: Some(dec!(100)),
                e_before: Some(dec!(200)),
                ..bill_request(room.id, (2025, 2), dec!(140), dec!(250))
            },
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();

    assert_eq!(bill.w_units, dec!(40));
    assert_eq!(bill.water_cost, dec!(760));
    assert_eq!(bill.e_units, dec!(50));
    assert_eq!(bill.electric_cost, dec!(350));
    assert_eq!(bill.rent, dec!(3000));
    assert_eq!(bill.service, dec!(200));
    assert_eq!(bill.fine, dec!(0));
    assert_eq!(bill.total, dec!(4310));
    assert_additive(&bill);

    let response = BillResponse::from(bill);
    assert_eq!(response.vat, dec!(301.70));
    assert_eq!(response.before_vat, dec!(4008.30));
    assert_eq!(response.total, dec!(4310));
}

#[tokio::test]
async fn test_previous_readings_come_from_last_bill_then_baseline() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("105", &tenant(), at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;

    let feb = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();
    assert_eq!((feb.w_before, feb.e_before), (dec!(100), dec!(200)));
    assert_eq!(feb.total, dec!(4310));

    let mar = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 3), dec!(150), dec!(270)),
            at(2025, 3, 1, 9),
        )
        .await
        .unwrap();
    assert_eq!((mar.w_before, mar.e_before), (dec!(140), dec!(250)));
    assert_eq!(mar.w_units, dec!(10));
    assert_eq!(mar.e_units, dec!(20));
    assert_additive(&mar);
}

#[tokio::test]
async fn test_meter_rollback_is_rejected_not_clamped() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("106", &tenant(), at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;

    let err = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(90), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(dorm
        .store
        .list_bills(&BillFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_meter_readings_finer_than_storage_are_rejected() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("116", &tenant(), at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;

    let err = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140.0005), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Три знака после запятой сохраняются без округления
    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140.125), dec!(250.5000)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();
    assert_eq!(bill.w_units, bill.w_after - bill.w_before);
    assert_eq!(bill.w_units, dec!(40.125));

    let err = dorm
        .bills
        .update_bill(
            &dorm.admin,
            bill.id,
            UpdateBillRequest {
                w_before: Some(dec!(100.0001)),
                w_after: dec!(141),
                e_before: None,
                e_after: dec!(251),
                due_date: None,
            },
            at(2025, 2, 2, 9),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let stored = dorm.store.find_bill(bill.id).await.unwrap().unwrap();
    assert_eq!(stored.w_after, dec!(140.125));
}

#[tokio::test]
async fn test_overdue_fine_is_an_explicit_write() {
    let dorm = Dorm::new();
    let somchai = tenant();
    let (room, _) = dorm
        .occupied("107", &somchai, at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;
    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 3), dec!(140), dec!(250)),
            at(2025, 3, 1, 9),
        )
        .await
        .unwrap();
    assert_eq!(bill.due_date, date(2025, 3, 5));

    // Чтение ничего не пересчитывает
    let first = dorm.bills.get_bill(&somchai, bill.id).await.unwrap();
    let second = dorm.bills.get_bill(&somchai, bill.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fine, dec!(0));

    let on_time = dorm
        .bills
        .refresh_fine(&dorm.admin, bill.id, at(2025, 3, 5, 18))
        .await
        .unwrap();
    assert_eq!(on_time.fine, dec!(0));

    let overdue = dorm
        .bills
        .refresh_fine(&dorm.admin, bill.id, at(2025, 3, 10, 9))
        .await
        .unwrap();
    assert_eq!(overdue.fine, dec!(250));
    assert_eq!(overdue.total, dec!(4560));
    assert_additive(&overdue);

    let paid = dorm
        .bills
        .mark_paid(&dorm.admin, bill.id, at(2025, 3, 11, 9))
        .await
        .unwrap();
    assert_eq!(paid.bill_status, BillStatus::Paid);
    assert_eq!(paid.paid_at, Some(at(2025, 3, 11, 9)));
    // Оплаченный счёт без пени, итог пересчитан в той же записи
    assert_eq!(paid.fine, dec!(0));
    assert_eq!(paid.total, dec!(4310));
    assert_additive(&paid);

    assert!(dorm
        .bills
        .refresh_fine(&dorm.admin, bill.id, at(2025, 4, 1, 9))
        .await
        .unwrap_err()
        .is_conflict());
    let stored = dorm.store.find_bill(bill.id).await.unwrap().unwrap();
    assert_eq!(stored.fine, dec!(0));
    assert_eq!(stored.total, dec!(4310));
}

#[tokio::test]
async fn test_edit_only_while_unpaid() {
    let dorm = Dorm::new();
    let somchai = tenant();
    let (room, _) = dorm
        .occupied("108", &somchai, at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;
    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();

    let edited = dorm
        .bills
        .update_bill(
            &dorm.admin,
            bill.id,
            UpdateBillRequest {
                w_before: None,
                w_after: dec!(150),
                e_before: None,
                e_after: dec!(250),
                due_date: None,
            },
            at(2025, 2, 2, 9),
        )
        .await
        .unwrap();
    assert_eq!(edited.w_units, dec!(50));
    assert_eq!(edited.water_cost, dec!(950));
    assert_eq!(edited.total, dec!(4500));
    assert_additive(&edited);

    dorm.bills
        .submit_payment(
            &somchai,
            bill.id,
            SubmitPaymentRequest {
                slip_url: "https://slips.example/1.jpg".to_string(),
            },
        )
        .await
        .unwrap();

    let err = dorm
        .bills
        .update_bill(
            &dorm.admin,
            bill.id,
            UpdateBillRequest {
                w_before: None,
                w_after: dec!(160),
                e_before: None,
                e_after: dec!(250),
                due_date: None,
            },
            at(2025, 2, 3, 9),
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_payment_verification_flow() {
    let dorm = Dorm::new();
    let somchai = tenant();
    let (room, _) = dorm
        .occupied("109", &somchai, at(2025, 1, 10, 9), dec!(100), dec!(200))
        .await;
    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(140), dec!(250)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();
    let slip = |url: &str| SubmitPaymentRequest {
        slip_url: url.to_string(),
    };

    assert!(matches!(
        dorm.bills.submit_payment(&somchai, bill.id, slip("  ")).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        dorm.bills.submit_payment(&tenant(), bill.id, slip("s/1.jpg")).await,
        Err(AppError::Forbidden)
    ));

    let submitted = dorm
        .bills
        .submit_payment(&somchai, bill.id, slip("s/1.jpg"))
        .await
        .unwrap();
    assert_eq!(submitted.bill_status, BillStatus::PendingVerification);
    assert_eq!(submitted.payment_slip_url.as_deref(), Some("s/1.jpg"));

    let rejected = dorm
        .bills
        .verify_payment(&dorm.admin, bill.id, false, at(2025, 2, 3, 9))
        .await
        .unwrap();
    assert_eq!(rejected.bill_status, BillStatus::Unpaid);
    assert!(rejected.payment_slip_url.is_none());
    assert!(rejected.paid_at.is_none());

    let overdue = dorm
        .bills
        .refresh_fine(&dorm.admin, bill.id, at(2025, 2, 8, 9))
        .await
        .unwrap();
    assert_eq!(overdue.fine, dec!(150));

    dorm.bills
        .submit_payment(&somchai, bill.id, slip("s/2.jpg"))
        .await
        .unwrap();
    let paid = dorm
        .bills
        .verify_payment(&dorm.admin, bill.id, true, at(2025, 2, 9, 9))
        .await
        .unwrap();
    assert_eq!(paid.bill_status, BillStatus::Paid);
    assert_eq!(paid.paid_at, Some(at(2025, 2, 9, 9)));
    assert_eq!(paid.fine, dec!(0));
    assert_eq!(paid.total, bill.total);

    // Повторная проверка оплаченного счёта
    assert!(dorm
        .bills
        .verify_payment(&dorm.admin, bill.id, true, at(2025, 2, 10, 9))
        .await
        .unwrap_err()
        .is_conflict());
}

#[tokio::test]
async fn test_tenant_sees_only_own_bills() {
    let dorm = Dorm::new();
    let somchai = tenant();
    let malee = tenant();
    let (room_a, _) = dorm
        .occupied("110", &somchai, at(2025, 1, 10, 9), dec!(0), dec!(0))
        .await;
    let (room_b, _) = dorm
        .occupied("111", &malee, at(2025, 1, 10, 9), dec!(0), dec!(0))
        .await;
    let own = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room_a.id, (2025, 2), dec!(1), dec!(1)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();
    let other = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room_b.id, (2025, 2), dec!(1), dec!(1)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();

    let listed = dorm
        .bills
        .list_bills(&somchai, BillsQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, own.id);
    assert_eq!(
        dorm.bills
            .list_bills(&dorm.admin, BillsQuery::default())
            .await
            .unwrap()
            .len(),
        2
    );
    assert!(matches!(
        dorm.bills.get_bill(&somchai, other.id).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        dorm.bills
            .create_bill(
                &somchai,
                bill_request(room_a.id, (2025, 3), dec!(2), dec!(2)),
                at(2025, 3, 1, 9)
            )
            .await,
        Err(AppError::Forbidden)
    ));
}

#[tokio::test]
async fn test_room_deletion_requires_settled_history() {
    let dorm = Dorm::new();
    let somchai = tenant();
    let (room, booking) = dorm
        .occupied("112", &somchai, at(2025, 1, 10, 9), dec!(0), dec!(0))
        .await;
    let bill = dorm
        .bills
        .create_bill(
            &dorm.admin,
            bill_request(room.id, (2025, 2), dec!(1), dec!(1)),
            at(2025, 2, 1, 9),
        )
        .await
        .unwrap();

    assert!(dorm
        .rooms
        .delete(&dorm.admin, room.id)
        .await
        .unwrap_err()
        .is_conflict());

    dorm.bookings
        .request_checkout(
            &somchai,
            booking.id,
            dormitory_backend::models::CheckoutRequest {
                checkout_date: Some(date(2025, 2, 28)),
            },
        )
        .await
        .unwrap();
    dorm.bookings
        .approve_checkout(&dorm.admin, booking.id, at(2025, 2, 28, 12))
        .await
        .unwrap();

    // Комната свободна, но счёт ещё не оплачен
    assert!(dorm
        .rooms
        .delete(&dorm.admin, room.id)
        .await
        .unwrap_err()
        .is_conflict());

    dorm.bills
        .mark_paid(&dorm.admin, bill.id, at(2025, 3, 1, 9))
        .await
        .unwrap();
    dorm.rooms.delete(&dorm.admin, room.id).await.unwrap();
    assert!(dorm.store.find_room(room.id).await.unwrap().is_none());
    assert!(dorm.store.find_bill(bill.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_every_stored_bill_is_additive() {
    let dorm = Dorm::new();
    let (room, _) = dorm
        .occupied("113", &tenant(), at(2024, 12, 1, 9), dec!(0.5), dec!(10.25))
        .await;
    let mut w = dec!(0.5);
    let mut e = dec!(10.25);
    for month in 1..=6 {
        w += dec!(3.333);
        e += dec!(17.777);
        dorm.bills
            .create_bill(
                &dorm.admin,
                bill_request(room.id, (2025, month), w, e),
                at(2025, month, 20, 9),
            )
            .await
            .unwrap();
    }

    let bills = dorm.store.list_bills(&BillFilter::default()).await.unwrap();
    assert_eq!(bills.len(), 6);
    for bill in &bills {
        assert_additive(bill);
        assert!(bill.total.scale() <= 2);
    }
}
