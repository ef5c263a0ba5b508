//! Таблицы допустимых переходов для бронирования, заявки на выселение,
//! комнаты и счёта.
//!
//! | Ось               | Из                 | Действие         | В                   |
//! |-------------------|--------------------|------------------|---------------------|
//! | одобрение         | Pending            | Approve          | Approved            |
//! | одобрение         | Pending            | Reject           | Rejected            |
//! | выселение         | нет заявки         | RequestCheckout  | Pending             |
//! | выселение         | Rejected           | RequestCheckout  | Pending             |
//! | выселение         | Pending            | ApproveCheckout  | Approved + CheckedOut |
//! | выселение         | Pending            | RejectCheckout   | Rejected            |
//! | счёт              | Unpaid             | SubmitPayment    | PendingVerification |
//! | счёт              | PendingVerification| VerifyPayment    | Paid                |
//! | счёт              | PendingVerification| RejectPayment    | Unpaid              |
//! | счёт              | Unpaid             | MarkPaid         | Paid                |
//! | счёт              | Unpaid             | Edit/RefreshFine | Unpaid              |
//!
//! Всё, чего нет в таблице, отклоняется с `Conflict`.

use std::fmt;

use crate::error::{AppError, AppResult};
use crate::models::{
    ApproveStatus, BillStatus, Booking, CheckoutStatus, ReturnApprovalStatus, Room, RoomStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Approve,
    Reject,
    CheckIn,
    RequestCheckout,
    ApproveCheckout,
    RejectCheckout,
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingAction::Approve => "approve",
            BookingAction::Reject => "reject",
            BookingAction::CheckIn => "check_in",
            BookingAction::RequestCheckout => "request_checkout",
            BookingAction::ApproveCheckout => "approve_checkout",
            BookingAction::RejectCheckout => "reject_checkout",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillAction {
    SubmitPayment,
    VerifyPayment,
    RejectPayment,
    MarkPaid,
    Edit,
    RefreshFine,
}

impl fmt::Display for BillAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BillAction::SubmitPayment => "submit_payment",
            BillAction::VerifyPayment => "verify_payment",
            BillAction::RejectPayment => "reject_payment",
            BillAction::MarkPaid => "mark_paid",
            BillAction::Edit => "edit",
            BillAction::RefreshFine => "refresh_fine",
        };
        write!(f, "{}", name)
    }
}

/// Статусные поля бронирования
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingState {
    pub approve: ApproveStatus,
    pub checked_in: bool,
    pub return_approval: Option<ReturnApprovalStatus>,
    pub checkout: CheckoutStatus,
}

impl BookingState {
    pub fn of(booking: &Booking) -> Self {
        Self {
            approve: booking.approve_status,
            checked_in: booking.actual_checkin.is_some(),
            return_approval: booking.return_approval_status,
            checkout: booking.checkout_status,
        }
    }
}

const APPROVAL_TRANSITIONS: &[(ApproveStatus, BookingAction, ApproveStatus)] = &[
    (ApproveStatus::Pending, BookingAction::Approve, ApproveStatus::Approved),
    (ApproveStatus::Pending, BookingAction::Reject, ApproveStatus::Rejected),
];

const RETURN_TRANSITIONS: &[(
    Option<ReturnApprovalStatus>,
    BookingAction,
    ReturnApprovalStatus,
)] = &[
    (None, BookingAction::RequestCheckout, ReturnApprovalStatus::Pending),
    (
        Some(ReturnApprovalStatus::Rejected),
        BookingAction::RequestCheckout,
        ReturnApprovalStatus::Pending,
    ),
    (
        Some(ReturnApprovalStatus::Pending),
        BookingAction::ApproveCheckout,
        ReturnApprovalStatus::Approved,
    ),
    (
        Some(ReturnApprovalStatus::Pending),
        BookingAction::RejectCheckout,
        ReturnApprovalStatus::Rejected,
    ),
];

const BILL_TRANSITIONS: &[(BillStatus, BillAction, BillStatus)] = &[
    (BillStatus::Unpaid, BillAction::SubmitPayment, BillStatus::PendingVerification),
    (BillStatus::PendingVerification, BillAction::VerifyPayment, BillStatus::Paid),
    (BillStatus::PendingVerification, BillAction::RejectPayment, BillStatus::Unpaid),
    (BillStatus::Unpaid, BillAction::MarkPaid, BillStatus::Paid),
    (BillStatus::Unpaid, BillAction::Edit, BillStatus::Unpaid),
    (BillStatus::Unpaid, BillAction::RefreshFine, BillStatus::Unpaid),
];

fn rejected(action: impl fmt::Display, reason: &str) -> AppError {
    AppError::Conflict(format!("Действие {} недопустимо: {}", action, reason))
}

pub fn next_booking_state(current: BookingState, action: BookingAction) -> AppResult<BookingState> {
    if current.checkout == CheckoutStatus::CheckedOut {
        return Err(rejected(action, "жилец уже выселен, бронирование только для чтения"));
    }

    match action {
        BookingAction::Approve | BookingAction::Reject => APPROVAL_TRANSITIONS
            .iter()
            .find(|(from, a, _)| *from == current.approve && *a == action)
            .map(|(_, _, to)| BookingState {
                approve: *to,
                ..current
            })
            .ok_or_else(|| rejected(action, "бронирование уже рассмотрено")),
        BookingAction::CheckIn => {
            if current.approve != ApproveStatus::Approved {
                return Err(rejected(action, "бронирование не одобрено"));
            }
            if current.checked_in {
                return Err(rejected(action, "заселение уже отмечено"));
            }
            Ok(BookingState {
                checked_in: true,
                ..current
            })
        }
        BookingAction::RequestCheckout
        | BookingAction::ApproveCheckout
        | BookingAction::RejectCheckout => {
            if current.approve != ApproveStatus::Approved {
                return Err(rejected(action, "бронирование не одобрено"));
            }
            let to = RETURN_TRANSITIONS
                .iter()
                .find(|(from, a, _)| *from == current.return_approval && *a == action)
                .map(|(_, _, to)| *to)
                .ok_or_else(|| match action {
                    BookingAction::RequestCheckout => {
                        rejected(action, "заявка на выселение уже ожидает рассмотрения")
                    }
                    _ => rejected(action, "нет заявки на выселение в статусе ожидания"),
                })?;
            let checkout = if to == ReturnApprovalStatus::Approved {
                CheckoutStatus::CheckedOut
            } else {
                current.checkout
            };
            Ok(BookingState {
                return_approval: Some(to),
                checkout,
                ..current
            })
        }
    }
}

/// Переносит статусные поля в бронирование. Флаг заселения не трогается:
/// время заселения записывает вызывающий код.
pub fn apply_booking_state(booking: &mut Booking, state: BookingState) {
    booking.approve_status = state.approve;
    booking.return_approval_status = state.return_approval;
    booking.checkout_status = state.checkout;
}

pub fn next_bill_status(current: BillStatus, action: BillAction) -> AppResult<BillStatus> {
    BILL_TRANSITIONS
        .iter()
        .find(|(from, a, _)| *from == current && *a == action)
        .map(|(_, _, to)| *to)
        .ok_or_else(|| rejected(action, &format!("счёт в статусе {:?}", current)))
}

/// Занимает свободную комнату
pub fn occupy_room(room: &mut Room) -> AppResult<()> {
    if room.status != RoomStatus::Vacant {
        return Err(AppError::Conflict(format!(
            "Комната {} уже занята",
            room.number
        )));
    }
    room.status = RoomStatus::Occupied;
    Ok(())
}

/// Освобождает занятую комнату
pub fn release_room(room: &mut Room) -> AppResult<()> {
    if room.status != RoomStatus::Occupied {
        return Err(AppError::Conflict(format!(
            "Комната {} уже свободна",
            room.number
        )));
    }
    room.status = RoomStatus::Vacant;
    Ok(())
}

/// Удалять можно только бронирование без неоплаченных счетов и без
/// ожидающей заявки на выселение; история выселенных не удаляется.
pub fn ensure_booking_deletable(state: BookingState, unsettled_bills: i64) -> AppResult<()> {
    if state.checkout == CheckoutStatus::CheckedOut {
        return Err(AppError::Conflict(
            "Бронирование завершено и хранится в истории".to_string(),
        ));
    }
    if state.return_approval == Some(ReturnApprovalStatus::Pending) {
        return Err(AppError::Conflict(
            "Есть заявка на выселение, ожидающая рассмотрения".to_string(),
        ));
    }
    if unsettled_bills > 0 {
        return Err(AppError::Conflict(format!(
            "По бронированию есть неоплаченные счета: {}",
            unsettled_bills
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn pending() -> BookingState {
        BookingState {
            approve: ApproveStatus::Pending,
            checked_in: false,
            return_approval: None,
            checkout: CheckoutStatus::NotCheckedOut,
        }
    }

    fn approved() -> BookingState {
        BookingState {
            approve: ApproveStatus::Approved,
            ..pending()
        }
    }

    #[test]
    fn test_approval_transitions() {
        assert_eq!(
            next_booking_state(pending(), BookingAction::Approve)
                .unwrap()
                .approve,
            ApproveStatus::Approved
        );
        assert_eq!(
            next_booking_state(pending(), BookingAction::Reject)
                .unwrap()
                .approve,
            ApproveStatus::Rejected
        );

        let rejected = BookingState {
            approve: ApproveStatus::Rejected,
            ..pending()
        };
        for action in [BookingAction::Approve, BookingAction::Reject, BookingAction::CheckIn] {
            assert!(next_booking_state(rejected, action).unwrap_err().is_conflict());
        }
        assert!(next_booking_state(approved(), BookingAction::Approve).is_err());
    }

    #[test]
    fn test_check_in_only_once_and_only_when_approved() {
        assert!(next_booking_state(pending(), BookingAction::CheckIn).is_err());
        let checked_in = next_booking_state(approved(), BookingAction::CheckIn).unwrap();
        assert!(checked_in.checked_in);
        assert!(next_booking_state(checked_in, BookingAction::CheckIn)
            .unwrap_err()
            .is_conflict());
    }

    #[test]
    fn test_checkout_flow() {
        let requested = next_booking_state(approved(), BookingAction::RequestCheckout).unwrap();
        assert_eq!(requested.return_approval, Some(ReturnApprovalStatus::Pending));

        // Вторая заявка, пока первая не рассмотрена
        assert!(next_booking_state(requested, BookingAction::RequestCheckout).is_err());

        let refused = next_booking_state(requested, BookingAction::RejectCheckout).unwrap();
        assert_eq!(refused.return_approval, Some(ReturnApprovalStatus::Rejected));
        assert_eq!(refused.checkout, CheckoutStatus::NotCheckedOut);

        let again = next_booking_state(refused, BookingAction::RequestCheckout).unwrap();
        let done = next_booking_state(again, BookingAction::ApproveCheckout).unwrap();
        assert_eq!(done.return_approval, Some(ReturnApprovalStatus::Approved));
        assert_eq!(done.checkout, CheckoutStatus::CheckedOut);

        // После выселения бронирование неизменно
        assert!(next_booking_state(done, BookingAction::RequestCheckout).is_err());
        assert!(next_booking_state(done, BookingAction::ApproveCheckout).is_err());
    }

    #[test]
    fn test_checkout_decision_requires_pending_request() {
        assert!(next_booking_state(approved(), BookingAction::ApproveCheckout)
            .unwrap_err()
            .is_conflict());
        assert!(next_booking_state(approved(), BookingAction::RejectCheckout).is_err());
        assert!(next_booking_state(pending(), BookingAction::RequestCheckout).is_err());
    }

    #[test]
    fn test_bill_transitions() {
        use BillAction::*;
        use BillStatus::*;

        assert_eq!(next_bill_status(Unpaid, SubmitPayment).unwrap(), PendingVerification);
        assert_eq!(next_bill_status(PendingVerification, VerifyPayment).unwrap(), Paid);
        assert_eq!(next_bill_status(PendingVerification, RejectPayment).unwrap(), Unpaid);
        assert_eq!(next_bill_status(Unpaid, MarkPaid).unwrap(), Paid);

        assert!(next_bill_status(Paid, Edit).is_err());
        assert!(next_bill_status(PendingVerification, Edit).is_err());
        assert!(next_bill_status(Paid, RefreshFine).is_err());
        assert!(next_bill_status(Paid, SubmitPayment).is_err());
        assert!(next_bill_status(Unpaid, VerifyPayment).is_err());
    }

    #[test]
    fn test_room_occupancy() {
        let mut room = Room::new(
            "101".to_string(),
            Decimal::new(3000, 0),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        occupy_room(&mut room).unwrap();
        assert_eq!(room.status, RoomStatus::Occupied);
        assert!(occupy_room(&mut room).is_err());
        release_room(&mut room).unwrap();
        assert_eq!(room.status, RoomStatus::Vacant);
        assert!(release_room(&mut room).is_err());
    }

    #[test]
    fn test_booking_deletion_guard() {
        assert!(ensure_booking_deletable(pending(), 0).is_ok());
        assert!(ensure_booking_deletable(approved(), 1).is_err());

        let requested = next_booking_state(approved(), BookingAction::RequestCheckout).unwrap();
        assert!(ensure_booking_deletable(requested, 0).is_err());

        let done = next_booking_state(requested, BookingAction::ApproveCheckout).unwrap();
        assert!(ensure_booking_deletable(done, 0).is_err());
    }
}
