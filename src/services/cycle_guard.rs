//! Допуск комнаты к выставлению счёта за расчётный месяц.
//!
//! Месяц `M` можно выставить, только если заселение по активному бронированию
//! произошло не позже 23:59:59 25-го числа месяца `M-1`. На одну пару
//! (комната, месяц) допускается ровно один счёт.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Bill, Booking};
use crate::services::state_machine::{next_bill_status, BillAction};
use crate::storage::StoreTransaction;

pub const CUTOFF_DAY: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NoActiveBooking,
    NotCheckedIn,
    CheckedInAfterCutoff { first_eligible: NaiveDate },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::NoActiveBooking => Some("В комнате нет активного бронирования".to_string()),
            Eligibility::NotCheckedIn => Some("Жилец ещё не заселился".to_string()),
            Eligibility::CheckedInAfterCutoff { first_eligible } => Some(format!(
                "Заселение после даты отсечки, первый доступный месяц: {}",
                first_eligible.format("%Y-%m")
            )),
        }
    }
}

/// Приводит любую дату к первому числу её месяца
pub fn billing_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Разбирает месяц из строки запроса: `2025-03` или `2025-03-17`
pub fn parse_month(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .map(billing_month)
        .map_err(|_| AppError::BadRequest(format!("Неверный формат месяца: {}", raw)))
}

fn shift_month(month: NaiveDate, delta: i32) -> AppResult<NaiveDate> {
    let month = billing_month(month);
    let shifted = if delta >= 0 {
        month.checked_add_months(Months::new(delta as u32))
    } else {
        month.checked_sub_months(Months::new(delta.unsigned_abs()))
    };
    shifted.ok_or_else(|| AppError::Validation(format!("Неверный расчётный месяц: {}", month)))
}

/// 23:59:59 25-го числа месяца, предшествующего расчётному
pub fn cutoff_for(month: NaiveDate) -> AppResult<DateTime<Utc>> {
    let previous = shift_month(month, -1)?;
    let naive = previous
        .with_day(CUTOFF_DAY)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .ok_or_else(|| AppError::Internal("Не удалось вычислить дату отсечки".to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Первый месяц, за который можно выставить счёт при заселении в `checkin`
pub fn first_eligible_month(checkin: DateTime<Utc>) -> AppResult<NaiveDate> {
    let next = shift_month(checkin.date_naive(), 1)?;
    if checkin <= cutoff_for(next)? {
        Ok(next)
    } else {
        shift_month(next, 1)
    }
}

pub fn evaluate(active_booking: Option<&Booking>, month: NaiveDate) -> AppResult<Eligibility> {
    let Some(booking) = active_booking else {
        return Ok(Eligibility::NoActiveBooking);
    };
    let Some(checkin) = booking.actual_checkin else {
        return Ok(Eligibility::NotCheckedIn);
    };

    if checkin <= cutoff_for(month)? {
        Ok(Eligibility::Eligible)
    } else {
        Ok(Eligibility::CheckedInAfterCutoff {
            first_eligible: first_eligible_month(checkin)?,
        })
    }
}

pub fn ensure_eligible(active_booking: Option<&Booking>, month: NaiveDate) -> AppResult<()> {
    let eligibility = evaluate(active_booking, month)?;
    match eligibility.reason() {
        None => Ok(()),
        Some(reason) => Err(AppError::Conflict(format!(
            "Комната не может получить счёт за {}: {}",
            month.format("%Y-%m"),
            reason
        ))),
    }
}

/// Проверяет внутри транзакции, что счёта за (комната, месяц) ещё нет
pub async fn ensure_cycle_free(
    tx: &mut dyn StoreTransaction,
    room_id: Uuid,
    month: NaiveDate,
) -> AppResult<()> {
    if let Some(existing) = tx.find_bill_for_cycle(room_id, billing_month(month)).await? {
        return Err(AppError::Conflict(format!(
            "Счёт за {} для этой комнаты уже существует ({})",
            month.format("%Y-%m"),
            existing.id
        )));
    }
    Ok(())
}

/// Пересчитать можно только неоплаченный счёт
pub fn ensure_editable(bill: &Bill) -> AppResult<()> {
    next_bill_status(bill.bill_status, BillAction::Edit).map(|_| ())
}
