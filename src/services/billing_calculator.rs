//! Расчёт счёта за комнату: коммунальные услуги по счётчикам, сервисный сбор,
//! пеня за просрочку и справочное выделение НДС.
//!
//! Все функции чистые. Денежные значения округляются до двух знаков один раз,
//! на выходе; промежуточные суммы считаются точно.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::config::RateConfig;
use crate::error::{AppError, AppResult};
use crate::models::BillStatus;

/// НДС 7%, уже включённый в итоговую сумму
pub fn vat_rate() -> Decimal {
    Decimal::new(7, 2)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReadings {
    pub w_before: Decimal,
    pub w_after: Decimal,
    pub e_before: Decimal,
    pub e_after: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillQuote {
    pub w_units: Decimal,
    pub e_units: Decimal,
    pub water_cost: Decimal,
    pub electric_cost: Decimal,
    pub rent: Decimal,
    pub service: Decimal,
    pub overdue_days: i64,
    pub fine: Decimal,
    pub total: Decimal,
    pub vat: Decimal,
    pub before_vat: Decimal,
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Пеня начисляется только по неоплаченному счёту и только после срока оплаты
pub fn overdue_days(status: BillStatus, due_date: NaiveDate, today: NaiveDate) -> i64 {
    if status != BillStatus::Unpaid || today <= due_date {
        return 0;
    }
    (today - due_date).num_days().max(0)
}

pub fn fine_for(
    status: BillStatus,
    due_date: NaiveDate,
    today: NaiveDate,
    fine_per_day: Decimal,
) -> Decimal {
    Decimal::from(overdue_days(status, due_date, today)) * fine_per_day
}

/// Выделяет НДС из суммы, которая его уже включает. Итог не меняется.
pub fn vat_split(total: Decimal) -> (Decimal, Decimal) {
    let vat = total * vat_rate();
    (round_money(vat), round_money(total - vat))
}

pub fn total_of(
    rent: Decimal,
    service: Decimal,
    water_cost: Decimal,
    electric_cost: Decimal,
    fine: Decimal,
) -> Decimal {
    rent + service + water_cost + electric_cost + fine
}

fn meter_units(label: &str, before: Decimal, after: Decimal) -> AppResult<Decimal> {
    if before.is_sign_negative() && !before.is_zero() {
        return Err(AppError::Validation(format!(
            "Показание счётчика ({}) не может быть отрицательным",
            label
        )));
    }
    if after < before {
        return Err(AppError::Validation(format!(
            "Текущее показание счётчика ({}) меньше предыдущего: {} < {}",
            label, after, before
        )));
    }
    Ok(after - before)
}

/// Считает счёт по показаниям и тарифам на дату `today`
pub fn quote(
    readings: &MeterReadings,
    rent: Decimal,
    rates: &RateConfig,
    due_date: NaiveDate,
    status: BillStatus,
    today: NaiveDate,
) -> AppResult<BillQuote> {
    let w_units = meter_units("вода", readings.w_before, readings.w_after)?;
    let e_units = meter_units("электричество", readings.e_before, readings.e_after)?;

    if rent.is_sign_negative() && !rent.is_zero() {
        return Err(AppError::Validation(
            "Арендная плата не может быть отрицательной".to_string(),
        ));
    }

    let water_cost = w_units * rates.water_rate;
    let electric_cost = e_units * rates.electric_rate;
    let days = overdue_days(status, due_date, today);
    let fine = Decimal::from(days) * rates.overdue_fine_per_day;
    let total = total_of(rent, rates.service_fee, water_cost, electric_cost, fine);
    let (vat, before_vat) = vat_split(total);

    Ok(BillQuote {
        w_units,
        e_units,
        water_cost: round_money(water_cost),
        electric_cost: round_money(electric_cost),
        rent: round_money(rent),
        service: round_money(rates.service_fee),
        overdue_days: days,
        fine: round_money(fine),
        total: round_money(total),
        vat,
        before_vat,
    })
}
