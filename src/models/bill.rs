use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::billing_calculator;

/// 0 = не оплачен, 1 = оплачен, 2 = оплата ожидает проверки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Unpaid = 0,
    Paid = 1,
    PendingVerification = 2,
}

impl Default for BillStatus {
    fn default() -> Self {
        Self::Unpaid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bill {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: Option<Uuid>,
    /// Первое число расчётного месяца
    pub month: NaiveDate,
    pub w_before: Decimal,
    pub w_after: Decimal,
    pub e_before: Decimal,
    pub e_after: Decimal,
    pub w_units: Decimal,
    pub e_units: Decimal,
    pub water_cost: Decimal,
    pub electric_cost: Decimal,
    pub rent: Decimal,
    pub service: Decimal,
    pub fine: Decimal,
    pub total: Decimal,
    pub due_date: NaiveDate,
    pub bill_status: BillStatus,
    pub payment_slip_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Счёт ещё не закрыт: не оплачен или оплата не подтверждена
    pub fn is_unsettled(&self) -> bool {
        self.bill_status != BillStatus::Paid
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    pub room_id: Uuid,
    /// Любой день расчётного месяца
    pub month: Option<NaiveDate>,
    pub w_before: Option<Decimal>,
    pub w_after: Decimal,
    pub e_before: Option<Decimal>,
    pub e_after: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillRequest {
    pub w_before: Option<Decimal>,
    pub w_after: Decimal,
    pub e_before: Option<Decimal>,
    pub e_after: Decimal,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitPaymentRequest {
    pub slip_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub approved: bool,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BillsQuery {
    pub room_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub month: Option<NaiveDate>,
    pub bill_status: Option<BillStatus>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EligibilityQuery {
    pub room_id: Option<Uuid>,
    /// `YYYY-MM` или любая дата месяца `YYYY-MM-DD`
    pub month: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EligibilityResponse {
    pub room_id: Uuid,
    pub month: NaiveDate,
    pub cutoff: DateTime<Utc>,
    pub eligible: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillResponse {
    pub id: Uuid,
    pub room_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub month: NaiveDate,
    pub w_before: Decimal,
    pub w_after: Decimal,
    pub e_before: Decimal,
    pub e_after: Decimal,
    pub w_units: Decimal,
    pub e_units: Decimal,
    pub water_cost: Decimal,
    pub electric_cost: Decimal,
    pub rent: Decimal,
    pub service: Decimal,
    pub fine: Decimal,
    pub total: Decimal,
    pub vat: Decimal,
    pub before_vat: Decimal,
    pub due_date: NaiveDate,
    pub bill_status: BillStatus,
    pub payment_slip_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Bill> for BillResponse {
    fn from(b: Bill) -> Self {
        let (vat, before_vat) = billing_calculator::vat_split(b.total);
        Self {
            id: b.id,
            room_id: b.room_id,
            booking_id: b.booking_id,
            month: b.month,
            w_before: b.w_before,
            w_after: b.w_after,
            e_before: b.e_before,
            e_after: b.e_after,
            w_units: b.w_units,
            e_units: b.e_units,
            water_cost: b.water_cost,
            electric_cost: b.electric_cost,
            rent: b.rent,
            service: b.service,
            fine: b.fine,
            total: b.total,
            vat,
            before_vat,
            due_date: b.due_date,
            bill_status: b.bill_status,
            payment_slip_url: b.payment_slip_url,
            paid_at: b.paid_at,
        }
    }
}
