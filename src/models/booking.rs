use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::utils::validators::validate_phone_field;

/// 0 = на рассмотрении, 1 = одобрено, 2 = отклонено
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum ApproveStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

impl Default for ApproveStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Статус заявки на выселение. Отсутствие значения означает, что заявки не было.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum ReturnApprovalStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    NotCheckedOut = 0,
    CheckedOut = 1,
}

impl Default for CheckoutStatus {
    fn default() -> Self {
        Self::NotCheckedOut
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub room_id: Uuid,
    pub customer_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub checkin_date: NaiveDate,
    pub approve_status: ApproveStatus,
    pub actual_checkin: Option<DateTime<Utc>>,
    pub checkin_water_meter: Option<Decimal>,
    pub checkin_electric_meter: Option<Decimal>,
    pub checkout_date: Option<NaiveDate>,
    pub return_approval_status: Option<ReturnApprovalStatus>,
    pub checkout_status: CheckoutStatus,
    pub actual_checkout: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        room_id: Uuid,
        customer_id: Uuid,
        full_name: String,
        phone: String,
        checkin_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            room_id,
            customer_id,
            full_name,
            phone,
            checkin_date,
            approve_status: ApproveStatus::Pending,
            actual_checkin: None,
            checkin_water_meter: None,
            checkin_electric_meter: None,
            checkout_date: None,
            return_approval_status: None,
            checkout_status: CheckoutStatus::NotCheckedOut,
            actual_checkout: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Одобренное и ещё не выселенное бронирование удерживает комнату
    pub fn is_active(&self) -> bool {
        self.approve_status == ApproveStatus::Approved
            && self.checkout_status == CheckoutStatus::NotCheckedOut
    }

    pub fn has_pending_checkout(&self) -> bool {
        self.return_approval_status == Some(ReturnApprovalStatus::Pending)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    pub room_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "имя обязательно"))]
    pub full_name: String,
    #[validate(custom(function = "validate_phone_field"))]
    pub phone: String,
    pub checkin_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckinRequest {
    pub water_meter: Decimal,
    pub electric_meter: Decimal,
    pub checked_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub checkout_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookingsQuery {
    pub room_id: Option<Uuid>,
    pub approve_status: Option<ApproveStatus>,
    pub checkout_status: Option<CheckoutStatus>,
}
