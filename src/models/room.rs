use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Хранится в БД как SMALLINT: 0 = свободна, 1 = занята
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Vacant = 0,
    Occupied = 1,
}

impl Default for RoomStatus {
    fn default() -> Self {
        Self::Vacant
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Room {
    pub id: Uuid,
    pub number: String,
    pub rent: Decimal,
    pub deposit: Decimal,
    pub booking_fee: Decimal,
    pub status: RoomStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(number: String, rent: Decimal, deposit: Decimal, booking_fee: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number,
            rent,
            deposit,
            booking_fee,
            status: RoomStatus::Vacant,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 20, message = "номер комнаты обязателен"))]
    pub number: String,
    pub rent: Decimal,
    pub deposit: Decimal,
    pub booking_fee: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoomRequest {
    pub rent: Option<Decimal>,
    pub deposit: Option<Decimal>,
    pub booking_fee: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoomsQuery {
    pub status: Option<RoomStatus>,
}
