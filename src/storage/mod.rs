//! Хранилище комнат, бронирований и счетов.
//!
//! Чтение вне транзакции идёт без блокировок. Любая запись выполняется внутри
//! `StoreTransaction`: строки перечитываются с блокировкой, а обновление
//! проходит только при совпадении версии строки, иначе возвращается `Conflict`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ApproveStatus, Bill, BillStatus, Booking, CheckoutStatus, Room, RoomStatus};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub room_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub approve_status: Option<ApproveStatus>,
    pub checkout_status: Option<CheckoutStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.room_id.map_or(true, |id| booking.room_id == id)
            && self.customer_id.map_or(true, |id| booking.customer_id == id)
            && self
                .approve_status
                .map_or(true, |s| booking.approve_status == s)
            && self
                .checkout_status
                .map_or(true, |s| booking.checkout_status == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillFilter {
    pub room_id: Option<Uuid>,
    pub booking_ids: Option<Vec<Uuid>>,
    pub month: Option<NaiveDate>,
    pub bill_status: Option<BillStatus>,
}

impl BillFilter {
    pub fn matches(&self, bill: &Bill) -> bool {
        self.room_id.map_or(true, |id| bill.room_id == id)
            && self.booking_ids.as_ref().map_or(true, |ids| {
                bill.booking_id.map_or(false, |id| ids.contains(&id))
            })
            && self.month.map_or(true, |m| bill.month == m)
            && self.bill_status.map_or(true, |s| bill.bill_status == s)
    }
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn find_room(&self, id: Uuid) -> AppResult<Option<Room>>;
    async fn list_rooms(&self, status: Option<RoomStatus>) -> AppResult<Vec<Room>>;
    async fn find_booking(&self, id: Uuid) -> AppResult<Option<Booking>>;
    async fn list_bookings(&self, filter: &BookingFilter) -> AppResult<Vec<Booking>>;
    async fn find_bill(&self, id: Uuid) -> AppResult<Option<Bill>>;
    async fn list_bills(&self, filter: &BillFilter) -> AppResult<Vec<Bill>>;

    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>>;
}

/// Единица работы. Без `commit` все изменения отбрасываются.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn lock_room(&mut self, id: Uuid) -> AppResult<Option<Room>>;
    async fn lock_booking(&mut self, id: Uuid) -> AppResult<Option<Booking>>;
    async fn lock_bill(&mut self, id: Uuid) -> AppResult<Option<Bill>>;
    /// Все бронирования комнаты; берётся раньше блокировки самой комнаты
    async fn lock_bookings_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Booking>>;

    async fn active_booking_for_room(&mut self, room_id: Uuid) -> AppResult<Option<Booking>>;
    async fn find_bill_for_cycle(&mut self, room_id: Uuid, month: NaiveDate)
        -> AppResult<Option<Bill>>;
    async fn latest_bill_before(&mut self, room_id: Uuid, month: NaiveDate)
        -> AppResult<Option<Bill>>;
    async fn count_unsettled_bills_for_booking(&mut self, booking_id: Uuid) -> AppResult<i64>;
    async fn count_unsettled_bills_for_room(&mut self, room_id: Uuid) -> AppResult<i64>;

    async fn insert_room(&mut self, room: &Room) -> AppResult<()>;
    /// Записывает комнату, если версия в хранилище равна `room.version`
    async fn update_room(&mut self, room: &Room) -> AppResult<Room>;
    async fn delete_room(&mut self, id: Uuid) -> AppResult<()>;

    async fn insert_booking(&mut self, booking: &Booking) -> AppResult<()>;
    async fn update_booking(&mut self, booking: &Booking) -> AppResult<Booking>;
    async fn delete_booking(&mut self, id: Uuid) -> AppResult<()>;

    async fn insert_bill(&mut self, bill: &Bill) -> AppResult<()>;
    async fn update_bill(&mut self, bill: &Bill) -> AppResult<Bill>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

pub(crate) fn stale_write(entity: &str, id: Uuid) -> crate::error::AppError {
    crate::error::AppError::Conflict(format!(
        "{} {} был изменён другой операцией, повторите запрос",
        entity, id
    ))
}
