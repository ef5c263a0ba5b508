//! Хранилище в памяти для тестов и локального запуска.
//!
//! Пишущие транзакции выполняются строго по одной: каждая держит мьютекс
//! записи, работает с копией состояния и при `commit` подменяет его целиком.
//! Чтение идёт из последнего зафиксированного состояния и не ждёт писателей.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{stale_write, BillFilter, BookingFilter, PersistenceStore, StoreTransaction};
use crate::error::{AppError, AppResult};
use crate::models::{Bill, Booking, Room, RoomStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rooms: HashMap<Uuid, Room>,
    bookings: HashMap<Uuid, Booking>,
    bills: HashMap<Uuid, Bill>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    committed: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Имитирует недоступность хранилища: новые транзакции не открываются
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn find_room(&self, id: Uuid) -> AppResult<Option<Room>> {
        Ok(self.committed.read().await.rooms.get(&id).cloned())
    }

    async fn list_rooms(&self, status: Option<RoomStatus>) -> AppResult<Vec<Room>> {
        let state = self.committed.read().await;
        let mut rooms: Vec<Room> = state
            .rooms
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(rooms)
    }

    async fn find_booking(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.committed.read().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        let state = self.committed.read().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn find_bill(&self, id: Uuid) -> AppResult<Option<Bill>> {
        Ok(self.committed.read().await.bills.get(&id).cloned())
    }

    async fn list_bills(&self, filter: &BillFilter) -> AppResult<Vec<Bill>> {
        let state = self.committed.read().await;
        let mut bills: Vec<Bill> = state
            .bills
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.month.cmp(&a.month));
        Ok(bills)
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let guard = self.writer.clone().lock_owned().await;
        let working = self.committed.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            committed: self.committed.clone(),
            working,
            _guard: guard,
        }))
    }
}

pub struct MemoryTransaction {
    committed: Arc<RwLock<MemoryState>>,
    working: MemoryState,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_room(&mut self, id: Uuid) -> AppResult<Option<Room>> {
        Ok(self.working.rooms.get(&id).cloned())
    }

    async fn lock_booking(&mut self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn lock_bill(&mut self, id: Uuid) -> AppResult<Option<Bill>> {
        Ok(self.working.bills.get(&id).cloned())
    }

    async fn lock_bookings_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .working
            .bookings
            .values()
            .filter(|b| b.room_id == room_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.id);
        Ok(bookings)
    }

    async fn active_booking_for_room(&mut self, room_id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self
            .working
            .bookings
            .values()
            .filter(|b| b.room_id == room_id && b.is_active())
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn find_bill_for_cycle(
        &mut self,
        room_id: Uuid,
        month: NaiveDate,
    ) -> AppResult<Option<Bill>> {
        Ok(self
            .working
            .bills
            .values()
            .find(|b| b.room_id == room_id && b.month == month)
            .cloned())
    }

    async fn latest_bill_before(
        &mut self,
        room_id: Uuid,
        month: NaiveDate,
    ) -> AppResult<Option<Bill>> {
        Ok(self
            .working
            .bills
            .values()
            .filter(|b| b.room_id == room_id && b.month < month)
            .max_by_key(|b| b.month)
            .cloned())
    }

    async fn count_unsettled_bills_for_booking(&mut self, booking_id: Uuid) -> AppResult<i64> {
        Ok(self
            .working
            .bills
            .values()
            .filter(|b| b.booking_id == Some(booking_id) && b.is_unsettled())
            .count() as i64)
    }

    async fn count_unsettled_bills_for_room(&mut self, room_id: Uuid) -> AppResult<i64> {
        Ok(self
            .working
            .bills
            .values()
            .filter(|b| b.room_id == room_id && b.is_unsettled())
            .count() as i64)
    }

    async fn insert_room(&mut self, room: &Room) -> AppResult<()> {
        if self.working.rooms.values().any(|r| r.number == room.number) {
            return Err(AppError::Conflict(
                "Комната с таким номером уже существует".to_string(),
            ));
        }
        self.working.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn update_room(&mut self, room: &Room) -> AppResult<Room> {
        let stored = self
            .working
            .rooms
            .get_mut(&room.id)
            .filter(|r| r.version == room.version)
            .ok_or_else(|| stale_write("Комната", room.id))?;
        *stored = Room {
            version: room.version + 1,
            updated_at: Utc::now(),
            ..room.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_room(&mut self, id: Uuid) -> AppResult<()> {
        self.working.rooms.remove(&id);
        self.working.bookings.retain(|_, b| b.room_id != id);
        self.working.bills.retain(|_, b| b.room_id != id);
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> AppResult<()> {
        if !self.working.rooms.contains_key(&booking.room_id) {
            return Err(AppError::NotFound("Комната не найдена".to_string()));
        }
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> AppResult<Booking> {
        let stored = self
            .working
            .bookings
            .get_mut(&booking.id)
            .filter(|b| b.version == booking.version)
            .ok_or_else(|| stale_write("Бронирование", booking.id))?;
        *stored = Booking {
            version: booking.version + 1,
            updated_at: Utc::now(),
            ..booking.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_booking(&mut self, id: Uuid) -> AppResult<()> {
        self.working.bookings.remove(&id);
        for bill in self.working.bills.values_mut() {
            if bill.booking_id == Some(id) {
                bill.booking_id = None;
            }
        }
        Ok(())
    }

    async fn insert_bill(&mut self, bill: &Bill) -> AppResult<()> {
        let duplicate = self
            .working
            .bills
            .values()
            .any(|b| b.room_id == bill.room_id && b.month == bill.month);
        if duplicate {
            return Err(AppError::Conflict(
                "Счёт за этот месяц для комнаты уже существует".to_string(),
            ));
        }
        self.working.bills.insert(bill.id, bill.clone());
        Ok(())
    }

    async fn update_bill(&mut self, bill: &Bill) -> AppResult<Bill> {
        let stored = self
            .working
            .bills
            .get_mut(&bill.id)
            .filter(|b| b.version == bill.version)
            .ok_or_else(|| stale_write("Счёт", bill.id))?;
        *stored = Bill {
            version: bill.version + 1,
            updated_at: Utc::now(),
            ..bill.clone()
        };
        Ok(stored.clone())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        *this.committed.write().await = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
