use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{stale_write, BillFilter, BookingFilter, PersistenceStore, StoreTransaction};
use crate::error::{AppError, AppResult};
use crate::models::{Bill, Booking, Room, RoomStatus};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 40P01 deadlock_detected, 40001 serialization_failure
const RETRYABLE_CODES: [&str; 2] = ["40P01", "40001"];

/// Взаимоблокировка или сбой сериализации: параллельная запись победила
fn lock_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| RETRYABLE_CODES.contains(&code.as_ref())) =>
        {
            tracing::warn!("Concurrent write aborted by database: {}", db.message());
            AppError::Conflict("Запись изменена параллельным запросом, повторите".to_string())
        }
        _ => AppError::Database(e),
    }
}

fn unique_violation(e: sqlx::Error, message: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => lock_error(e),
    }
}

#[async_trait]
impl PersistenceStore for PgStore {
    async fn find_room(&self, id: Uuid) -> AppResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(room)
    }

    async fn list_rooms(&self, status: Option<RoomStatus>) -> AppResult<Vec<Room>> {
        let rooms = sqlx::query_as::<_, Room>(
            r#"
            SELECT * FROM rooms
            WHERE ($1::smallint IS NULL OR status = $1)
            ORDER BY number
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn find_booking(&self, id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE ($1::uuid IS NULL OR room_id = $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::smallint IS NULL OR approve_status = $3)
              AND ($4::smallint IS NULL OR checkout_status = $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.room_id)
        .bind(filter.customer_id)
        .bind(filter.approve_status)
        .bind(filter.checkout_status)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn find_bill(&self, id: Uuid) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bill)
    }

    async fn list_bills(&self, filter: &BillFilter) -> AppResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE ($1::uuid IS NULL OR room_id = $1)
              AND ($2::uuid[] IS NULL OR booking_id = ANY($2))
              AND ($3::date IS NULL OR month = $3)
              AND ($4::smallint IS NULL OR bill_status = $4)
            ORDER BY month DESC, created_at DESC
            "#,
        )
        .bind(filter.room_id)
        .bind(filter.booking_ids.as_deref())
        .bind(filter.month)
        .bind(filter.bill_status)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    async fn begin(&self) -> AppResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_room(&mut self, id: Uuid) -> AppResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(lock_error)?;
        Ok(room)
    }

    async fn lock_booking(&mut self, id: Uuid) -> AppResult<Option<Booking>> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(lock_error)?;
        Ok(booking)
    }

    async fn lock_bill(&mut self, id: Uuid) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(lock_error)?;
        Ok(bill)
    }

    async fn lock_bookings_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE room_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(lock_error)?;
        Ok(bookings)
    }

    // Без FOR UPDATE: активность бронирования меняется только под блокировкой комнаты
    async fn active_booking_for_room(&mut self, room_id: Uuid) -> AppResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE room_id = $1 AND approve_status = 1 AND checkout_status = 0
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?;
        Ok(booking)
    }

    async fn find_bill_for_cycle(
        &mut self,
        room_id: Uuid,
        month: NaiveDate,
    ) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            "SELECT * FROM bills WHERE room_id = $1 AND month = $2 FOR UPDATE",
        )
        .bind(room_id)
        .bind(month)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?;
        Ok(bill)
    }

    async fn latest_bill_before(
        &mut self,
        room_id: Uuid,
        month: NaiveDate,
    ) -> AppResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT * FROM bills
            WHERE room_id = $1 AND month < $2
            ORDER BY month DESC
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .bind(month)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?;
        Ok(bill)
    }

    async fn count_unsettled_bills_for_booking(&mut self, booking_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bills WHERE booking_id = $1 AND bill_status <> 1")
                .bind(booking_id)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(lock_error)?;
        Ok(count)
    }

    async fn count_unsettled_bills_for_room(&mut self, room_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bills WHERE room_id = $1 AND bill_status <> 1")
                .bind(room_id)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(lock_error)?;
        Ok(count)
    }

    async fn insert_room(&mut self, room: &Room) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rooms (id, number, rent, deposit, booking_fee, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(room.id)
        .bind(&room.number)
        .bind(room.rent)
        .bind(room.deposit)
        .bind(room.booking_fee)
        .bind(room.status)
        .bind(room.version)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "Комната с таким номером уже существует"))?;
        Ok(())
    }

    async fn update_room(&mut self, room: &Room) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(
            r#"
            UPDATE rooms
            SET rent = $3, deposit = $4, booking_fee = $5, status = $6,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(room.id)
        .bind(room.version)
        .bind(room.rent)
        .bind(room.deposit)
        .bind(room.booking_fee)
        .bind(room.status)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?
        .ok_or_else(|| stale_write("Комната", room.id))
    }

    async fn delete_room(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(lock_error)?;
        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, room_id, customer_id, full_name, phone, checkin_date, approve_status,
                 actual_checkin, checkin_water_meter, checkin_electric_meter, checkout_date,
                 return_approval_status, checkout_status, actual_checkout, version,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(booking.id)
        .bind(booking.room_id)
        .bind(booking.customer_id)
        .bind(&booking.full_name)
        .bind(&booking.phone)
        .bind(booking.checkin_date)
        .bind(booking.approve_status)
        .bind(booking.actual_checkin)
        .bind(booking.checkin_water_meter)
        .bind(booking.checkin_electric_meter)
        .bind(booking.checkout_date)
        .bind(booking.return_approval_status)
        .bind(booking.checkout_status)
        .bind(booking.actual_checkout)
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(lock_error)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> AppResult<Booking> {
        sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET approve_status = $3, actual_checkin = $4, checkin_water_meter = $5,
                checkin_electric_meter = $6, checkout_date = $7, return_approval_status = $8,
                checkout_status = $9, actual_checkout = $10,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.version)
        .bind(booking.approve_status)
        .bind(booking.actual_checkin)
        .bind(booking.checkin_water_meter)
        .bind(booking.checkin_electric_meter)
        .bind(booking.checkout_date)
        .bind(booking.return_approval_status)
        .bind(booking.checkout_status)
        .bind(booking.actual_checkout)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?
        .ok_or_else(|| stale_write("Бронирование", booking.id))
    }

    async fn delete_booking(&mut self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(lock_error)?;
        Ok(())
    }

    async fn insert_bill(&mut self, bill: &Bill) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bills
                (id, room_id, booking_id, month, w_before, w_after, e_before, e_after,
                 w_units, e_units, water_cost, electric_cost, rent, service, fine, total,
                 due_date, bill_status, payment_slip_url, paid_at, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(bill.id)
        .bind(bill.room_id)
        .bind(bill.booking_id)
        .bind(bill.month)
        .bind(bill.w_before)
        .bind(bill.w_after)
        .bind(bill.e_before)
        .bind(bill.e_after)
        .bind(bill.w_units)
        .bind(bill.e_units)
        .bind(bill.water_cost)
        .bind(bill.electric_cost)
        .bind(bill.rent)
        .bind(bill.service)
        .bind(bill.fine)
        .bind(bill.total)
        .bind(bill.due_date)
        .bind(bill.bill_status)
        .bind(&bill.payment_slip_url)
        .bind(bill.paid_at)
        .bind(bill.version)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, "Счёт за этот месяц для комнаты уже существует"))?;
        Ok(())
    }

    async fn update_bill(&mut self, bill: &Bill) -> AppResult<Bill> {
        sqlx::query_as::<_, Bill>(
            r#"
            UPDATE bills
            SET w_before = $3, w_after = $4, e_before = $5, e_after = $6,
                w_units = $7, e_units = $8, water_cost = $9, electric_cost = $10,
                rent = $11, service = $12, fine = $13, total = $14, due_date = $15,
                bill_status = $16, payment_slip_url = $17, paid_at = $18,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(bill.id)
        .bind(bill.version)
        .bind(bill.w_before)
        .bind(bill.w_after)
        .bind(bill.e_before)
        .bind(bill.e_after)
        .bind(bill.w_units)
        .bind(bill.e_units)
        .bind(bill.water_cost)
        .bind(bill.electric_cost)
        .bind(bill.rent)
        .bind(bill.service)
        .bind(bill.fine)
        .bind(bill.total)
        .bind(bill.due_date)
        .bind(bill.bill_status)
        .bind(&bill.payment_slip_url)
        .bind(bill.paid_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(lock_error)?
        .ok_or_else(|| stale_write("Счёт", bill.id))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(lock_error)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.rollback().await.map_err(lock_error)?;
        Ok(())
    }
}
