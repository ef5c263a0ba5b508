#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use dormitory_backend::config::{Config, RateConfig};
use dormitory_backend::error::{AppError, AppResult};
use dormitory_backend::middleware::AuthUser;
use dormitory_backend::models::{
    Booking, CheckinRequest, CreateBookingRequest, CreateRoomRequest, Room, RoomStatus, UserRole,
};
use dormitory_backend::services::{
    BillService, BookingService, NotificationService, RoomService, WebhookNotifier,
};
use dormitory_backend::storage::{BookingFilter, InMemoryStore, PersistenceStore};

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        database_max_connections: 1,
        jwt_secret: "test-secret".to_string(),
        jwt_access_expiry: 900,
        notify_enabled: false,
        notify_webhook_url: None,
        rates: RateConfig::default(),
        bill_due_day: 5,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: UserRole::Admin,
    }
}

pub fn tenant() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: UserRole::Tenant,
    }
}

/// Пересылает уведомления в канал, чтобы тест мог их дождаться
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<(Uuid, String)>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Uuid, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn notify(&self, recipient_id: Uuid, message: &str) -> AppResult<()> {
        let _ = self.tx.send((recipient_id, message.to_string()));
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl NotificationService for FailingNotifier {
    async fn notify(&self, _recipient_id: Uuid, _message: &str) -> AppResult<()> {
        Err(AppError::Notification("webhook is down".to_string()))
    }
}

pub struct Dorm {
    pub store: Arc<InMemoryStore>,
    pub rooms: RoomService,
    pub bookings: Arc<BookingService>,
    pub bills: BillService,
    pub admin: AuthUser,
}

impl Dorm {
    pub fn new() -> Self {
        Self::with_notifier(Arc::new(WebhookNotifier::new(test_config())))
    }

    pub fn with_notifier(notifier: Arc<dyn NotificationService>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = test_config();
        Self {
            rooms: RoomService::new(store.clone()),
            bookings: Arc::new(BookingService::new(store.clone(), notifier.clone())),
            bills: BillService::new(store.clone(), notifier, &config),
            admin: admin(),
            store,
        }
    }

    pub async fn room(&self, number: &str, rent: Decimal) -> Room {
        self.rooms
            .create(
                &self.admin,
                CreateRoomRequest {
                    number: number.to_string(),
                    rent,
                    deposit: Decimal::new(5000, 0),
                    booking_fee: Decimal::new(500, 0),
                },
            )
            .await
            .unwrap()
    }

    pub async fn book(&self, room: &Room, tenant: &AuthUser) -> Booking {
        self.bookings
            .create(
                tenant,
                CreateBookingRequest {
                    room_id: room.id,
                    full_name: "Somchai Jaidee".to_string(),
                    phone: "081-234-5678".to_string(),
                    checkin_date: Some(date(2025, 1, 10)),
                },
            )
            .await
            .unwrap()
    }

    /// Комната с одобренным бронированием и отмеченным заселением
    pub async fn occupied(
        &self,
        number: &str,
        tenant: &AuthUser,
        checked_in_at: DateTime<Utc>,
        water: Decimal,
        electric: Decimal,
    ) -> (Room, Booking) {
        let room = self.room(number, Decimal::new(3000, 0)).await;
        let booking = self.book(&room, tenant).await;
        self.bookings.approve(&self.admin, booking.id).await.unwrap();
        let booking = self
            .bookings
            .check_in(
                &self.admin,
                booking.id,
                CheckinRequest {
                    water_meter: water,
                    electric_meter: electric,
                    checked_in_at: Some(checked_in_at),
                },
                checked_in_at,
            )
            .await
            .unwrap();
        (room, booking)
    }

    pub async fn room_status(&self, room_id: Uuid) -> RoomStatus {
        self.store.find_room(room_id).await.unwrap().unwrap().status
    }

    /// Комната занята тогда и только тогда, когда есть ровно одно активное бронирование
    pub async fn assert_room_consistent(&self, room_id: Uuid) {
        let room = self.store.find_room(room_id).await.unwrap().unwrap();
        let active = self
            .store
            .list_bookings(&BookingFilter {
                room_id: Some(room_id),
                ..Default::default()
            })
            .await
            .unwrap()
            .into_iter()
            .filter(|b| b.is_active())
            .count();
        assert!(active <= 1, "room {} has {} active bookings", room.number, active);
        assert_eq!(
            room.status == RoomStatus::Occupied,
            active == 1,
            "room {} status {:?} with {} active bookings",
            room.number,
            room.status,
            active
        );
    }
}
