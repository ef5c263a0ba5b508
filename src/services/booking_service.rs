//! Операции над бронированием: заявка, одобрение, заселение, выселение.
//!
//! Каждая запись идёт по одной схеме: прочитать строки, проверить переход по
//! таблице, открыть единицу работы, перечитать строки с блокировкой, проверить
//! переход ещё раз и записать всё вместе. Уведомление уходит после фиксации.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, require_owner_or_admin, require_tenant, AuthUser};
use crate::models::{
    Booking, BookingsQuery, CheckinRequest, CheckoutRequest, CreateBookingRequest, Room,
    RoomStatus,
};
use crate::services::coordinator::{revalidate, ConsistencyCoordinator};
use crate::services::notification_service::{DomainEvent, EventDispatcher, NotificationService};
use crate::services::state_machine::{
    apply_booking_state, ensure_booking_deletable, next_booking_state, occupy_room, release_room,
    BookingAction, BookingState,
};
use crate::storage::{BookingFilter, PersistenceStore};
use crate::utils::validators::{ensure_meter_reading, normalize_phone, sanitize_string};

fn allows(action: BookingAction) -> impl Fn(&Booking) -> AppResult<()> {
    move |b| next_booking_state(BookingState::of(b), action).map(|_| ())
}

fn room_is_vacant(room: &Room) -> AppResult<()> {
    if room.status != RoomStatus::Vacant {
        return Err(AppError::Conflict(format!(
            "Комната {} уже занята",
            room.number
        )));
    }
    Ok(())
}

pub struct BookingService {
    store: Arc<dyn PersistenceStore>,
    coordinator: ConsistencyCoordinator,
    events: EventDispatcher,
}

impl BookingService {
    pub fn new(store: Arc<dyn PersistenceStore>, notifier: Arc<dyn NotificationService>) -> Self {
        Self {
            coordinator: ConsistencyCoordinator::new(store.clone()),
            events: EventDispatcher::new(notifier),
            store,
        }
    }

    async fn load(&self, id: Uuid) -> AppResult<Booking> {
        self.store
            .find_booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Бронирование не найдено".to_string()))
    }

    async fn load_room(&self, id: Uuid) -> AppResult<Room> {
        self.store
            .find_room(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Комната не найдена".to_string()))
    }

    async fn room_number(&self, id: Uuid) -> String {
        match self.store.find_room(id).await {
            Ok(Some(room)) => room.number,
            _ => id.to_string(),
        }
    }

    pub async fn get(&self, actor: &AuthUser, id: Uuid) -> AppResult<Booking> {
        let booking = self.load(id).await?;
        require_owner_or_admin(actor, booking.customer_id)?;
        Ok(booking)
    }

    pub async fn list(&self, actor: &AuthUser, query: BookingsQuery) -> AppResult<Vec<Booking>> {
        let filter = BookingFilter {
            room_id: query.room_id,
            customer_id: if actor.is_admin() {
                None
            } else {
                Some(actor.user_id)
            },
            approve_status: query.approve_status,
            checkout_status: query.checkout_status,
        };
        self.store.list_bookings(&filter).await
    }

    pub async fn create(&self, actor: &AuthUser, req: CreateBookingRequest) -> AppResult<Booking> {
        require_tenant(actor)?;
        req.validate()?;
        let checkin_date = req
            .checkin_date
            .ok_or_else(|| AppError::Validation("Дата заселения обязательна".to_string()))?;

        let initial_room = self.load_room(req.room_id).await?;
        room_is_vacant(&initial_room)?;

        let booking = Booking::new(
            initial_room.id,
            actor.user_id,
            sanitize_string(&req.full_name),
            normalize_phone(&req.phone),
            checkin_date,
        );

        let mut uow = self.coordinator.begin("create_booking").await?;
        let result = async {
            let fresh = uow.tx().lock_room(initial_room.id).await?;
            revalidate(&initial_room, fresh, room_is_vacant)?;
            uow.tx().insert_booking(&booking).await
        }
        .await;
        uow.finish(result).await?;

        tracing::info!(
            "Booking {} created for room {} by {}",
            booking.id,
            booking.room_id,
            booking.customer_id
        );
        Ok(booking)
    }

    /// Одобрение занимает комнату в той же транзакции
    pub async fn approve(&self, actor: &AuthUser, id: Uuid) -> AppResult<Booking> {
        require_admin(actor)?;
        let initial = self.load(id).await?;
        allows(BookingAction::Approve)(&initial)?;
        let initial_room = self.load_room(initial.room_id).await?;
        room_is_vacant(&initial_room)?;

        let mut uow = self.coordinator.begin("approve_booking").await?;
        let result = async {
            let fresh = uow.tx().lock_booking(id).await?;
            let mut booking = revalidate(&initial, fresh, allows(BookingAction::Approve))?;
            let fresh_room = uow.tx().lock_room(booking.room_id).await?;
            let mut room = revalidate(&initial_room, fresh_room, room_is_vacant)?;
            if uow.tx().active_booking_for_room(room.id).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "У комнаты {} уже есть активное бронирование",
                    room.number
                )));
            }

            let state = next_booking_state(BookingState::of(&booking), BookingAction::Approve)?;
            apply_booking_state(&mut booking, state);
            occupy_room(&mut room)?;

            let booking = uow.tx().update_booking(&booking).await?;
            let room = uow.tx().update_room(&room).await?;
            Ok::<_, AppError>((booking, room))
        }
        .await;
        let (booking, room) = uow.finish(result).await?;

        tracing::info!("Booking {} approved, room {} occupied", booking.id, room.number);
        self.events.publish(DomainEvent::BookingApproved {
            customer_id: booking.customer_id,
            room_number: room.number,
        });
        Ok(booking)
    }

    pub async fn reject(&self, actor: &AuthUser, id: Uuid) -> AppResult<Booking> {
        require_admin(actor)?;
        let booking = self
            .transition(id, BookingAction::Reject, "reject_booking", |_| Ok(()))
            .await?;

        tracing::info!("Booking {} rejected", booking.id);
        self.events.publish(DomainEvent::BookingRejected {
            customer_id: booking.customer_id,
            room_number: self.room_number(booking.room_id).await,
        });
        Ok(booking)
    }

    pub async fn check_in(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: CheckinRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Booking> {
        require_admin(actor)?;
        ensure_meter_reading("water_meter", req.water_meter)?;
        ensure_meter_reading("electric_meter", req.electric_meter)?;
        let checked_in_at = req.checked_in_at.unwrap_or(now);

        let booking = self
            .transition(id, BookingAction::CheckIn, "check_in", |b| {
                b.actual_checkin = Some(checked_in_at);
                b.checkin_water_meter = Some(req.water_meter);
                b.checkin_electric_meter = Some(req.electric_meter);
                Ok(())
            })
            .await?;

        tracing::info!("Booking {} checked in at {}", booking.id, checked_in_at);
        self.events.publish(DomainEvent::CheckedIn {
            customer_id: booking.customer_id,
            room_number: self.room_number(booking.room_id).await,
        });
        Ok(booking)
    }

    pub async fn request_checkout(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: CheckoutRequest,
    ) -> AppResult<Booking> {
        let checkout_date = req
            .checkout_date
            .ok_or_else(|| AppError::Validation("Дата выселения обязательна".to_string()))?;

        let initial = self.load(id).await?;
        if initial.customer_id != actor.user_id {
            return Err(AppError::Forbidden);
        }

        let booking = self
            .transition(id, BookingAction::RequestCheckout, "request_checkout", |b| {
                let earliest = b
                    .actual_checkin
                    .map(|at| at.date_naive())
                    .unwrap_or(b.checkin_date);
                if checkout_date < earliest {
                    return Err(AppError::Validation(format!(
                        "Дата выселения {} раньше даты заселения {}",
                        checkout_date, earliest
                    )));
                }
                b.checkout_date = Some(checkout_date);
                Ok(())
            })
            .await?;

        tracing::info!("Checkout requested for booking {} on {}", booking.id, checkout_date);
        self.events.publish(DomainEvent::CheckoutRequested {
            customer_id: booking.customer_id,
            checkout_date,
        });
        Ok(booking)
    }

    /// Подтверждение выселения освобождает комнату в той же транзакции
    pub async fn approve_checkout(
        &self,
        actor: &AuthUser,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Booking> {
        require_admin(actor)?;
        let initial = self.load(id).await?;
        allows(BookingAction::ApproveCheckout)(&initial)?;
        let initial_room = self.load_room(initial.room_id).await?;

        let mut uow = self.coordinator.begin("approve_checkout").await?;
        let result = async {
            let fresh = uow.tx().lock_booking(id).await?;
            let mut booking =
                revalidate(&initial, fresh, allows(BookingAction::ApproveCheckout))?;
            let fresh_room = uow.tx().lock_room(booking.room_id).await?;
            let mut room = revalidate(&initial_room, fresh_room, |_| Ok(()))?;

            let state =
                next_booking_state(BookingState::of(&booking), BookingAction::ApproveCheckout)?;
            apply_booking_state(&mut booking, state);
            booking.actual_checkout = Some(now);
            release_room(&mut room)?;

            let booking = uow.tx().update_booking(&booking).await?;
            let room = uow.tx().update_room(&room).await?;
            Ok::<_, AppError>((booking, room))
        }
        .await;
        let (booking, room) = uow.finish(result).await?;

        tracing::info!("Booking {} checked out, room {} released", booking.id, room.number);
        self.events.publish(DomainEvent::CheckoutApproved {
            customer_id: booking.customer_id,
            room_number: room.number,
        });
        Ok(booking)
    }

    pub async fn reject_checkout(&self, actor: &AuthUser, id: Uuid) -> AppResult<Booking> {
        require_admin(actor)?;
        let booking = self
            .transition(id, BookingAction::RejectCheckout, "reject_checkout", |_| {
                Ok(())
            })
            .await?;

        tracing::info!("Checkout request for booking {} rejected", booking.id);
        self.events.publish(DomainEvent::CheckoutRejected {
            customer_id: booking.customer_id,
        });
        Ok(booking)
    }

    /// Жилец может отозвать только нерассмотренную заявку. Удаление активного
    /// бронирования освобождает комнату.
    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> AppResult<()> {
        let initial = self.load(id).await?;
        require_owner_or_admin(actor, initial.customer_id)?;
        let tenant_withdrawal = !actor.is_admin();
        let pending_only = |b: &Booking| {
            if tenant_withdrawal && b.approve_status != crate::models::ApproveStatus::Pending {
                return Err(AppError::Forbidden);
            }
            Ok(())
        };
        pending_only(&initial)?;

        let mut uow = self.coordinator.begin("delete_booking").await?;
        let result = async {
            let fresh = uow.tx().lock_booking(id).await?;
            let booking = revalidate(&initial, fresh, pending_only)?;
            let unsettled = uow.tx().count_unsettled_bills_for_booking(booking.id).await?;
            ensure_booking_deletable(BookingState::of(&booking), unsettled)?;

            let released = if booking.is_active() {
                let mut room = uow.tx().lock_room(booking.room_id).await?.ok_or_else(|| {
                    AppError::Conflict("Комната бронирования не найдена".to_string())
                })?;
                release_room(&mut room)?;
                Some(uow.tx().update_room(&room).await?)
            } else {
                None
            };

            uow.tx().delete_booking(booking.id).await?;
            Ok::<_, AppError>(released)
        }
        .await;
        let released = uow.finish(result).await?;

        match released {
            Some(room) => tracing::info!("Booking {} deleted, room {} released", id, room.number),
            None => tracing::info!("Booking {} deleted", id),
        }
        Ok(())
    }

    /// Переход, который меняет только само бронирование
    async fn transition<F>(
        &self,
        id: Uuid,
        action: BookingAction,
        operation: &'static str,
        mutate: F,
    ) -> AppResult<Booking>
    where
        F: FnOnce(&mut Booking) -> AppResult<()> + Send,
    {
        let initial = self.load(id).await?;
        allows(action)(&initial)?;

        let mut uow = self.coordinator.begin(operation).await?;
        let result = async {
            let fresh = uow.tx().lock_booking(id).await?;
            let mut booking = revalidate(&initial, fresh, allows(action))?;
            let state = next_booking_state(BookingState::of(&booking), action)?;
            apply_booking_state(&mut booking, state);
            mutate(&mut booking)?;
            uow.tx().update_booking(&booking).await
        }
        .await;
        uow.finish(result).await
    }
}
