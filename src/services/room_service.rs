use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{require_admin, AuthUser};
use crate::models::{CreateRoomRequest, Room, RoomStatus, UpdateRoomRequest};
use crate::services::coordinator::{revalidate, ConsistencyCoordinator};
use crate::storage::PersistenceStore;
use crate::utils::validators::{ensure_non_negative, sanitize_string};

pub struct RoomService {
    store: Arc<dyn PersistenceStore>,
    coordinator: ConsistencyCoordinator,
}

impl RoomService {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            coordinator: ConsistencyCoordinator::new(store.clone()),
            store,
        }
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Room> {
        self.store
            .find_room(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Комната не найдена".to_string()))
    }

    pub async fn list(&self, status: Option<RoomStatus>) -> AppResult<Vec<Room>> {
        self.store.list_rooms(status).await
    }

    pub async fn create(&self, actor: &AuthUser, req: CreateRoomRequest) -> AppResult<Room> {
        require_admin(actor)?;
        req.validate()?;
        ensure_non_negative("rent", req.rent)?;
        ensure_non_negative("deposit", req.deposit)?;
        ensure_non_negative("booking_fee", req.booking_fee)?;

        let room = Room::new(
            sanitize_string(&req.number),
            req.rent,
            req.deposit,
            req.booking_fee,
        );

        let mut uow = self.coordinator.begin("create_room").await?;
        let result = uow.tx().insert_room(&room).await;
        uow.finish(result).await?;

        tracing::info!("Room {} created ({})", room.number, room.id);
        Ok(room)
    }

    pub async fn update(
        &self,
        actor: &AuthUser,
        id: Uuid,
        req: UpdateRoomRequest,
    ) -> AppResult<Room> {
        require_admin(actor)?;
        for (field, value) in [
            ("rent", req.rent),
            ("deposit", req.deposit),
            ("booking_fee", req.booking_fee),
        ] {
            if let Some(value) = value {
                ensure_non_negative(field, value)?;
            }
        }

        let initial = self.get(id).await?;

        let mut uow = self.coordinator.begin("update_room").await?;
        let result = async {
            let fresh = uow.tx().lock_room(id).await?;
            let mut room = revalidate(&initial, fresh, |_| Ok(()))?;
            room.rent = req.rent.unwrap_or(room.rent);
            room.deposit = req.deposit.unwrap_or(room.deposit);
            room.booking_fee = req.booking_fee.unwrap_or(room.booking_fee);
            uow.tx().update_room(&room).await
        }
        .await;
        let room = uow.finish(result).await?;

        tracing::info!("Room {} prices updated", room.id);
        Ok(room)
    }

    /// Комната удаляется вместе с историей, если её никто не занимает
    /// и по ней нет неоплаченных счетов
    pub async fn delete(&self, actor: &AuthUser, id: Uuid) -> AppResult<()> {
        require_admin(actor)?;
        let initial = self.get(id).await?;

        let mut uow = self.coordinator.begin("delete_room").await?;
        let result = async {
            // Порядок блокировок как у операций над бронированием: бронирования, затем комната
            uow.tx().lock_bookings_for_room(id).await?;
            let fresh = uow.tx().lock_room(id).await?;
            let room = revalidate(&initial, fresh, |r| {
                if r.status == RoomStatus::Occupied {
                    return Err(AppError::Conflict(format!("Комната {} занята", r.number)));
                }
                Ok(())
            })?;

            if uow.tx().active_booking_for_room(room.id).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "У комнаты {} есть активное бронирование",
                    room.number
                )));
            }
            let unsettled = uow.tx().count_unsettled_bills_for_room(room.id).await?;
            if unsettled > 0 {
                return Err(AppError::Conflict(format!(
                    "По комнате {} есть неоплаченные счета: {}",
                    room.number, unsettled
                )));
            }

            uow.tx().delete_room(room.id).await
        }
        .await;
        uow.finish(result).await?;

        tracing::info!("Room {} deleted", id);
        Ok(())
    }
}
