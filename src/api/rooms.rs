use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{AppState, AuthUser};
use crate::models::{CreateRoomRequest, Room, RoomsQuery, UpdateRoomRequest};
use crate::services::RoomService;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(get_room).put(update_room).delete(delete_room))
}

fn service(state: &AppState) -> RoomService {
    RoomService::new(state.store.clone())
}

/// Список комнат
#[utoipa::path(
    get,
    path = "/api/v1/rooms",
    tag = "rooms",
    security(("bearer_auth" = [])),
    params(RoomsQuery),
    responses(
        (status = 200, description = "Список комнат", body = Vec<Room>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_rooms(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<RoomsQuery>,
) -> AppResult<Json<Vec<Room>>> {
    let rooms = service(&state).list(query.status).await?;
    Ok(Json(rooms))
}

/// Получить комнату
#[utoipa::path(
    get,
    path = "/api/v1/rooms/{id}",
    tag = "rooms",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID комнаты")
    ),
    responses(
        (status = 200, description = "Комната", body = Room),
        (status = 404, description = "Комната не найдена")
    )
)]
pub async fn get_room(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Room>> {
    Ok(Json(service(&state).get(id).await?))
}

/// Создать комнату (администратор)
#[utoipa::path(
    post,
    path = "/api/v1/rooms",
    tag = "rooms",
    security(("bearer_auth" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Комната создана", body = Room),
        (status = 403, description = "Только для администратора"),
        (status = 409, description = "Номер комнаты занят"),
        (status = 422, description = "Неверные данные")
    )
)]
pub async fn create_room(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateRoomRequest>,
) -> AppResult<Json<Room>> {
    Ok(Json(service(&state).create(&auth_user, payload).await?))
}

/// Изменить цены комнаты (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/rooms/{id}",
    tag = "rooms",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID комнаты")
    ),
    request_body = UpdateRoomRequest,
    responses(
        (status = 200, description = "Комната обновлена", body = Room),
        (status = 403, description = "Только для администратора"),
        (status = 404, description = "Комната не найдена"),
        (status = 409, description = "Комната изменена другой операцией")
    )
)]
pub async fn update_room(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoomRequest>,
) -> AppResult<Json<Room>> {
    Ok(Json(service(&state).update(&auth_user, id, payload).await?))
}

/// Удалить комнату (администратор)
#[utoipa::path(
    delete,
    path = "/api/v1/rooms/{id}",
    tag = "rooms",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID комнаты")
    ),
    responses(
        (status = 200, description = "Комната удалена"),
        (status = 404, description = "Комната не найдена"),
        (status = 409, description = "Комната занята или есть неоплаченные счета")
    )
)]
pub async fn delete_room(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    service(&state).delete(&auth_user, id).await?;
    Ok(Json(json!({ "success": true })))
}
