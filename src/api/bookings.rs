use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    Booking, BookingsQuery, CheckinRequest, CheckoutRequest, CreateBookingRequest,
};
use crate::services::BookingService;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/:id", get(get_booking).delete(delete_booking))
        .route("/:id/approve", put(approve_booking))
        .route("/:id/reject", put(reject_booking))
        .route("/:id/checkin", put(check_in))
        .route("/:id/checkout-request", post(request_checkout))
        .route("/:id/checkout/approve", put(approve_checkout))
        .route("/:id/checkout/reject", put(reject_checkout))
}

fn service(state: &AppState) -> BookingService {
    BookingService::new(state.store.clone(), state.notifier.clone())
}

/// Подать заявку на бронирование
#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    request_body = CreateBookingRequest,
    responses(
        (status = 200, description = "Заявка создана", body = Booking),
        (status = 404, description = "Комната не найдена"),
        (status = 409, description = "Комната занята"),
        (status = 422, description = "Неверные данные")
    )
)]
pub async fn create_booking(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<Json<Booking>> {
    Ok(Json(service(&state).create(&auth_user, payload).await?))
}

/// Список бронирований: администратор видит все, жилец свои
#[utoipa::path(
    get,
    path = "/api/v1/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(BookingsQuery),
    responses(
        (status = 200, description = "Список бронирований", body = Vec<Booking>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<BookingsQuery>,
) -> AppResult<Json<Vec<Booking>>> {
    Ok(Json(service(&state).list(&auth_user, query).await?))
}

/// Получить бронирование
#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Бронирование", body = Booking),
        (status = 403, description = "Чужое бронирование"),
        (status = 404, description = "Бронирование не найдено")
    )
)]
pub async fn get_booking(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(service(&state).get(&auth_user, id).await?))
}

/// Удалить бронирование
#[utoipa::path(
    delete,
    path = "/api/v1/bookings/{id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Бронирование удалено"),
        (status = 403, description = "Нет доступа"),
        (status = 409, description = "Есть неоплаченные счета или заявка на выселение")
    )
)]
pub async fn delete_booking(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    service(&state).delete(&auth_user, id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Одобрить бронирование (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/approve",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Бронирование одобрено", body = Booking),
        (status = 409, description = "Бронирование уже рассмотрено или комната занята")
    )
)]
pub async fn approve_booking(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(service(&state).approve(&auth_user, id).await?))
}

/// Отклонить бронирование (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/reject",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Бронирование отклонено", body = Booking),
        (status = 409, description = "Бронирование уже рассмотрено")
    )
)]
pub async fn reject_booking(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(service(&state).reject(&auth_user, id).await?))
}

/// Отметить заселение (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/checkin",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Заселение отмечено", body = Booking),
        (status = 409, description = "Бронирование не одобрено или заселение уже отмечено"),
        (status = 422, description = "Отрицательное показание счётчика")
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckinRequest>,
) -> AppResult<Json<Booking>> {
    Ok(Json(
        service(&state)
            .check_in(&auth_user, id, payload, Utc::now())
            .await?,
    ))
}

/// Подать заявку на выселение (жилец)
#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/checkout-request",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Заявка на выселение подана", body = Booking),
        (status = 403, description = "Чужое бронирование"),
        (status = 409, description = "Заявка уже ожидает рассмотрения"),
        (status = 422, description = "Дата выселения не указана")
    )
)]
pub async fn request_checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<Booking>> {
    Ok(Json(
        service(&state)
            .request_checkout(&auth_user, id, payload)
            .await?,
    ))
}

/// Подтвердить выселение (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/checkout/approve",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Выселение подтверждено, комната свободна", body = Booking),
        (status = 409, description = "Нет заявки на выселение в статусе ожидания")
    )
)]
pub async fn approve_checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(
        service(&state)
            .approve_checkout(&auth_user, id, Utc::now())
            .await?,
    ))
}

/// Отклонить заявку на выселение (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/checkout/reject",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID бронирования")
    ),
    responses(
        (status = 200, description = "Заявка на выселение отклонена", body = Booking),
        (status = 409, description = "Нет заявки на выселение в статусе ожидания")
    )
)]
pub async fn reject_checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(service(&state).reject_checkout(&auth_user, id).await?))
}
