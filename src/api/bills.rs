use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    BillResponse, BillsQuery, CreateBillRequest, EligibilityQuery, EligibilityResponse,
    SubmitPaymentRequest, UpdateBillRequest, VerifyPaymentRequest,
};
use crate::services::{cycle_guard, BillService};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bills).post(create_bill))
        .route("/eligibility", get(check_eligibility))
        .route("/:id", get(get_bill).put(update_bill))
        .route("/:id/payment-slip", post(submit_payment))
        .route("/:id/verify", put(verify_payment))
        .route("/:id/mark-paid", put(mark_paid))
        .route("/:id/refresh-fine", post(refresh_fine))
}

fn service(state: &AppState) -> BillService {
    BillService::new(state.store.clone(), state.notifier.clone(), &state.config)
}

/// Проверить, можно ли выставить счёт комнате за месяц (администратор)
#[utoipa::path(
    get,
    path = "/api/v1/bills/eligibility",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(EligibilityQuery),
    responses(
        (status = 200, description = "Результат проверки", body = EligibilityResponse),
        (status = 400, description = "Не указана комната или неверный месяц"),
        (status = 403, description = "Только для администратора"),
        (status = 404, description = "Комната не найдена")
    )
)]
pub async fn check_eligibility(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<EligibilityQuery>,
) -> AppResult<Json<EligibilityResponse>> {
    let room_id = query
        .room_id
        .ok_or_else(|| AppError::BadRequest("room_id обязателен".to_string()))?;
    let month = query
        .month
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("month обязателен".to_string()))
        .and_then(cycle_guard::parse_month)?;
    Ok(Json(
        service(&state)
            .check_eligibility(&auth_user, room_id, month)
            .await?,
    ))
}

/// Выставить счёт (администратор)
#[utoipa::path(
    post,
    path = "/api/v1/bills",
    tag = "bills",
    security(("bearer_auth" = [])),
    request_body = CreateBillRequest,
    responses(
        (status = 200, description = "Счёт выставлен", body = BillResponse),
        (status = 404, description = "Комната не найдена"),
        (status = 409, description = "Счёт за месяц уже есть или комната не допущена"),
        (status = 422, description = "Неверные показания счётчиков")
    )
)]
pub async fn create_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateBillRequest>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .create_bill(&auth_user, payload, Utc::now())
        .await?;
    Ok(Json(bill.into()))
}

/// Получить счета: администратор видит все, жилец свои
#[utoipa::path(
    get,
    path = "/api/v1/bills",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(BillsQuery),
    responses(
        (status = 200, description = "Список счетов", body = Vec<BillResponse>),
        (status = 401, description = "Не авторизован")
    )
)]
pub async fn list_bills(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<BillsQuery>,
) -> AppResult<Json<Vec<BillResponse>>> {
    let bills = service(&state).list_bills(&auth_user, query).await?;
    Ok(Json(bills.into_iter().map(BillResponse::from).collect()))
}

/// Получить счёт
#[utoipa::path(
    get,
    path = "/api/v1/bills/{id}",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    responses(
        (status = 200, description = "Счёт", body = BillResponse),
        (status = 403, description = "Чужой счёт"),
        (status = 404, description = "Счёт не найден")
    )
)]
pub async fn get_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state).get_bill(&auth_user, id).await?;
    Ok(Json(bill.into()))
}

/// Перевыставить неоплаченный счёт (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bills/{id}",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    request_body = UpdateBillRequest,
    responses(
        (status = 200, description = "Счёт пересчитан", body = BillResponse),
        (status = 409, description = "Счёт уже оплачен или на проверке"),
        (status = 422, description = "Неверные показания счётчиков")
    )
)]
pub async fn update_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBillRequest>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .update_bill(&auth_user, id, payload, Utc::now())
        .await?;
    Ok(Json(bill.into()))
}

/// Отправить квитанцию об оплате (жилец)
#[utoipa::path(
    post,
    path = "/api/v1/bills/{id}/payment-slip",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    request_body = SubmitPaymentRequest,
    responses(
        (status = 200, description = "Квитанция отправлена на проверку", body = BillResponse),
        (status = 403, description = "Чужой счёт"),
        (status = 409, description = "Счёт не ожидает оплаты")
    )
)]
pub async fn submit_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitPaymentRequest>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .submit_payment(&auth_user, id, payload)
        .await?;
    Ok(Json(bill.into()))
}

/// Подтвердить или отклонить оплату (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bills/{id}/verify",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Решение по оплате принято", body = BillResponse),
        (status = 409, description = "Оплата не ожидает проверки")
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .verify_payment(&auth_user, id, payload.approved, Utc::now())
        .await?;
    Ok(Json(bill.into()))
}

/// Отметить счёт оплаченным (администратор)
#[utoipa::path(
    put,
    path = "/api/v1/bills/{id}/mark-paid",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    responses(
        (status = 200, description = "Счёт оплачен", body = BillResponse),
        (status = 409, description = "Счёт не в статусе неоплаченного")
    )
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .mark_paid(&auth_user, id, Utc::now())
        .await?;
    Ok(Json(bill.into()))
}

/// Пересчитать пеню на сегодня (администратор)
#[utoipa::path(
    post,
    path = "/api/v1/bills/{id}/refresh-fine",
    tag = "bills",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "ID счёта")
    ),
    responses(
        (status = 200, description = "Пеня пересчитана", body = BillResponse),
        (status = 409, description = "Счёт не в статусе неоплаченного")
    )
)]
pub async fn refresh_fine(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillResponse>> {
    let bill = service(&state)
        .refresh_fine(&auth_user, id, Utc::now())
        .await?;
    Ok(Json(bill.into()))
}
