use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::UserRole;
use crate::services::auth_service::parse_role;
use crate::services::{AuthService, NotificationService};
use crate::storage::PersistenceStore;

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceStore>,
    pub notifier: Arc<dyn NotificationService>,
    pub config: Config,
}

// Вспомогательные функции для проверки ролей
pub fn require_admin(user: &AuthUser) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_tenant(user: &AuthUser) -> AppResult<()> {
    if user.role == UserRole::Tenant {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Администратор видит всё, жилец только свои записи
pub fn require_owner_or_admin(user: &AuthUser, owner_id: Uuid) -> AppResult<()> {
    if user.is_admin() || user.user_id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

// Middleware для добавления AppState в extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(state);
    next.run(request).await
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

// Экстрактор для авторизованного пользователя
#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let app_state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))?;

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "Missing authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            reject(
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            )
        })?;

        let auth_service = AuthService::new(app_state.config);
        let claims = auth_service
            .verify_token(token)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

        if claims.token_type != "access" {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid token type"));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "Invalid user ID in token"))?;

        Ok(AuthUser {
            user_id,
            role: parse_role(&claims.role),
        })
    }
}
