pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use middleware::AppState;
pub use openapi::ApiDoc;

use axum::{middleware as axum_middleware, Router};

/// Маршруты `/api/v1` с состоянием приложения, без внешних слоёв
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api::routes())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
