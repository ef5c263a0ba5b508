pub mod bills;
pub mod bookings;
pub mod rooms;

use crate::middleware::AppState;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/rooms", rooms::routes())
        .nest("/bookings", bookings::routes())
        .nest("/bills", bills::routes())
}
