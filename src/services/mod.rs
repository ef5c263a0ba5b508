pub mod auth_service;
pub mod bill_service;
pub mod billing_calculator;
pub mod booking_service;
pub mod coordinator;
pub mod cycle_guard;
pub mod notification_service;
pub mod room_service;
pub mod state_machine;

pub use auth_service::AuthService;
pub use bill_service::BillService;
pub use booking_service::BookingService;
pub use coordinator::ConsistencyCoordinator;
pub use notification_service::{DomainEvent, EventDispatcher, NotificationService, WebhookNotifier};
pub use room_service::RoomService;
