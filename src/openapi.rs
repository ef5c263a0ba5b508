use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dormitory API",
        version = "1.0.0",
        description = "Backend API общежития: комнаты, бронирования, заселение, выселение и ежемесячные счета"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "rooms", description = "Комнаты и их цены"),
        (name = "bookings", description = "Бронирования, заселение и выселение"),
        (name = "bills", description = "Счета: коммунальные услуги, пеня, оплата")
    ),
    paths(
        // Rooms
        crate::api::rooms::list_rooms,
        crate::api::rooms::get_room,
        crate::api::rooms::create_room,
        crate::api::rooms::update_room,
        crate::api::rooms::delete_room,
        // Bookings
        crate::api::bookings::create_booking,
        crate::api::bookings::list_bookings,
        crate::api::bookings::get_booking,
        crate::api::bookings::delete_booking,
        crate::api::bookings::approve_booking,
        crate::api::bookings::reject_booking,
        crate::api::bookings::check_in,
        crate::api::bookings::request_checkout,
        crate::api::bookings::approve_checkout,
        crate::api::bookings::reject_checkout,
        // Bills
        crate::api::bills::check_eligibility,
        crate::api::bills::create_bill,
        crate::api::bills::list_bills,
        crate::api::bills::get_bill,
        crate::api::bills::update_bill,
        crate::api::bills::submit_payment,
        crate::api::bills::verify_payment,
        crate::api::bills::mark_paid,
        crate::api::bills::refresh_fine,
    ),
    components(
        schemas(
            crate::models::UserRole,
            // Rooms
            crate::models::Room,
            crate::models::RoomStatus,
            crate::models::CreateRoomRequest,
            crate::models::UpdateRoomRequest,
            // Bookings
            crate::models::Booking,
            crate::models::ApproveStatus,
            crate::models::ReturnApprovalStatus,
            crate::models::CheckoutStatus,
            crate::models::CreateBookingRequest,
            crate::models::CheckinRequest,
            crate::models::CheckoutRequest,
            // Bills
            crate::models::Bill,
            crate::models::BillStatus,
            crate::models::BillResponse,
            crate::models::CreateBillRequest,
            crate::models::UpdateBillRequest,
            crate::models::SubmitPaymentRequest,
            crate::models::VerifyPaymentRequest,
            crate::models::EligibilityResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
