pub mod bill;
pub mod booking;
pub mod room;
pub mod user;

pub use bill::*;
pub use booking::*;
pub use room::*;
pub use user::*;
