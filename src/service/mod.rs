pub mod attendance;
pub mod error;
pub mod gate;
pub mod qr_token;
