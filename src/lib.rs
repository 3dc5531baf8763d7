pub mod auth;
pub mod error;
pub mod mailer;
pub mod models;
pub mod openapi;
pub mod otp;
pub mod repo;
pub mod routes;

// Re-export commonly used items for tests / external users
pub use otp::OtpLedger;
pub use routes::{config, AppState};
