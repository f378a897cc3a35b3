pub mod admin;
pub mod customer;

pub use service_core::error::ErrorResponse;
