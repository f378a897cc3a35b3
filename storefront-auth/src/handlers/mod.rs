pub mod admin;
pub mod app;
pub mod customer;
