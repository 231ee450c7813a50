//! HTTP route handlers.

pub mod courses;
pub mod health;
pub mod hooks;
pub mod me;
pub mod profiles;
pub mod roles;
pub mod students;
