pub mod access_service;
pub mod auth_service;
