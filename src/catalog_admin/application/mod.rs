pub mod catalog_service;
pub mod error;
pub mod normalize_service;
