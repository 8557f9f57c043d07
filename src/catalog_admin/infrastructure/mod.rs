pub mod axum_handler;
pub mod backup_writer;
pub mod catalog_store;
pub mod config;
pub mod error;
pub mod file_storage;
pub mod image_library;
pub mod image_processor;
pub mod settings;
pub mod share_gallery;
