pub mod catalog;
pub mod conversion;
pub mod error;
pub mod image;
pub mod image_processor_trait;
pub mod resize_spec;
pub mod staged_file;
pub mod upload_path;
