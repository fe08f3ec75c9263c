//! Shared utilities for the astralign workspace.

pub mod buffer2;
pub mod file_format;
pub mod log_setup;

pub use buffer2::Buffer2;
pub use file_format::{deserialize, load_file, serialize, FileExtensionError, SerdeFormat};
