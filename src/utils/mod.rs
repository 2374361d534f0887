pub mod error;
pub mod files;
pub mod logger;
pub mod progress;
pub mod validation;
