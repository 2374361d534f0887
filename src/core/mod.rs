pub mod assembly;
pub mod barcode_groups;
pub mod cache;
pub mod category;
pub mod engine;
pub mod expr;
pub mod link;
pub mod pipeline;

pub use crate::domain::model::{Catalog, Part, Record};
pub use crate::domain::ports::{ConfigProvider, PartsDatabase, Storage};
pub use crate::utils::error::Result;
