pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod drivers;
pub mod plot;
pub mod utils;

pub use adapters::{HistogramFile, LocalStorage, RhApiClient};
pub use config::PartsConfig;
pub use core::category::{eval_category, CategoryConfig, CategoryResult};
pub use core::engine::SyncEngine;
pub use core::link::combine_parts;
pub use core::pipeline::{get_all_part_info, save_all_part_info, FetchJob, PartsPipeline};
pub use domain::model::{DetectorModule, PartKind, ReadoutUnit, SensorModule, SiPMArray};
pub use utils::error::{PartsError, Result};
