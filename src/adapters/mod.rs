pub mod histogram_file;
pub mod rhapi;
pub mod storage;

pub use histogram_file::HistogramFile;
pub use rhapi::RhApiClient;
pub use storage::LocalStorage;
