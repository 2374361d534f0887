use crate::domain::model::{PartKind, Record};
use crate::plot::histogram::Histogram1D;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn database_url(&self) -> &str;
    fn tunnel_port(&self) -> u16;
    fn max_group_span(&self) -> u64;
    /// Database `KIND_OF_PART` string for a kind.
    fn kind_of_part(&self, kind: PartKind) -> &str;
}

/// Queries against the parts-tracking database.
#[async_trait]
pub trait PartsDatabase: Send + Sync {
    /// Barcodes of every part of a kind, optionally restricted to locations.
    async fn part_barcodes(&self, kind_of_part: &str, locations: &[i64]) -> Result<Vec<String>>;

    /// Full part rows with `min <= BARCODE <= max`.
    async fn parts_in_range(&self, barcode_min: &str, barcode_max: &str) -> Result<Vec<Record>>;

    /// Full part rows whose `PART_PARENT_ID` is one of `parent_ids`.
    async fn daughters_of(&self, parent_ids: &[String]) -> Result<Vec<Record>>;

    /// TEC resistance rows (`partBarcode`, `rac`) for a barcode range.
    async fn tec_resistances(&self, barcode_min: &str, barcode_max: &str) -> Result<Vec<Record>>;
}

/// A file of named histograms, the way QC output files are organized.
pub trait HistogramSource {
    fn get(&self, name: &str) -> Option<Histogram1D>;

    /// Location shown in error reports.
    fn path(&self) -> String;
}
