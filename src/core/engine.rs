use crate::core::pipeline::Extraction;
use crate::domain::model::{Catalog, Part};
use crate::utils::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Part: Part;

    async fn extract(&self) -> Result<Extraction<Self::Part>>;
    async fn transform(&self, extraction: Extraction<Self::Part>) -> Result<Catalog<Self::Part>>;
    async fn load(&self, catalog: &Catalog<Self::Part>) -> Result<String>;
}

/// Outcome of a complete extract → transform → load run.
#[derive(Debug, Clone)]
pub struct SyncReport<P: Part> {
    pub output_path: String,
    pub catalog: Catalog<P>,
}

pub struct SyncEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> SyncEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    /// Extract and transform only; nothing is written.
    pub async fn collect(&self) -> Result<Catalog<P::Part>> {
        let extraction = self.pipeline.extract().await?;
        tracing::debug!(
            "Extracted {} cached and {} fetched batch(es)",
            extraction.cached.len(),
            extraction.batches.len()
        );
        self.pipeline.transform(extraction).await
    }

    pub async fn run(&self) -> Result<SyncReport<P::Part>> {
        let catalog = self.collect().await?;
        let output_path = self.pipeline.load(&catalog).await?;
        tracing::debug!("Output saved to: {}", output_path);

        Ok(SyncReport {
            output_path,
            catalog,
        })
    }
}
