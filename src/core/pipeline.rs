use crate::adapters::storage::LocalStorage;
use crate::core::assembly::{attach_parent_barcodes, Assemble, FetchedBatch, COL_BARCODE, COL_ID};
use crate::core::barcode_groups::{group_barcodes, BarcodeGroup};
use crate::core::cache::{load_catalog, save_catalog};
use crate::core::engine::{Pipeline, SyncEngine};
use crate::domain::model::{Catalog, DetectorModule, Part, RowSource};
use crate::domain::ports::{ConfigProvider, PartsDatabase, Storage};
use crate::utils::error::Result;
use crate::utils::progress::Progress;
use std::collections::BTreeSet;
use std::marker::PhantomData;

/// What to fetch and where the cache lives.
#[derive(Debug, Clone, Default)]
pub struct FetchJob {
    /// Existing cache; parts already in it are not fetched again.
    pub in_yaml: Option<String>,
    pub out_yaml: String,
    /// `LOCATION_ID`s to restrict the part listing to; empty means everywhere.
    pub locations: Vec<i64>,
    /// Skip the database and only reload the cache.
    pub nodb: bool,
}

/// Cached parts plus the raw rows for the barcodes still missing.
#[derive(Debug, Clone)]
pub struct Extraction<P: Part> {
    pub cached: Catalog<P>,
    /// Barcodes listed in the database but absent from the cache.
    pub wanted: BTreeSet<String>,
    pub batches: Vec<FetchedBatch>,
}

pub struct PartsPipeline<P, D, S, C> {
    db: D,
    storage: S,
    config: C,
    job: FetchJob,
    _part: PhantomData<fn() -> P>,
}

impl<P, D, S, C> PartsPipeline<P, D, S, C>
where
    P: Assemble,
    D: PartsDatabase,
    S: Storage,
    C: ConfigProvider,
{
    pub fn new(db: D, storage: S, config: C, job: FetchJob) -> Self {
        Self {
            db,
            storage,
            config,
            job,
            _part: PhantomData,
        }
    }

    async fn fetch_group(&self, group: &BarcodeGroup) -> Result<FetchedBatch> {
        let mut parents = self.db.parts_in_range(&group.min, &group.max).await?;
        // merged ranges pull in parts nobody asked for
        parents.retain(|row| {
            row.get_str(COL_BARCODE)
                .map(|bc| group.contains(&bc))
                .unwrap_or(false)
        });

        let extra = match P::KIND.row_source() {
            RowSource::Daughters => {
                let parent_ids: Vec<String> =
                    parents.iter().filter_map(|row| row.get_str(COL_ID)).collect();
                if parent_ids.is_empty() {
                    Vec::new()
                } else {
                    let mut daughters = self.db.daughters_of(&parent_ids).await?;
                    attach_parent_barcodes(&parents, &mut daughters)?;
                    daughters
                }
            }
            RowSource::TecResistance => self.db.tec_resistances(&group.min, &group.max).await?,
        };

        Ok(FetchedBatch {
            group: group.clone(),
            parents,
            extra,
        })
    }
}

#[async_trait::async_trait]
impl<P, D, S, C> Pipeline for PartsPipeline<P, D, S, C>
where
    P: Assemble,
    D: PartsDatabase,
    S: Storage,
    C: ConfigProvider,
{
    type Part = P;

    async fn extract(&self) -> Result<Extraction<P>> {
        P::KIND.ensure_fetchable()?;

        let cached = match &self.job.in_yaml {
            Some(path) => load_catalog::<P, S>(&self.storage, path).await?,
            None => Catalog::new(),
        };

        if self.job.nodb {
            return Ok(Extraction {
                cached,
                wanted: BTreeSet::new(),
                batches: Vec::new(),
            });
        }

        tracing::info!("Fetching {} information from the database ... ", P::KIND);
        let barcodes = self
            .db
            .part_barcodes(self.config.kind_of_part(P::KIND), &self.job.locations)
            .await?;
        tracing::info!("Found {} {}(s) on the database.", barcodes.len(), P::KIND);

        let wanted: BTreeSet<String> = barcodes
            .into_iter()
            .filter(|barcode| !cached.contains_key(barcode))
            .collect();
        tracing::info!("Fetching {} {}(s) from the database ...", wanted.len(), P::KIND);

        let groups = group_barcodes(
            &wanted.iter().collect::<Vec<_>>(),
            self.config.max_group_span(),
        )?;

        let progress = Progress::new(groups.len(), "Barcode groups");
        let mut batches = Vec::with_capacity(groups.len());
        for (igroup, group) in groups.iter().enumerate() {
            tracing::info!(
                "Fetching barcode group {}/{} having {} {}(s) ...",
                igroup + 1,
                groups.len(),
                group.len(),
                P::KIND
            );
            batches.push(self.fetch_group(group).await?);
            progress.inc();
        }
        progress.finish();

        Ok(Extraction {
            cached,
            wanted,
            batches,
        })
    }

    async fn transform(&self, extraction: Extraction<P>) -> Result<Catalog<P>> {
        let Extraction {
            mut cached,
            wanted,
            batches,
        } = extraction;

        for batch in &batches {
            tracing::debug!(
                "Processing {} {}(s) of group {}..{}",
                batch.parents.len(),
                P::KIND,
                batch.group.min,
                batch.group.max
            );
            let fetched = P::assemble(batch, &self.config)?;
            cached.extend(
                fetched
                    .into_iter()
                    .filter(|(barcode, _)| wanted.contains(barcode)),
            );
        }

        tracing::info!(
            "Found information for {} {}(s) in total.",
            cached.len(),
            P::KIND
        );
        Ok(cached)
    }

    async fn load(&self, catalog: &Catalog<P>) -> Result<String> {
        save_catalog(&self.storage, &self.job.out_yaml, catalog).await?;
        Ok(self.job.out_yaml.clone())
    }
}

/// Cached parts merged with everything the database has that the cache lacks.
pub async fn get_all_part_info<P, D, C>(db: D, config: C, job: FetchJob) -> Result<Catalog<P>>
where
    P: Assemble,
    D: PartsDatabase,
    C: ConfigProvider,
{
    let pipeline = PartsPipeline::<P, _, _, _>::new(db, LocalStorage::current_dir(), config, job);
    SyncEngine::new(pipeline).collect().await
}

/// Fetch, merge and write the catalog to `job.out_yaml`.
pub async fn save_all_part_info<P, D, C>(
    db: D,
    config: C,
    job: FetchJob,
    ret: bool,
) -> Result<Option<Catalog<P>>>
where
    P: Assemble,
    D: PartsDatabase,
    C: ConfigProvider,
{
    let pipeline = PartsPipeline::<P, _, _, _>::new(db, LocalStorage::current_dir(), config, job);
    let report = SyncEngine::new(pipeline).run().await?;
    Ok(ret.then_some(report.catalog))
}

/// Barcodes of every SM already assembled into a DM.
pub async fn get_used_sm_barcodes<D, C>(db: D, config: C, job: FetchJob) -> Result<Vec<String>>
where
    D: PartsDatabase,
    C: ConfigProvider,
{
    let dms = get_all_part_info::<DetectorModule, _, _>(db, config, job).await?;
    Ok(dms
        .values()
        .flatten()
        .flat_map(|dm| dm.sm_barcodes())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{PartKind, Record, SensorModule, SiPMArray};
    use crate::utils::error::PartsError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn row(value: serde_json::Value) -> Record {
        Record::from_object(value.as_object().cloned().unwrap_or_default())
    }

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.get_file(path).ok_or_else(|| {
                PartsError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn exists(&self, path: &str) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
    }

    struct MockConfig;

    impl ConfigProvider for MockConfig {
        fn database_url(&self) -> &str {
            "http://localhost:8113"
        }

        fn tunnel_port(&self) -> u16 {
            8113
        }

        fn max_group_span(&self) -> u64 {
            500
        }

        fn kind_of_part(&self, kind: PartKind) -> &str {
            match kind {
                PartKind::SiPMArray => "SiPMArray",
                PartKind::LYSOMatrix => "LYSOMatrix",
                PartKind::SensorModule => "SensorModule",
                PartKind::FrontEnd => "FE",
                PartKind::DetectorModule => "DetectorModule",
                PartKind::ReadoutUnit => "ReadoutUnit",
            }
        }
    }

    /// In-memory parts table; records every range query it answers.
    #[derive(Clone, Default)]
    struct MockDatabase {
        parts: Vec<Record>,
        tec: Vec<Record>,
        ranges: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait::async_trait]
    impl PartsDatabase for MockDatabase {
        async fn part_barcodes(&self, kind_of_part: &str, _locations: &[i64]) -> Result<Vec<String>> {
            Ok(self
                .parts
                .iter()
                .filter(|r| r.get_str("kindOfPart").as_deref() == Some(kind_of_part))
                .filter_map(|r| r.get_str("barcode"))
                .collect())
        }

        async fn parts_in_range(&self, min: &str, max: &str) -> Result<Vec<Record>> {
            self.ranges
                .lock()
                .unwrap()
                .push((min.to_string(), max.to_string()));
            Ok(self
                .parts
                .iter()
                .filter(|r| {
                    let bc = r.get_str("barcode").unwrap_or_default();
                    bc.as_str() >= min && bc.as_str() <= max
                })
                .cloned()
                .collect())
        }

        async fn daughters_of(&self, parent_ids: &[String]) -> Result<Vec<Record>> {
            Ok(self
                .parts
                .iter()
                .filter(|r| {
                    r.get_str("partParentId")
                        .map(|id| parent_ids.contains(&id))
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn tec_resistances(&self, _min: &str, _max: &str) -> Result<Vec<Record>> {
            Ok(self.tec.clone())
        }
    }

    fn sm_database() -> MockDatabase {
        MockDatabase {
            parts: vec![
                row(json!({"id": 1, "barcode": "1000", "kindOfPart": "SensorModule"})),
                row(json!({"id": 2, "barcode": "1001", "kindOfPart": "SensorModule"})),
                row(json!({"id": 3, "barcode": "1400", "kindOfPart": "SensorModule"})),
                row(json!({"id": 9, "barcode": "1002", "kindOfPart": "SiPMArray"})),
                row(json!({"id": 20, "barcode": "L1", "kindOfPart": "LYSOMatrix", "partParentId": 1})),
                row(json!({"id": 21, "barcode": "S2", "kindOfPart": "SiPMArray", "partParentId": 1})),
                row(json!({"id": 22, "barcode": "S1", "kindOfPart": "SiPMArray", "partParentId": 1})),
                row(json!({"id": 23, "barcode": "L2", "kindOfPart": "LYSOMatrix", "partParentId": 2})),
                row(json!({"id": 30, "barcode": "L3", "kindOfPart": "LYSOMatrix", "partParentId": 3})),
                row(json!({"id": 31, "barcode": "S5", "kindOfPart": "SiPMArray", "partParentId": 3})),
                row(json!({"id": 32, "barcode": "S6", "kindOfPart": "SiPMArray", "partParentId": 3})),
            ],
            ..Default::default()
        }
    }

    fn job(out: &str) -> FetchJob {
        FetchJob {
            in_yaml: Some(out.to_string()),
            out_yaml: out.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sensor_module_sync_writes_complete_parts() {
        let db = sm_database();
        let storage = MockStorage::default();
        let pipeline =
            PartsPipeline::<SensorModule, _, _, _>::new(db.clone(), storage.clone(), MockConfig, job("sm.yaml"));

        let report = SyncEngine::new(pipeline).run().await.unwrap();

        assert_eq!(report.output_path, "sm.yaml");
        assert_eq!(report.catalog.len(), 3);
        assert!(report.catalog["1001"].is_none());
        let sm = report.catalog["1000"].as_ref().unwrap();
        assert_eq!(sm.sipm1.as_ref().unwrap().barcode(), "S1");
        assert_eq!(sm.sipm2.as_ref().unwrap().barcode(), "S2");

        // one merged range 1000..1400
        assert_eq!(
            *db.ranges.lock().unwrap(),
            vec![("1000".to_string(), "1400".to_string())]
        );

        let written = String::from_utf8(storage.get_file("sm.yaml").unwrap()).unwrap();
        assert!(written.contains("'1000'"));
        assert!(written.contains("'1400'"));
        assert!(!written.contains("'1001'"));
    }

    #[tokio::test]
    async fn test_cached_parts_are_not_fetched_again() {
        let db = sm_database();
        let storage = MockStorage::default();
        storage
            .write_file(
                "sm.yaml",
                b"'1000':\n  barcode: '1000'\n  id: '1'\n  lyso: cached\n  sipm1: S1\n  sipm2: S2\n  prod_datime: null\n",
            )
            .await
            .unwrap();

        let pipeline =
            PartsPipeline::<SensorModule, _, _, _>::new(db.clone(), storage, MockConfig, job("sm.yaml"));
        let catalog = SyncEngine::new(pipeline).collect().await.unwrap();

        assert_eq!(catalog["1000"].as_ref().unwrap().lyso.as_deref(), Some("cached"));
        assert_eq!(
            *db.ranges.lock().unwrap(),
            vec![("1001".to_string(), "1400".to_string())]
        );
    }

    #[tokio::test]
    async fn test_nodb_only_reloads_cache() {
        let db = sm_database();
        let storage = MockStorage::default();
        let mut job = job("sm.yaml");
        job.nodb = true;

        let pipeline = PartsPipeline::<SensorModule, _, _, _>::new(db.clone(), storage, MockConfig, job);
        let catalog = SyncEngine::new(pipeline).collect().await.unwrap();

        assert!(catalog.is_empty());
        assert!(db.ranges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sipm_arrays_take_tec_resistance() {
        let db = MockDatabase {
            parts: vec![row(json!({"id": 9, "barcode": "1002", "kindOfPart": "SiPMArray"}))],
            tec: vec![row(json!({"partBarcode": "1002", "rac": "7.75"}))],
            ..Default::default()
        };
        let pipeline = PartsPipeline::<SiPMArray, _, _, _>::new(
            db,
            MockStorage::default(),
            MockConfig,
            FetchJob {
                out_yaml: "sipm.yaml".to_string(),
                ..Default::default()
            },
        );
        let catalog = SyncEngine::new(pipeline).collect().await.unwrap();
        assert_eq!(catalog["1002"].as_ref().unwrap().tec_res, Some(7.75));
    }
}
