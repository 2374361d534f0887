use crate::core::barcode_groups::BarcodeGroup;
use crate::domain::model::{
    Catalog, DetectorModule, Link, Part, PartKind, ReadoutUnit, Record, SensorModule, SiPMArray,
};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{PartsError, Result};
use crate::utils::files::natural_sort;
use std::collections::BTreeMap;

pub const COL_ID: &str = "id";
pub const COL_BARCODE: &str = "barcode";
pub const COL_KIND: &str = "kindOfPart";
pub const COL_PARENT_ID: &str = "partParentId";
pub const COL_PARENT_BARCODE: &str = "parentBarcode";
pub const COL_PRODUCTION_DATE: &str = "productionDate";
pub const COL_TEC_BARCODE: &str = "partBarcode";
pub const COL_TEC_RES: &str = "rac";

/// Raw rows fetched for one barcode group.
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub group: BarcodeGroup,
    /// Rows of the parts in the group range.
    pub parents: Vec<Record>,
    /// Daughter rows for assemblies, TEC rows for SiPM arrays.
    pub extra: Vec<Record>,
}

/// Builds records of one kind from a fetched batch.
pub trait Assemble: Part {
    fn assemble(batch: &FetchedBatch, config: &dyn ConfigProvider) -> Result<Catalog<Self>>;
}

/// Tag every daughter row with the barcode of its parent.
pub fn attach_parent_barcodes(parents: &[Record], daughters: &mut [Record]) -> Result<()> {
    let by_id: BTreeMap<String, String> = parents
        .iter()
        .filter_map(|p| Some((p.get_str(COL_ID)?, p.get_str(COL_BARCODE)?)))
        .collect();

    for daughter in daughters.iter_mut() {
        let parent_id = daughter.require_str(COL_PARENT_ID)?;
        let parent_barcode =
            by_id
                .get(&parent_id)
                .cloned()
                .ok_or_else(|| PartsError::MissingParent {
                    parent_id: parent_id.clone(),
                    barcode: daughter.get_str(COL_BARCODE).unwrap_or_default(),
                })?;
        daughter.insert(COL_PARENT_BARCODE, parent_barcode);
    }
    Ok(())
}

/// Barcode to TEC resistance. Rows that do not parse are reported and skipped.
pub fn tec_resistance_map(rows: &[Record]) -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    for row in rows {
        match (row.get_str(COL_TEC_BARCODE), row.get_f64(COL_TEC_RES)) {
            (Some(barcode), Some(res)) => {
                map.insert(barcode, res);
            }
            _ => tracing::warn!("Error getting TEC resistance of: {:?}", row.data),
        }
    }
    map
}

fn daughters_of<'a>(daughters: &'a [Record], parent_id: &str, kind: &str) -> Vec<&'a Record> {
    daughters
        .iter()
        .filter(|d| {
            d.get_str(COL_PARENT_ID).as_deref() == Some(parent_id)
                && d.get_str(COL_KIND).as_deref() == Some(kind)
        })
        .collect()
}

fn daughter_barcodes(daughters: &[Record], parent_id: &str, kind: &str) -> Vec<String> {
    natural_sort(
        daughters_of(daughters, parent_id, kind)
            .into_iter()
            .filter_map(|d| d.get_str(COL_BARCODE))
            .collect(),
    )
}

struct ParentInfo {
    id: String,
    barcode: String,
    prod_datime: Option<String>,
}

fn parent_info(row: &Record) -> Result<ParentInfo> {
    Ok(ParentInfo {
        id: row.require_str(COL_ID)?,
        barcode: row.require_str(COL_BARCODE)?,
        prod_datime: row.get_str(COL_PRODUCTION_DATE),
    })
}

pub fn assemble_sipm_arrays(rows: &[Record], tec: &BTreeMap<String, f64>) -> Result<Catalog<SiPMArray>> {
    let mut parts = Catalog::new();
    for row in rows {
        let info = parent_info(row)?;
        let tec_res = tec.get(&info.barcode).copied();
        if tec_res.is_none() {
            tracing::warn!("No TEC resistance found for SiPM {}", info.barcode);
        }
        parts.insert(
            info.barcode.clone(),
            Some(SiPMArray {
                barcode: info.barcode,
                id: info.id,
                tec_res,
            }),
        );
    }
    Ok(parts)
}

pub fn assemble_sensor_modules(
    parents: &[Record],
    daughters: &[Record],
    lyso_kind: &str,
    sipm_kind: &str,
) -> Result<Catalog<SensorModule>> {
    let mut parts = Catalog::new();
    for row in parents {
        let info = parent_info(row)?;
        let lyso = daughters_of(daughters, &info.id, lyso_kind)
            .first()
            .and_then(|d| d.get_str(COL_BARCODE));
        let sipms = daughter_barcodes(daughters, &info.id, sipm_kind);

        let part = match (lyso, sipms.as_slice()) {
            (Some(lyso), [sipm1, sipm2]) => Some(SensorModule {
                barcode: info.barcode.clone(),
                id: info.id,
                lyso: Some(lyso),
                sipm1: Some(Link::Barcode(sipm1.clone())),
                sipm2: Some(Link::Barcode(sipm2.clone())),
                prod_datime: info.prod_datime,
            }),
            (lyso, _) => {
                tracing::warn!(
                    "Error fetching parts for SM {}: LYSO: {:?}, SiPM: {:?}",
                    info.barcode,
                    lyso,
                    sipms
                );
                None
            }
        };
        parts.insert(info.barcode, part);
    }
    Ok(parts)
}

pub fn assemble_detector_modules(
    parents: &[Record],
    daughters: &[Record],
    fe_kind: &str,
    sm_kind: &str,
) -> Result<Catalog<DetectorModule>> {
    let mut parts = Catalog::new();
    for row in parents {
        let info = parent_info(row)?;
        let feb = daughters_of(daughters, &info.id, fe_kind)
            .first()
            .and_then(|d| d.get_str(COL_BARCODE));
        let sms = daughter_barcodes(daughters, &info.id, sm_kind);

        let part = match (feb, sms.as_slice()) {
            (Some(feb), [sm1, sm2]) => Some(DetectorModule {
                barcode: info.barcode.clone(),
                id: info.id,
                feb: Some(feb),
                sm1: Some(Link::Barcode(sm1.clone())),
                sm2: Some(Link::Barcode(sm2.clone())),
                prod_datime: info.prod_datime,
            }),
            (feb, _) => {
                tracing::warn!(
                    "Error fetching parts for DM {}: FEB: {:?}, SM: {:?}",
                    info.barcode,
                    feb,
                    sms
                );
                None
            }
        };
        parts.insert(info.barcode, part);
    }
    Ok(parts)
}

pub fn assemble_readout_units(
    parents: &[Record],
    daughters: &[Record],
    dm_kind: &str,
) -> Result<Catalog<ReadoutUnit>> {
    let mut parts = Catalog::new();
    for row in parents {
        let info = parent_info(row)?;
        let dms = daughter_barcodes(daughters, &info.id, dm_kind);

        let part = if dms.is_empty() {
            tracing::warn!("Error fetching parts for RU {}: no DMs attached", info.barcode);
            None
        } else {
            Some(ReadoutUnit {
                barcode: info.barcode.clone(),
                id: info.id,
                dms: dms.into_iter().map(Link::Barcode).collect(),
                prod_datime: info.prod_datime,
            })
        };
        parts.insert(info.barcode, part);
    }
    Ok(parts)
}

impl Assemble for SiPMArray {
    fn assemble(batch: &FetchedBatch, _config: &dyn ConfigProvider) -> Result<Catalog<Self>> {
        assemble_sipm_arrays(&batch.parents, &tec_resistance_map(&batch.extra))
    }
}

impl Assemble for SensorModule {
    fn assemble(batch: &FetchedBatch, config: &dyn ConfigProvider) -> Result<Catalog<Self>> {
        assemble_sensor_modules(
            &batch.parents,
            &batch.extra,
            config.kind_of_part(PartKind::LYSOMatrix),
            config.kind_of_part(PartKind::SiPMArray),
        )
    }
}

impl Assemble for DetectorModule {
    fn assemble(batch: &FetchedBatch, config: &dyn ConfigProvider) -> Result<Catalog<Self>> {
        assemble_detector_modules(
            &batch.parents,
            &batch.extra,
            config.kind_of_part(PartKind::FrontEnd),
            config.kind_of_part(PartKind::SensorModule),
        )
    }
}

impl Assemble for ReadoutUnit {
    fn assemble(batch: &FetchedBatch, config: &dyn ConfigProvider) -> Result<Catalog<Self>> {
        assemble_readout_units(
            &batch.parents,
            &batch.extra,
            config.kind_of_part(PartKind::DetectorModule),
        )
    }
}
