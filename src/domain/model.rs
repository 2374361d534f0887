use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{PartsError, Result};

/// One row of a database query result, keyed by camelCase column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn from_object(obj: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            data: obj.into_iter().collect(),
        }
    }

    /// Column value as a string; numbers are rendered without quotes.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.data.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .ok_or_else(|| PartsError::MalformedResponse {
                message: format!("row is missing column '{}': {:?}", key, self.data),
            })
    }

    pub fn insert(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.data.insert(key.to_string(), value.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartKind {
    SiPMArray,
    LYSOMatrix,
    SensorModule,
    FrontEnd,
    DetectorModule,
    ReadoutUnit,
}

/// Where the extra information for a kind comes from, beyond its own part rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// Daughter parts assembled into the parent.
    Daughters,
    /// Measurements in the TEC resistance table.
    TecResistance,
}

impl PartKind {
    pub const ALL: [PartKind; 6] = [
        PartKind::SiPMArray,
        PartKind::LYSOMatrix,
        PartKind::SensorModule,
        PartKind::FrontEnd,
        PartKind::DetectorModule,
        PartKind::ReadoutUnit,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            PartKind::SiPMArray => "SiPM",
            PartKind::LYSOMatrix => "LYSO",
            PartKind::SensorModule => "SM",
            PartKind::FrontEnd => "FEB",
            PartKind::DetectorModule => "DM",
            PartKind::ReadoutUnit => "RU",
        }
    }

    /// Kinds that have a record type and can be fetched and cached.
    pub fn is_fetchable(&self) -> bool {
        !matches!(self, PartKind::LYSOMatrix | PartKind::FrontEnd)
    }

    pub fn ensure_fetchable(&self) -> Result<()> {
        if self.is_fetchable() {
            Ok(())
        } else {
            Err(PartsError::InvalidPartKind {
                kind: self.to_string(),
            })
        }
    }

    pub fn row_source(&self) -> RowSource {
        match self {
            PartKind::SiPMArray => RowSource::TecResistance,
            _ => RowSource::Daughters,
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for PartKind {
    type Err = PartsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sipm" | "sipmarray" => Ok(PartKind::SiPMArray),
            "lyso" | "lysomatrix" => Ok(PartKind::LYSOMatrix),
            "sm" | "sensormodule" => Ok(PartKind::SensorModule),
            "fe" | "feb" | "frontend" => Ok(PartKind::FrontEnd),
            "dm" | "detectormodule" => Ok(PartKind::DetectorModule),
            "ru" | "readoutunit" => Ok(PartKind::ReadoutUnit),
            _ => Err(PartsError::InvalidPartKind {
                kind: s.to_string(),
            }),
        }
    }
}

/// A child reference: a barcode until resolved, then the referenced record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link<T> {
    Resolved(T),
    Barcode(String),
}

impl<T: Part> Link<T> {
    pub fn barcode(&self) -> &str {
        match self {
            Link::Resolved(part) => part.barcode(),
            Link::Barcode(barcode) => barcode,
        }
    }

    pub fn resolved(&self) -> Option<&T> {
        match self {
            Link::Resolved(part) => Some(part),
            Link::Barcode(_) => None,
        }
    }

    /// Replace a bare barcode with its record when the lookup has it.
    pub fn resolve(&mut self, lookup: &Catalog<T>) {
        if let Link::Barcode(barcode) = self {
            if let Some(Some(part)) = lookup.get(barcode.as_str()) {
                *self = Link::Resolved(part.clone());
            }
        }
    }
}

impl<T> From<&str> for Link<T> {
    fn from(barcode: &str) -> Self {
        Link::Barcode(barcode.to_string())
    }
}

impl<T> From<String> for Link<T> {
    fn from(barcode: String) -> Self {
        Link::Barcode(barcode)
    }
}

pub trait Part:
    Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync + 'static
{
    const KIND: PartKind;

    fn barcode(&self) -> &str;
}

/// Parts keyed by barcode. `None` marks a part known to the database whose
/// assembly information is incomplete; such entries are never written to disk.
pub type Catalog<P> = BTreeMap<String, Option<P>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiPMArray {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tec_res: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorModule {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub lyso: Option<String>,
    #[serde(default)]
    pub sipm1: Option<Link<SiPMArray>>,
    #[serde(default)]
    pub sipm2: Option<Link<SiPMArray>>,
    #[serde(default)]
    pub prod_datime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorModule {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub feb: Option<String>,
    #[serde(default)]
    pub sm1: Option<Link<SensorModule>>,
    #[serde(default)]
    pub sm2: Option<Link<SensorModule>>,
    #[serde(default)]
    pub prod_datime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadoutUnit {
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub dms: Vec<Link<DetectorModule>>,
    #[serde(default)]
    pub prod_datime: Option<String>,
}

impl Part for SiPMArray {
    const KIND: PartKind = PartKind::SiPMArray;

    fn barcode(&self) -> &str {
        &self.barcode
    }
}

impl Part for SensorModule {
    const KIND: PartKind = PartKind::SensorModule;

    fn barcode(&self) -> &str {
        &self.barcode
    }
}

impl Part for DetectorModule {
    const KIND: PartKind = PartKind::DetectorModule;

    fn barcode(&self) -> &str {
        &self.barcode
    }
}

impl Part for ReadoutUnit {
    const KIND: PartKind = PartKind::ReadoutUnit;

    fn barcode(&self) -> &str {
        &self.barcode
    }
}

impl DetectorModule {
    /// Barcodes of both sensor modules, resolved or not.
    pub fn sm_barcodes(&self) -> Vec<String> {
        [&self.sm1, &self.sm2]
            .into_iter()
            .flatten()
            .map(|link| link.barcode().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_kind_parsing() {
        assert_eq!("dm".parse::<PartKind>().unwrap(), PartKind::DetectorModule);
        assert_eq!("SiPM".parse::<PartKind>().unwrap(), PartKind::SiPMArray);
        assert_eq!("RU".parse::<PartKind>().unwrap(), PartKind::ReadoutUnit);
        assert!("crystal".parse::<PartKind>().is_err());
    }

    #[test]
    fn test_lyso_and_feb_are_not_fetchable() {
        assert!(PartKind::LYSOMatrix.ensure_fetchable().is_err());
        assert!(PartKind::FrontEnd.ensure_fetchable().is_err());
        assert!(PartKind::SensorModule.ensure_fetchable().is_ok());
    }

    #[test]
    fn test_record_accessors_accept_numbers_and_strings() {
        let row = Record::from_object(
            serde_json::json!({"id": 1042, "barcode": "3211", "rac": "12.5"})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(row.get_str("id").as_deref(), Some("1042"));
        assert_eq!(row.get_f64("rac"), Some(12.5));
        assert!(row.require_str("kindOfPart").is_err());
    }

    #[test]
    fn test_link_resolution_keeps_unknown_barcodes() {
        let mut lookup: Catalog<SiPMArray> = Catalog::new();
        lookup.insert(
            "100".to_string(),
            Some(SiPMArray {
                barcode: "100".to_string(),
                id: "1".to_string(),
                tec_res: Some(3.2),
            }),
        );
        lookup.insert("101".to_string(), None);

        let mut known: Link<SiPMArray> = "100".into();
        let mut incomplete: Link<SiPMArray> = "101".into();
        let mut unknown: Link<SiPMArray> = "999".into();
        known.resolve(&lookup);
        incomplete.resolve(&lookup);
        unknown.resolve(&lookup);

        assert_eq!(known.resolved().map(|s| s.tec_res), Some(Some(3.2)));
        assert_eq!(incomplete, Link::Barcode("101".to_string()));
        assert_eq!(unknown.barcode(), "999");
    }

    #[test]
    fn test_detector_module_yaml_round_trip_with_resolved_link() {
        let dm = DetectorModule {
            barcode: "32110020000001".to_string(),
            id: "77".to_string(),
            feb: Some("32110030000005".to_string()),
            sm1: Some(Link::Resolved(SensorModule {
                barcode: "32110040000010".to_string(),
                id: "55".to_string(),
                lyso: Some("32110050000002".to_string()),
                sipm1: Some("32110060000001".into()),
                sipm2: Some("32110060000002".into()),
                prod_datime: None,
            })),
            sm2: Some("32110040000011".into()),
            prod_datime: Some("2024-05-02 10:00:00".to_string()),
        };

        let yaml = serde_yaml::to_string(&dm).unwrap();
        let back: DetectorModule = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, dm);
        assert_eq!(back.sm_barcodes(), vec!["32110040000010", "32110040000011"]);
    }
}
