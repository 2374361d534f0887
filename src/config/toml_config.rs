use crate::adapters::rhapi::{DEFAULT_TUNNEL_PORT, DEFAULT_URL};
use crate::core::barcode_groups::DEFAULT_MAX_GROUP_SPAN;
use crate::domain::model::PartKind;
use crate::domain::ports::ConfigProvider;
use crate::plot::convert::DEFAULT_DPI;
use crate::plot::options::PlotOptions;
use crate::utils::error::{PartsError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range,
    validate_required_field, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "mtd-parts.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartsConfig {
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    pub kinds: KindNames,
    /// Site name to `LOCATION_ID`.
    pub locations: BTreeMap<String, LocationValue>,
    pub plot: PlotConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Local port of the SSH tunnel; 0 skips the check.
    pub tunnel_port: u16,
    pub format: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_group_span: u64,
}

/// `KIND_OF_PART` strings used by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindNames {
    pub sipm: String,
    pub lyso: String,
    pub sm: String,
    pub fe: String,
    pub dm: String,
    pub ru: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub png_dpi: u32,
    pub convert_to_png: bool,
    pub cms_extra_text: String,
    pub lumi_text: String,
}

/// A location id, or text that becomes one once `${VAR}` is expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationValue {
    Id(i64),
    Text(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            tunnel_port: DEFAULT_TUNNEL_PORT,
            format: "json2".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_group_span: DEFAULT_MAX_GROUP_SPAN,
        }
    }
}

impl Default for KindNames {
    fn default() -> Self {
        Self {
            sipm: "SiPMArray".to_string(),
            lyso: "LYSOMatrix".to_string(),
            sm: "SensorModule".to_string(),
            fe: "FE".to_string(),
            dm: "DetectorModule".to_string(),
            ru: "ReadoutUnit".to_string(),
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            png_dpi: DEFAULT_DPI,
            convert_to_png: true,
            cms_extra_text: "Internal".to_string(),
            lumi_text: "Phase-2".to_string(),
        }
    }
}

impl Default for PartsConfig {
    fn default() -> Self {
        let locations = ["CERN", "CIT", "MIB"]
            .into_iter()
            .map(|site| {
                (
                    site.to_string(),
                    LocationValue::Text(format!("${{MTD_LOCATION_{}}}", site)),
                )
            })
            .collect();

        Self {
            database: DatabaseConfig::default(),
            fetch: FetchConfig::default(),
            kinds: KindNames::default(),
            locations,
            plot: PlotConfig::default(),
        }
    }
}

impl PartsConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed)?)
    }

    /// The given file, else `mtd-parts.toml` if present, else the defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                tracing::debug!("Using configuration file {}", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Replace `${VAR}` with the environment value; unset variables stay as is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Names of the `${VAR}` references left after substitution.
    fn unset_env_vars(content: &str) -> Result<Vec<String>> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;
        Ok(re
            .captures_iter(content)
            .map(|caps| caps[1].to_string())
            .collect())
    }

    /// A location given by site name or as a numeric id.
    pub fn resolve_location(&self, name_or_id: &str) -> Result<i64> {
        if let Ok(id) = name_or_id.trim().parse::<i64>() {
            return Ok(id);
        }

        let field = format!("locations.{}", name_or_id);
        let entry = self.locations.get(name_or_id).cloned();
        let value = validate_required_field(&field, &entry)?;
        match value {
            LocationValue::Id(id) => Ok(*id),
            LocationValue::Text(text) => {
                let expanded = Self::substitute_env_vars(text)?;
                if let Ok(id) = expanded.trim().parse::<i64>() {
                    return Ok(id);
                }

                let unset = Self::unset_env_vars(&expanded)?;
                let reason = if unset.is_empty() {
                    "Location must be a numeric LOCATION_ID".to_string()
                } else {
                    format!(
                        "Environment variable {} is not set; export the numeric LOCATION_ID or set {} in {}",
                        unset.join(", "),
                        field,
                        DEFAULT_CONFIG_FILE
                    )
                };
                Err(PartsError::InvalidConfigValueError {
                    field,
                    value: expanded,
                    reason,
                })
            }
        }
    }

    pub fn resolve_locations<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<i64>> {
        names
            .iter()
            .map(|name| self.resolve_location(name.as_ref()))
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.database.timeout_seconds)
    }

    /// Plot defaults with the `[plot]` section applied.
    pub fn plot_options(&self) -> PlotOptions {
        PlotOptions {
            convert_to_png: self.plot.convert_to_png,
            png_dpi: self.plot.png_dpi,
            cms_extra_text: self.plot.cms_extra_text.clone(),
            lumi_text: self.plot.lumi_text.clone(),
            ..PlotOptions::default()
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("database.url", &self.database.url)?;
        validate_positive_number("database.timeout_seconds", self.database.timeout_seconds, 1)?;
        validate_positive_number("fetch.max_group_span", self.fetch.max_group_span, 1)?;
        validate_range("plot.png_dpi", self.plot.png_dpi, 10, 2400)?;

        let valid_formats = ["json", "json2"];
        if !valid_formats.contains(&self.database.format.as_str()) {
            return Err(PartsError::InvalidConfigValueError {
                field: "database.format".to_string(),
                value: self.database.format.clone(),
                reason: format!(
                    "Unsupported format. Valid formats: {}",
                    valid_formats.join(", ")
                ),
            });
        }

        for kind in PartKind::ALL {
            validate_non_empty_string(
                &format!("kinds.{}", kind.short_name().to_lowercase()),
                self.kind_of_part(kind),
            )?;
        }
        Ok(())
    }
}

impl ConfigProvider for PartsConfig {
    fn database_url(&self) -> &str {
        &self.database.url
    }

    fn tunnel_port(&self) -> u16 {
        self.database.tunnel_port
    }

    fn max_group_span(&self) -> u64 {
        self.fetch.max_group_span
    }

    fn kind_of_part(&self, kind: PartKind) -> &str {
        match kind {
            PartKind::SiPMArray => &self.kinds.sipm,
            PartKind::LYSOMatrix => &self.kinds.lyso,
            PartKind::SensorModule => &self.kinds.sm,
            PartKind::FrontEnd => &self.kinds.fe,
            PartKind::DetectorModule => &self.kinds.dm,
            PartKind::ReadoutUnit => &self.kinds.ru,
        }
    }
}

impl Validate for PartsConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PartsConfig::default();
        assert_eq!(config.database_url(), "http://localhost:8113");
        assert_eq!(config.tunnel_port(), 8113);
        assert_eq!(config.max_group_span(), 500);
        assert_eq!(config.kind_of_part(PartKind::DetectorModule), "DetectorModule");
        assert_eq!(config.plot.png_dpi, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = PartsConfig::from_toml_str(
            r#"
[database]
url = "http://localhost:9000"
tunnel_port = 0

[fetch]
max_group_span = 250

[kinds]
dm = "DM v1"

[locations]
CIT = 1003
MIB = "1005"
"#,
        )
        .unwrap();

        assert_eq!(config.database.url, "http://localhost:9000");
        assert_eq!(config.database.format, "json2");
        assert_eq!(config.tunnel_port(), 0);
        assert_eq!(config.max_group_span(), 250);
        assert_eq!(config.kind_of_part(PartKind::DetectorModule), "DM v1");
        assert_eq!(config.kind_of_part(PartKind::SensorModule), "SensorModule");
        assert_eq!(config.resolve_locations(&["CIT", "MIB", "42"]).unwrap(), vec![1003, 1005, 42]);
        assert!(config.resolve_location("CERN").is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MTD_PARTS_TEST_URL", "https://cmsomds.example.org/api");
        std::env::set_var("MTD_PARTS_TEST_LOCATION", "2001");

        let config = PartsConfig::from_toml_str(
            r#"
[database]
url = "${MTD_PARTS_TEST_URL}"

[locations]
CIT = "${MTD_PARTS_TEST_LOCATION}"
"#,
        )
        .unwrap();
        assert_eq!(config.database.url, "https://cmsomds.example.org/api");
        assert_eq!(config.resolve_location("CIT").unwrap(), 2001);

        std::env::remove_var("MTD_PARTS_TEST_URL");
        std::env::remove_var("MTD_PARTS_TEST_LOCATION");
    }

    #[test]
    fn test_unset_location_variable_is_reported() {
        let config = PartsConfig::default();
        std::env::remove_var("MTD_LOCATION_MIB");
        let err = config.resolve_location("MIB").unwrap_err();
        match err {
            PartsError::InvalidConfigValueError { field, reason, .. } => {
                assert_eq!(field, "locations.MIB");
                assert!(reason.contains("MTD_LOCATION_MIB"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_config_validation() {
        let bad_url = PartsConfig::from_toml_str("[database]\nurl = \"ftp://db\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_span = PartsConfig::from_toml_str("[fetch]\nmax_group_span = 0\n").unwrap();
        assert!(bad_span.validate().is_err());

        let bad_kind = PartsConfig::from_toml_str("[kinds]\nsm = \"  \"\n").unwrap();
        assert!(bad_kind.validate().is_err());

        let bad_format = PartsConfig::from_toml_str("[database]\nformat = \"xml\"\n").unwrap();
        assert!(bad_format.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[plot]\npng_dpi = 150\nlumi_text = \"Test beam\"\n")
            .unwrap();

        let config = PartsConfig::from_file(temp_file.path()).unwrap();
        let opts = config.plot_options();
        assert_eq!(opts.png_dpi, 150);
        assert_eq!(opts.lumi_text, "Test beam");
        assert_eq!(opts.cms_extra_text, "Internal");
    }

    #[test]
    fn test_invalid_toml() {
        let err = PartsConfig::from_toml_str("[database\nurl = 1").unwrap_err();
        assert!(matches!(err, PartsError::TomlError(_)));
    }
}
