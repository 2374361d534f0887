use crate::domain::ports::HistogramSource;
use crate::plot::histogram::Histogram1D;
use crate::utils::error::{PartsError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Histograms read from a YAML or JSON document mapping name to histogram.
#[derive(Debug, Clone)]
pub struct HistogramFile {
    path: PathBuf,
    histograms: BTreeMap<String, Histogram1D>,
}

impl HistogramFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let raw: BTreeMap<String, Histogram1D> = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => {
                return Err(PartsError::ProcessingError {
                    message: format!(
                        "unsupported histogram file extension '{}' ({})",
                        other,
                        path.display()
                    ),
                })
            }
        };

        let histograms = raw
            .into_iter()
            .map(|(name, mut hist)| {
                if hist.name.is_empty() {
                    hist.name = name.clone();
                }
                hist.validated().map(|h| (name, h))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        tracing::debug!(
            "Loaded {} histogram(s) from {}",
            histograms.len(),
            path.display()
        );
        Ok(Self { path, histograms })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.histograms.keys().map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<Histogram1D> {
        self.get(name).ok_or_else(|| PartsError::MissingHistogram {
            name: name.to_string(),
            source_path: self.path(),
        })
    }
}

impl HistogramSource for HistogramFile {
    fn get(&self, name: &str) -> Option<Histogram1D> {
        self.histograms.get(name).cloned()
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join("module.yaml");
        std::fs::write(
            &yaml,
            "h1_amp:\n  title: Amplitude\n  nbins: 2\n  xmin: 0\n  xmax: 2\n  contents: [0, 3, 4, 1]\n",
        )
        .unwrap();
        let json = dir.path().join("module.json");
        std::fs::write(
            &json,
            r#"{"h1_t": {"nbins": 1, "xmin": 0, "xmax": 1, "contents": [5], "sumw2": [2]}}"#,
        )
        .unwrap();

        let file = HistogramFile::load(&yaml).unwrap();
        let h = file.require("h1_amp").unwrap();
        assert_eq!(h.name, "h1_amp");
        assert_eq!(h.bin_content(2), 4.0);
        assert_eq!(h.bin_error(1), 3f64.sqrt());
        assert!(file.require("h1_nope").is_err());

        let file = HistogramFile::load(&json).unwrap();
        let h = file.get("h1_t").unwrap();
        assert_eq!(h.contents, vec![0.0, 5.0, 0.0]);
        assert_eq!(h.bin_error(1), 2f64.sqrt());
        assert_eq!(file.names().collect::<Vec<_>>(), vec!["h1_t"]);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("module.root");
        std::fs::write(&root, "binary").unwrap();
        assert!(HistogramFile::load(&root).is_err());
    }
}
