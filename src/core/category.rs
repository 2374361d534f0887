//! Quality-control categorization of a module from its histograms.

use crate::core::expr::{Env, Expr, Value};
use crate::domain::ports::HistogramSource;
use crate::utils::error::{PartsError, Result};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Deserialize a mapping while keeping its key order.
fn ordered<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                other => serde_yaml::to_string(&other)
                    .map_err(D::Error::custom)?
                    .trim()
                    .to_string(),
            };
            let value = serde_yaml::from_value(value).map_err(D::Error::custom)?;
            Ok((key, value))
        })
        .collect()
}

fn as_map<S, T>(items: &[(String, T)], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    serializer.collect_map(items.iter().map(|(k, v)| (k, v)))
}

/// Categorization rules.
///
/// `read` maps variable names to histogram names, `values` holds constants,
/// `metrics` and `categories` hold expressions evaluated in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default, deserialize_with = "ordered", serialize_with = "as_map")]
    pub read: Vec<(String, String)>,
    #[serde(default, deserialize_with = "ordered", serialize_with = "as_map")]
    pub values: Vec<(String, f64)>,
    #[serde(default, deserialize_with = "ordered", serialize_with = "as_map")]
    pub metrics: Vec<(String, String)>,
    #[serde(default, deserialize_with = "ordered", serialize_with = "as_map")]
    pub categories: Vec<(String, String)>,
}

impl CategoryConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryResult {
    #[serde(serialize_with = "as_map")]
    pub read: Vec<(String, String)>,
    #[serde(serialize_with = "as_map")]
    pub values: Vec<(String, f64)>,
    #[serde(serialize_with = "as_map")]
    pub metrics: Vec<(String, Value)>,
    #[serde(serialize_with = "as_map")]
    pub categories: Vec<(String, Value)>,
    pub category: Option<String>,
}

impl CategoryResult {
    pub fn metric(&self, name: &str) -> Option<&Value> {
        self.metrics.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn category_error(
    source: &dyn HistogramSource,
    result: &CategoryResult,
    barcode: &str,
    reason: String,
) -> PartsError {
    PartsError::Category {
        barcode: barcode.to_string(),
        reason,
        source_path: source.path(),
        dump: result.to_yaml().unwrap_or_default(),
    }
}

/// Evaluate the metrics and categories of one module.
///
/// Exactly one category must evaluate true; the last true one is reported.
pub fn eval_category(
    source: &dyn HistogramSource,
    cfg: &CategoryConfig,
    barcode: &str,
) -> Result<CategoryResult> {
    let mut result = CategoryResult {
        read: cfg.read.clone(),
        values: cfg.values.clone(),
        ..CategoryResult::default()
    };

    let mut env = Env::new();
    for (name, value) in &cfg.values {
        env.insert(name.clone(), Value::Number(*value));
    }
    for (var, hist_name) in &cfg.read {
        let hist = source
            .get(hist_name)
            .ok_or_else(|| PartsError::MissingHistogram {
                name: hist_name.clone(),
                source_path: source.path(),
            })?;
        env.insert(var.clone(), Value::from(hist));
    }

    for (name, expression) in &cfg.metrics {
        let value = Expr::parse(expression)?.eval(&env)?;
        tracing::debug!("Module {}: metric {} = {}", barcode, name, value);
        env.insert(name.clone(), value.clone());
        result.metrics.push((name.clone(), value));
    }

    // categories see the constants, the metrics and earlier categories
    let mut cat_env: Env = cfg
        .values
        .iter()
        .map(|(name, value)| (name.clone(), Value::Number(*value)))
        .chain(result.metrics.iter().cloned())
        .collect();
    let mut chosen = None;
    let mut n_true = 0;
    for (name, expression) in &cfg.categories {
        let value = Expr::parse(expression)?.eval(&cat_env)?;
        let Some(is_true) = value.as_bool() else {
            result.categories.push((name.clone(), value.clone()));
            return Err(category_error(
                source,
                &result,
                barcode,
                format!("category '{}' is not boolean (got {})", name, value),
            ));
        };
        if is_true {
            chosen = Some(name.clone());
            n_true += 1;
        }
        cat_env.insert(name.clone(), value.clone());
        result.categories.push((name.clone(), value));
    }

    match n_true {
        0 => Err(category_error(source, &result, barcode, "uncategorized".to_string())),
        1 => {
            result.category = chosen;
            Ok(result)
        }
        _ => Err(category_error(
            source,
            &result,
            barcode,
            "categorization is not mutually exclusive".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::histogram::Histogram1D;
    use std::collections::HashMap;

    struct MemorySource(HashMap<String, Histogram1D>);

    impl HistogramSource for MemorySource {
        fn get(&self, name: &str) -> Option<Histogram1D> {
            self.0.get(name).cloned()
        }

        fn path(&self) -> String {
            "memory://module.root".to_string()
        }
    }

    fn source(amplitude: f64) -> MemorySource {
        let mut h = Histogram1D::new("h1_amp", "", 100, 0.0, 100.0);
        for _ in 0..10 {
            h.fill(amplitude);
        }
        MemorySource(HashMap::from([("h1_amp".to_string(), h)]))
    }

    const RULES: &str = r#"
read:
  amp: h1_amp
values:
  thr: 40
metrics:
  amp_mean: "{amp}.GetMean()"
  amp_ok: "{amp_mean} > {thr}"
categories:
  good: "{amp_ok}"
  bad: "not {amp_ok}"
"#;

    #[test]
    fn test_config_keeps_file_order() {
        let cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        let metrics: Vec<&str> = cfg.metrics.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(metrics, vec!["amp_mean", "amp_ok"]);
        assert_eq!(cfg.values, vec![("thr".to_string(), 40.0)]);
    }

    #[test]
    fn test_categorizes_module() {
        let cfg = CategoryConfig::from_yaml_str(RULES).unwrap();

        let good = eval_category(&source(55.5), &cfg, "32110040000010").unwrap();
        assert_eq!(good.category.as_deref(), Some("good"));
        assert_eq!(good.metric("amp_mean"), Some(&Value::Number(55.5)));

        let bad = eval_category(&source(10.5), &cfg, "32110040000011").unwrap();
        assert_eq!(bad.category.as_deref(), Some("bad"));

        let yaml = good.to_yaml().unwrap();
        assert!(yaml.contains("category: good"));
        assert!(yaml.find("amp_mean").unwrap() < yaml.find("amp_ok").unwrap());
    }

    #[test]
    fn test_categories_see_constants_but_not_histograms() {
        let mut cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        cfg.categories = vec![
            ("good".to_string(), "{amp_mean} > {thr}".to_string()),
            ("bad".to_string(), "not good".to_string()),
        ];
        let result = eval_category(&source(55.5), &cfg, "BC2").unwrap();
        assert_eq!(result.category.as_deref(), Some("good"));

        cfg.categories = vec![("good".to_string(), "{amp}.GetMean() > 0".to_string())];
        let err = eval_category(&source(55.5), &cfg, "BC3").unwrap_err();
        assert!(matches!(err, PartsError::Expression { .. }));
    }

    #[test]
    fn test_uncategorized() {
        let mut cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        cfg.categories = vec![("good".to_string(), "amp_mean > 1000".to_string())];

        let err = eval_category(&source(55.5), &cfg, "BC1").unwrap_err();
        match err {
            PartsError::Category {
                barcode,
                reason,
                source_path,
                dump,
            } => {
                assert_eq!(barcode, "BC1");
                assert_eq!(reason, "uncategorized");
                assert_eq!(source_path, "memory://module.root");
                assert!(dump.contains("good: false"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_mutually_exclusive() {
        let mut cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        cfg.categories.push(("also_good".to_string(), "good".to_string()));

        let err = eval_category(&source(55.5), &cfg, "BC2").unwrap_err();
        assert!(err.to_string().contains("not mutually exclusive"));
    }

    #[test]
    fn test_non_boolean_category() {
        let mut cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        cfg.categories = vec![("weird".to_string(), "amp_mean".to_string())];

        let err = eval_category(&source(55.5), &cfg, "BC3").unwrap_err();
        assert!(err.to_string().contains("is not boolean"));
    }

    #[test]
    fn test_missing_histogram() {
        let mut cfg = CategoryConfig::from_yaml_str(RULES).unwrap();
        cfg.read = vec![("amp".to_string(), "h1_missing".to_string())];

        let err = eval_category(&source(55.5), &cfg, "BC4").unwrap_err();
        assert!(matches!(err, PartsError::MissingHistogram { name, .. } if name == "h1_missing"));
    }
}
