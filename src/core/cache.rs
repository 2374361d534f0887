use crate::adapters::storage::LocalStorage;
use crate::domain::model::{Catalog, Part};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::collections::BTreeMap;

/// Load cached parts from a YAML file. A missing file yields an empty catalog.
pub async fn load_catalog<P: Part, S: Storage>(storage: &S, path: &str) -> Result<Catalog<P>> {
    P::KIND.ensure_fetchable()?;

    if !storage.exists(path).await {
        tracing::info!(
            "{} information file ({}) does not exist. No {} information loaded.",
            P::KIND,
            path,
            P::KIND
        );
        return Ok(Catalog::new());
    }

    tracing::info!("Loading {} information from file: {} ...", P::KIND, path);
    let bytes = storage.read_file(path).await?;
    let text = String::from_utf8_lossy(&bytes);

    let parts: BTreeMap<String, P> = if text.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(&text)?
    };

    tracing::info!("Loaded information for {} {}(s).", parts.len(), P::KIND);
    Ok(parts.into_iter().map(|(k, v)| (k, Some(v))).collect())
}

/// Write the complete parts of a catalog to YAML; returns how many were written.
pub async fn save_catalog<P: Part, S: Storage>(
    storage: &S,
    path: &str,
    catalog: &Catalog<P>,
) -> Result<usize> {
    P::KIND.ensure_fetchable()?;

    let parts: BTreeMap<&String, &P> = catalog
        .iter()
        .filter_map(|(barcode, part)| part.as_ref().map(|p| (barcode, p)))
        .collect();

    tracing::info!("Saving {} information to file: {} ...", P::KIND, path);
    let yaml = serde_yaml::to_string(&parts)?;
    storage.write_file(path, yaml.as_bytes()).await?;
    tracing::info!("Saved information for {} {}(s).", parts.len(), P::KIND);

    Ok(parts.len())
}

pub async fn load_part_info<P: Part>(yaml_file: &str) -> Result<Catalog<P>> {
    load_catalog(&LocalStorage::current_dir(), yaml_file).await
}

pub async fn save_part_info<P: Part>(yaml_file: &str, catalog: &Catalog<P>) -> Result<usize> {
    save_catalog(&LocalStorage::current_dir(), yaml_file, catalog).await
}
