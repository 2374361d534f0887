//! Entry points shared by the `mtd-parts` CLI and the preset binaries.

use crate::adapters::rhapi::RhApiClient;
use crate::config::PartsConfig;
use crate::core::assembly::Assemble;
use crate::core::pipeline::{save_all_part_info, FetchJob};
use crate::domain::model::{DetectorModule, PartKind, ReadoutUnit, SensorModule, SiPMArray};
use crate::utils::error::{PartsError, Result};
use crate::utils::logger;
use crate::utils::validation::{validate_path, Validate};

/// A fixed cache update: one kind, one YAML file used as input and output.
///
/// `locations` are site names resolved through `[locations]`; the default
/// configuration reads them from `MTD_LOCATION_<SITE>`.
#[derive(Debug, Clone, Copy)]
pub struct DriverPreset {
    pub kind: PartKind,
    pub yaml: &'static str,
    pub locations: &'static [&'static str],
}

pub const CIT_DM_INFO: DriverPreset = DriverPreset {
    kind: PartKind::DetectorModule,
    yaml: "info/CIT/dm_info.yaml",
    locations: &["CIT"],
};

pub const MIB_DM_INFO: DriverPreset = DriverPreset {
    kind: PartKind::DetectorModule,
    yaml: "info/MIB/dm_info.yaml",
    locations: &["MIB", "CERN"],
};

pub const MIB_RU_INFO: DriverPreset = DriverPreset {
    kind: PartKind::ReadoutUnit,
    yaml: "info/MIB/ru_info.yaml",
    locations: &["MIB", "CERN"],
};

impl DriverPreset {
    pub fn job(&self, config: &PartsConfig) -> Result<FetchJob> {
        Ok(FetchJob {
            in_yaml: Some(self.yaml.to_string()),
            out_yaml: self.yaml.to_string(),
            locations: config.resolve_locations(self.locations)?,
            nodb: false,
        })
    }
}

async fn fetch_as<P: Assemble>(
    db: RhApiClient,
    config: &PartsConfig,
    job: FetchJob,
) -> Result<usize> {
    validate_path("out_yaml", &job.out_yaml)?;
    let catalog = save_all_part_info::<P, _, _>(db, config.clone(), job, true).await?;
    Ok(catalog
        .map(|catalog| catalog.values().flatten().count())
        .unwrap_or(0))
}

/// Update the cache of `kind` described by `job`; returns the number of
/// complete parts written.
pub async fn fetch_kind(config: &PartsConfig, kind: PartKind, job: FetchJob) -> Result<usize> {
    let db = RhApiClient::from_config(config, config.timeout())?
        .with_format(&config.database.format);

    match kind {
        PartKind::SiPMArray => fetch_as::<SiPMArray>(db, config, job).await,
        PartKind::SensorModule => fetch_as::<SensorModule>(db, config, job).await,
        PartKind::DetectorModule => fetch_as::<DetectorModule>(db, config, job).await,
        PartKind::ReadoutUnit => fetch_as::<ReadoutUnit>(db, config, job).await,
        PartKind::LYSOMatrix | PartKind::FrontEnd => Err(PartsError::InvalidPartKind {
            kind: kind.to_string(),
        }),
    }
}

/// Log an error with its classification and print the user-facing lines.
pub fn report_failure(context: &str, e: &PartsError) {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
}

async fn run_preset_inner(preset: &DriverPreset) -> Result<usize> {
    let config = PartsConfig::load_or_default(None)?;
    config.validate()?;
    let job = preset.job(&config)?;
    fetch_kind(&config, preset.kind, job).await
}

/// Run a preset and return the process exit code.
pub async fn run_preset(preset: &DriverPreset) -> i32 {
    logger::init_cli_logger(false);
    tracing::info!(
        "🚀 Updating {} information in {} (locations: {})",
        preset.kind,
        preset.yaml,
        preset.locations.join(", ")
    );

    match run_preset_inner(preset).await {
        Ok(count) => {
            tracing::info!("✅ Saved {} {}(s) to {}", count, preset.kind, preset.yaml);
            0
        }
        Err(e) => {
            report_failure(&format!("{} update", preset.kind), &e);
            e.exit_code()
        }
    }
}
