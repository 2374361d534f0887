use anyhow::{anyhow, Context};
use clap::Parser;
use mtd_parts::adapters::{HistogramFile, RhApiClient};
use mtd_parts::config::{Cli, Command, PartsConfig};
use mtd_parts::core::cache::{load_part_info, save_part_info};
use mtd_parts::core::category::{eval_category, CategoryConfig};
use mtd_parts::core::link::{attach_detector_modules, combine_parts};
use mtd_parts::core::pipeline::{get_used_sm_barcodes, FetchJob};
use mtd_parts::domain::model::{DetectorModule, ReadoutUnit, SensorModule, SiPMArray};
use mtd_parts::drivers::{fetch_kind, report_failure};
use mtd_parts::plot::{convert_to_png, plot_1d, Histogram1D, PlotOptions};
use mtd_parts::utils::files::{get_file_list, natural_sort};
use mtd_parts::utils::{logger, validation::Validate};
use mtd_parts::PartsError;
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_log {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("🚀 Starting mtd-parts");
    if cli.verbose {
        tracing::debug!("CLI arguments: {:?}", cli);
    }

    let mut config = match PartsConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };
    if let Some(url) = &cli.db_url {
        config.database.url = url.clone();
        tracing::info!("🔧 Database URL overridden to: {}", url);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, config).await {
        match e.downcast_ref::<PartsError>() {
            Some(err) => {
                if let PartsError::Category {
                    source_path, dump, ..
                } = err
                {
                    println!("File: {}", source_path);
                    println!("Categorization:");
                    print!("{}", dump);
                }
                tracing::error!("❌ {:#}", e);
                report_failure("Command", err);
                std::process::exit(err.exit_code());
            }
            None => {
                tracing::error!("❌ {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run(command: Command, config: PartsConfig) -> anyhow::Result<()> {
    match command {
        Command::Fetch {
            kind,
            out,
            input,
            location,
            nodb,
        } => {
            let job = FetchJob {
                in_yaml: input,
                out_yaml: out.clone(),
                locations: config.resolve_locations(&location)?,
                nodb,
            };
            let count = fetch_kind(&config, kind, job).await?;
            tracing::info!("✅ Saved {} {}(s) to {}", count, kind, out);
            println!("📁 Output saved to: {}", out);
        }

        Command::UsedSms {
            dm_yaml,
            location,
            nodb,
        } => {
            let db = RhApiClient::from_config(&config, config.timeout())?
                .with_format(&config.database.format);
            let job = FetchJob {
                in_yaml: dm_yaml,
                locations: config.resolve_locations(&location)?,
                nodb,
                ..FetchJob::default()
            };
            let used = get_used_sm_barcodes(db, config, job).await?;
            tracing::info!("Found {} SM(s) assembled into DMs", used.len());
            for barcode in natural_sort(used) {
                println!("{}", barcode);
            }
        }

        Command::Combine {
            sipm,
            sm,
            dm,
            out,
            ru,
            ru_out,
        } => {
            let sipms = load_part_info::<SiPMArray>(&sipm).await?;
            let mut sms = load_part_info::<SensorModule>(&sm).await?;
            let mut dms = load_part_info::<DetectorModule>(&dm).await?;

            combine_parts(&sipms, &mut sms, &mut dms);
            save_part_info(&out, &dms).await?;
            println!("📁 Output saved to: {}", out);

            if let Some(ru) = ru {
                let mut rus = load_part_info::<ReadoutUnit>(&ru).await?;
                attach_detector_modules(&dms, &mut rus);
                let ru_out = ru_out.unwrap_or(ru);
                save_part_info(&ru_out, &rus).await?;
                println!("📁 Output saved to: {}", ru_out);
            }
        }

        Command::Categorize {
            histograms,
            rules,
            barcode,
            out,
        } => {
            let source = HistogramFile::load(&histograms)?;
            let text = std::fs::read_to_string(&rules)
                .with_context(|| format!("failed to read rules from {}", rules))?;
            let cfg = CategoryConfig::from_yaml_str(&text)?;

            let result = eval_category(&source, &cfg, &barcode)?;
            let yaml = result.to_yaml()?;
            match out {
                Some(path) => {
                    if let Some(dir) = Path::new(&path).parent().filter(|d| !d.as_os_str().is_empty()) {
                        std::fs::create_dir_all(dir)?;
                    }
                    std::fs::write(&path, yaml)?;
                    println!("📁 Output saved to: {}", path);
                }
                None => print!("{}", yaml),
            }
            tracing::info!(
                "✅ Module {} category: {}",
                barcode,
                result.category.as_deref().unwrap_or("-")
            );
        }

        Command::Plot {
            histograms,
            names,
            overlay,
            ratio,
            out,
            options,
            logx,
            logy,
            xtitle,
            ytitle,
            legend_pos,
            ratio_mode,
            no_png,
        } => {
            let source = HistogramFile::load(&histograms)?;

            let mut opts = match options {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read plot options from {}", path))?;
                    serde_yaml::from_str::<PlotOptions>(&text)?
                }
                None => config.plot_options(),
            };
            opts.logx |= logx;
            opts.logy |= logy;
            opts.convert_to_png &= !no_png;
            if let Some(title) = xtitle {
                opts.xtitle = title;
            }
            if let Some(title) = ytitle {
                opts.ytitle = title;
            }
            if let Some(pos) = legend_pos {
                opts.legend_pos = pos.parse()?;
            }
            if let Some(mode) = ratio_mode {
                opts.ratio_mode = mode.parse()?;
            }

            let require = |name: &String| source.require(name);
            let hists = names.iter().map(require).collect::<Result<Vec<Histogram1D>, _>>()?;
            let overlays = overlay.iter().map(require).collect::<Result<Vec<Histogram1D>, _>>()?;
            let pairs = ratio
                .iter()
                .map(|pair| -> anyhow::Result<(Histogram1D, Histogram1D)> {
                    let (num, den) = pair
                        .split_once('/')
                        .ok_or_else(|| anyhow!("ratio '{}' is not numerator/denominator", pair))?;
                    Ok((source.require(num)?, source.require(den)?))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            for path in plot_1d(&hists, &overlays, &pairs, &opts, Path::new(&out))? {
                println!("📁 Output saved to: {}", path.display());
            }
        }

        Command::ToPng { file, out, dpi } => {
            let png = convert_to_png(
                Path::new(&file),
                out.as_deref().map(Path::new),
                dpi.unwrap_or(config.plot.png_dpi),
            )?;
            println!("📁 Output saved to: {}", png.display());
        }

        Command::Files { src, regex } => {
            let files = get_file_list(&src, &regex)?;
            let names = files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>();
            for name in natural_sort(names) {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
