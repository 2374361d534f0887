use crate::domain::model::PartKind;
use clap::{Parser, Subcommand};

fn parse_kind(s: &str) -> Result<PartKind, String> {
    s.parse::<PartKind>().map_err(|e| e.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "mtd-parts")]
#[command(about = "CMS MTD parts database and QC tooling")]
pub struct Cli {
    /// Path to TOML configuration file (default: mtd-parts.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines instead of the compact format
    #[arg(long, global = true)]
    pub json_log: bool,

    /// Override the database URL from the config
    #[arg(long, global = true)]
    pub db_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch all parts of a kind and update a YAML cache
    Fetch {
        /// sipm, sm, dm or ru
        #[arg(long, value_parser = parse_kind)]
        kind: PartKind,

        #[arg(long)]
        out: String,

        /// Existing cache; its parts are not fetched again
        #[arg(long = "in")]
        input: Option<String>,

        /// Site name from [locations] or a numeric LOCATION_ID
        #[arg(long)]
        location: Vec<String>,

        /// Only reload the cache, do not query the database
        #[arg(long)]
        nodb: bool,
    },

    /// List the sensor modules already assembled into detector modules
    UsedSms {
        #[arg(long)]
        dm_yaml: Option<String>,

        #[arg(long)]
        location: Vec<String>,

        #[arg(long)]
        nodb: bool,
    },

    /// Resolve SiPM, SM (and optionally DM → RU) links from cached files
    Combine {
        #[arg(long)]
        sipm: String,

        #[arg(long)]
        sm: String,

        #[arg(long)]
        dm: String,

        #[arg(long)]
        out: String,

        /// Readout units to attach the combined DMs to
        #[arg(long)]
        ru: Option<String>,

        #[arg(long, requires = "ru")]
        ru_out: Option<String>,
    },

    /// Evaluate the QC category of a module
    Categorize {
        /// YAML or JSON histogram file
        #[arg(long)]
        histograms: String,

        /// YAML file with read/values/metrics/categories
        #[arg(long)]
        rules: String,

        #[arg(long, default_value = "")]
        barcode: String,

        /// Write the result here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },

    /// Plot histograms from a YAML or JSON histogram file
    Plot {
        #[arg(long)]
        histograms: String,

        /// Histograms drawn in the main stack
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,

        /// Histograms drawn on top of the stack
        #[arg(long, value_delimiter = ',')]
        overlay: Vec<String>,

        /// Ratio pairs as numerator/denominator
        #[arg(long, value_delimiter = ',')]
        ratio: Vec<String>,

        /// Output file; the extension is replaced by .svg/.png
        #[arg(long)]
        out: String,

        /// YAML file with plot options
        #[arg(long)]
        options: Option<String>,

        #[arg(long)]
        logx: bool,

        #[arg(long)]
        logy: bool,

        #[arg(long)]
        xtitle: Option<String>,

        #[arg(long)]
        ytitle: Option<String>,

        /// UR, LR, LL or UL
        #[arg(long)]
        legend_pos: Option<String>,

        /// default, data or mc
        #[arg(long)]
        ratio_mode: Option<String>,

        /// Keep only the SVG
        #[arg(long)]
        no_png: bool,
    },

    /// Convert a PDF or SVG file to PNG
    ToPng {
        file: String,

        #[arg(long)]
        out: Option<String>,

        #[arg(long)]
        dpi: Option<u32>,
    },

    /// List files under directories whose path matches a regex
    Files {
        #[arg(long, required = true)]
        src: Vec<String>,

        #[arg(long)]
        regex: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::parse_from([
            "mtd-parts",
            "--verbose",
            "fetch",
            "--kind",
            "dm",
            "--out",
            "info/dm.yaml",
            "--in",
            "info/dm.yaml",
            "--location",
            "MIB",
            "--location",
            "CERN",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Fetch {
                kind,
                input,
                location,
                nodb,
                ..
            } => {
                assert_eq!(kind, PartKind::DetectorModule);
                assert_eq!(input.as_deref(), Some("info/dm.yaml"));
                assert_eq!(location, vec!["MIB", "CERN"]);
                assert!(!nodb);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_plot_lists() {
        let cli = Cli::parse_from([
            "mtd-parts",
            "plot",
            "--histograms",
            "h.yaml",
            "--names",
            "a,b",
            "--ratio",
            "a/b",
            "--out",
            "plots/a.pdf",
        ]);
        match cli.command {
            Command::Plot { names, ratio, .. } => {
                assert_eq!(names, vec!["a", "b"]);
                assert_eq!(ratio, vec!["a/b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["mtd-parts", "fetch", "--kind", "bar", "--out", "x"]).is_err());
    }
}
