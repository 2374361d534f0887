use crate::plot::layout::LegendPosition;
use crate::utils::error::{PartsError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the ratio pad treats uncertainties.
///
/// `Data` moves the numerator's relative error onto the ratio points and draws
/// the denominator's relative error as a band around 1. The other modes keep
/// the propagated errors of the division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioMode {
    Default,
    Data,
    #[default]
    Mc,
}

impl FromStr for RatioMode {
    type Err = PartsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(RatioMode::Default),
            "data" => Ok(RatioMode::Data),
            "mc" => Ok(RatioMode::Mc),
            other => Err(PartsError::Plot {
                message: format!("unknown ratio mode '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotOptions {
    /// Derived from the histograms when unset.
    pub xrange: Option<(f64, f64)>,
    pub yrange: Option<(f64, f64)>,
    pub logx: bool,
    pub logy: bool,
    pub xtitle: String,
    pub ytitle: String,
    /// strftime format; x values are then read as unix seconds (UTC).
    pub time_format_x: String,
    pub xtitle_ratio: String,
    pub ytitle_ratio: String,
    pub yrange_ratio: (f64, f64),
    pub no_xerror: bool,
    pub gridx: bool,
    pub gridy: bool,
    pub ndivisions_x: Option<usize>,
    pub ndivisions_y: Option<usize>,
    pub ndivisions_y_ratio: usize,
    pub stack_draw_option: String,
    pub ratio_draw_option: String,
    pub ratio_mode: RatioMode,
    pub legend_pos: LegendPosition,
    pub legend_ncol: usize,
    pub legend_text_size: f64,
    pub legend_title: String,
    pub legend_height_scale: f64,
    pub legend_width_scale: f64,
    pub cms_extra_text: String,
    pub lumi_text: String,
    pub convert_to_png: bool,
    pub png_dpi: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            xrange: None,
            yrange: None,
            logx: false,
            logy: false,
            xtitle: String::new(),
            ytitle: String::new(),
            time_format_x: String::new(),
            xtitle_ratio: String::new(),
            ytitle_ratio: String::new(),
            yrange_ratio: (0.0, 2.0),
            no_xerror: false,
            gridx: false,
            gridy: false,
            ndivisions_x: None,
            ndivisions_y: None,
            ndivisions_y_ratio: 5,
            stack_draw_option: "nostack".to_string(),
            ratio_draw_option: "hist".to_string(),
            ratio_mode: RatioMode::Mc,
            legend_pos: LegendPosition::UR,
            legend_ncol: 1,
            legend_text_size: 0.045,
            legend_title: String::new(),
            legend_height_scale: 1.0,
            legend_width_scale: 1.0,
            cms_extra_text: "Internal".to_string(),
            lumi_text: "Phase-2".to_string(),
            convert_to_png: true,
            png_dpi: 300,
        }
    }
}

impl PlotOptions {
    pub fn is_stacked(&self) -> bool {
        !self.stack_draw_option.contains("nostack")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_partial_yaml() {
        let opts: PlotOptions =
            serde_yaml::from_str("logy: true\nratio_mode: data\nlegend_pos: UL\n").unwrap();
        assert!(opts.logy);
        assert_eq!(opts.ratio_mode, RatioMode::Data);
        assert_eq!(opts.legend_pos, LegendPosition::UL);
        assert_eq!(opts.yrange_ratio, (0.0, 2.0));
        assert_eq!(opts.cms_extra_text, "Internal");
        assert!(!opts.is_stacked());
        assert!("sideways".parse::<RatioMode>().is_err());
    }
}
