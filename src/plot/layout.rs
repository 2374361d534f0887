//! Canvas and legend geometry in normalized (0..1) pad coordinates.

use crate::plot::histogram::HistStyle;
use crate::utils::error::{PartsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CANVAS_WIDTH: u32 = 1600;
pub const CANVAS_HEIGHT: u32 = 1300;
pub const TICK_LENGTH: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// A pad occupying `[ylow, yhigh]` of the canvas height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pad {
    pub ylow: f64,
    pub yhigh: f64,
    pub margins: Margins,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    pub main: Pad,
    pub ratio: Option<Pad>,
}

impl CanvasLayout {
    pub fn new(with_ratio: bool) -> Self {
        if with_ratio {
            Self {
                width: CANVAS_WIDTH,
                height: CANVAS_HEIGHT,
                main: Pad {
                    ylow: 0.32,
                    yhigh: 1.0,
                    margins: Margins {
                        top: 0.075,
                        bottom: 0.0,
                        left: 0.125,
                        right: 0.05,
                    },
                },
                ratio: Some(Pad {
                    ylow: 0.0,
                    yhigh: 0.3,
                    margins: Margins {
                        top: 0.05,
                        bottom: 0.285,
                        left: 0.125,
                        right: 0.05,
                    },
                }),
            }
        } else {
            Self {
                width: CANVAS_WIDTH,
                height: CANVAS_HEIGHT,
                main: Pad {
                    ylow: 0.0,
                    yhigh: 1.0,
                    margins: Margins {
                        top: 0.05,
                        bottom: 0.13,
                        left: 0.125,
                        right: 0.05,
                    },
                },
                ratio: None,
            }
        }
    }

    /// Pixel height of the main pad and of the gap above the ratio pad.
    pub fn split_pixels(&self) -> (u32, u32) {
        let main = ((1.0 - self.main.ylow) * self.height as f64).round() as u32;
        let gap = self
            .ratio
            .map(|r| ((self.main.ylow - r.yhigh) * self.height as f64).round() as u32)
            .unwrap_or(0);
        (main, gap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LegendPosition {
    #[default]
    UR,
    LR,
    LL,
    UL,
}

impl FromStr for LegendPosition {
    type Err = PartsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UR" => Ok(LegendPosition::UR),
            "LR" => Ok(LegendPosition::LR),
            "LL" => Ok(LegendPosition::LL),
            "UL" => Ok(LegendPosition::UL),
            other => Err(PartsError::Plot {
                message: format!("Wrong legend position option: {}", other),
            }),
        }
    }
}

impl fmt::Display for LegendPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegendPosition::UR => "UR",
            LegendPosition::LR => "LR",
            LegendPosition::LL => "LL",
            LegendPosition::UL => "UL",
        };
        f.write_str(name)
    }
}

/// Legend rectangle; `y` grows upwards as in ROOT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

pub fn legend_box(
    position: LegendPosition,
    margins: &Margins,
    entries: usize,
    has_title: bool,
    width_scale: f64,
    height_scale: f64,
) -> LegendBox {
    let title_rows = if has_title { 1.5 } else { 0.0 };
    let height = height_scale * 0.065 * (entries as f64 + title_rows);
    let width = width_scale * 0.4;

    let top = 1.0 - 0.3 * margins.top - TICK_LENGTH;
    let right = 1.0 - margins.right - 0.6 * TICK_LENGTH;
    let bottom = margins.bottom + 0.6 * TICK_LENGTH;
    let left = margins.left + 0.6 * TICK_LENGTH;

    match position {
        LegendPosition::UR => LegendBox {
            x1: right - width,
            y1: top - height,
            x2: right,
            y2: top,
        },
        LegendPosition::LR => LegendBox {
            x1: right - width,
            y1: bottom,
            x2: right,
            y2: bottom + height,
        },
        LegendPosition::LL => LegendBox {
            x1: left,
            y1: bottom,
            x2: left + width,
            y2: bottom + height,
        },
        LegendPosition::UL => LegendBox {
            x1: left,
            y1: top - height,
            x2: left + width,
            y2: top,
        },
    }
}

/// Legend marker option for a histogram's draw option.
pub fn draw_option(style: &HistStyle) -> String {
    let opt = style.draw_option.replace("hist", "L");
    if style.fill {
        format!("{}F", opt)
    } else {
        opt
    }
}
