//! SVG rendering of 1D histogram plots with an optional ratio pad.

use crate::plot::convert::convert_to_png;
use crate::plot::histogram::Histogram1D;
use crate::plot::layout::{draw_option, legend_box, CanvasLayout, Pad};
use crate::plot::options::{PlotOptions, RatioMode};
use crate::utils::error::{PartsError, Result};
use plotters::chart::SeriesAnno;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::{Path, PathBuf};

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type Formatter = Box<dyn Fn(&f64) -> String>;

const PALETTE: [(u8, u8, u8); 6] = [
    (0, 0, 0),
    (228, 26, 28),
    (55, 126, 184),
    (77, 175, 74),
    (152, 78, 163),
    (255, 127, 0),
];

fn plot_err<E: std::fmt::Display>(err: E) -> PartsError {
    PartsError::Plot {
        message: err.to_string(),
    }
}

fn tick_label(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e5 || v.abs() < 1e-3) {
        return format!("{:.0e}", v);
    }
    let s = format!("{:.3}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Axis values are stored as log10 on log axes.
fn to_axis(v: f64, log: bool) -> Option<f64> {
    if log {
        (v > 0.0).then(|| v.log10())
    } else {
        Some(v)
    }
}

fn x_formatter(log: bool, time_format: &str) -> Formatter {
    if !time_format.is_empty() {
        let fmt = time_format.to_string();
        Box::new(move |v: &f64| {
            chrono::DateTime::from_timestamp(*v as i64, 0)
                .map(|t| t.format(&fmt).to_string())
                .unwrap_or_default()
        })
    } else if log {
        Box::new(|v: &f64| tick_label(10f64.powf(*v)))
    } else {
        Box::new(|v: &f64| tick_label(*v))
    }
}

fn y_formatter(log: bool) -> Formatter {
    if log {
        Box::new(|v: &f64| tick_label(10f64.powf(*v)))
    } else {
        Box::new(|v: &f64| tick_label(*v))
    }
}

fn color_of(hist: &Histogram1D, index: usize) -> RGBColor {
    let (r, g, b) = if hist.style.color == (0, 0, 0) {
        PALETTE[index % PALETTE.len()]
    } else {
        hist.style.color
    };
    RGBColor(r, g, b)
}

/// Contents actually drawn: cumulative sums when stacking.
fn displayed_contents(hists: &[Histogram1D], stacked: bool) -> Vec<Vec<f64>> {
    let mut out: Vec<Vec<f64>> = Vec::with_capacity(hists.len());
    for hist in hists {
        let contents = match (stacked, out.last()) {
            (true, Some(below)) if below.len() == hist.contents.len() => hist
                .contents
                .iter()
                .zip(below)
                .map(|(c, b)| c + b)
                .collect(),
            _ => hist.contents.clone(),
        };
        out.push(contents);
    }
    out
}

fn x_range(hists: &[&Histogram1D], opts: &PlotOptions) -> (f64, f64) {
    opts.xrange.unwrap_or_else(|| {
        hists.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h.xmin), hi.max(h.xmax))
        })
    })
}

fn y_range(drawn: &[(&Histogram1D, &[f64])], xr: (f64, f64), opts: &PlotOptions) -> (f64, f64) {
    if let Some(range) = opts.yrange {
        return range;
    }

    let mut max = 0.0f64;
    let mut min_positive = f64::INFINITY;
    for (hist, contents) in drawn {
        for bin in 1..=hist.nbins {
            let center = hist.bin_center(bin);
            if center < xr.0 || center > xr.1 {
                continue;
            }
            let value = contents[bin] + hist.bin_error(bin);
            max = max.max(value);
            if contents[bin] > 0.0 {
                min_positive = min_positive.min(contents[bin]);
            }
        }
    }
    if max <= 0.0 {
        max = 1.0;
    }

    if opts.logy {
        let low = if min_positive.is_finite() {
            0.5 * min_positive
        } else {
            0.1
        };
        (low, max * 10.0)
    } else {
        (0.0, max * 1.25)
    }
}

fn step_points(
    hist: &Histogram1D,
    contents: &[f64],
    xr: (f64, f64),
    opts: &PlotOptions,
    y_floor: f64,
) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(2 * hist.nbins);
    for bin in 1..=hist.nbins {
        let lo = hist.bin_low_edge(bin);
        let hi = lo + hist.bin_width();
        if hi <= xr.0 || lo >= xr.1 {
            continue;
        }
        let (Some(x1), Some(x2)) = (
            to_axis(lo.max(xr.0), opts.logx),
            to_axis(hi.min(xr.1), opts.logx),
        ) else {
            continue;
        };
        let y = to_axis(contents[bin], opts.logy).unwrap_or(y_floor).max(y_floor);
        points.push((x1, y));
        points.push((x2, y));
    }
    points
}

#[derive(Clone, Copy)]
enum LegendMark {
    Line,
    Fill,
    Marker,
}

fn legend_mark(hist: &Histogram1D, option: &str) -> LegendMark {
    let legend = draw_option(&hist.style);
    if legend.contains('F') {
        LegendMark::Fill
    } else if hist.style.markers || option.contains('E') || option.contains('P') {
        LegendMark::Marker
    } else {
        LegendMark::Line
    }
}

fn annotate(anno: &mut SeriesAnno<'_, SVGBackend<'_>>, title: &str, mark: LegendMark, color: RGBColor, width: u32) {
    if title.is_empty() {
        return;
    }
    let anno = anno.label(title);
    match mark {
        LegendMark::Line => {
            anno.legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(width)));
        }
        LegendMark::Fill => {
            anno.legend(move |(x, y)| Rectangle::new([(x, y - 8), (x + 30, y + 8)], color.mix(0.6).filled()));
        }
        LegendMark::Marker => {
            anno.legend(move |(x, y)| Circle::new((x + 15, y), 6, color.filled()));
        }
    }
}

/// Draw one histogram with the given displayed contents and draw option.
#[allow(clippy::too_many_arguments)]
fn draw_hist(
    chart: &mut Chart<'_, '_>,
    hist: &Histogram1D,
    contents: &[f64],
    option: &str,
    color: RGBColor,
    xr: (f64, f64),
    y_floor: f64,
    opts: &PlotOptions,
) -> Result<()> {
    let width = hist.style.line_width.max(1);
    let mark = legend_mark(hist, option);

    match mark {
        LegendMark::Marker => {
            let mut points = Vec::new();
            for bin in 1..=hist.nbins {
                let center = hist.bin_center(bin);
                if center < xr.0 || center > xr.1 {
                    continue;
                }
                let (Some(x), Some(y)) = (to_axis(center, opts.logx), to_axis(contents[bin], opts.logy))
                else {
                    continue;
                };
                let err = hist.bin_error(bin);
                let ylo = to_axis(contents[bin] - err, opts.logy).unwrap_or(y_floor).max(y_floor);
                let yhi = to_axis(contents[bin] + err, opts.logy).unwrap_or(y);
                let half = 0.5 * hist.bin_width();
                let xlo = to_axis(center - half, opts.logx).unwrap_or(x);
                let xhi = to_axis(center + half, opts.logx).unwrap_or(x);
                points.push((x, y, ylo, yhi, xlo, xhi));
            }

            chart
                .draw_series(points.iter().map(|&(x, _, ylo, yhi, _, _)| {
                    PathElement::new(vec![(x, ylo), (x, yhi)], color.stroke_width(width))
                }))
                .map_err(plot_err)?;
            if !opts.no_xerror {
                chart
                    .draw_series(points.iter().map(|&(_, y, _, _, xlo, xhi)| {
                        PathElement::new(vec![(xlo, y), (xhi, y)], color.stroke_width(width))
                    }))
                    .map_err(plot_err)?;
            }
            let anno = chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y, ..)| Circle::new((x, y), 6, color.filled())),
                )
                .map_err(plot_err)?;
            annotate(anno, &hist.title, mark, color, width);
        }
        LegendMark::Fill => {
            let points = step_points(hist, contents, xr, opts, y_floor);
            let anno = chart
                .draw_series(
                    AreaSeries::new(points, y_floor, color.mix(0.6))
                        .border_style(color.stroke_width(width)),
                )
                .map_err(plot_err)?;
            annotate(anno, &hist.title, mark, color, width);
        }
        LegendMark::Line => {
            let points = step_points(hist, contents, xr, opts, y_floor);
            let anno = chart
                .draw_series(LineSeries::new(points, color.stroke_width(width)))
                .map_err(plot_err)?;
            annotate(anno, &hist.title, mark, color, width);
        }
    }
    Ok(())
}

fn draw_experiment_label(area: &Area<'_>, pad: &Pad, opts: &PlotOptions) -> Result<()> {
    let (w, h) = area.dim_in_pixel();
    let m = pad.margins;
    let size = (0.75 * m.top * h as f64).max(24.0);
    let left = (m.left * w as f64) as i32;
    let right = ((1.0 - m.right) * w as f64) as i32;
    let baseline = (m.top * h as f64) as i32 - 6;

    let cms = TextStyle::from(FontDesc::new(FontFamily::SansSerif, size, FontStyle::Bold))
        .pos(Pos::new(HPos::Left, VPos::Bottom));
    area.draw_text("CMS", &cms, (left, baseline)).map_err(plot_err)?;

    if !opts.cms_extra_text.is_empty() {
        let extra = TextStyle::from(FontDesc::new(
            FontFamily::SansSerif,
            0.76 * size,
            FontStyle::Italic,
        ))
        .pos(Pos::new(HPos::Left, VPos::Bottom));
        let offset = (2.6 * size) as i32;
        area.draw_text(&opts.cms_extra_text, &extra, (left + offset, baseline))
            .map_err(plot_err)?;
    }

    if !opts.lumi_text.is_empty() {
        let lumi = TextStyle::from(FontDesc::new(
            FontFamily::SansSerif,
            0.76 * size,
            FontStyle::Normal,
        ))
        .pos(Pos::new(HPos::Right, VPos::Bottom));
        area.draw_text(&opts.lumi_text, &lumi, (right, baseline))
            .map_err(plot_err)?;
    }
    Ok(())
}

fn draw_main(
    area: &Area<'_>,
    pad: &Pad,
    hists: &[Histogram1D],
    overlays: &[Histogram1D],
    xr: (f64, f64),
    has_ratio: bool,
    opts: &PlotOptions,
) -> Result<()> {
    let (w, h) = area.dim_in_pixel();
    let m = pad.margins;

    let stacked = displayed_contents(hists, opts.is_stacked());
    let mut drawn: Vec<(&Histogram1D, &[f64])> = hists
        .iter()
        .zip(stacked.iter())
        .map(|(hist, contents)| (hist, contents.as_slice()))
        .collect();
    drawn.extend(overlays.iter().map(|hist| (hist, hist.contents.as_slice())));

    let yr = y_range(&drawn, xr, opts);
    let (x0, x1, y0, y1) = match (
        to_axis(xr.0, opts.logx),
        to_axis(xr.1, opts.logx),
        to_axis(yr.0, opts.logy),
        to_axis(yr.1, opts.logy),
    ) {
        (Some(x0), Some(x1), Some(y0), Some(y1)) if x0 < x1 && y0 < y1 => (x0, x1, y0, y1),
        _ => {
            return Err(PartsError::Plot {
                message: format!("invalid axis ranges x={:?} y={:?}", xr, yr),
            })
        }
    };

    let x_label_area = if has_ratio { 0 } else { (m.bottom * h as f64) as u32 };
    let mut chart = ChartBuilder::on(area)
        .margin_top((m.top * h as f64) as u32)
        .margin_right((m.right * w as f64) as u32)
        .x_label_area_size(x_label_area)
        .y_label_area_size((m.left * w as f64) as u32)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_err)?;

    let x_fmt = x_formatter(opts.logx, &opts.time_format_x);
    let y_fmt = y_formatter(opts.logy);
    {
        let mut mesh = chart.configure_mesh();
        mesh.x_desc(opts.xtitle.as_str())
            .y_desc(opts.ytitle.as_str())
            .x_label_formatter(&*x_fmt)
            .y_label_formatter(&*y_fmt)
            .axis_desc_style(("sans-serif", (0.055 * h as f64) as u32))
            .label_style(("sans-serif", (0.04 * h as f64) as u32));
        if !opts.gridx {
            mesh.disable_x_mesh();
        }
        if !opts.gridy {
            mesh.disable_y_mesh();
        }
        if let Some(n) = opts.ndivisions_x {
            mesh.x_labels(n);
        }
        if let Some(n) = opts.ndivisions_y {
            mesh.y_labels(n);
        }
        mesh.draw().map_err(plot_err)?;
    }

    // topmost stack layer first so lower layers stay visible
    let order: Vec<usize> = if opts.is_stacked() {
        (0..hists.len()).rev().collect()
    } else {
        (0..hists.len()).collect()
    };
    for idx in order {
        let hist = &hists[idx];
        draw_hist(
            &mut chart,
            hist,
            &stacked[idx],
            &hist.style.draw_option,
            color_of(hist, idx),
            xr,
            y0,
            opts,
        )?;
    }
    for (idx, hist) in overlays.iter().enumerate() {
        draw_hist(
            &mut chart,
            hist,
            &hist.contents,
            &hist.style.draw_option,
            color_of(hist, hists.len() + idx),
            xr,
            y0,
            opts,
        )?;
    }

    let entries = hists
        .iter()
        .chain(overlays)
        .filter(|hist| !hist.title.is_empty())
        .count();
    if entries > 0 || !opts.legend_title.is_empty() {
        let legend = legend_box(
            opts.legend_pos,
            &m,
            entries,
            !opts.legend_title.is_empty(),
            opts.legend_width_scale,
            opts.legend_height_scale,
        );
        let row = opts.legend_height_scale * 0.065 * h as f64;
        let text_px = (opts.legend_text_size * h as f64) as u32;
        let left_px = (legend.x1 * w as f64) as i32;
        let mut top_px = ((1.0 - legend.y2) * h as f64) as i32;

        if !opts.legend_title.is_empty() {
            let style = TextStyle::from(("sans-serif", text_px)).pos(Pos::new(HPos::Left, VPos::Top));
            area.draw_text(&opts.legend_title, &style, (left_px, top_px))
                .map_err(plot_err)?;
            top_px += (1.5 * row) as i32;
        }

        if entries > 0 {
            let plot_left = (m.left * w as f64) as i32;
            let plot_top = (m.top * h as f64) as i32;
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::Coordinate(
                    left_px - plot_left,
                    top_px - plot_top,
                ))
                .label_font(("sans-serif", text_px))
                .background_style(WHITE.mix(0.0))
                .border_style(WHITE.mix(0.0))
                .draw()
                .map_err(plot_err)?;
        }
    }

    draw_experiment_label(area, pad, opts)
}

fn draw_ratio(
    area: &Area<'_>,
    pad: &Pad,
    pairs: &[(Histogram1D, Histogram1D)],
    xr: (f64, f64),
    opts: &PlotOptions,
) -> Result<()> {
    let (w, h) = area.dim_in_pixel();
    let m = pad.margins;
    let (y0, y1) = opts.yrange_ratio;
    let (Some(x0), Some(x1)) = (to_axis(xr.0, opts.logx), to_axis(xr.1, opts.logx)) else {
        return Err(PartsError::Plot {
            message: format!("invalid x range {:?}", xr),
        });
    };

    let mut chart = ChartBuilder::on(area)
        .margin_top((m.top * h as f64) as u32)
        .margin_right((m.right * w as f64) as u32)
        .x_label_area_size((m.bottom * h as f64) as u32)
        .y_label_area_size((m.left * w as f64) as u32)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_err)?;

    let x_fmt = x_formatter(opts.logx, &opts.time_format_x);
    {
        let mut mesh = chart.configure_mesh();
        mesh.x_desc(opts.xtitle_ratio.as_str())
            .y_desc(opts.ytitle_ratio.as_str())
            .x_label_formatter(&*x_fmt)
            .y_labels(opts.ndivisions_y_ratio)
            .axis_desc_style(("sans-serif", (0.115 * h as f64) as u32))
            .label_style(("sans-serif", (0.1 * h as f64) as u32));
        if !opts.gridx {
            mesh.disable_x_mesh();
        }
        if !opts.gridy {
            mesh.disable_y_mesh();
        }
        if let Some(n) = opts.ndivisions_x {
            mesh.x_labels(n);
        }
        mesh.draw().map_err(plot_err)?;
    }

    let linear = PlotOptions {
        logy: false,
        ..opts.clone()
    };
    for (idx, (num, den)) in pairs.iter().enumerate() {
        let mut ratio = num.divide(den)?;

        if opts.ratio_mode == RatioMode::Data {
            let mut band = Vec::new();
            for bin in 1..=ratio.nbins {
                let n = num.bin_content(bin);
                if n != 0.0 {
                    let err = ratio.bin_content(bin) * num.bin_error(bin) / n;
                    ratio.set_bin_error(bin, err);
                }
                let d = den.bin_content(bin);
                if d != 0.0 {
                    let rel = den.bin_error(bin) / d;
                    let lo = ratio.bin_low_edge(bin);
                    let hi = lo + ratio.bin_width();
                    if let (Some(bx0), Some(bx1)) = (to_axis(lo, opts.logx), to_axis(hi, opts.logx)) {
                        band.push([(bx0, (1.0 - rel).max(y0)), (bx1, (1.0 + rel).min(y1))]);
                    }
                }
            }
            chart
                .draw_series(
                    band.into_iter()
                        .map(|corners| Rectangle::new(corners, BLACK.mix(0.25).filled())),
                )
                .map_err(plot_err)?;
        }

        let mut styled = ratio;
        styled.title = String::new();
        let color = color_of(num, idx);
        draw_hist(
            &mut chart,
            &styled,
            &styled.contents.clone(),
            &opts.ratio_draw_option,
            color,
            xr,
            y0,
            &linear,
        )?;
    }
    Ok(())
}

/// Render histograms (optionally stacked), overlays and ratio pairs.
///
/// The SVG is written next to `outfile` (its extension replaced), parent
/// directories are created and a PNG is produced when `convert_to_png` is
/// set. Returns the written files.
pub fn plot_1d(
    hists: &[Histogram1D],
    overlays: &[Histogram1D],
    ratio_pairs: &[(Histogram1D, Histogram1D)],
    opts: &PlotOptions,
    outfile: &Path,
) -> Result<Vec<PathBuf>> {
    if hists.is_empty() && overlays.is_empty() {
        return Err(PartsError::Plot {
            message: "nothing to plot".to_string(),
        });
    }

    if let Some(dir) = outfile.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let svg = outfile.with_extension("svg");

    let all: Vec<&Histogram1D> = hists.iter().chain(overlays).collect();
    let xr = x_range(&all, opts);
    let layout = CanvasLayout::new(!ratio_pairs.is_empty());

    {
        let root = SVGBackend::new(&svg, (layout.width, layout.height)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        match layout.ratio {
            Some(ratio_pad) => {
                let (main_px, gap_px) = layout.split_pixels();
                let (top, rest) = root.split_vertically(main_px);
                let (_, bottom) = rest.split_vertically(gap_px);
                draw_main(&top, &layout.main, hists, overlays, xr, true, opts)?;
                draw_ratio(&bottom, &ratio_pad, ratio_pairs, xr, opts)?;
            }
            None => draw_main(&root, &layout.main, hists, overlays, xr, false, opts)?,
        }
        root.present().map_err(plot_err)?;
    }
    tracing::info!("Written {}", svg.display());

    let mut written = vec![svg.clone()];
    if opts.convert_to_png {
        written.push(convert_to_png(&svg, Some(outfile), opts.png_dpi)?);
    }
    Ok(written)
}
