//! Chart descriptions and the raster renderer that turns them into PNGs.
//!
//! Analyses build a [`Figure`]; the UI host may draw it interactively from
//! its JSON form, while PDF exports go through a [`ChartRenderer`].

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use serde::Serialize;

use super::{ExportError, ExportResult};

/// How a panel's series are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    /// Side-by-side bars per category
    Bars,
    /// Series stacked per category
    StackedBars,
    /// One polyline per series
    Lines,
    /// Rows of cells; `series[i]` is row `i` from the bottom
    Heatmap,
}

/// One named data series aligned with the panel's categories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    /// `None` leaves a gap
    pub values: Vec<Option<f64>>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Series without gaps.
    pub fn dense(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(name, values.into_iter().map(Some).collect())
    }
}

/// One plot panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    /// X-axis categories (or bin labels)
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    /// Lines drawn against a secondary y axis
    pub secondary: Vec<Series>,
    pub log_y: bool,
}

impl Chart {
    pub fn new(kind: ChartKind, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind,
            x_label: String::new(),
            y_label: String::new(),
            categories: Vec::new(),
            series: Vec::new(),
            secondary: Vec::new(),
            log_y: false,
        }
    }

    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn secondary(mut self, series: Series) -> Self {
        self.secondary.push(series);
        self
    }

    pub fn log_scale(mut self, log_y: bool) -> Self {
        self.log_y = log_y;
        self
    }

    /// Largest value a panel must fit on the primary axis.
    fn y_max(&self) -> f64 {
        let max = match self.kind {
            ChartKind::StackedBars => (0..self.categories.len())
                .map(|i| {
                    self.series
                        .iter()
                        .filter_map(|s| s.values.get(i).copied().flatten())
                        .filter(|v| *v > 0.0)
                        .sum::<f64>()
                })
                .fold(0.0, f64::max),
            _ => series_max(&self.series),
        };
        self.scale(max)
    }

    fn scale(&self, v: f64) -> f64 {
        if self.log_y {
            if v > 0.0 {
                (1.0 + v).log10()
            } else {
                0.0
            }
        } else {
            v
        }
    }
}

fn series_max(series: &[Series]) -> f64 {
    series
        .iter()
        .flat_map(|s| s.values.iter().flatten())
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max)
}

/// A figure of vertically stacked panels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub panels: Vec<Chart>,
    pub width_px: u32,
    pub height_px: u32,
}

impl Figure {
    pub const DEFAULT_WIDTH: u32 = 1000;
    pub const DEFAULT_HEIGHT: u32 = 600;

    pub fn single(chart: Chart) -> Self {
        Self::stacked(vec![chart], Self::DEFAULT_WIDTH, Self::DEFAULT_HEIGHT)
    }

    pub fn stacked(panels: Vec<Chart>, width_px: u32, height_px: u32) -> Self {
        Self {
            panels,
            width_px,
            height_px,
        }
    }

    pub fn to_json(&self) -> ExportResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Turns a figure into PNG bytes.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, figure: &Figure) -> ExportResult<Vec<u8>>;
}

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// tab10
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

const MARGIN_LEFT: u32 = 60;
const MARGIN_RIGHT: u32 = 60;
const MARGIN_TOP: u32 = 30;
const MARGIN_BOTTOM: u32 = 50;
const GRID_LINES: u32 = 5;

/// Plot area of one panel, in pixels.
#[derive(Debug, Clone, Copy)]
struct Area {
    x0: i64,
    y0: i64,
    width: i64,
    height: i64,
}

impl Area {
    fn bottom(&self) -> i64 {
        self.y0 + self.height
    }

    /// Pixel row of a value on a `[0, max]` axis.
    fn y_of(&self, v: f64, max: f64) -> i64 {
        let frac = if max > 0.0 { (v / max).clamp(0.0, 1.0) } else { 0.0 };
        self.bottom() - (frac * self.height as f64).round() as i64
    }
}

/// Draws figures onto an RGB canvas with the `image` crate. Text is left to
/// the document the image is placed in.
#[derive(Debug, Clone, Default)]
pub struct RasterChartRenderer;

impl RasterChartRenderer {
    pub fn new() -> Self {
        Self
    }

    fn draw_panel(&self, img: &mut RgbImage, chart: &Chart, area: Area) {
        for i in 0..=GRID_LINES {
            let y = area.bottom() - (area.height * i as i64) / GRID_LINES as i64;
            draw_line(img, (area.x0, y), (area.x0 + area.width, y), GRID, 1);
        }

        let n = chart.categories.len().max(
            chart
                .series
                .iter()
                .chain(&chart.secondary)
                .map(|s| s.values.len())
                .max()
                .unwrap_or(0),
        );
        if n > 0 {
            let max = chart.y_max();
            match chart.kind {
                ChartKind::Bars => draw_bars(img, chart, area, n, max),
                ChartKind::StackedBars => draw_stacked(img, chart, area, n, max),
                ChartKind::Lines => {
                    for (i, s) in chart.series.iter().enumerate() {
                        draw_series_line(img, chart, s, area, n, max, PALETTE[i % PALETTE.len()]);
                    }
                }
                ChartKind::Heatmap => draw_heatmap(img, chart, area, n),
            }
            let secondary_max = chart.scale(series_max(&chart.secondary));
            for (i, s) in chart.secondary.iter().enumerate() {
                let colour = PALETTE[(chart.series.len() + i) % PALETTE.len()];
                draw_series_line(img, chart, s, area, n, secondary_max, colour);
            }
        }

        draw_line(img, (area.x0, area.y0), (area.x0, area.bottom()), AXIS, 2);
        draw_line(
            img,
            (area.x0, area.bottom()),
            (area.x0 + area.width, area.bottom()),
            AXIS,
            2,
        );
        if !chart.secondary.is_empty() {
            let right = area.x0 + area.width;
            draw_line(img, (right, area.y0), (right, area.bottom()), AXIS, 2);
        }
    }
}

impl ChartRenderer for RasterChartRenderer {
    fn render(&self, figure: &Figure) -> ExportResult<Vec<u8>> {
        let (width, height) = (figure.width_px, figure.height_px);
        if width <= MARGIN_LEFT + MARGIN_RIGHT || height == 0 {
            return Err(ExportError::Chart(format!("figure too small: {}x{}", width, height)));
        }
        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

        let n_panels = figure.panels.len().max(1) as u32;
        let panel_height = height / n_panels;
        if panel_height <= MARGIN_TOP + MARGIN_BOTTOM {
            return Err(ExportError::Chart(format!(
                "{} panels do not fit in {} px",
                n_panels, height
            )));
        }
        for (i, chart) in figure.panels.iter().enumerate() {
            let area = Area {
                x0: MARGIN_LEFT as i64,
                y0: (i as u32 * panel_height + MARGIN_TOP) as i64,
                width: (width - MARGIN_LEFT - MARGIN_RIGHT) as i64,
                height: (panel_height - MARGIN_TOP - MARGIN_BOTTOM) as i64,
            };
            self.draw_panel(&mut img, chart, area);
        }

        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, ColorType::Rgb8)
            .map_err(|e| ExportError::Chart(e.to_string()))?;
        Ok(bytes)
    }
}

fn draw_bars(img: &mut RgbImage, chart: &Chart, area: Area, n: usize, max: f64) {
    let slot = area.width as f64 / n as f64;
    let k = chart.series.len().max(1);
    let bar = (slot * 0.8 / k as f64).max(1.0);
    for (j, s) in chart.series.iter().enumerate() {
        let colour = PALETTE[j % PALETTE.len()];
        for (i, v) in s.values.iter().enumerate() {
            let Some(v) = v else { continue };
            let x0 = area.x0 as f64 + slot * i as f64 + slot * 0.1 + bar * j as f64;
            let top = area.y_of(chart.scale(*v), max);
            fill_rect(img, x0 as i64, top, (x0 + bar) as i64, area.bottom(), colour);
        }
    }
}

fn draw_stacked(img: &mut RgbImage, chart: &Chart, area: Area, n: usize, max: f64) {
    let slot = area.width as f64 / n as f64;
    for i in 0..n {
        let x0 = area.x0 as f64 + slot * i as f64 + slot * 0.05;
        let x1 = x0 + slot * 0.9;
        let mut base = 0.0;
        for (j, s) in chart.series.iter().enumerate() {
            let v = s.values.get(i).copied().flatten().unwrap_or(0.0);
            if v <= 0.0 {
                continue;
            }
            let bottom = area.y_of(chart.scale(base), max);
            base += v;
            let top = area.y_of(chart.scale(base), max);
            fill_rect(img, x0 as i64, top, x1.max(x0 + 1.0) as i64, bottom, PALETTE[j % PALETTE.len()]);
        }
    }
}

fn draw_series_line(
    img: &mut RgbImage,
    chart: &Chart,
    series: &Series,
    area: Area,
    n: usize,
    max: f64,
    colour: Rgb<u8>,
) {
    let slot = area.width as f64 / n as f64;
    let mut last: Option<(i64, i64)> = None;
    for (i, v) in series.values.iter().enumerate() {
        let point = v.filter(|v| v.is_finite()).map(|v| {
            let x = (area.x0 as f64 + slot * (i as f64 + 0.5)) as i64;
            (x, area.y_of(chart.scale(v), max))
        });
        if let (Some(a), Some(b)) = (last, point) {
            draw_line(img, a, b, colour, 2);
        }
        last = point;
    }
}

fn draw_heatmap(img: &mut RgbImage, chart: &Chart, area: Area, n: usize) {
    let rows = chart.series.len().max(1);
    let max = series_max(&chart.series);
    let cell_w = area.width as f64 / n as f64;
    let cell_h = area.height as f64 / rows as f64;
    let base = PALETTE[0];
    for (r, s) in chart.series.iter().enumerate() {
        for (c, v) in s.values.iter().enumerate() {
            let Some(v) = v.filter(|v| *v > 0.0) else { continue };
            let t = if max > 0.0 { v / max } else { 0.0 };
            let shade = Rgb([
                lerp(255, base[0], t),
                lerp(255, base[1], t),
                lerp(255, base[2], t),
            ]);
            let x0 = area.x0 as f64 + cell_w * c as f64;
            let y1 = area.bottom() as f64 - cell_h * r as f64;
            fill_rect(
                img,
                x0 as i64,
                (y1 - cell_h) as i64,
                (x0 + cell_w).ceil() as i64,
                y1 as i64,
                shade,
            );
        }
    }
}

fn lerp(from: u8, to: u8, t: f64) -> u8 {
    (from as f64 + (to as f64 - from as f64) * t.clamp(0.0, 1.0)).round() as u8
}

fn put(img: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, colour);
    }
}

fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, colour: Rgb<u8>) {
    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));
    for y in y0..y1.max(y0 + 1) {
        for x in x0..x1.max(x0 + 1) {
            put(img, x, y, colour);
        }
    }
}

/// Bresenham line, `thickness` pixels wide.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), colour: Rgb<u8>, thickness: i64) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        for t in 0..thickness.max(1) {
            if dx >= -dy {
                put(img, x, y + t, colour);
            } else {
                put(img, x + t, y, colour);
            }
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .unwrap()
            .to_rgb8()
    }

    #[test]
    fn test_render_bars_png() {
        let chart = Chart::new(ChartKind::Bars, "counts")
            .categories(vec!["a".into(), "b".into()])
            .series(Series::dense("n", [2.0, 4.0]));
        let bytes = RasterChartRenderer::new().render(&Figure::single(chart)).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let img = decode(&bytes);
        assert_eq!(img.dimensions(), (Figure::DEFAULT_WIDTH, Figure::DEFAULT_HEIGHT));
        // Second bar reaches the top of the plot area
        let area_top = MARGIN_TOP + 1;
        let x = MARGIN_LEFT + (Figure::DEFAULT_WIDTH - MARGIN_LEFT - MARGIN_RIGHT) * 3 / 4;
        assert_eq!(*img.get_pixel(x, area_top + 2), PALETTE[0]);
    }

    #[test]
    fn test_render_stacked_panels() {
        let lines = Chart::new(ChartKind::Lines, "lines")
            .categories(vec!["d1".into(), "d2".into(), "d3".into()])
            .series(Series::new("x", vec![Some(1.0), None, Some(3.0)]))
            .secondary(Series::dense("p", [0.1, 0.5, 0.2]));
        let heat = Chart::new(ChartKind::Heatmap, "heat")
            .categories(vec!["c1".into(), "c2".into()])
            .series(Series::dense("r1", [1.0, 0.0]))
            .series(Series::dense("r2", [2.0, 5.0]));
        let stacked = Chart::new(ChartKind::StackedBars, "stack")
            .categories(vec!["q1".into()])
            .series(Series::dense("a", [1.0]))
            .series(Series::dense("b", [2.0]))
            .log_scale(true);
        let figure = Figure::stacked(vec![lines, heat, stacked], 800, 1200);
        let bytes = RasterChartRenderer::new().render(&figure).unwrap();
        assert_eq!(decode(&bytes).dimensions(), (800, 1200));
    }

    #[test]
    fn test_render_rejects_tiny_figure() {
        let figure = Figure::stacked(vec![Chart::new(ChartKind::Bars, "x")], 50, 50);
        assert!(matches!(
            RasterChartRenderer::new().render(&figure),
            Err(ExportError::Chart(_))
        ));
    }

    #[test]
    fn test_figure_json() {
        let chart = Chart::new(ChartKind::StackedBars, "t").labels("date", "Count");
        let json = Figure::single(chart).to_json().unwrap();
        assert!(json.contains("\"kind\":\"stacked_bars\""));
    }
}
