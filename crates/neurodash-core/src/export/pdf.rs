//! Report generator: lays out a title block, tables and chart images on A4
//! pages with `printpdf`.
//!
//! Generation is a pure assembly step. Every image is loaded before anything
//! is drawn, so an unreadable image fails the whole document.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use image::DynamicImage;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rgb,
};
use tracing::info;

use super::{ExportError, ExportResult};
use crate::models::Table;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const IMAGE_DPI: f32 = 300.0;

const TITLE_SIZE: f32 = 18.0;
const SUBTITLE_SIZE: f32 = 11.0;
const DATA_SIZE: f32 = 8.0;
const ROW_HEIGHT: f32 = 4.5;
const MAX_COLUMN_WIDTH: f32 = 45.0;
/// Approximate Helvetica advance per character, in mm per pt of font size.
const CHAR_WIDTH: f32 = 0.55 * 0.3528;

/// Spacer placed above chart images, in mm.
pub const IMAGE_SPACER: f32 = 7.0;

/// Title and subtitle line of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleBlock {
    pub title: String,
    pub date: NaiveDate,
    /// What the analysis covers
    pub target: Option<String>,
    pub date_range: Option<(String, String)>,
}

impl TitleBlock {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            date,
            target: None,
            date_range: None,
        }
    }

    pub fn for_target(mut self, target: impl Into<String>, start: impl ToString, end: impl ToString) -> Self {
        self.target = Some(target.into());
        self.date_range = Some((start.to_string(), end.to_string()));
        self
    }

    pub fn subtitle(&self) -> String {
        match (&self.target, &self.date_range) {
            (Some(target), Some((start, end))) => format!(
                "Date: {}, Analysis for: {}, Date range: {} to {}",
                self.date, target, start, end
            ),
            _ => format!("Date: {}", self.date),
        }
    }
}

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { name: String, bytes: Vec<u8> },
}

impl ImageSource {
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ImageSource::Bytes {
            name: name.into(),
            bytes,
        }
    }

    fn name(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Bytes { name, .. } => name.clone(),
        }
    }

    fn load(&self) -> ExportResult<DynamicImage> {
        let failed = |reason: String| ExportError::Image {
            source_name: self.name(),
            reason,
        };
        let decoded = match self {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| failed(e.to_string()))?;
                image::load_from_memory(&bytes)
            }
            ImageSource::Bytes { bytes, .. } => image::load_from_memory(bytes),
        };
        let img = decoded.map_err(|e| failed(e.to_string()))?;
        Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
    }
}

/// An image with its printed size.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub source: ImageSource,
    pub width_cm: f32,
    pub height_cm: f32,
}

impl PlacedImage {
    pub fn new(source: ImageSource, width_cm: f32, height_cm: f32) -> Self {
        Self {
            source,
            width_cm,
            height_cm,
        }
    }
}

/// A per-breakdown block: heading, cross-tabulation and chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownBlock {
    pub heading: String,
    pub table: Table,
    pub image: PlacedImage,
}

/// One element of the document body, drawn top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Table(Table),
    /// Vertical gap in mm
    Spacer(f32),
    Image(PlacedImage),
    Breakdown(BreakdownBlock),
}

/// Everything a document is assembled from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBundle {
    pub title: TitleBlock,
    pub blocks: Vec<Block>,
}

impl ReportBundle {
    pub fn new(title: TitleBlock) -> Self {
        Self {
            title,
            blocks: Vec::new(),
        }
    }

    pub fn table(mut self, table: Table) -> Self {
        self.blocks.push(Block::Table(table));
        self
    }

    pub fn spacer(mut self, mm: f32) -> Self {
        self.blocks.push(Block::Spacer(mm));
        self
    }

    pub fn image(mut self, image: PlacedImage) -> Self {
        self.blocks.push(Block::Image(image));
        self
    }

    pub fn breakdown(mut self, heading: impl Into<String>, table: Table, image: PlacedImage) -> Self {
        self.blocks.push(Block::Breakdown(BreakdownBlock {
            heading: heading.into(),
            table,
            image,
        }));
        self
    }

    /// Operational analysis report: selection criteria, the categorical
    /// summary in two tables of at most six columns, the continuous summary
    /// and the chart.
    pub fn operational(
        date: NaiveDate,
        selection: &Table,
        categorical: &Table,
        continuous: &Table,
        chart: ImageSource,
    ) -> Self {
        Self::new(TitleBlock::new("Operational Analysis Report", date))
            .table(selection.clone())
            .table(categorical.slice_columns(0..6))
            .table(categorical.slice_columns(6..12))
            .table(continuous.clone())
            .spacer(IMAGE_SPACER)
            .image(PlacedImage::new(chart, 16.0, 11.0))
    }

    /// Service-analysis report for one variable: its summary and temporal
    /// chart, then one block per breakdown variable.
    pub fn variable(
        date: NaiveDate,
        variable: &str,
        summary: &Table,
        chart: ImageSource,
        breakdowns: Vec<(String, Table, ImageSource)>,
    ) -> Self {
        let mut bundle = Self::new(TitleBlock::new("Operational Analysis Report", date))
            .table(summary.clone())
            .spacer(IMAGE_SPACER)
            .image(PlacedImage::new(chart, 15.0, 9.0));
        for (breakdown, table, image) in breakdowns {
            bundle = bundle.breakdown(
                format!("{} vs. {}", variable, breakdown),
                table,
                PlacedImage::new(image, 15.0, 9.0),
            );
        }
        bundle
    }

    /// Workload report: title line naming the target and date range, one
    /// table, one chart of the given size.
    #[allow(clippy::too_many_arguments)]
    pub fn service(
        date: NaiveDate,
        target: &str,
        start: NaiveDate,
        end: NaiveDate,
        table: &Table,
        chart: ImageSource,
        height_cm: f32,
        width_cm: f32,
    ) -> Self {
        Self::new(TitleBlock::new("Operational Analysis Report", date).for_target(target, start, end))
            .table(table.clone())
            .image(PlacedImage::new(chart, width_cm, height_cm))
    }

    fn images(&self) -> impl Iterator<Item = &PlacedImage> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Image(img) => Some(img),
            Block::Breakdown(bd) => Some(&bd.image),
            _ => None,
        })
    }
}

/// A generated PDF. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    bytes: Vec<u8>,
}

impl ReportDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> ExportResult<()> {
        super::write_export(path, &self.bytes)
    }
}

/// Lay out a bundle and render it to PDF bytes.
pub fn generate(bundle: &ReportBundle) -> ExportResult<ReportDocument> {
    let images = bundle
        .images()
        .map(|placed| placed.source.load())
        .collect::<ExportResult<Vec<_>>>()?;
    let mut images = images.into_iter();

    let (doc, page, layer) = PdfDocument::new(
        &bundle.title.title,
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ExportError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ExportError::Pdf(format!("font error: {e}")))?;

    let pages = {
        let mut page_writer = PageWriter {
            doc: &doc,
            layer: doc.get_page(page).get_layer(layer),
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
            font,
            bold,
        };

        page_writer.title(&bundle.title);
        for block in &bundle.blocks {
            match block {
                Block::Table(table) => page_writer.table(table),
                Block::Spacer(mm) => page_writer.y -= mm,
                Block::Image(placed) => {
                    if let Some(img) = images.next() {
                        page_writer.image(&img, placed);
                    }
                }
                Block::Breakdown(bd) => {
                    page_writer.ensure(SUBTITLE_SIZE * 0.3528 + 2.0 * ROW_HEIGHT);
                    page_writer.text(&bd.heading, SUBTITLE_SIZE, false);
                    page_writer.table(&bd.table);
                    if let Some(img) = images.next() {
                        page_writer.image(&img, &bd.image);
                    }
                }
            }
        }
        page_writer.pages
    };

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::Pdf(format!("save error: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| ExportError::Pdf(format!("buffer error: {e}")))?;
    info!(title = %bundle.title.title, pages, bytes = bytes.len(), "generated report document");
    Ok(ReportDocument { bytes })
}

/// Cursor over the current page.
struct PageWriter<'d> {
    doc: &'d PdfDocumentReference,
    layer: PdfLayerReference,
    /// Distance of the cursor from the page bottom, in mm
    y: f32,
    pages: usize,
    font: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PageWriter<'_> {
    /// Start a new page unless `height` mm still fit.
    fn ensure(&mut self, height: f32) {
        if self.y - height >= MARGIN || self.y >= PAGE_HEIGHT - MARGIN {
            return;
        }
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool) {
        let line_height = size * 0.3528 + 2.0;
        self.ensure(line_height);
        self.y -= line_height;
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(MARGIN), Mm(self.y), font);
    }

    fn title(&mut self, title: &TitleBlock) {
        self.text(&title.title, TITLE_SIZE, true);
        self.y -= 3.0;
        self.text(&title.subtitle(), SUBTITLE_SIZE, false);
        self.y -= 3.0;
    }

    fn rule(&self, x0: f32, x1: f32, y: f32) {
        self.layer.set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        self.layer.set_outline_thickness(0.7);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x0), Mm(y)), false),
                (Point::new(Mm(x1), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    /// Header row of `[""] + columns`, a rule under it, then one row per
    /// index entry.
    fn table(&mut self, table: &Table) {
        let mut rows: Vec<Vec<String>> = Vec::with_capacity(table.n_rows() + 1);
        rows.push(std::iter::once(String::new()).chain(table.columns.iter().cloned()).collect());
        for (index, cells) in table.index.iter().zip(table.display_rows()) {
            rows.push(std::iter::once(index.clone()).chain(cells).collect());
        }
        let widths = column_widths(&rows);

        self.y -= 2.5;
        for (r, row) in rows.iter().enumerate() {
            self.ensure(ROW_HEIGHT);
            self.y -= ROW_HEIGHT;
            let mut x = MARGIN;
            for (cell, width) in row.iter().zip(&widths) {
                let text = fit(cell, *width);
                self.layer.use_text(text, DATA_SIZE, Mm(x), Mm(self.y + 1.0), &self.font);
                x += width;
            }
            if r == 0 {
                self.rule(MARGIN, x, self.y);
            }
        }
    }

    /// Centre an image scaled to its requested size, shrunk to fit the page.
    fn image(&mut self, img: &DynamicImage, placed: &PlacedImage) {
        let usable_w = PAGE_WIDTH - 2.0 * MARGIN;
        let usable_h = PAGE_HEIGHT - 2.0 * MARGIN;
        let mut width = placed.width_cm * 10.0;
        let mut height = placed.height_cm * 10.0;
        let shrink = (usable_w / width).min(usable_h / height).min(1.0);
        width *= shrink;
        height *= shrink;

        self.ensure(height);
        self.y -= height;

        let native_w = img.width() as f32 / IMAGE_DPI * 25.4;
        let native_h = img.height() as f32 / IMAGE_DPI * 25.4;
        Image::from_dynamic_image(img).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm((PAGE_WIDTH - width) / 2.0)),
                translate_y: Some(Mm(self.y)),
                scale_x: Some(width / native_w),
                scale_y: Some(height / native_h),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }
}

/// Column widths in mm from the longest cell, capped per column and scaled
/// down to the printable width.
fn column_widths(rows: &[Vec<String>]) -> Vec<f32> {
    let n = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths: Vec<f32> = (0..n)
        .map(|c| {
            let chars = rows
                .iter()
                .filter_map(|r| r.get(c))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0);
            (chars as f32 * DATA_SIZE * CHAR_WIDTH + 3.0).min(MAX_COLUMN_WIDTH)
        })
        .collect();
    let total: f32 = widths.iter().sum();
    let usable = PAGE_WIDTH - 2.0 * MARGIN;
    if total > usable {
        for w in &mut widths {
            *w *= usable / total;
        }
    }
    widths
}

/// Truncate a cell to its column width.
fn fit(text: &str, width: f32) -> String {
    let max_chars = ((width - 2.0) / (DATA_SIZE * CHAR_WIDTH)).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let keep = max_chars.saturating_sub(3).max(1);
        format!("{}...", text.chars().take(keep).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ChartKind, ChartRenderer, Chart, Figure, RasterChartRenderer, Series};
    use crate::models::Value;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn png() -> Vec<u8> {
        let chart = Chart::new(ChartKind::Bars, "x")
            .categories(vec!["a".into()])
            .series(Series::dense("n", [1.0]));
        RasterChartRenderer::new().render(&Figure::single(chart)).unwrap()
    }

    fn table(n_cols: usize) -> Table {
        let mut t = Table::new((0..n_cols).map(|i| format!("column {}", i)));
        t.push_row("count", (0..n_cols).map(|i| Value::Int(i as i64)).collect());
        t.push_row("mean", (0..n_cols).map(|i| Value::Float(i as f64 / 3.0)).collect());
        t
    }

    #[test]
    fn test_subtitle() {
        let plain = TitleBlock::new("T", date());
        assert_eq!(plain.subtitle(), "Date: 2024-03-01");
        let service = plain.for_target("contrast_usage", "2024-01-01", "2024-02-01");
        assert_eq!(
            service.subtitle(),
            "Date: 2024-03-01, Analysis for: contrast_usage, Date range: 2024-01-01 to 2024-02-01"
        );
    }

    #[test]
    fn test_operational_layout() {
        let bundle = ReportBundle::operational(
            date(),
            &table(4),
            &table(14),
            &table(3),
            ImageSource::bytes("figure.png", png()),
        );
        let kinds: Vec<&str> = bundle
            .blocks
            .iter()
            .map(|b| match b {
                Block::Table(_) => "table",
                Block::Spacer(_) => "spacer",
                Block::Image(_) => "image",
                Block::Breakdown(_) => "breakdown",
            })
            .collect();
        assert_eq!(kinds, vec!["table", "table", "table", "table", "spacer", "image"]);
        match (&bundle.blocks[1], &bundle.blocks[2]) {
            (Block::Table(a), Block::Table(b)) => {
                assert_eq!(a.columns.len(), 6);
                assert_eq!(b.columns.len(), 6);
                assert_eq!(b.columns[0], "column 6");
            }
            _ => panic!("expected tables"),
        }

        let doc = generate(&bundle).unwrap();
        assert_eq!(&doc.as_bytes()[0..4], b"%PDF");
    }

    #[test]
    fn test_variable_report_with_breakdowns_spans_pages() {
        let breakdowns = (0..4)
            .map(|i| (format!("bd{}", i), table(3), ImageSource::bytes("bd.png", png())))
            .collect();
        let bundle = ReportBundle::variable(
            date(),
            "Sex",
            &table(2),
            ImageSource::bytes("temporal.png", png()),
            breakdowns,
        );
        match &bundle.blocks[3] {
            Block::Breakdown(bd) => assert_eq!(bd.heading, "Sex vs. bd0"),
            other => panic!("unexpected block {:?}", other),
        }
        let doc = generate(&bundle).unwrap();
        assert!(doc.len() > 4);
        assert_eq!(&doc.as_bytes()[0..4], b"%PDF");
    }

    #[test]
    fn test_unreadable_image_fails() {
        let bundle = ReportBundle::service(
            date(),
            "aggregate_data",
            date(),
            date(),
            &table(2),
            ImageSource::Path(PathBuf::from("/nonexistent/plot.png")),
            10.0,
            15.0,
        );
        match generate(&bundle) {
            Err(ExportError::Image { source_name, .. }) => {
                assert_eq!(source_name, "/nonexistent/plot.png")
            }
            other => panic!("unexpected {:?}", other.map(|d| d.len())),
        }

        let corrupt = ReportBundle::new(TitleBlock::new("T", date()))
            .image(PlacedImage::new(ImageSource::bytes("bad.png", b"not a png".to_vec()), 5.0, 5.0));
        assert!(matches!(generate(&corrupt), Err(ExportError::Image { .. })));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        let doc = generate(&ReportBundle::new(TitleBlock::new("Empty", date()))).unwrap();
        doc.write_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), doc.as_bytes());
    }

    #[test]
    fn test_fit_truncates() {
        assert_eq!(fit("short", 40.0), "short");
        let long = "x".repeat(200);
        let fitted = fit(&long, 20.0);
        assert!(fitted.ends_with("..."));
        assert!(fitted.len() < 200);
    }
}
