//! Batch service analysis: a report export and a TOML config in, one PDF
//! per configured variable out.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::info;

use super::{describe_categorical, AnalysisError, AnalysisResult};
use crate::config::{DataFormat, Dtype, FieldSpec, HistogramStat, PlotType, PlotVariable, ServiceConfig, AGE_AT_STUDY};
use crate::export::{
    generate, write_export, Chart, ChartKind, ChartRenderer, Figure, ImageSource, ReportBundle,
    Series,
};
use crate::ingest::{load_reports, UploadedFile};
use crate::models::{columns, ReportRecord, ReportSet, ReportSubset, Table, Value};
use crate::transform::{
    bucket_ages, collapse_rare, epoch_seconds, fill_unknown, pathology_present,
    pathology_presence_column, DEFAULT_TOP_K,
};

/// Epoch-seconds column added by the transform.
pub const DATE_COLUMN: &str = "date";

/// Schema for service exports: only the exam date is typed, every other
/// column is inferred from its text.
pub fn service_format() -> DataFormat {
    DataFormat::new(vec![(
        columns::EXAM_DATE.to_string(),
        FieldSpec::new("Exam date", Dtype::Date, false, false, PlotType::Temporal),
    )])
}

/// Load a service export (CSV or XLSX).
pub fn load_service_input(path: &Path) -> AnalysisResult<ReportSet> {
    let file = UploadedFile::from_path(path)?;
    Ok(load_reports(&[file], &service_format())?)
}

/// Column-oriented rows of the analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceData {
    /// Column names in export order, derived columns last
    pub columns: Vec<String>,
    values: BTreeMap<String, Vec<Value>>,
    pub exam_dates: Vec<NaiveDateTime>,
}

impl ServiceData {
    pub fn len(&self) -> usize {
        self.exam_dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exam_dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(Vec::as_slice)
    }

    fn require(&self, name: &str) -> AnalysisResult<&[Value]> {
        self.column(name)
            .ok_or_else(|| AnalysisError::MissingColumn(name.to_string()))
    }

    fn set_column(&mut self, name: &str, values: Vec<Value>) {
        if !self.values.contains_key(name) {
            self.columns.push(name.to_string());
        }
        self.values.insert(name.to_string(), values);
    }
}

/// Restrict to `[start, end)`, bucket the age column, add epoch-second dates
/// and `has-*` pathology flags, then tidy every categorical variable: missing
/// values become `UNK` and all but the ten most frequent values `other`.
pub fn transform_service_data(reports: &ReportSet, config: &ServiceConfig) -> AnalysisResult<ServiceData> {
    let (start, end) = config.dates.bounds()?;
    let rows: Vec<&ReportRecord> = reports
        .records
        .iter()
        .filter(|r| r.exam_date().is_some_and(|d| d >= start && d < end))
        .collect();
    if rows.is_empty() {
        return Err(AnalysisError::Empty(format!(
            "no reports between {} and {}",
            config.dates.start, config.dates.end
        )));
    }
    let subset = ReportSubset::new(&reports.columns, rows);
    let exam_dates: Vec<NaiveDateTime> = subset.iter().filter_map(ReportRecord::exam_date).collect();

    let mut data = ServiceData {
        columns: Vec::new(),
        values: BTreeMap::new(),
        exam_dates,
    };
    for column in subset.all_columns() {
        data.set_column(&column, subset.column(&column));
    }

    if let Some(ages) = data.column(AGE_AT_STUDY) {
        let buckets = bucket_ages(ages);
        data.set_column(AGE_AT_STUDY, buckets);
    }
    let dates = data
        .exam_dates
        .iter()
        .map(|d| Value::Int(epoch_seconds(*d)))
        .collect();
    data.set_column(DATE_COLUMN, dates);

    let presence: Vec<(String, Vec<Value>)> = data
        .columns
        .iter()
        .filter_map(|c| {
            let name = pathology_presence_column(c)?;
            let values = data.values.get(c)?.iter().map(pathology_present).collect();
            Some((name, values))
        })
        .collect();
    for (name, values) in presence {
        data.set_column(&name, values);
    }

    for variable in config.categorical_variables() {
        let tidy = collapse_rare(&fill_unknown(data.require(&variable)?), DEFAULT_TOP_K);
        data.set_column(&variable, tidy);
    }
    info!(rows = data.len(), columns = data.columns.len(), "service data prepared");
    Ok(data)
}

/// Summary and breakdown tables of one configured variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableAnalysis {
    pub variable: PlotVariable,
    /// Categorical describe of the variable and its breakdown columns
    pub summary: Table,
    /// Cross-tabulation against each breakdown column
    pub breakdowns: Vec<(String, Table)>,
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    a.partial_compare(b)
        .unwrap_or_else(|| a.to_string().cmp(&b.to_string()))
}

/// Distinct non-null values in ascending order.
fn sorted_levels(values: &[Value]) -> Vec<Value> {
    let mut levels: Vec<Value> = Vec::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        if !levels.contains(v) {
            levels.push(v.clone());
        }
    }
    levels.sort_by(compare_values);
    levels
}

/// Distinct non-null values in first-seen order.
fn levels_in_order(values: &[Value]) -> Vec<Value> {
    let mut levels: Vec<Value> = Vec::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        if !levels.contains(v) {
            levels.push(v.clone());
        }
    }
    levels
}

/// Counts of each (row value, column value) pair; rows with a missing value
/// on either side are not counted.
pub fn crosstab(rows: &[Value], cols: &[Value]) -> Table {
    let row_levels = sorted_levels(rows);
    let col_levels = sorted_levels(cols);
    let mut counts = vec![vec![0_i64; col_levels.len()]; row_levels.len()];
    for (r, c) in rows.iter().zip(cols) {
        let (Some(i), Some(j)) = (
            row_levels.iter().position(|l| l == r),
            col_levels.iter().position(|l| l == c),
        ) else {
            continue;
        };
        counts[i][j] += 1;
    }
    let mut table = Table::new(col_levels.iter().map(ToString::to_string));
    for (level, row) in row_levels.iter().zip(counts) {
        table.push_row(level.to_string(), row.into_iter().map(Value::Int).collect());
    }
    table
}

/// Summary and crosstabs for every configured variable.
pub fn analyse_service_data(data: &ServiceData, config: &ServiceConfig) -> AnalysisResult<Vec<VariableAnalysis>> {
    config
        .variables()
        .map(|variable| {
            let values = data.require(&variable.name)?;
            let mut described = vec![(variable.name.clone(), values.to_vec())];
            let mut breakdowns = Vec::new();
            for breakdown in &variable.breakdown {
                let other = data.require(breakdown)?;
                described.push((breakdown.clone(), other.to_vec()));
                breakdowns.push((breakdown.clone(), crosstab(values, other)));
            }
            Ok(VariableAnalysis {
                variable: variable.clone(),
                summary: describe_categorical(&described),
                breakdowns,
            })
        })
        .collect()
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), (date.month() - 1) / 3 * 3 + 1, 1).unwrap_or(date)
}

fn next_quarter(start: NaiveDate) -> NaiveDate {
    let (year, month) = if start.month() > 9 {
        (start.year() + 1, start.month() - 9)
    } else {
        (start.year(), start.month() + 3)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

/// Quarter-start bin edges covering every date, first edge at the start of
/// the quarter holding the earliest date.
pub fn quarter_edges(dates: &[NaiveDateTime]) -> Vec<NaiveDate> {
    let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
        return Vec::new();
    };
    let mut edges = vec![quarter_start(first.date())];
    while let Some(&edge) = edges.last() {
        if edge > last.date() || edge == NaiveDate::MAX {
            break;
        }
        edges.push(next_quarter(edge));
    }
    edges
}

/// Normalise class-by-bin counts together, so the whole chart shares one
/// total.
fn normalise_grid(stat: HistogramStat, counts: &[Vec<f64>], widths: &[f64]) -> Vec<Vec<f64>> {
    let flat: Vec<f64> = counts.iter().flatten().copied().collect();
    let flat_widths: Vec<f64> = counts.iter().flat_map(|_| widths.iter().copied()).collect();
    let normalised = stat.normalise(&flat, &flat_widths);
    normalised
        .chunks(widths.len().max(1))
        .map(<[f64]>::to_vec)
        .collect()
}

/// Quarterly histogram of report dates stacked by the variable's classes.
pub fn temporal_chart(data: &ServiceData, variable: &PlotVariable) -> AnalysisResult<Figure> {
    let values = data.require(&variable.name)?;
    let edges = quarter_edges(&data.exam_dates);
    let n_bins = edges.len().saturating_sub(1);
    let edge_secs: Vec<i64> = edges
        .iter()
        .map(|d| epoch_seconds(d.and_time(chrono::NaiveTime::MIN)))
        .collect();
    let widths: Vec<f64> = edge_secs.windows(2).map(|w| (w[1] - w[0]) as f64).collect();

    let classes = levels_in_order(values);
    let mut counts = vec![vec![0.0; n_bins]; classes.len()];
    for (value, date) in values.iter().zip(&data.exam_dates) {
        let Some(c) = classes.iter().position(|l| l == value) else {
            continue;
        };
        let secs = epoch_seconds(*date);
        if let Some(bin) = edge_secs.windows(2).position(|w| secs >= w[0] && secs < w[1]) {
            counts[c][bin] += 1.0;
        }
    }

    let mut chart = Chart::new(ChartKind::StackedBars, &variable.name)
        .labels(DATE_COLUMN, variable.stat.axis_label())
        .categories(
            edges
                .iter()
                .take(n_bins)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect(),
        );
    for (class, row) in classes.iter().zip(normalise_grid(variable.stat, &counts, &widths)) {
        chart = chart.series(Series::dense(class.to_string(), row));
    }
    Ok(Figure::single(chart))
}

/// Side-by-side bars of the variable's classes split by a breakdown column.
pub fn breakdown_chart(data: &ServiceData, variable: &PlotVariable, breakdown: &str) -> AnalysisResult<Figure> {
    let values = data.require(&variable.name)?;
    let split = data.require(breakdown)?;
    let categories = levels_in_order(values);
    let hues = levels_in_order(split);

    let mut counts = vec![vec![0.0; categories.len()]; hues.len()];
    for (value, hue) in values.iter().zip(split) {
        let (Some(i), Some(h)) = (
            categories.iter().position(|l| l == value),
            hues.iter().position(|l| l == hue),
        ) else {
            continue;
        };
        counts[h][i] += 1.0;
    }
    let widths = vec![1.0; categories.len()];

    let mut chart = Chart::new(ChartKind::Bars, format!("{} vs. {}", variable.name, breakdown))
        .labels(&variable.name, variable.stat.axis_label())
        .categories(categories.iter().map(ToString::to_string).collect());
    for (hue, row) in hues.iter().zip(normalise_grid(variable.stat, &counts, &widths)) {
        chart = chart.series(Series::dense(hue.to_string(), row));
    }
    Ok(Figure::single(chart))
}

/// Render the charts to PNG and write `{var}_temporal.png`,
/// `{var}_breakdown_{bd}.png` and `{var}.pdf` for every variable.
pub fn write_service_outputs(
    data: &ServiceData,
    analyses: &[VariableAnalysis],
    outdir: &Path,
    renderer: &dyn ChartRenderer,
    today: NaiveDate,
) -> AnalysisResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    for analysis in analyses {
        let name = &analysis.variable.name;
        let temporal_path = outdir.join(format!("{}_temporal.png", name));
        write_export(&temporal_path, &renderer.render(&temporal_chart(data, &analysis.variable)?)?)?;
        written.push(temporal_path.clone());

        let mut breakdowns = Vec::new();
        for (breakdown, table) in &analysis.breakdowns {
            let path = outdir.join(format!("{}_breakdown_{}.png", name, breakdown));
            let figure = breakdown_chart(data, &analysis.variable, breakdown)?;
            write_export(&path, &renderer.render(&figure)?)?;
            written.push(path.clone());
            breakdowns.push((breakdown.clone(), table.clone(), ImageSource::Path(path)));
        }

        let bundle = ReportBundle::variable(
            today,
            name,
            &analysis.summary,
            ImageSource::Path(temporal_path),
            breakdowns,
        );
        let pdf_path = outdir.join(format!("{}.pdf", name));
        generate(&bundle)?.write_to(&pdf_path)?;
        written.push(pdf_path);
    }
    Ok(written)
}

/// Load, transform, analyse and write every output into `outdir`, which is
/// created if missing.
pub fn run_service_analysis(
    input: &Path,
    config: &ServiceConfig,
    outdir: &Path,
    renderer: &dyn ChartRenderer,
    today: NaiveDate,
) -> AnalysisResult<Vec<PathBuf>> {
    std::fs::create_dir_all(outdir)?;
    info!(input = %input.display(), "loading data");
    let reports = load_service_input(input)?;
    let data = transform_service_data(&reports, config)?;
    info!("running analysis");
    let analyses = analyse_service_data(&data, config)?;
    info!(outdir = %outdir.display(), "writing results");
    write_service_outputs(&data, &analyses, outdir, renderer, today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::RasterChartRenderer;
    use crate::ingest::{process_ris, read_csv};

    const CONFIG: &str = r#"
[dates]
start = "01/01/2020"
end = "01/01/2021"

[to_plot.age]
name = "age_at_study"
type = "percent"
breakdown = ["Sex"]

[to_plot.priority]
name = "Quality Priority"
breakdown = ["has-cerebrovascular"]
"#;

    fn csv() -> String {
        let mut text = String::from(
            "End Exam Date,age_at_study,Sex,Quality Priority,asserted-pathology-cerebrovascular\n",
        );
        let rows = [
            ("31/12/2019 10:00", "40", "F", "Routine", "0"),
            ("01/01/2020 00:00", "41", "F", "Routine", "2"),
            ("15/03/2020 09:00", "67", "M", "Urgent", "0"),
            ("20/05/2020 09:00", "105", "", "Routine", "1"),
            ("30/11/2020 09:00", "8", "M", "", "0"),
            ("01/01/2021 00:00", "50", "F", "Routine", "0"),
        ];
        for (date, age, sex, priority, count) in rows {
            text.push_str(&format!("{},{},{},{},{}\n", date, age, sex, priority, count));
        }
        text
    }

    fn reports() -> ReportSet {
        let raw = read_csv(csv().as_bytes()).unwrap();
        process_ris("service.csv", raw, &service_format()).unwrap()
    }

    #[test]
    fn test_transform_window_and_columns() {
        let config = ServiceConfig::from_toml(CONFIG).unwrap();
        let data = transform_service_data(&reports(), &config).unwrap();

        // start inclusive, end exclusive
        assert_eq!(data.len(), 4);
        assert_eq!(
            data.column(AGE_AT_STUDY).unwrap(),
            &[Value::from("40-49"), Value::from("60-69"), Value::Null, Value::from("0-9")]
        );
        assert_eq!(data.column(DATE_COLUMN).unwrap()[0], Value::Int(1_577_836_800));
        assert_eq!(
            data.column("has-cerebrovascular").unwrap(),
            &[Value::Bool(true), Value::Bool(false), Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(
            data.column("Quality Priority").unwrap(),
            &[Value::from("Routine"), Value::from("Urgent"), Value::from("Routine"), Value::from("UNK")]
        );
        assert_eq!(data.columns.last().map(String::as_str), Some("has-cerebrovascular"));
    }

    #[test]
    fn test_missing_variable() {
        let config = ServiceConfig::from_toml(&CONFIG.replace("Quality Priority", "Nope")).unwrap();
        assert!(matches!(
            transform_service_data(&reports(), &config),
            Err(AnalysisError::MissingColumn(c)) if c == "Nope"
        ));
    }

    #[test]
    fn test_crosstab() {
        let rows = [Value::from("b"), Value::from("a"), Value::from("b"), Value::Null];
        let cols = [Value::Bool(true), Value::Bool(false), Value::Bool(true), Value::Bool(true)];
        let table = crosstab(&rows, &cols);
        assert_eq!(table.index, vec!["a", "b"]);
        assert_eq!(table.columns, vec!["False", "True"]);
        assert_eq!(table.cell("b", "True"), Some(&Value::Int(2)));
        assert_eq!(table.cell("a", "True"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_analysis_tables() {
        let config = ServiceConfig::from_toml(CONFIG).unwrap();
        let data = transform_service_data(&reports(), &config).unwrap();
        let analyses = analyse_service_data(&data, &config).unwrap();

        let age = analyses.iter().find(|a| a.variable.name == AGE_AT_STUDY).unwrap();
        assert_eq!(age.summary.columns, vec![AGE_AT_STUDY, "Sex"]);
        assert_eq!(age.summary.cell("count", AGE_AT_STUDY), Some(&Value::Int(3)));
        let (name, table) = &age.breakdowns[0];
        assert_eq!(name, "Sex");
        assert_eq!(table.cell("60-69", "M"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_quarter_edges() {
        let at = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let edges = quarter_edges(&[at(2020, 2, 10), at(2020, 7, 1)]);
        let expected: Vec<NaiveDate> = [(2020, 1), (2020, 4), (2020, 7), (2020, 10)]
            .iter()
            .map(|(y, m)| NaiveDate::from_ymd_opt(*y, *m, 1).unwrap())
            .collect();
        assert_eq!(edges, expected);
        assert!(quarter_edges(&[]).is_empty());
    }

    #[test]
    fn test_temporal_chart_percent_shares_one_total() {
        let config = ServiceConfig::from_toml(CONFIG).unwrap();
        let data = transform_service_data(&reports(), &config).unwrap();
        let figure = temporal_chart(&data, &config.to_plot["priority"]).unwrap();
        let chart = &figure.panels[0];
        assert_eq!(chart.categories, vec!["2020-01-01", "2020-04-01", "2020-07-01", "2020-10-01"]);
        let total: f64 = chart.series.iter().flat_map(|s| s.values.iter().flatten()).sum();
        assert_eq!(total, 4.0);

        let percent = temporal_chart(&data, &config.to_plot["age"]).unwrap();
        let total: f64 = percent.panels[0]
            .series
            .iter()
            .flat_map(|s| s.values.iter().flatten())
            .sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_service_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("export.csv");
        std::fs::write(&input, csv()).unwrap();
        let outdir = dir.path().join("out");
        let config = ServiceConfig::from_toml(CONFIG).unwrap();
        let today = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();

        let written =
            run_service_analysis(&input, &config, &outdir, &RasterChartRenderer::new(), today).unwrap();
        for name in [
            "age_at_study_temporal.png",
            "age_at_study_breakdown_Sex.png",
            "age_at_study.pdf",
            "Quality Priority_temporal.png",
            "Quality Priority_breakdown_has-cerebrovascular.png",
            "Quality Priority.pdf",
        ] {
            assert!(written.contains(&outdir.join(name)), "missing {}", name);
        }
        let pdf = std::fs::read(outdir.join("age_at_study.pdf")).unwrap();
        assert_eq!(&pdf[0..4], b"%PDF");
    }
}
