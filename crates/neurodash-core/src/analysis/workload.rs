//! Workload reports: daily volume across reporters, per-reporter activity
//! and contrast usage per pathological domain.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use super::{describe_total, AnalysisError, AnalysisResult};
use crate::export::{
    generate, Chart, ChartKind, ChartRenderer, Figure, ImageSource, ReportBundle, ReportDocument,
    Series,
};
use crate::models::{Table, Value};
use crate::selection::select_dates;
use crate::transform::{
    contrast_totals, date_range, domain_columns, explode_reporters, reporters_by_count,
    ContrastUsage, DomainSeries, WorkloadRecord, ROLLING_WINDOW,
};

/// Target name of the all-reporter report.
pub const AGGREGATE_TARGET: &str = "aggregate_data";

/// Target name of the contrast usage report.
pub const CONTRAST_TARGET: &str = "contrast_usage";

pub const AGGREGATE_FILE: &str = "total_reporter_analysis.pdf";
pub const CONTRAST_FILE: &str = "contrast_usage_analysis.pdf";

/// File name of the `index`-th reporter's report.
pub fn reporter_file_name(index: usize) -> String {
    format!("reporter_{}_analysis.pdf", index)
}

/// A workload analysis: summary table, figure and printed chart size.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadReport {
    /// What the report covers: a reporter name or a fixed target
    pub target: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub table: Table,
    pub figure: Figure,
    pub height_cm: f32,
    pub width_cm: f32,
}

impl WorkloadReport {
    /// Render the figure and lay out the PDF.
    pub fn to_pdf(&self, renderer: &dyn ChartRenderer, today: NaiveDate) -> AnalysisResult<ReportDocument> {
        let png = renderer.render(&self.figure)?;
        let bundle = ReportBundle::service(
            today,
            &self.target,
            self.start,
            self.end,
            &self.table,
            ImageSource::bytes(format!("{}_plot.png", self.target), png),
            self.height_cm,
            self.width_cm,
        );
        Ok(generate(&bundle)?)
    }
}

/// Rows whose day falls in `[start, end)`; either bound may be open.
pub fn restrict_dates<'a>(
    rows: &[WorkloadRecord<'a>],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<WorkloadRecord<'a>> {
    let start = start.unwrap_or(NaiveDate::MIN);
    let end = end.unwrap_or(NaiveDate::MAX);
    select_dates(rows, start, end).into_iter().cloned().collect()
}

fn span(rows: &[WorkloadRecord<'_>]) -> AnalysisResult<(NaiveDate, NaiveDate)> {
    date_range(rows).ok_or_else(|| AnalysisError::Empty("no dated reports for workload analysis".into()))
}

fn day_labels(days: &[NaiveDate]) -> Vec<String> {
    days.iter().map(NaiveDate::to_string).collect()
}

/// Daily report count across all reporters.
pub fn aggregate_reporters_report(rows: &[WorkloadRecord<'_>]) -> AnalysisResult<WorkloadReport> {
    let (start, end) = span(rows)?;
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in rows {
        let count = daily.entry(row.date).or_insert(0.0);
        if row.report.patient_id().is_some() {
            *count += 1.0;
        }
    }
    let days: Vec<NaiveDate> = daily.keys().copied().collect();
    let counts: Vec<f64> = daily.into_values().collect();

    let chart = Chart::new(ChartKind::Lines, "Count of daily reports for all reporters")
        .labels("date", "n_daily_reports")
        .categories(day_labels(&days))
        .series(Series::dense("n_daily_reports", counts.iter().copied()));
    Ok(WorkloadReport {
        target: AGGREGATE_TARGET.to_string(),
        start,
        end,
        table: describe_total(&[("n_daily_reports".to_string(), counts)]),
        figure: Figure::stacked(vec![chart], 1000, 600),
        height_cm: 10.0,
        width_cm: 15.0,
    })
}

/// One report per reporter, most active first. Reports are attributed to
/// both their primary and secondary reporter.
pub fn per_reporter_reports(rows: &[WorkloadRecord<'_>]) -> AnalysisResult<Vec<WorkloadReport>> {
    let (start, end) = span(rows)?;
    let attributions = explode_reporters(rows);
    let domains = domain_columns(rows.iter().map(|r| r.report));

    // (date, reporter) counts and the daily totals they share
    let mut counts: BTreeMap<(NaiveDate, &str), f64> = BTreeMap::new();
    let mut daily_totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for a in &attributions {
        if a.row.report.patient_id().is_some() {
            *counts.entry((a.row.date, a.reporter)).or_insert(0.0) += 1.0;
            *daily_totals.entry(a.row.date).or_insert(0.0) += 1.0;
        } else {
            counts.entry((a.row.date, a.reporter)).or_insert(0.0);
        }
    }

    let reports = reporters_by_count(&attributions)
        .into_iter()
        .map(|(reporter, _)| {
            let mut days = Vec::new();
            let mut count = Vec::new();
            let mut proportion = Vec::new();
            for ((date, r), n) in &counts {
                if *r != reporter {
                    continue;
                }
                let total = daily_totals.get(date).copied().unwrap_or(0.0);
                days.push(*date);
                count.push(*n);
                proportion.push(if total > 0.0 { n / total } else { 0.0 });
            }

            let mut domain_counts: Vec<(String, f64)> = domains
                .iter()
                .map(|d| {
                    let n = attributions
                        .iter()
                        .filter(|a| a.reporter == reporter && a.row.report.domain_flag(d))
                        .count();
                    (d.clone(), n as f64)
                })
                .collect();
            domain_counts.sort_by(|a, b| a.1.total_cmp(&b.1));

            let activity = Chart::new(ChartKind::Lines, "Report count and proportion of total reports")
                .labels("date", "count")
                .categories(day_labels(&days))
                .series(Series::dense("count", count.iter().copied()))
                .secondary(Series::dense("proportion_of_total", proportion.iter().copied()));
            let classes = Chart::new(ChartKind::Bars, "Number of reports of each pathological class")
                .labels("pathology_class", "count")
                .categories(domain_counts.iter().map(|(d, _)| d.clone()).collect())
                .series(Series::dense("count", domain_counts.iter().map(|(_, n)| *n)));

            WorkloadReport {
                table: describe_total(&[
                    ("count".to_string(), count),
                    ("proportion_of_total".to_string(), proportion),
                ]),
                target: reporter,
                start,
                end,
                figure: Figure::stacked(vec![activity, classes], 1000, 1500),
                height_cm: 20.0,
                width_cm: 14.0,
            }
        })
        .collect();
    Ok(reports)
}

fn domain_lines(chart: Chart, series: Vec<DomainSeries>) -> Chart {
    series
        .into_iter()
        .fold(chart, |chart, s| chart.series(Series::new(s.domain, s.values)))
}

/// Contrast totals and the weekly rolling contrast usage of each domain.
pub fn contrast_usage_report(rows: &[WorkloadRecord<'_>]) -> AnalysisResult<WorkloadReport> {
    let (start, end) = span(rows)?;
    let domains = domain_columns(rows.iter().map(|r| r.report));
    let usage = ContrastUsage::from_rows(rows, &domains);

    let (with, without, total) = contrast_totals(rows);
    let mut table = Table::new(["uses_contrast"]);
    table.push_row("n_with_contrast", vec![Value::Int(with as i64)]);
    table.push_row("n_without_contrast", vec![Value::Int(without as i64)]);
    table.push_row("total", vec![Value::Int(total as i64)]);

    let counts = usage.rolling_contrast_counts(ROLLING_WINDOW);
    let count_days = counts.first().map(|s| s.dates.clone()).unwrap_or_default();
    let count_chart = Chart::new(ChartKind::Lines, "Contrast usage counts for each pathology class")
        .labels("date", "count, weekly rolling average")
        .categories(day_labels(&count_days));
    let proportion_chart = Chart::new(
        ChartKind::Lines,
        "Contrast usage for each class, as a proportion of the class",
    )
    .labels("date", "proportion, weekly rolling average")
    .categories(day_labels(&usage.dates()));

    Ok(WorkloadReport {
        target: CONTRAST_TARGET.to_string(),
        start,
        end,
        table,
        figure: Figure::stacked(
            vec![
                domain_lines(count_chart, counts),
                domain_lines(proportion_chart, usage.rolling_proportions(ROLLING_WINDOW)),
            ],
            1200,
            1500,
        ),
        height_cm: 20.0,
        width_cm: 16.0,
    })
}

/// All workload reports over the rows, written as PDFs into `outdir`.
pub fn write_workload_reports(
    rows: &[WorkloadRecord<'_>],
    outdir: &Path,
    renderer: &dyn ChartRenderer,
    today: NaiveDate,
) -> AnalysisResult<Vec<PathBuf>> {
    std::fs::create_dir_all(outdir)?;
    let mut written = Vec::new();
    let mut write = |report: &WorkloadReport, name: String| -> AnalysisResult<()> {
        let path = outdir.join(name);
        report.to_pdf(renderer, today)?.write_to(&path)?;
        written.push(path);
        Ok(())
    };

    write(&aggregate_reporters_report(rows)?, AGGREGATE_FILE.to_string())?;
    write(&contrast_usage_report(rows)?, CONTRAST_FILE.to_string())?;
    for (i, report) in per_reporter_reports(rows)?.iter().enumerate() {
        write(report, reporter_file_name(i))?;
    }
    info!(outdir = %outdir.display(), files = written.len(), "workload reports written");
    Ok(written)
}
