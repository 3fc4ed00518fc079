//! Operational plots: one figure per plottable column and view.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AnalysisError, AnalysisResult};
use crate::config::{DataFormat, PlotType, PlotView};
use crate::export::{Chart, ChartKind, Figure, Series};
use crate::models::{columns, ReportRecord, ReportSubset, Value};
use crate::selection::value_counts;
use crate::transform::{epoch_seconds, from_epoch_seconds};

/// Default number of histogram and heatmap bins.
pub const DEFAULT_BINS: usize = 50;

/// Class label used when counting reports over time.
const REPORT_COUNT_CLASS: &str = "N";

/// Resampling period of the percent-change view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::Daily,
        Interval::Weekly,
        Interval::Monthly,
        Interval::Quarterly,
        Interval::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "Daily",
            Interval::Weekly => "Weekly",
            Interval::Monthly => "Monthly",
            Interval::Quarterly => "Quarterly",
            Interval::Yearly => "Yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == s)
    }

    /// Last day of the period containing `date`. Periods are labelled by
    /// their end; weeks end on Sunday.
    pub fn period_end(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Interval::Daily => date,
            Interval::Weekly => {
                date + Duration::days(6 - i64::from(date.weekday().num_days_from_monday()))
            }
            Interval::Monthly => month_end(date.year(), date.month()),
            Interval::Quarterly => month_end(date.year(), (date.month() - 1) / 3 * 3 + 3),
            Interval::Yearly => month_end(date.year(), 12),
        }
    }
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    let (y, m) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Binning and resampling choices of a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotOptions {
    /// Histogram bins, or heatmap bins along time
    pub nbins: usize,
    /// Heatmap bins along the value axis
    pub nbins_y: usize,
    pub interval: Interval,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            nbins: DEFAULT_BINS,
            nbins_y: DEFAULT_BINS,
            interval: Interval::default(),
        }
    }
}

/// Equal-width bins spanning the observed range.
#[derive(Debug, Clone, Copy)]
struct Bins {
    lo: f64,
    width: f64,
    n: usize,
}

impl Bins {
    fn spanning<I: IntoIterator<Item = f64>>(values: I, n: usize) -> Option<Self> {
        let (lo, hi) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;
        if hi > lo {
            let n = n.max(1);
            Some(Self { lo, width: (hi - lo) / n as f64, n })
        } else {
            Some(Self { lo, width: 1.0, n: 1 })
        }
    }

    fn index(&self, v: f64) -> usize {
        (((v - self.lo) / self.width).floor().max(0.0) as usize).min(self.n - 1)
    }

    fn left_edges(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.n).map(move |i| self.lo + i as f64 * self.width)
    }

    fn value_labels(&self) -> Vec<String> {
        self.left_edges()
            .map(|lo| format!("{}-{}", format_edge(lo), format_edge(lo + self.width)))
            .collect()
    }

    fn date_labels(&self) -> Vec<String> {
        self.left_edges()
            .map(|lo| {
                from_epoch_seconds(lo as i64)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            })
            .collect()
    }
}

fn format_edge(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Bar per value, most frequent first.
pub fn value_count_chart(title: &str, values: &[Value], log_y: bool) -> Chart {
    let counts = value_counts(values);
    Chart::new(ChartKind::Bars, title)
        .labels(title, "counts")
        .categories(counts.iter().map(|(v, _)| v.to_string()).collect())
        .series(Series::dense("counts", counts.iter().map(|(_, n)| *n as f64)))
        .log_scale(log_y)
}

/// Counts of each class in equal time bins, stacked. With `percent` each
/// bin is scaled so its classes sum to 100.
pub fn temporal_histogram(
    title: &str,
    observations: &[(NaiveDateTime, String)],
    nbins: usize,
    percent: bool,
    log_y: bool,
) -> Chart {
    let mut chart = Chart::new(ChartKind::StackedBars, title)
        .labels(columns::EXAM_DATE, if percent { "percent" } else { "count" })
        .log_scale(log_y);
    let Some(bins) = Bins::spanning(observations.iter().map(|(d, _)| epoch_seconds(*d) as f64), nbins)
    else {
        return chart;
    };

    let mut classes: Vec<&str> = Vec::new();
    let mut counts: Vec<Vec<f64>> = Vec::new();
    for (date, class) in observations {
        let c = match classes.iter().position(|k| *k == class) {
            Some(c) => c,
            None => {
                classes.push(class);
                counts.push(vec![0.0; bins.n]);
                classes.len() - 1
            }
        };
        counts[c][bins.index(epoch_seconds(*date) as f64)] += 1.0;
    }

    if percent {
        for bin in 0..bins.n {
            let total: f64 = counts.iter().map(|c| c[bin]).sum();
            if total > 0.0 {
                counts.iter_mut().for_each(|c| c[bin] *= 100.0 / total);
            }
        }
    }

    chart = chart.categories(bins.date_labels());
    for (class, values) in classes.into_iter().zip(counts) {
        chart = chart.series(Series::dense(class, values));
    }
    chart
}

/// Class counts resampled per period, as percent change from the previous
/// period. Empty periods count zero; a change from zero is left as a gap.
pub fn percent_change_chart(
    title: &str,
    observations: &[(NaiveDateTime, String)],
    interval: Interval,
    log_y: bool,
) -> Chart {
    let mut chart = Chart::new(ChartKind::Lines, title)
        .labels(columns::EXAM_DATE, "% change")
        .log_scale(log_y);
    let Some(first) = observations.iter().map(|(d, _)| d.date()).min() else {
        return chart;
    };
    let last = observations.iter().map(|(d, _)| d.date()).max().unwrap_or(first);

    let mut periods = vec![interval.period_end(first)];
    let last_period = interval.period_end(last);
    while let Some(&current) = periods.last() {
        if current >= last_period {
            break;
        }
        match current.succ_opt() {
            Some(next) => periods.push(interval.period_end(next)),
            None => break,
        }
    }
    let position: HashMap<NaiveDate, usize> =
        periods.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    let mut classes: Vec<String> = Vec::new();
    let mut counts: Vec<Vec<f64>> = Vec::new();
    for (date, class) in observations {
        let c = match classes.iter().position(|k| k == class) {
            Some(c) => c,
            None => {
                classes.push(class.clone());
                counts.push(vec![0.0; periods.len()]);
                classes.len() - 1
            }
        };
        if let Some(&p) = position.get(&interval.period_end(date.date())) {
            counts[c][p] += 1.0;
        }
    }

    chart = chart.categories(periods.iter().map(|p| p.to_string()).collect());
    for (class, values) in classes.into_iter().zip(counts) {
        chart = chart.series(Series::new(class, percent_change(&values)));
    }
    chart
}

/// Percent change between consecutive values.
pub fn percent_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;
    for &v in values {
        out.push(
            previous
                .map(|p| (v - p) / p * 100.0)
                .filter(|change| change.is_finite()),
        );
        previous = Some(v);
    }
    out
}

/// Histogram of numeric values.
pub fn histogram_chart(title: &str, values: &[f64], nbins: usize, log_y: bool) -> Chart {
    let mut chart = Chart::new(ChartKind::Bars, title)
        .labels(title, "count")
        .log_scale(log_y);
    if let Some(bins) = Bins::spanning(values.iter().copied(), nbins) {
        let mut counts = vec![0.0; bins.n];
        for v in values.iter().filter(|v| v.is_finite()) {
            counts[bins.index(*v)] += 1.0;
        }
        chart = chart
            .categories(bins.value_labels())
            .series(Series::dense("count", counts));
    }
    chart
}

/// Report density over exam date and value.
pub fn density_heatmap(
    title: &str,
    points: &[(NaiveDateTime, f64)],
    nbins_x: usize,
    nbins_y: usize,
) -> Chart {
    let mut chart = Chart::new(ChartKind::Heatmap, title).labels(columns::EXAM_DATE, title);
    let x_bins = Bins::spanning(points.iter().map(|(d, _)| epoch_seconds(*d) as f64), nbins_x);
    let y_bins = Bins::spanning(points.iter().map(|(_, v)| *v), nbins_y);
    let (Some(x_bins), Some(y_bins)) = (x_bins, y_bins) else {
        return chart;
    };

    let mut grid = vec![vec![0.0; x_bins.n]; y_bins.n];
    for (date, value) in points.iter().filter(|(_, v)| v.is_finite()) {
        grid[y_bins.index(*value)][x_bins.index(epoch_seconds(*date) as f64)] += 1.0;
    }
    chart = chart.categories(x_bins.date_labels());
    for (label, row) in y_bins.value_labels().into_iter().zip(grid) {
        chart = chart.series(Series::dense(label, row));
    }
    chart
}

/// Builds the operational figure for a column and view, dispatching on the
/// column's plot type.
#[derive(Debug, Clone, Copy)]
pub struct OperationalPlotter<'f> {
    format: &'f DataFormat,
}

impl<'f> OperationalPlotter<'f> {
    pub fn new(format: &'f DataFormat) -> Self {
        Self { format }
    }

    /// Display name to column, for the plot menu.
    pub fn plottable_variables(&self) -> Vec<(String, String)> {
        self.format.plottable()
    }

    /// Views offered for a column.
    pub fn views(&self, column: &str) -> AnalysisResult<Vec<PlotView>> {
        let spec = self
            .format
            .get(column)
            .ok_or_else(|| AnalysisError::UnknownColumn(column.to_string()))?;
        Ok(spec.allowed_plot_views.clone())
    }

    pub fn plot(
        &self,
        subset: &ReportSubset<'_>,
        column: &str,
        view: PlotView,
        options: &PlotOptions,
    ) -> AnalysisResult<Figure> {
        let spec = self
            .format
            .get(column)
            .ok_or_else(|| AnalysisError::UnknownColumn(column.to_string()))?;
        debug!(column, view = view.as_str(), rows = subset.len(), "plotting");
        let log_y = view.is_logarithmic();

        let chart = match spec.plot_type {
            PlotType::Categorical => {
                let observations = || {
                    dated(subset.iter(), |r| r.get(column).label())
                };
                match view {
                    PlotView::Temporal => {
                        temporal_histogram(column, &observations(), options.nbins, false, false)
                    }
                    PlotView::TemporalProportion => {
                        temporal_histogram(column, &observations(), options.nbins, true, false)
                    }
                    PlotView::TemporalPercentChange => {
                        percent_change_chart(column, &observations(), options.interval, false)
                    }
                    _ => value_count_chart(column, &subset.column(column), log_y),
                }
            }
            PlotType::Continuous => match view {
                PlotView::Temporal | PlotView::TemporalPercentChange => {
                    let points: Vec<(NaiveDateTime, f64)> = subset
                        .iter()
                        .filter_map(|r| Some((r.exam_date()?, numeric(&r.get(column))?)))
                        .collect();
                    density_heatmap(column, &points, options.nbins, options.nbins_y)
                }
                _ => {
                    let values: Vec<f64> =
                        subset.iter().filter_map(|r| numeric(&r.get(column))).collect();
                    histogram_chart(column, &values, options.nbins, log_y)
                }
            },
            PlotType::PerPatientCategorical => {
                let values: Vec<Value> = first_per_patient(subset.iter())
                    .into_iter()
                    .map(|r| r.get(column))
                    .collect();
                value_count_chart(column, &values, log_y)
            }
            PlotType::PerPatientContinuous => {
                let scans: Vec<f64> = value_counts(&subset.column(columns::MRN))
                    .into_iter()
                    .map(|(_, n)| n as f64)
                    .collect();
                histogram_chart("n_scans", &scans, options.nbins, log_y)
            }
            PlotType::Temporal => {
                let observations: Vec<(NaiveDateTime, String)> = subset
                    .iter()
                    .filter_map(|r| Some((r.exam_date()?, REPORT_COUNT_CLASS.to_string())))
                    .collect();
                match view {
                    PlotView::TemporalPercentChange => {
                        percent_change_chart("report_count", &observations, options.interval, false)
                    }
                    _ => temporal_histogram("report_count", &observations, options.nbins, false, log_y),
                }
            }
            PlotType::NotPlottable => return Err(AnalysisError::NotPlottable(column.to_string())),
        };
        Ok(Figure::single(Chart {
            title: spec.display_name.clone(),
            ..chart
        }))
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(_) => None,
        v => v.as_f64(),
    }
}

/// (exam date, class) pairs of the rows that have both.
fn dated<'a, I, F>(rows: I, class: F) -> Vec<(NaiveDateTime, String)>
where
    I: Iterator<Item = &'a ReportRecord>,
    F: Fn(&ReportRecord) -> Option<String>,
{
    rows.filter_map(|r| Some((r.exam_date()?, class(r)?))).collect()
}

/// First report of each patient, in view order. Reports without a patient
/// id share one key.
fn first_per_patient<'a, I>(rows: I) -> Vec<&'a ReportRecord>
where
    I: Iterator<Item = &'a ReportRecord>,
{
    let mut seen = std::collections::HashSet::new();
    rows.filter(|r| seen.insert(r.patient_id())).collect()
}
