//! Service-analysis settings, read from TOML.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};
use crate::models::parse_datetime;

/// Normalisation applied to histogram bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistogramStat {
    #[default]
    Count,
    Frequency,
    Probability,
    Proportion,
    Percent,
    Density,
}

impl HistogramStat {
    /// Scale raw bin counts. `widths` gives each bin's width in the x unit.
    pub fn normalise(&self, counts: &[f64], widths: &[f64]) -> Vec<f64> {
        let total: f64 = counts.iter().sum();
        let width = |i: usize| widths.get(i).copied().filter(|w| *w > 0.0).unwrap_or(1.0);
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| match self {
                HistogramStat::Count => *c,
                HistogramStat::Frequency => c / width(i),
                HistogramStat::Probability | HistogramStat::Proportion if total > 0.0 => c / total,
                HistogramStat::Percent if total > 0.0 => 100.0 * c / total,
                HistogramStat::Density if total > 0.0 => c / total / width(i),
                _ => 0.0,
            })
            .collect()
    }

    pub fn axis_label(&self) -> &'static str {
        match self {
            HistogramStat::Count => "Count",
            HistogramStat::Frequency => "Frequency",
            HistogramStat::Probability => "Probability",
            HistogramStat::Proportion => "Proportion",
            HistogramStat::Percent => "Percent",
            HistogramStat::Density => "Density",
        }
    }
}

/// Analysis window; both ends are read day-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: String,
    pub end: String,
}

impl DateWindow {
    /// Parsed `(start, end)`.
    pub fn bounds(&self) -> ConfigResult<(NaiveDateTime, NaiveDateTime)> {
        let parse = |field: &str, value: &str| {
            parse_datetime(value, true).ok_or_else(|| ConfigError::InvalidDate {
                field: field.to_string(),
                value: value.to_string(),
            })
        };
        let start = parse("dates.start", &self.start)?;
        let end = parse("dates.end", &self.end)?;
        if end < start {
            return Err(ConfigError::Invalid(format!(
                "dates.end {} is before dates.start {}",
                self.end, self.start
            )));
        }
        Ok((start, end))
    }
}

/// One variable to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotVariable {
    /// Column name
    pub name: String,
    #[serde(rename = "type", default)]
    pub stat: HistogramStat,
    /// Columns to cross-tabulate against
    #[serde(default)]
    pub breakdown: Vec<String>,
}

/// Contents of `service_analysis.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub dates: DateWindow,
    pub to_plot: BTreeMap<String, PlotVariable>,
}

impl ServiceConfig {
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let config: ServiceConfig = toml::from_str(text)?;
        config.dates.bounds()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn variables(&self) -> impl Iterator<Item = &PlotVariable> {
        self.to_plot.values()
    }

    /// Variables treated as categorical: every plotted variable except the
    /// bucketed age.
    pub fn categorical_variables(&self) -> Vec<String> {
        self.variables()
            .filter(|v| v.name != AGE_AT_STUDY)
            .map(|v| v.name.clone())
            .collect()
    }
}

/// Age column of the service-analysis export.
pub const AGE_AT_STUDY: &str = "age_at_study";
