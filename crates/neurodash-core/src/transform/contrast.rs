//! Contrast usage per day and pathological domain.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::{rolling_mean, WorkloadRecord};

/// Share of a domain's reports that used contrast; 0.0 when there were none.
pub fn contrast_proportion(with_contrast: f64, without_contrast: f64) -> f64 {
    let total = with_contrast + without_contrast;
    if total > 0.0 {
        with_contrast / total
    } else {
        0.0
    }
}

/// Domain flag sums for one day, split by contrast use. A side is `None`
/// when no report that day fell on it.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyContrast {
    pub date: NaiveDate,
    pub with_contrast: Option<Vec<f64>>,
    pub without_contrast: Option<Vec<f64>>,
}

/// A smoothed per-domain series.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSeries {
    pub domain: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

/// Reports grouped by (day, contrast flag) with domain flags summed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastUsage {
    pub domains: Vec<String>,
    pub days: Vec<DailyContrast>,
}

impl ContrastUsage {
    /// Group rows by day and contrast flag. Rows without a contrast flag are
    /// not counted.
    pub fn from_rows(rows: &[WorkloadRecord<'_>], domains: &[String]) -> Self {
        let mut by_day: BTreeMap<NaiveDate, DailyContrast> = BTreeMap::new();
        for row in rows {
            let Some(contrast) = row.report.uses_contrast() else {
                continue;
            };
            let day = by_day.entry(row.date).or_insert_with(|| DailyContrast {
                date: row.date,
                with_contrast: None,
                without_contrast: None,
            });
            let side = if contrast {
                &mut day.with_contrast
            } else {
                &mut day.without_contrast
            };
            let sums = side.get_or_insert_with(|| vec![0.0; domains.len()]);
            for (sum, domain) in sums.iter_mut().zip(domains) {
                if row.report.domain_flag(domain) {
                    *sum += 1.0;
                }
            }
        }
        Self {
            domains: domains.to_vec(),
            days: by_day.into_values().collect(),
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|d| d.date).collect()
    }

    /// Per-day contrast proportion for each domain; a missing side counts
    /// as zero reports.
    pub fn proportions(&self) -> Vec<Vec<f64>> {
        let zeros = vec![0.0; self.domains.len()];
        self.days
            .iter()
            .map(|day| {
                let with = day.with_contrast.as_ref().unwrap_or(&zeros);
                let without = day.without_contrast.as_ref().unwrap_or(&zeros);
                with.iter()
                    .zip(without)
                    .map(|(w, wo)| contrast_proportion(*w, *wo))
                    .collect()
            })
            .collect()
    }

    /// Rolling mean of each domain's daily contrast proportion.
    pub fn rolling_proportions(&self, window: usize) -> Vec<DomainSeries> {
        let dates = self.dates();
        let proportions = self.proportions();
        self.domain_series(&dates, |i| proportions.iter().map(|p| p[i]).collect(), window)
    }

    /// Rolling mean of each domain's contrast count, over the days that had
    /// any contrast report.
    pub fn rolling_contrast_counts(&self, window: usize) -> Vec<DomainSeries> {
        let days: Vec<(&NaiveDate, &Vec<f64>)> = self
            .days
            .iter()
            .filter_map(|d| d.with_contrast.as_ref().map(|w| (&d.date, w)))
            .collect();
        let dates: Vec<NaiveDate> = days.iter().map(|(d, _)| **d).collect();
        self.domain_series(&dates, |i| days.iter().map(|(_, w)| w[i]).collect(), window)
    }

    fn domain_series<F>(&self, dates: &[NaiveDate], column: F, window: usize) -> Vec<DomainSeries>
    where
        F: Fn(usize) -> Vec<f64>,
    {
        self.domains
            .iter()
            .enumerate()
            .map(|(i, domain)| DomainSeries {
                domain: domain.clone(),
                dates: dates.to_vec(),
                values: rolling_mean(&column(i), window),
            })
            .collect()
    }
}

/// Counts behind the contrast summary table: (with, without, total).
pub fn contrast_totals(rows: &[WorkloadRecord<'_>]) -> (usize, usize, usize) {
    let with = rows
        .iter()
        .filter(|r| r.report.uses_contrast() == Some(true))
        .count();
    let without = rows
        .iter()
        .filter(|r| r.report.uses_contrast() == Some(false))
        .count();
    (with, without, with + without)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::{Enrichment, ReportRecord};

    fn report(contrast: Option<bool>, domains: &[&str]) -> ReportRecord {
        ReportRecord {
            fields: BTreeMap::new(),
            enrichment: Some(Enrichment {
                uses_contrast: contrast,
                domain_flags: domains.iter().map(|d| (d.to_string(), true)).collect(),
                ..Default::default()
            }),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 5, d).unwrap()
    }

    fn rows<'a>(reports: &'a [(u32, ReportRecord)]) -> Vec<WorkloadRecord<'a>> {
        reports
            .iter()
            .map(|(d, r)| WorkloadRecord {
                report: r,
                age_bucket: None,
                date: day(*d),
                primary_reporter: None,
                secondary_reporter: None,
            })
            .collect()
    }

    #[test]
    fn test_zero_total_is_zero() {
        assert_eq!(contrast_proportion(0.0, 0.0), 0.0);
        assert_eq!(contrast_proportion(1.0, 3.0), 0.25);
    }

    #[test]
    fn test_group_and_proportion() {
        let reports = vec![
            (1, report(Some(true), &["Epilepsy"])),
            (1, report(Some(false), &["Epilepsy"])),
            (1, report(Some(false), &["Epilepsy", "Traumatic"])),
            (2, report(Some(true), &["Traumatic"])),
            (3, report(None, &["Epilepsy"])),
        ];
        let rows = rows(&reports);
        let domains = vec!["Epilepsy".to_string(), "Traumatic".to_string()];
        let usage = ContrastUsage::from_rows(&rows, &domains);

        assert_eq!(usage.dates(), vec![day(1), day(2)]);
        assert_eq!(usage.days[0].with_contrast, Some(vec![1.0, 0.0]));
        assert_eq!(usage.days[0].without_contrast, Some(vec![2.0, 1.0]));
        assert_eq!(usage.days[1].without_contrast, None);

        let p = usage.proportions();
        assert!((p[0][0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(p[0][1], 0.0);
        assert_eq!(p[1], vec![0.0, 1.0]);

        assert_eq!(contrast_totals(&rows), (2, 2, 4));
    }

    #[test]
    fn test_rolling_series() {
        let reports: Vec<(u32, ReportRecord)> = (1..=8)
            .map(|d| (d, report(Some(d % 2 == 0), &["Epilepsy"])))
            .collect();
        let rows = rows(&reports);
        let usage = ContrastUsage::from_rows(&rows, &["Epilepsy".to_string()]);

        let proportions = usage.rolling_proportions(7);
        assert_eq!(proportions[0].dates.len(), 8);
        assert_eq!(proportions[0].values[5], None);
        assert!((proportions[0].values[6].unwrap() - 3.0 / 7.0).abs() < 1e-12);

        let counts = usage.rolling_contrast_counts(2);
        assert_eq!(counts[0].dates, vec![day(2), day(4), day(6), day(8)]);
        assert_eq!(counts[0].values, vec![None, Some(1.0), Some(1.0), Some(1.0)]);
    }
}
