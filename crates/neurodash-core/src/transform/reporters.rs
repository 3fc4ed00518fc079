//! Reporting-clinician split and per-reporter explosion.

use std::collections::HashMap;

use super::WorkloadRecord;

/// Split a "Reporting Clinicians" cell into primary and secondary reporter.
/// Names are newline separated; anything past the second is ignored.
pub fn split_reporters(field: Option<&str>) -> (Option<String>, Option<String>) {
    let mut parts = field
        .unwrap_or("")
        .splitn(3, '\n')
        .map(|p| p.trim())
        .map(|p| (!p.is_empty()).then(|| p.to_string()));
    let primary = parts.next().flatten();
    let secondary = parts.next().flatten();
    (primary, secondary)
}

/// One report attributed to one reporter.
#[derive(Debug, Clone, Copy)]
pub struct Attribution<'r, 'a> {
    pub reporter: &'r str,
    pub row: &'r WorkloadRecord<'a>,
}

/// Attribute every report to each of its reporters: primary attributions in
/// row order, followed by the secondary ones.
pub fn explode_reporters<'r, 'a>(rows: &'r [WorkloadRecord<'a>]) -> Vec<Attribution<'r, 'a>> {
    let primaries = rows.iter().filter_map(|row| {
        row.primary_reporter
            .as_deref()
            .map(|reporter| Attribution { reporter, row })
    });
    let secondaries = rows.iter().filter_map(|row| {
        row.secondary_reporter
            .as_deref()
            .map(|reporter| Attribution { reporter, row })
    });
    primaries.chain(secondaries).collect()
}

/// Reporters with their attribution counts, most active first; ties keep
/// first-seen order.
pub fn reporters_by_count(attributions: &[Attribution<'_, '_>]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for a in attributions {
        match positions.get(a.reporter) {
            Some(&i) => counts[i].1 += 1,
            None => {
                positions.insert(a.reporter, counts.len());
                counts.push((a.reporter.to_string(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::ReportRecord;

    #[test]
    fn test_split_reporters() {
        assert_eq!(
            split_reporters(Some("Dr X\nDr Y")),
            (Some("Dr X".into()), Some("Dr Y".into()))
        );
        assert_eq!(split_reporters(Some("Dr X")), (Some("Dr X".into()), None));
        assert_eq!(
            split_reporters(Some("Dr X\nDr Y\nDr Z")),
            (Some("Dr X".into()), Some("Dr Y".into()))
        );
        assert_eq!(split_reporters(Some("Dr X\n")), (Some("Dr X".into()), None));
        assert_eq!(split_reporters(None), (None, None));
    }

    #[test]
    fn test_explode() {
        let report = ReportRecord::default();
        let day = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let row = |p: Option<&str>, s: Option<&str>| WorkloadRecord {
            report: &report,
            age_bucket: None,
            date: day,
            primary_reporter: p.map(String::from),
            secondary_reporter: s.map(String::from),
        };
        let rows = vec![row(Some("X"), Some("Y")), row(Some("X"), None), row(None, None)];

        let exploded = explode_reporters(&rows);
        let names: Vec<&str> = exploded.iter().map(|a| a.reporter).collect();
        assert_eq!(names, vec!["X", "X", "Y"]);
        assert!(std::ptr::eq(exploded[2].row, &rows[0]));

        assert_eq!(
            reporters_by_count(&exploded),
            vec![("X".to_string(), 2), ("Y".to_string(), 1)]
        );
    }
}
