//! Option lists for the selection panel widgets.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::Value;

/// Sentinel option meaning "no constraint".
pub const ALL: &str = "all";

/// Default number of categorical options offered.
pub const MAX_OPTIONS: usize = 30;

/// Value counts in descending frequency, ties kept in first-seen order.
/// Missing values are not counted.
pub fn value_counts<'a, I>(values: I) -> Vec<(Value, usize)>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut counts: Vec<(Value, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for value in values {
        let Some(key) = value.label() else {
            continue;
        };
        match positions.get(&key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                positions.insert(key, counts.len());
                counts.push((value.clone(), 1));
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Sort values if every pair is comparable; otherwise keep the given order.
fn sort_best_effort(values: Vec<Value>) -> Vec<Value> {
    let mut sorted = values.clone();
    let mut comparable = true;
    sorted.sort_by(|a, b| {
        a.partial_compare(b).unwrap_or_else(|| {
            comparable = false;
            Ordering::Equal
        })
    });
    if comparable {
        sorted
    } else {
        values
    }
}

/// The `max_options` most frequent values plus [`ALL`], sorted when the
/// values are mutually orderable.
pub fn multiselect_options<'a, I>(values: I, max_options: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut options: Vec<Value> = value_counts(values)
        .into_iter()
        .take(max_options)
        .map(|(v, _)| v)
        .collect();
    options.push(Value::from(ALL));
    sort_best_effort(options)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Distinct labels across multi-label cells plus [`ALL`], sorted.
pub fn multilabel_options<'a, I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut options: Vec<String> = Vec::new();
    for label in labels.into_iter().flatten() {
        if !options.contains(label) {
            options.push(label.clone());
        }
    }
    options.push(ALL.to_string());
    options.sort();
    options
}
