//! Categorical column clean-up: unknown fill and top-k collapsing.

use std::collections::HashSet;

use crate::models::Value;
use crate::selection::value_counts;

/// Label replacing values outside the top k.
pub const OTHER: &str = "other";

/// Label for missing categorical values.
pub const UNKNOWN: &str = "UNK";

pub const DEFAULT_TOP_K: usize = 10;

/// Replace missing values with [`UNKNOWN`] and render everything else as text.
pub fn fill_unknown(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .map(|v| Value::Text(v.label().unwrap_or_else(|| UNKNOWN.to_string())))
        .collect()
}

/// Keep the `top_k` most frequent values and rewrite the rest, missing
/// values included, to [`OTHER`].
pub fn collapse_rare(values: &[Value], top_k: usize) -> Vec<Value> {
    let keep: HashSet<String> = value_counts(values)
        .into_iter()
        .take(top_k)
        .filter_map(|(v, _)| v.label())
        .collect();
    values
        .iter()
        .map(|v| match v.label() {
            Some(label) if keep.contains(&label) => v.clone(),
            _ => Value::from(OTHER),
        })
        .collect()
}
