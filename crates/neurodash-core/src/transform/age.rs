//! Decade age buckets.

use crate::models::Value;

/// Width of one age bucket in years.
pub const AGE_BUCKET_WIDTH: i64 = 10;

/// Number of buckets; ages at or past `AGE_BUCKET_WIDTH * AGE_BUCKETS` are
/// left unbucketed.
pub const AGE_BUCKETS: i64 = 10;

/// Bucket label for an age, `[lo, lo + 10)` labelled `"{lo}-{lo + 9}"`.
pub fn age_bucket(age: f64) -> Option<String> {
    if !age.is_finite() || age < 0.0 {
        return None;
    }
    let idx = (age / AGE_BUCKET_WIDTH as f64).floor() as i64;
    if idx >= AGE_BUCKETS {
        return None;
    }
    let lo = idx * AGE_BUCKET_WIDTH;
    Some(format!("{}-{}", lo, lo + AGE_BUCKET_WIDTH - 1))
}

/// Every bucket label in ascending order.
pub fn age_bucket_labels() -> Vec<String> {
    (0..AGE_BUCKETS)
        .map(|i| {
            let lo = i * AGE_BUCKET_WIDTH;
            format!("{}-{}", lo, lo + AGE_BUCKET_WIDTH - 1)
        })
        .collect()
}

/// Bucket a column of ages; non-numeric and out-of-range cells become null.
pub fn bucket_ages(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .filter(|_| !matches!(v, Value::Bool(_)))
                .and_then(age_bucket)
                .map_or(Value::Null, Value::Text)
        })
        .collect()
}
