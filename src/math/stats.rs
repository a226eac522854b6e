//! Small robust statistics helpers.

/// Median of a slice, sorting it in place. `None` when empty.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Median absolute deviation about the median (unscaled).
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let mut work: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let med = median_mut(&mut work)?;
    let mut dev: Vec<f64> = work.iter().map(|v| (v - med).abs()).collect();
    median_mut(&mut dev)
}
