//! Sigma-clipped statistics.


/// Arithmetic mean. `None` for an empty slice.
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of a sorted, non-empty slice, averaging the two middle values for
/// even lengths.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    debug_assert!(!sorted.is_empty());

    let mid = sorted.len() / 2;
    if sorted.len() & 1 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    }
}

/// Population standard deviation (divides by N). `None` for an empty slice.
fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Statistics of the values that survived sigma clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation of the survivors.
    pub std: f64,
    /// Number of values that survived clipping.
    pub count: usize,
}

/// Iteratively clipped mean, median and standard deviation.
///
/// Each pass takes the median as center and the population standard deviation
/// as spread, then drops values with `|v - median| > sigma * std`. Stops after
/// `max_iterations` passes or as soon as a pass clips nothing. Non-finite
/// values are ignored.
///
/// Returns `None` when no finite value is present.
pub fn sigma_clipped_stats(
    values: &[f64],
    sigma: f64,
    max_iterations: usize,
) -> Option<ClippedStats> {
    let mut active: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if active.is_empty() {
        return None;
    }
    active.sort_unstable_by(f64::total_cmp);

    for _ in 0..max_iterations {
        let center = median_of_sorted(&active);
        let std = population_std(&active)?;
        let threshold = sigma * std;

        let before = active.len();
        // Sorted order survives retain
        active.retain(|v| (v - center).abs() <= threshold);

        if active.len() == before {
            break;
        }
        if active.is_empty() {
            return None;
        }
    }

    Some(ClippedStats {
        mean: mean(&active)?,
        median: median_of_sorted(&active),
        std: population_std(&active)?,
        count: active.len(),
    })
}
