//! Quantiles, quantile binning and ranking.
//!
//! Quantiles use linear interpolation between order statistics: for a
//! sorted sample of length n, the q-quantile sits at fractional position
//! `q * (n - 1)`.

/// Quantile of an ascending-sorted slice. Returns `f64::NAN` when empty.
///
/// ```
/// use custscore_core::stats::quantile_sorted;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(quantile_sorted(&values, 0.5), 3.0);
/// assert_eq!(quantile_sorted(&values, 0.25), 2.0);
/// ```
pub fn quantile_sorted(sorted_values: &[f64], q: f64) -> f64 {
    debug_assert!(
        sorted_values.is_sorted_by(|a, b| a <= b),
        "values must be sorted in ascending order"
    );
    if sorted_values.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted_values.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let frac = position - lo as f64;
    sorted_values[lo] + (sorted_values[hi] - sorted_values[lo]) * frac
}

/// Quantile of an unsorted sample, ignoring NaN.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// The `n_bins + 1` equal-population bin edges of a sample.
pub fn quantile_edges(values: &[f64], n_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    (0..=n_bins)
        .map(|k| quantile_sorted(&sorted, k as f64 / n_bins as f64))
        .collect()
}

/// Assign every value a 0-based equal-population bin.
///
/// Bins are right-closed with the lowest edge included. When the sample
/// has too few distinct values, edges coincide and a value goes to the
/// lowest bin whose upper edge covers it, so fewer distinct bins appear
/// instead of an error.
///
/// ```
/// use custscore_core::stats::qcut;
///
/// let bins = qcut(&[10.0, 20.0, 30.0, 40.0, 50.0], 5);
/// assert_eq!(bins, vec![0, 1, 2, 3, 4]);
///
/// // Constant input collapses to a single bin.
/// assert_eq!(qcut(&[7.0, 7.0, 7.0], 4), vec![0, 0, 0]);
/// ```
pub fn qcut(values: &[f64], n_bins: usize) -> Vec<usize> {
    assert!(n_bins > 0, "n_bins must be > 0");
    let edges = quantile_edges(values, n_bins);
    values
        .iter()
        .map(|&v| {
            edges[1..]
                .iter()
                .position(|&upper| v <= upper)
                .unwrap_or(n_bins - 1)
        })
        .collect()
}

/// 1-based ranks where ties are broken by order of appearance.
///
/// ```
/// use custscore_core::stats::rank_first;
///
/// assert_eq!(rank_first(&[3.0, 1.0, 3.0, 2.0]), vec![3.0, 1.0, 4.0, 2.0]);
/// ```
pub fn rank_first(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // Stable sort keeps first-seen order among equal values.
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let mut ranks = vec![0.0; values.len()];
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = (rank + 1) as f64;
    }
    ranks
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Pearson correlation. `None` when undefined (fewer than two points or a
/// constant series).
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    assert_eq!(xs.len(), ys.len(), "series must have equal length");
    if xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}
