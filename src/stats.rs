// Descriptive statistics for commit metric columns
//
// Medians build the baseline commit; quantiles summarise the commit, file
// and developer metric distributions for the output payload.
//
// - Uses aprender::stats::DescriptiveStats for quantiles (R-7 method,
//   linear interpolation between closest ranks)
// - Uses trueno::Vector as the sample container
//
// Quantile samples are f32 inside trueno; results are widened back to f64.
// Medians stay in f64 since the baseline commit is fed back to the model.

use anyhow::Result;
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// Calculate a quantile using aprender's DescriptiveStats
///
/// `values` must be non-empty and `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        anyhow::bail!("Cannot compute quantile of an empty sample");
    }
    if !(0.0..=1.0).contains(&q) {
        anyhow::bail!("Quantile must be in [0, 1], got {}", q);
    }

    let samples: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let vector = Vector::from_slice(&samples);
    let stats = DescriptiveStats::new(&vector);
    stats
        .quantile(q)
        .map(f64::from)
        .map_err(|e| anyhow::anyhow!("Failed to compute quantile {}: {}", q, e))
}

/// Exact median in f64, mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        anyhow::bail!("Cannot compute median of an empty sample");
    }
    if values.iter().any(|v| v.is_nan()) {
        anyhow::bail!("Cannot compute median of a sample containing NaN");
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Ok(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median of a column with missing values skipped; `None` if nothing remains
pub fn median_skip_missing<I>(values: I) -> Result<Option<f64>>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect();
    if present.is_empty() {
        return Ok(None);
    }
    median(&present).map(Some)
}
