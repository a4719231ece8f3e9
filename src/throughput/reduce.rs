//! Reductions from per-probe samples to one dimension value.
//!
//! A failed probe is `None`. Reductions never see probe ordering, so the
//! result is independent of completion order.

/// Best-of-N: the maximum over resolved samples, or 0 if none resolved.
pub fn best_of<I>(samples: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    samples.into_iter().flatten().fold(0.0, f64::max)
}

/// Single-sample dimension (ping): the sample itself, or 0 on failure.
pub fn single(sample: Option<f64>) -> f64 {
    sample.unwrap_or(0.0)
}

/// True when every probe in the set failed.
pub fn all_failed(samples: &[Option<f64>]) -> bool {
    samples.iter().all(Option::is_none)
}
