//! Weighted averaging of client contributions.
//!
//! Contributions are summed in the order they are given, in `f64`. Callers that need results
//! independent of arrival order should sort the contributions first.

use crate::parameters::{Tensor, Weights};

/// Averages weights, weighting every contribution by it's amount of examples.
///
/// # Arguments
/// * `contributions` - Pairs of weights and the amount of examples they were trained on.
///
/// # Returns
/// The averaged weights, or `None` if there are no contributions, no examples at all
/// or the contributions don't share the same layout.
pub fn weighted_average(contributions: &[(&Weights, u64)]) -> Option<Weights> {
    let (first, _) = contributions.first()?;
    // Counts are reported by clients, any of them may be as large as `u64::MAX`.
    let total: u128 = contributions.iter().map(|(_, n)| u128::from(*n)).sum();

    if total == 0 {
        return None;
    }

    if contributions.iter().any(|(w, _)| !w.same_layout(first)) {
        return None;
    }

    let mut acc: Vec<Vec<f64>> = first.iter().map(|t| vec![0.; t.len()]).collect();

    for (weights, num_examples) in contributions {
        let factor = *num_examples as f64 / total as f64;

        for (sums, tensor) in acc.iter_mut().zip(weights.iter()) {
            for (sum, value) in sums.iter_mut().zip(tensor.values()) {
                *sum += *value as f64 * factor;
            }
        }
    }

    let tensors = first
        .iter()
        .zip(acc)
        .map(|(template, sums)| {
            let mut tensor = Tensor::zeros(template.shape().to_vec());
            for (out, sum) in tensor.values_mut().iter_mut().zip(sums) {
                *out = sum as f32;
            }
            tensor
        })
        .collect();

    Some(Weights::new(tensors))
}

/// Averages losses, weighting every loss by it's amount of examples.
///
/// # Arguments
/// * `losses` - Pairs of the amount of evaluated examples and the measured loss.
///
/// # Returns
/// The averaged loss, or `None` if there were no examples at all.
pub fn weighted_loss_avg(losses: &[(u64, f64)]) -> Option<f64> {
    let total: u128 = losses.iter().map(|(n, _)| u128::from(*n)).sum();

    if total == 0 {
        return None;
    }

    let weighted: f64 = losses.iter().map(|(n, loss)| *n as f64 * loss).sum();
    Some(weighted / total as f64)
}
