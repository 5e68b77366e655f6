//! A simulated federation: every client fits `y = slope * x + intercept` on it's own noisy
//! samples with mini-batch SGD, at it's own simulated speed.

use std::str::FromStr;

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::{Distribution, Normal};

use federated_orchestra::{
    Client, ClientErr, Config, EvaluateIns, EvaluateRes, FitIns, FitRes, Tensor, Weights,
    messages::keys,
};

const LEARNING_RATE: f32 = 0.05;
const LEARNING_RATE_DECAY: f32 = 0.01;

/// The line every client samples it's data from.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub slope: f32,
    pub intercept: f32,
    pub noise: f32,
}

/// Noisy samples of a `Line`.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<(f32, f32)>,
}

impl Dataset {
    /// Samples `len` points of `line` with `x` uniform in `[-1, 1)`.
    ///
    /// # Arguments
    /// * `rng` - The random number generator.
    /// * `line` - The line to sample.
    /// * `len` - The amount of samples.
    pub fn generate<R: Rng>(rng: &mut R, line: Line, len: usize) -> Self {
        let noise = Normal::new(0.0, line.noise.max(0.0)).ok();

        let samples = (0..len)
            .map(|_| {
                let x = rng.random_range(-1.0..1.0);
                let eps = noise.map_or(0.0, |n| n.sample(rng));
                (x, line.slope * x + line.intercept + eps)
            })
            .collect();

        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Mean squared error of `(slope, intercept)` over this dataset.
    pub fn mse(&self, slope: f32, intercept: f32) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum: f64 = self
            .samples
            .iter()
            .map(|&(x, y)| f64::from(slope * x + intercept - y).powi(2))
            .sum();

        sum / self.samples.len() as f64
    }

    /// The fraction of samples predicted within `tolerance` of their target.
    pub fn accuracy(&self, slope: f32, intercept: f32, tolerance: f32) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let hits = self
            .samples
            .iter()
            .filter(|&&(x, y)| (slope * x + intercept - y).abs() <= tolerance)
            .count();

        hits as f64 / self.samples.len() as f64
    }
}

/// Splits weights into the line they describe.
///
/// # Errors
/// A `ClientErr::Protocol` if the weights aren't two single value tensors.
pub fn line_of(weights: &Weights) -> Result<(f32, f32), ClientErr> {
    match weights.tensors() {
        [slope, intercept] => match (slope.values(), intercept.values()) {
            ([slope], [intercept]) => Ok((*slope, *intercept)),
            _ => Err(ClientErr::Protocol("expected scalar tensors".into())),
        },
        _ => Err(ClientErr::Protocol(format!(
            "expected 2 tensors, got {}",
            weights.len()
        ))),
    }
}

fn weights_of(slope: f32, intercept: f32) -> Weights {
    Weights::new(vec![
        Tensor::from_vec(vec![slope]),
        Tensor::from_vec(vec![intercept]),
    ])
}

fn parse<T: FromStr>(config: &Config, key: &str) -> Result<Option<T>, ClientErr> {
    config
        .get(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ClientErr::Protocol(format!("invalid {key}: {value}")))
        })
        .transpose()
}

/// A client training on private data at a simulated speed.
pub struct LinearClient {
    data: Dataset,
    rng: StdRng,
    /// Simulated seconds it takes to train on a single example.
    secs_per_example: f64,
}

impl LinearClient {
    /// Creates a new `LinearClient` with freshly generated data.
    ///
    /// # Arguments
    /// * `seed` - Seeds both the data and the training order.
    /// * `line` - The line the data is sampled from.
    /// * `len` - The amount of local samples.
    ///
    /// # Returns
    /// A new `LinearClient` instance.
    pub fn new(seed: u64, line: Line, len: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = Dataset::generate(&mut rng, line, len);
        let secs_per_example = rng.random_range(0.001..0.02);

        Self {
            data,
            rng,
            secs_per_example,
        }
    }
}

impl Client for LinearClient {
    fn get_parameters(&mut self) -> Result<Weights, ClientErr> {
        Ok(weights_of(0.0, 0.0))
    }

    fn fit(&mut self, ins: FitIns) -> Result<FitRes, ClientErr> {
        let (mut slope, mut intercept) = line_of(&ins.weights)?;

        let epochs: usize = parse(&ins.config, keys::EPOCHS)?.unwrap_or(1);
        let batch_size: usize = parse::<usize>(&ins.config, keys::BATCH_SIZE)?
            .unwrap_or(32)
            .max(1);
        let epoch_global: usize = parse(&ins.config, keys::EPOCH_GLOBAL)?.unwrap_or(0);
        let timeout: Option<f64> = parse(&ins.config, keys::TIMEOUT)?;
        let partial_updates = parse::<u8>(&ins.config, keys::PARTIAL_UPDATES)? == Some(1);

        let lr = LEARNING_RATE / (1.0 + LEARNING_RATE_DECAY * epoch_global as f32);
        let num_examples_ceil = (self.data.len() as u64).saturating_mul(epochs as u64);
        let mut num_examples = 0;
        let mut elapsed = 0.0;

        'training: for _ in 0..epochs {
            self.data.samples.shuffle(&mut self.rng);

            for batch in self.data.samples.chunks(batch_size) {
                let cost = batch.len() as f64 * self.secs_per_example;
                if timeout.is_some_and(|budget| elapsed + cost > budget) {
                    break 'training;
                }

                let (mut grad_slope, mut grad_intercept) = (0.0, 0.0);
                for &(x, y) in batch {
                    let err = slope * x + intercept - y;
                    grad_slope += 2.0 * err * x;
                    grad_intercept += 2.0 * err;
                }

                let n = batch.len() as f32;
                slope -= lr * grad_slope / n;
                intercept -= lr * grad_intercept / n;

                elapsed += cost;
                num_examples += batch.len() as u64;
            }
        }

        debug!(
            examples = num_examples, ceil = num_examples_ceil, elapsed = elapsed;
            "local training finished"
        );

        if num_examples < num_examples_ceil && !partial_updates {
            return Ok(FitRes {
                weights: Weights::default(),
                num_examples: 0,
                num_examples_ceil,
            });
        }

        Ok(FitRes {
            weights: weights_of(slope, intercept),
            num_examples,
            num_examples_ceil,
        })
    }

    fn evaluate(&mut self, ins: EvaluateIns) -> Result<EvaluateRes, ClientErr> {
        let (slope, intercept) = line_of(&ins.weights)?;

        Ok(EvaluateRes {
            num_examples: self.data.len() as u64,
            loss: self.data.mse(slope, intercept),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use super::*;

    const LINE: Line = Line {
        slope: 2.0,
        intercept: -1.0,
        noise: 0.0,
    };

    fn fit_ins(weights: Weights, config: &[(&str, &str)]) -> FitIns {
        let config: BTreeMap<_, _> = config
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        FitIns {
            weights: Arc::new(weights),
            config,
        }
    }

    #[test]
    fn training_reduces_the_local_loss() {
        let mut client = LinearClient::new(3, LINE, 200);
        let before = client.data.mse(0.0, 0.0);

        let res = client
            .fit(fit_ins(weights_of(0.0, 0.0), &[(keys::EPOCHS, "20"), (keys::BATCH_SIZE, "8")]))
            .unwrap();
        let (slope, intercept) = line_of(&res.weights).unwrap();

        assert_eq!(res.num_examples, 4000);
        assert_eq!(res.num_examples_ceil, 4000);
        assert!(client.data.mse(slope, intercept) < before / 10.0);
    }

    #[test]
    fn unfinished_training_without_partial_updates_is_empty() {
        let mut client = LinearClient::new(3, LINE, 100);
        client.secs_per_example = 1.0;

        let res = client
            .fit(fit_ins(
                weights_of(0.0, 0.0),
                &[(keys::EPOCHS, "1"), (keys::BATCH_SIZE, "10"), (keys::TIMEOUT, "50")],
            ))
            .unwrap();

        assert!(res.is_empty());
        assert_eq!(res.num_examples_ceil, 100);
    }

    #[test]
    fn unfinished_training_with_partial_updates_keeps_progress() {
        let mut client = LinearClient::new(3, LINE, 100);
        client.secs_per_example = 1.0;

        let res = client
            .fit(fit_ins(
                weights_of(0.0, 0.0),
                &[
                    (keys::EPOCHS, "1"),
                    (keys::BATCH_SIZE, "10"),
                    (keys::TIMEOUT, "50"),
                    (keys::PARTIAL_UPDATES, "1"),
                ],
            ))
            .unwrap();

        assert_eq!(res.num_examples, 50);
        assert_eq!(res.num_examples_ceil, 100);
        assert!(!res.is_empty());
    }

    #[test]
    fn malformed_weights_are_rejected() {
        let mut client = LinearClient::new(3, LINE, 10);
        let ins = fit_ins(Weights::new(vec![Tensor::from_vec(vec![1.0, 2.0])]), &[]);

        assert!(matches!(client.fit(ins), Err(ClientErr::Protocol(_))));
    }

    #[test]
    fn exact_line_is_fully_accurate() {
        let mut rng = StdRng::seed_from_u64(0);
        let data = Dataset::generate(&mut rng, LINE, 50);

        assert_eq!(data.mse(LINE.slope, LINE.intercept), 0.0);
        assert_eq!(data.accuracy(LINE.slope, LINE.intercept, 1e-3), 1.0);
    }
}
