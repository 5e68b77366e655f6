use serde::Serialize;

use super::{Entry, HistoryErr, MetricKind, Result};

/// Append-only ledger of the metrics produced by a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    entries: Vec<Entry>,
}

impl History {
    /// Creates a new empty `History`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a metric.
    ///
    /// # Arguments
    /// * `round` - The round the metric belongs to.
    /// * `kind` - The kind of metric.
    /// * `value` - The measured value.
    ///
    /// # Returns
    /// A `HistoryErr` if `round` is lower than the last recorded round or if this
    /// kind of metric was already recorded for `round`.
    pub fn add(&mut self, round: u64, kind: MetricKind, value: f64) -> Result<()> {
        if let Some(last) = self.last_round() {
            if round < last {
                return Err(HistoryErr::RoundRegressed { round, last });
            }
        }

        if self
            .entries
            .iter()
            .rev()
            .take_while(|e| e.round == round)
            .any(|e| e.kind == kind)
        {
            return Err(HistoryErr::Duplicate { round, kind });
        }

        self.entries.push(Entry { round, kind, value });
        Ok(())
    }

    pub fn add_loss_centralized(&mut self, round: u64, loss: f64) -> Result<()> {
        self.add(round, MetricKind::CentralizedLoss, loss)
    }

    pub fn add_accuracy_centralized(&mut self, round: u64, accuracy: f64) -> Result<()> {
        self.add(round, MetricKind::CentralizedAccuracy, accuracy)
    }

    pub fn add_loss_distributed(&mut self, round: u64, loss: f64) -> Result<()> {
        self.add(round, MetricKind::DistributedLoss, loss)
    }

    /// Returns every entry ordered by round and then by kind.
    pub fn to_vec(&self) -> Vec<Entry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| (e.round, e.kind));
        entries
    }

    pub fn losses_centralized(&self) -> Vec<(u64, f64)> {
        self.of_kind(MetricKind::CentralizedLoss)
    }

    pub fn accuracies_centralized(&self) -> Vec<(u64, f64)> {
        self.of_kind(MetricKind::CentralizedAccuracy)
    }

    pub fn losses_distributed(&self) -> Vec<(u64, f64)> {
        self.of_kind(MetricKind::DistributedLoss)
    }

    /// The highest round with at least one recorded metric.
    pub fn last_round(&self) -> Option<u64> {
        self.entries.last().map(|e| e.round)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn of_kind(&self, kind: MetricKind) -> Vec<(u64, f64)> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (e.round, e.value))
            .collect()
    }
}
