mod entry;
mod error;
mod history;

pub use entry::{Entry, MetricKind};
pub use error::{HistoryErr, Result};
pub use history::History;
