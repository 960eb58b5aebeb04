//! Batched, paced delivery to a recipient list.
//!
//! Batches run strictly one after another with a fixed pause between them
//! (none after the last). A failing batch is recorded and the run goes on.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::constants::{BULK_BATCH_SIZE, BULK_INTERVAL_SECS};

/// One address, or a list to be split into batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn len(&self) -> usize {
        match self {
            Recipients::One(_) => 1,
            Recipients::Many(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Recipients::One(address)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(list: Vec<String>) -> Self {
        Recipients::Many(list)
    }
}

/// Result of sending one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BatchOutcome<T> {
    Delivered { batch: usize, size: usize, value: T },
    Failed { batch: usize, size: usize, reason: String },
}

impl<T> BatchOutcome<T> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, BatchOutcome::Delivered { .. })
    }

    pub fn size(&self) -> usize {
        match self {
            BatchOutcome::Delivered { size, .. } | BatchOutcome::Failed { size, .. } => *size,
        }
    }
}

/// Every batch outcome of a run, in batch order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport<T> {
    pub outcomes: Vec<BatchOutcome<T>>,
}

impl<T> BulkReport<T> {
    /// Outcome of the first batch, the only one older callers looked at
    pub fn first(&self) -> Option<&BatchOutcome<T>> {
        self.outcomes.first()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Split `recipients` into contiguous batches of at most `batch_size`
pub fn partition(recipients: &[String], batch_size: usize) -> Vec<Vec<String>> {
    recipients
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// A bulk send: who, how many per batch, how long between batches
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub recipients: Recipients,
    pub batch_size: usize,
    pub interval: Duration,
}

impl BatchJob {
    pub fn new(recipients: Recipients) -> Self {
        Self {
            recipients,
            batch_size: BULK_BATCH_SIZE,
            interval: Duration::from_secs(BULK_INTERVAL_SECS),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Number of sends this job will make
    pub fn batches(&self) -> usize {
        match &self.recipients {
            Recipients::One(_) => 1,
            Recipients::Many(list) => list.len().div_ceil(self.batch_size.max(1)),
        }
    }

    /// Run the job, calling `send` once per batch
    ///
    /// A single address skips batching and is sent right away. `job_id`
    /// only tags the log lines.
    pub async fn run<F, Fut, T, E>(self, job_id: &str, mut send: F) -> BulkReport<T>
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let batches = match self.recipients {
            Recipients::One(address) => vec![vec![address]],
            Recipients::Many(list) => {
                tracing::info!(
                    job = job_id,
                    "Sending to {} recipients in batches of {}",
                    list.len(),
                    self.batch_size
                );
                partition(&list, self.batch_size)
            }
        };

        let total = batches.len();
        let mut outcomes = Vec::with_capacity(total);

        for (batch, recipients) in batches.into_iter().enumerate() {
            let size = recipients.len();
            tracing::info!(job = job_id, "Sending batch {} of {}", batch + 1, total);

            let outcome = match send(recipients).await {
                Ok(value) => BatchOutcome::Delivered { batch, size, value },
                Err(e) => {
                    tracing::error!(job = job_id, "Batch {} failed: {}", batch + 1, e);
                    BatchOutcome::Failed {
                        batch,
                        size,
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);

            if batch + 1 < total {
                tokio::time::sleep(self.interval).await;
            }
        }

        tracing::info!(job = job_id, "Done sending {} batches", total);
        BulkReport { outcomes }
    }
}
