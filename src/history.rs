//! Filtered-value history and batch statistics.
//!
//! Max and min are taken over everything retained since the session started,
//! not just the latest reporting batch. By default nothing is ever evicted;
//! `with_retention` caps the history and min/max then cover the retained
//! values only.

use crate::error::{LinkError, LinkResult};
use serde::Serialize;
use std::collections::VecDeque;

/// Max/min over the filtered history at the time of a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchStats {
    /// Largest filtered value retained.
    pub max: f64,
    /// Smallest filtered value retained.
    pub min: f64,
}

/// Append-only record of filtered values, optionally bounded.
#[derive(Debug, Clone, Default)]
pub struct History {
    values: VecDeque<f64>,
    retention: Option<usize>,
}

impl History {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// History that keeps at most `limit` of the most recent values.
    /// A limit of zero means unbounded.
    pub fn with_retention(limit: usize) -> Self {
        Self {
            values: VecDeque::new(),
            retention: (limit > 0).then_some(limit),
        }
    }

    /// Record one filtered value, evicting the oldest if over the bound.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if let Some(limit) = self.retention {
            while self.values.len() > limit {
                self.values.pop_front();
            }
        }
    }

    /// Number of retained values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True before the first push.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Retained values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Largest retained value.
    ///
    /// # Errors
    /// `LinkError::EmptyHistory` if nothing has been recorded.
    pub fn max(&self) -> LinkResult<f64> {
        self.values
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or(LinkError::EmptyHistory)
    }

    /// Smallest retained value.
    ///
    /// # Errors
    /// `LinkError::EmptyHistory` if nothing has been recorded.
    pub fn min(&self) -> LinkResult<f64> {
        self.values
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(LinkError::EmptyHistory)
    }

    /// Both extremes at once.
    pub fn stats(&self) -> LinkResult<BatchStats> {
        Ok(BatchStats {
            max: self.max()?,
            min: self.min()?,
        })
    }
}
