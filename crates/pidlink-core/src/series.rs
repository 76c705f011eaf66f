//! Sample series
//!
//! Consumer-side history of received telemetry. The reader hands out bare
//! values; the series numbers them in arrival order (the plot's x axis) and
//! keeps a bounded window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of points kept before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One numbered sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Position in the stream, starting at 0
    pub index: u64,
    /// Decoded sample
    pub value: f64,
}

/// Bounded, numbered history of samples
#[derive(Debug, Clone)]
pub struct SampleSeries {
    points: VecDeque<SamplePoint>,
    capacity: usize,
    next_index: u64,
}

impl Default for SampleSeries {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SampleSeries {
    /// Create a series keeping at most `capacity` points
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            next_index: 0,
        }
    }

    /// Append a sample and return the point it became
    pub fn push(&mut self, value: f64) -> SamplePoint {
        let point = SamplePoint {
            index: self.next_index,
            value,
        };
        self.next_index += 1;

        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        point
    }

    /// Append everything currently waiting in an iterator
    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) -> usize {
        let mut count = 0;
        for value in values {
            self.push(value);
            count += 1;
        }
        count
    }

    /// Points currently retained
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are retained
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total samples ever pushed, including dropped ones
    pub fn total(&self) -> u64 {
        self.next_index
    }

    /// Most recent point
    pub fn latest(&self) -> Option<SamplePoint> {
        self.points.back().copied()
    }

    /// Retained points, oldest first
    pub fn points(&self) -> impl Iterator<Item = &SamplePoint> {
        self.points.iter()
    }

    /// Parallel x/y vectors, as a plotting widget wants them
    pub fn xy(&self) -> (Vec<f64>, Vec<f64>) {
        self.points
            .iter()
            .map(|p| (p.index as f64, p.value))
            .unzip()
    }

    /// Minimum and maximum of the retained values
    pub fn range(&self) -> Option<(f64, f64)> {
        let mut values = self.points.iter().map(|p| p.value);
        let first = values.next()?;
        Some(values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Forget all points but keep numbering
    pub fn clear(&mut self) {
        self.points.clear();
    }
}
