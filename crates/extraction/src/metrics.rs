// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline timing metrics.
//!
//! [`ExtractionMetrics`] records named wall-clock splits as the pipeline
//! moves through its stages (topology, broadcast, per-bundle extraction,
//! gathers, assembly). The splits are the primary tool for deciding how
//! to shape the worker topology for a deployment.

use std::time::{Duration, Instant};

/// Named wall-clock splits for one extraction run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExtractionMetrics {
    /// Ordered (label, duration) pairs, one per recorded stage.
    pub splits: Vec<(String, Duration)>,
    #[serde(skip)]
    started: Option<Instant>,
    #[serde(skip)]
    last: Option<Instant>,
}

impl Default for ExtractionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionMetrics {
    /// Starts the split clock.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            splits: Vec::new(),
            started: Some(now),
            last: Some(now),
        }
    }

    /// Records the time elapsed since the previous split under `label`.
    pub fn split(&mut self, label: &str) {
        let now = Instant::now();
        let since = self.last.map(|t| now - t).unwrap_or_default();
        self.splits.push((label.to_string(), since));
        self.last = Some(now);
    }

    /// Total wall-clock time across all recorded splits.
    pub fn total(&self) -> Duration {
        self.splits.iter().map(|(_, d)| *d).sum()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let total_ms = self.total().as_secs_f64() * 1000.0;
        let stages: Vec<String> = self
            .splits
            .iter()
            .map(|(label, d)| format!("{label} {:.2}ms", d.as_secs_f64() * 1000.0))
            .collect();
        format!("extraction timing: {total_ms:.2}ms total ({})", stages.join(", "))
    }
}
