// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `spectex check`: preflight-check a configuration.
//!
//! Runs the same checks the pipeline runs before entering any
//! collective, so a bad deployment fails here instead of deadlocking a
//! worker group mid-run.

use extraction::ExtractionConfig;
use topology::layout;

pub fn execute(config: ExtractionConfig, workers: usize) -> anyhow::Result<()> {
    anyhow::ensure!(workers > 0, "at least one worker is required");

    if let Err(e) = config.validate(workers) {
        tracing::error!("{e}");
        println!("FAILED: {e}");
        anyhow::bail!("preflight check failed");
    }

    if let Err(e) = layout(workers, config.accel, config.ranks_per_bundle) {
        tracing::error!("{e}");
        println!("FAILED: {e}");
        anyhow::bail!("preflight check failed");
    }

    println!(
        "OK: {} spectra in bundles of {} ({} sub-bundles), {} worker(s)",
        config.nspec, config.bundlesize, config.nsubbundles, workers,
    );
    Ok(())
}
