// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `spectex plan`: preview the patch partition and worker topology.

use extraction::ExtractionConfig;
use patch_planner::plan_bundle;
use topology::layout;

pub fn execute(mut config: ExtractionConfig, workers: usize) -> anyhow::Result<()> {
    anyhow::ensure!(workers > 0, "at least one worker is required");

    let (optics, grid) = super::demo_setup(&mut config)?;
    config.validate(workers)?;

    let nbundles = config.nspec / config.bundlesize;
    println!("Partition plan:");
    println!(
        "  {} spectra in {} bundles of {}, {} wavelength bins",
        config.nspec,
        nbundles,
        config.bundlesize,
        grid.nwave(),
    );

    // All bundles share one tiling; show the first.
    let subbundles = plan_bundle(
        config.specmin,
        config.bundlesize,
        config.nsubbundles,
        grid.nwave(),
        config.nwavestep,
        config.wavepad,
        optics.hsizey,
    );
    let tiles = &subbundles[0];
    println!(
        "  per bundle: {} sub-bundles x {} wavelength tiles = {} patches",
        subbundles.len(),
        tiles.len(),
        subbundles.len() * tiles.len(),
    );
    for (t, patch) in tiles.iter().enumerate() {
        println!(
            "   tile {t}: padded bins [{}, {}), keeps {} of {} bins",
            patch.iwave - patch.wavepad,
            patch.iwave + patch.nwavestep + patch.wavepad,
            patch.keep_span().len(),
            patch.nwavestep,
        );
    }
    println!();

    let topo = layout(workers, config.accel, config.ranks_per_bundle)?;
    let ngroups = topo
        .assignments
        .iter()
        .map(|a| a.bundle_group)
        .max()
        .map(|g| g + 1)
        .unwrap_or(0);
    println!("Worker topology ({workers} workers):");
    println!(
        "  {ngroups} bundle group(s) of {} worker(s), bundle stride {}",
        topo.group_size, topo.bundle_stride,
    );
    for a in &topo.assignments {
        println!(
            "   rank {}: bundle group {} (rank {}), device {}",
            a.rank,
            a.bundle_group,
            a.bundle_rank,
            a.device.map(|d| d.0.to_string()).unwrap_or_else(|| "-".into()),
        );
    }
    println!();
    println!(
        "  bundles per group: ~{}",
        nbundles.div_ceil(topo.bundle_stride),
    );
    Ok(())
}
