// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bundle partitioning.

use crate::Patch;

/// Plans the patches covering one bundle.
///
/// The bundle's `bundlesize` spectra are split into `nsubbundles` equal
/// spectrum groups; within each group the padded wavelength range is tiled
/// into consecutive windows of `nwavestep` bins, starting at `wavepad` and
/// stepping until the bundle's `nwave` output bins are covered.
///
/// Returns the ordered 2D collection: outer index sub-bundle, inner index
/// wavelength tile. Patch order is deterministic for identical inputs;
/// downstream reassembly relies on positional correspondence.
///
/// `bundlesize` must be evenly divisible by `nsubbundles`; the caller's
/// configuration validation enforces this before planning.
pub fn plan_bundle(
    bspecmin: usize,
    bundlesize: usize,
    nsubbundles: usize,
    nwave: usize,
    nwavestep: usize,
    wavepad: usize,
    ndiag: usize,
) -> Vec<Vec<Patch>> {
    debug_assert!(nsubbundles > 0);
    debug_assert_eq!(
        bundlesize % nsubbundles,
        0,
        "bundlesize must divide evenly into sub-bundles"
    );

    let nspec_per_patch = bundlesize / nsubbundles;
    let mut subbundles = Vec::with_capacity(nsubbundles);
    for ispec in (bspecmin..bspecmin + bundlesize).step_by(nspec_per_patch) {
        let mut patches = Vec::new();
        for iwave in (wavepad..wavepad + nwave).step_by(nwavestep) {
            patches.push(Patch::new(
                ispec,
                iwave,
                bspecmin,
                nspec_per_patch,
                nwavestep,
                wavepad,
                nwave,
                bundlesize,
                ndiag,
            ));
        }
        subbundles.push(patches);
    }
    subbundles
}
