// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bundle assembly.
//!
//! Merges all of one bundle's per-patch results into dense bundle-shaped
//! arrays. The dense arrays tile exactly (every patch writes its keep
//! region into a disjoint `spec_span` x `wave_span` block) while the
//! model image *accumulates*, because wavelength padding makes
//! neighboring patches overlap in pixel space and their contributions
//! must sum.

use crate::ExtractError;
use ndarray::{s, Array2, Array3};
use patch_planner::{PixelRegion, ResolvedPatch};
use solver_api::PatchResult;

/// One bundle's assembled output.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// Global index of the bundle's first spectrum.
    pub bspecmin: usize,
    /// Extracted flux, `(bundlesize, nwave)`, photon counts per bin.
    pub flux: Array2<f64>,
    /// Inverse variance of `flux`.
    pub ivar: Array2<f64>,
    /// Resolution diagonal band, `(bundlesize, 2*ndiag+1, nwave)`.
    pub rdiags: Array3<f64>,
    /// Masked-input-pixel fraction per bin.
    pub pixmask_fraction: Array2<f64>,
    /// Chi-square per pixel of the patch fits.
    pub chi2pix: Array2<f64>,
    /// Stitched model image over `pixels` (zero extent when no patch
    /// covered the image).
    pub modelimage: Array2<f64>,
    /// Union pixel bounding box of all contributing patches, in global
    /// detector coordinates.
    pub pixels: Option<PixelRegion>,
}

/// Assembles one bundle from its (patch, result) pairs.
///
/// The input order is irrelevant: dense writes are disjoint by
/// construction and model contributions are additive. A patch whose
/// bounding box is `None` still writes its dense arrays but never
/// touches the model image; a patch model that is absent, all zero, or
/// non-finite is treated as "no contribution" rather than an error, so
/// a corrupt per-patch model cannot corrupt the shared image.
pub fn assemble_bundle(
    results: &[(ResolvedPatch, PatchResult)],
) -> Result<BundleOutput, ExtractError> {
    let Some((first, _)) = results.first() else {
        return Err(ExtractError::Assembly(
            "cannot assemble a bundle from zero patch results".into(),
        ));
    };

    // Bundle-wide shape parameters, identical across patches.
    let nwave = first.patch.nwave;
    let bundlesize = first.patch.bundlesize;
    let band = first.patch.band_width();
    let bspecmin = first.patch.bspecmin;

    let mut flux = Array2::zeros((bundlesize, nwave));
    let mut ivar = Array2::zeros((bundlesize, nwave));
    let mut rdiags = Array3::zeros((bundlesize, band, nwave));
    let mut pixmask_fraction = Array2::zeros((bundlesize, nwave));
    let mut chi2pix = Array2::zeros((bundlesize, nwave));

    // Union pixel extent over the patches that landed on the image.
    let pixels = PixelRegion::union_all(results.iter().filter_map(|(rp, _)| rp.pixels.as_ref()));
    let mut modelimage = match &pixels {
        Some(region) => Array2::zeros((region.nrows(), region.ncols())),
        None => Array2::zeros((0, 0)),
    };

    for (resolved, result) in results {
        let patch = &resolved.patch;
        let sr = patch.spec_span().range();
        let wr = patch.wave_span().range();
        let kr = patch.keep_span().range();

        if result.flux.nrows() != sr.len() || result.flux.ncols() < kr.len() {
            return Err(ExtractError::Assembly(format!(
                "patch at spectrum {} wave {} returned flux shaped {:?}, expected ({}, >= {})",
                patch.ispec,
                patch.iwave,
                result.flux.dim(),
                sr.len(),
                kr.len(),
            )));
        }
        if result.rdiags.dim().1 != band {
            return Err(ExtractError::Assembly(format!(
                "patch at spectrum {} wave {} returned a {}-wide diagonal band, expected {}",
                patch.ispec,
                patch.iwave,
                result.rdiags.dim().1,
                band,
            )));
        }

        // Kept region into the bundle arrays: disjoint across patches.
        flux.slice_mut(s![sr.clone(), wr.clone()])
            .assign(&result.flux.slice(s![.., kr.clone()]));
        ivar.slice_mut(s![sr.clone(), wr.clone()])
            .assign(&result.ivar.slice(s![.., kr.clone()]));
        rdiags
            .slice_mut(s![sr.clone(), .., wr.clone()])
            .assign(&result.rdiags.slice(s![.., .., kr.clone()]));
        pixmask_fraction
            .slice_mut(s![sr.clone(), wr.clone()])
            .assign(&result.pixmask_fraction.slice(s![.., kr.clone()]));
        chi2pix
            .slice_mut(s![sr, wr])
            .assign(&result.chi2pix.slice(s![.., kr]));

        // Model accumulation: only for on-image patches with a usable
        // model contribution.
        let Some(region) = &resolved.pixels else {
            continue;
        };
        let Some(model) = &result.model else {
            continue;
        };
        let skip = model.iter().all(|&v| v == 0.0) || model.iter().any(|v| !v.is_finite());
        if skip {
            continue;
        }
        if model.dim() != (region.nrows(), region.ncols()) {
            return Err(ExtractError::Assembly(format!(
                "patch at spectrum {} wave {} returned a model shaped {:?} for a {}x{} region",
                patch.ispec,
                patch.iwave,
                model.dim(),
                region.nrows(),
                region.ncols(),
            )));
        }

        let union = pixels.as_ref().expect("on-image patch implies a union box");
        let rel = region.relative_to(union);
        let mut target = modelimage.slice_mut(s![rel.rows.range(), rel.cols.range()]);
        target += model;
    }

    Ok(BundleOutput {
        bspecmin,
        flux,
        ivar,
        rdiags,
        pixmask_fraction,
        chi2pix,
        modelimage,
        pixels,
    })
}
