// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Solver request and result records.

use ndarray::{Array2, Array3, ArrayView2};
use patch_planner::{Patch, PixelRegion};

/// Everything a solver needs to extract one patch.
///
/// The image and inverse-variance are borrowed views of the full frame;
/// solvers slice out what they need and never mutate them. Spectrum
/// indexing is bundle-relative (`ispec`), with `bspecmin` locating the
/// bundle on the detector.
#[derive(Debug, Clone)]
pub struct PatchRequest<'a> {
    /// Full detector image.
    pub image: ArrayView2<'a, f64>,
    /// Full detector inverse-variance.
    pub ivar: ArrayView2<'a, f64>,
    /// Global index of the owning bundle's first spectrum.
    pub bspecmin: usize,
    /// Bundle-relative index of the patch's first spectrum.
    pub ispec: usize,
    /// Number of spectra to extract.
    pub nspec: usize,
    /// Padded-grid index of the patch's first unpadded wavelength bin.
    pub iwave: usize,
    /// Number of unpadded wavelength bins to extract.
    pub nwavestep: usize,
    /// Wavelength padding carried on each edge.
    pub wavepad: usize,
    /// Spectra per bundle.
    pub bundlesize: usize,
    /// Resolution diagonals retained per side.
    pub ndiag: usize,
    /// Regularization strength for the inverse-covariance solve.
    pub regularize: f64,
    /// Outlier-clipping scale (0 disables clipping).
    pub clip_scale: f64,
    /// Fractional PSF model error override.
    pub psferr: f64,
    /// Whether to compute the patch's model image.
    pub want_model: bool,
}

impl<'a> PatchRequest<'a> {
    /// Builds the request for a planned patch.
    pub fn for_patch(
        image: ArrayView2<'a, f64>,
        ivar: ArrayView2<'a, f64>,
        patch: &Patch,
        regularize: f64,
        clip_scale: f64,
        psferr: f64,
        want_model: bool,
    ) -> Self {
        Self {
            image,
            ivar,
            bspecmin: patch.bspecmin,
            ispec: patch.spec_offset(),
            nspec: patch.nspec,
            iwave: patch.iwave,
            nwavestep: patch.nwavestep,
            wavepad: patch.wavepad,
            bundlesize: patch.bundlesize,
            ndiag: patch.ndiag,
            regularize,
            clip_scale,
            psferr,
            want_model,
        }
    }

    /// The padded wavelength window `[lo, hi)` this patch solves over,
    /// as indices into the padded grid.
    pub fn padded_window(&self) -> (usize, usize) {
        (
            self.iwave - self.wavepad,
            self.iwave + self.nwavestep + self.wavepad,
        )
    }
}

/// One patch's extraction output.
///
/// Dense arrays span the patch's own coordinate system: `nspec` rows by
/// `nwavestep` wavelength columns (column `j` is padded-grid bin
/// `iwave + j`). The keep span applied at assembly discards the part of
/// a final patch that runs past its bundle's wavelength range.
///
/// `pixels == None` means the patch missed the image entirely; such a
/// result still occupies its slot in the bundle's dense arrays. An
/// absent, all-zero, or non-finite `model` is a valid "no model
/// contribution" and must not raise an error anywhere downstream.
#[derive(Debug, Clone)]
pub struct PatchResult {
    /// Extracted flux in photon counts per wavelength bin.
    pub flux: Array2<f64>,
    /// Inverse variance of `flux`.
    pub ivar: Array2<f64>,
    /// Resolution-matrix diagonal band, `(nspec, 2*ndiag+1, nwavestep)`.
    pub rdiags: Array3<f64>,
    /// Fraction of masked input pixels contributing to each bin.
    pub pixmask_fraction: Array2<f64>,
    /// Chi-square per pixel of the patch fit.
    pub chi2pix: Array2<f64>,
    /// Detector pixels the patch covered, or `None` if off-image.
    pub pixels: Option<PixelRegion>,
    /// Model image over `pixels`, when requested.
    pub model: Option<Array2<f64>>,
}

impl PatchResult {
    /// An all-zero result for a patch with no pixel coverage.
    pub fn off_image(nspec: usize, nwavestep: usize, ndiag: usize) -> Self {
        Self {
            flux: Array2::zeros((nspec, nwavestep)),
            ivar: Array2::zeros((nspec, nwavestep)),
            rdiags: Array3::zeros((nspec, 2 * ndiag + 1, nwavestep)),
            pixmask_fraction: Array2::from_elem((nspec, nwavestep), 1.0),
            chi2pix: Array2::zeros((nspec, nwavestep)),
            pixels: None,
            model: None,
        }
    }
}
