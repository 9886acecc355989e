// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Patch descriptors.
//!
//! A [`Patch`] records one extraction unit's position in every coordinate
//! system the pipeline touches: the bundle's output arrays (spectrum and
//! wavelength axes), and the patch's own padded result arrays. The pixel
//! coordinate system is only known after extraction and lives on
//! [`ResolvedPatch`].

use crate::{PixelRegion, Span};

/// An immutable planned extraction patch.
///
/// Created by [`plan_bundle`](crate::plan_bundle) before extraction. The
/// wavelength index `iwave` is an index into the *padded* wavelength grid,
/// so the first patch of a bundle starts at `iwave == wavepad`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Patch {
    /// Global index of the first spectrum this patch extracts.
    pub ispec: usize,
    /// Index of the first wavelength bin in the padded grid.
    pub iwave: usize,
    /// Global index of the first spectrum of the owning bundle.
    pub bspecmin: usize,
    /// Number of spectra extracted (excluding padding).
    pub nspec: usize,
    /// Number of wavelength bins extracted (excluding padding).
    pub nwavestep: usize,
    /// Extra wavelength bins carried (and later discarded) on each edge.
    pub wavepad: usize,
    /// Total wavelength bins in the owning bundle's output.
    pub nwave: usize,
    /// Spectra per bundle.
    pub bundlesize: usize,
    /// Resolution-matrix diagonals retained per side.
    pub ndiag: usize,
    /// Where the patch lands on the bundle's spectrum axis.
    spec_span: Span,
    /// Where the patch's kept bins land on the bundle's wavelength axis.
    wave_span: Span,
    /// Leading sub-range of the patch's own padded output that is keepable.
    keep_span: Span,
}

impl Patch {
    /// Plans a patch.
    ///
    /// The keep span is always the shortest of `[0, nwavestep)` and what
    /// remains of the bundle's wavelength range: the final patch of a
    /// bundle is narrower when `nwave % nwavestep != 0`.
    pub fn new(
        ispec: usize,
        iwave: usize,
        bspecmin: usize,
        nspec: usize,
        nwavestep: usize,
        wavepad: usize,
        nwave: usize,
        bundlesize: usize,
        ndiag: usize,
    ) -> Self {
        debug_assert!(ispec >= bspecmin, "patch starts before its bundle");
        debug_assert!(iwave >= wavepad, "patch starts inside the lower pad");

        // Spectrum indexing in bundle outputs is relative to the bundle.
        let spec0 = ispec - bspecmin;
        let spec_span = Span::new(spec0, spec0 + nspec);

        let wave0 = iwave - wavepad;
        let nwavekeep = nwavestep.min(nwave.saturating_sub(wave0));
        let wave_span = Span::new(wave0, wave0 + nwavekeep);
        let keep_span = Span::new(0, nwavekeep);

        Self {
            ispec,
            iwave,
            bspecmin,
            nspec,
            nwavestep,
            wavepad,
            nwave,
            bundlesize,
            ndiag,
            spec_span,
            wave_span,
            keep_span,
        }
    }

    /// Where this patch lands on the bundle's spectrum axis.
    pub fn spec_span(&self) -> Span {
        self.spec_span
    }

    /// Where this patch's kept bins land on the bundle's wavelength axis.
    pub fn wave_span(&self) -> Span {
        self.wave_span
    }

    /// Which leading sub-range of the patch's padded output is keepable.
    pub fn keep_span(&self) -> Span {
        self.keep_span
    }

    /// Spectrum start relative to the bundle.
    pub fn spec_offset(&self) -> usize {
        self.ispec - self.bspecmin
    }

    /// Width of the resolution diagonal band (`2 * ndiag + 1`).
    pub fn band_width(&self) -> usize {
        2 * self.ndiag + 1
    }

    /// Attaches the pixel bounding box computed during extraction.
    pub fn resolve(self, pixels: Option<PixelRegion>) -> ResolvedPatch {
        ResolvedPatch { patch: self, pixels }
    }
}

/// A planned patch plus the detector pixels it was extracted from.
///
/// `pixels` is `None` when the patch lies entirely outside the image; such
/// a patch still occupies its slot in the bundle's dense output arrays but
/// contributes nothing to the model image.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedPatch {
    pub patch: Patch,
    pub pixels: Option<PixelRegion>,
}

impl ResolvedPatch {
    /// Returns `true` if the patch covered any detector pixels.
    pub fn on_image(&self) -> bool {
        self.pixels.is_some()
    }
}
