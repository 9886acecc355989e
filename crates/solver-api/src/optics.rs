// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The optics projection model handle.
//!
//! Solvers need to know how a (spectrum, wavelength-bin) pair projects
//! onto detector pixels. The real instrument response lives in an
//! external PSF model; this handle carries the pieces the decomposition
//! engine and the reference solvers consume: detector extent, spot
//! half-sizes, model-error fraction, wavelength bounds, and a linear
//! trace geometry.
//!
//! Trace geometry: spectrum `s` runs down detector column
//! `col0 + s * col_spacing`; padded-grid wavelength bin `w` falls on
//! detector row `row_origin + w`. A negative `row_origin` places the
//! lower wavelength padding off the bottom edge of the image, which is
//! how off-image patches arise at the detector boundary.

use ndarray::Array2;
use patch_planner::{PixelRegion, Span};

/// Projection geometry and PSF metadata for one detector frame.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OpticsModel {
    /// Detector rows.
    pub nrows: usize,
    /// Detector columns.
    pub ncols: usize,
    /// Number of spectra traced on the detector.
    pub nspec: usize,
    /// PSF spot half-size along columns.
    pub hsizex: usize,
    /// PSF spot half-size along rows; also the number of resolution
    /// diagonals retained per side.
    pub hsizey: usize,
    /// Fractional PSF model error, used for chi2 and pixel masking.
    pub psferr: f64,
    /// Lower wavelength bound covered by the model.
    pub wavemin: f64,
    /// Upper wavelength bound covered by the model.
    pub wavemax: f64,
    /// Detector column of spectrum 0's trace.
    pub col0: usize,
    /// Column spacing between adjacent spectrum traces.
    pub col_spacing: usize,
    /// Detector row of padded-grid wavelength bin 0 (may be negative).
    pub row_origin: i64,
}

impl OpticsModel {
    /// A synthetic model tracing `nspec` spectra over `nfullwave` padded
    /// wavelength bins, with the detector sized to cover every trace.
    pub fn synthetic(nspec: usize, nfullwave: usize) -> Self {
        let col_spacing = 2;
        let col0 = 1;
        Self {
            nrows: nfullwave,
            ncols: col0 + (nspec.max(1) - 1) * col_spacing + 2,
            nspec,
            hsizex: 1,
            hsizey: 3,
            psferr: 0.01,
            wavemin: 0.0,
            wavemax: nfullwave as f64,
            col0,
            col_spacing,
            row_origin: 0,
        }
    }

    /// Detector column of spectrum `spec`'s trace.
    pub fn trace_col(&self, spec: usize) -> usize {
        self.col0 + spec * self.col_spacing
    }

    /// Detector row of padded-grid wavelength bin `w`, unclipped.
    pub fn wave_row(&self, w: usize) -> i64 {
        self.row_origin + w as i64
    }

    /// The detector pixels touched by spectra `[spec_lo, spec_hi)` over
    /// padded-grid wavelength bins `[wave_lo, wave_hi)`, including the
    /// PSF spot half-sizes, clipped to the image.
    ///
    /// Returns `None` when the projection misses the image entirely.
    pub fn patch_region(
        &self,
        spec_lo: usize,
        spec_hi: usize,
        wave_lo: usize,
        wave_hi: usize,
    ) -> Option<PixelRegion> {
        if spec_lo >= spec_hi || wave_lo >= wave_hi {
            return None;
        }
        let row_lo = self.wave_row(wave_lo) - self.hsizey as i64;
        let row_hi = self.wave_row(wave_hi - 1) + self.hsizey as i64 + 1;
        let col_lo = self.trace_col(spec_lo) as i64 - self.hsizex as i64;
        let col_hi = self.trace_col(spec_hi - 1) as i64 + self.hsizex as i64 + 1;

        let rows = clip(row_lo, row_hi, self.nrows);
        let cols = clip(col_lo, col_hi, self.ncols);
        match (rows, cols) {
            (Some(rows), Some(cols)) => Some(PixelRegion::new(rows, cols)),
            _ => None,
        }
    }

    /// Projects per-spectrum photon counts onto a synthetic detector
    /// image: `phot` has shape `(nspec, nfullwave)` and each count lands
    /// on its trace pixel.
    ///
    /// Used by tests and the demo pipeline to fabricate an image whose
    /// extraction is known in closed form.
    pub fn project_image(&self, phot: &Array2<f64>) -> Array2<f64> {
        let mut image = Array2::zeros((self.nrows, self.ncols));
        for s in 0..phot.nrows() {
            let c = self.trace_col(s);
            if c >= self.ncols {
                continue;
            }
            for w in 0..phot.ncols() {
                let r = self.wave_row(w);
                if r >= 0 && (r as usize) < self.nrows {
                    image[[r as usize, c]] += phot[[s, w]];
                }
            }
        }
        image
    }
}

fn clip(lo: i64, hi: i64, limit: usize) -> Option<Span> {
    let lo = lo.max(0);
    let hi = hi.min(limit as i64);
    if lo >= hi {
        None
    } else {
        Some(Span::new(lo as usize, hi as usize))
    }
}
