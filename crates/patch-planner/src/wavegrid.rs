// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Wavelength grids.
//!
//! The extraction target is a uniform wavelength grid `[wmin, wmax]` with
//! step `dw`. Extraction itself runs on a padded grid carrying `wavepad`
//! buffer bins below the range and `wavepad + nwavestep` above it; the
//! extra `nwavestep` bins give a final partial tile full coverage. The
//! padded bins are extracted and discarded.

use crate::PlanError;
use ndarray::Array1;

/// The target and padded wavelength grids for one extraction.
#[derive(Debug, Clone)]
pub struct WavelengthGrid {
    wave: Array1<f64>,
    fullwave: Array1<f64>,
    dw: f64,
    wavepad: usize,
}

impl WavelengthGrid {
    /// Builds the grid for `[wmin, wmax]` with step `dw`.
    ///
    /// The target grid includes `wmax` itself when the range divides
    /// evenly (half-step-inclusive stop).
    pub fn new(
        wmin: f64,
        wmax: f64,
        dw: f64,
        wavepad: usize,
        nwavestep: usize,
    ) -> Result<Self, PlanError> {
        if !dw.is_finite() || dw <= 0.0 {
            return Err(PlanError::InvalidWavelengthStep { dw });
        }
        if !(wmin.is_finite() && wmax.is_finite()) || wmax < wmin {
            return Err(PlanError::InvalidWavelengthRange { wmin, wmax });
        }

        let nwave = ((wmax - wmin + 0.5 * dw) / dw).ceil() as usize;
        let wave = Array1::from_iter((0..nwave).map(|i| wmin + i as f64 * dw));

        let wtop = wave[nwave - 1];
        let nfull = nwave + 2 * wavepad + nwavestep;
        let fullwave = Array1::from_iter((0..nfull).map(|i| {
            if i < wavepad {
                wmin - (wavepad - i) as f64 * dw
            } else if i < wavepad + nwave {
                wave[i - wavepad]
            } else {
                wtop + (i - wavepad - nwave + 1) as f64 * dw
            }
        }));

        Ok(Self {
            wave,
            fullwave,
            dw,
            wavepad,
        })
    }

    /// Number of target wavelength bins.
    pub fn nwave(&self) -> usize {
        self.wave.len()
    }

    /// The target wavelength grid.
    pub fn wave(&self) -> &Array1<f64> {
        &self.wave
    }

    /// The padded wavelength grid.
    pub fn fullwave(&self) -> &Array1<f64> {
        &self.fullwave
    }

    /// Grid step.
    pub fn dw(&self) -> f64 {
        self.dw
    }

    /// Pad width on the lower edge.
    pub fn wavepad(&self) -> usize {
        self.wavepad
    }

    /// Local bin width at each target bin, via the discrete gradient of
    /// the grid (central differences, one-sided at the edges).
    ///
    /// Used to convert photon counts per bin into flux density per
    /// wavelength unit.
    pub fn bin_widths(&self) -> Array1<f64> {
        let w = &self.wave;
        let n = w.len();
        if n == 1 {
            return Array1::from_elem(1, self.dw);
        }
        Array1::from_iter((0..n).map(|i| {
            if i == 0 {
                w[1] - w[0]
            } else if i == n - 1 {
                w[n - 1] - w[n - 2]
            } else {
                (w[i + 1] - w[i - 1]) / 2.0
            }
        }))
    }
}
