// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference solvers.
//!
//! [`HostSolver`] performs a trace-sampling extraction: each output bin
//! reads the detector pixel its trace projects to, the resolution band
//! is the identity, and the model image re-projects the values the patch
//! consumed over its *padded* window. It is deliberately simple: the
//! point is a deterministic kernel with the exact contract shape of the
//! real deconvolution, so the decomposition and assembly layers can be
//! validated in closed form.
//!
//! [`BatchedSolver`] wraps the same kernel in the accelerator invocation
//! pattern: stage every patch of a group, run one fused pass, finalize
//! each patch individually.

use crate::{DispatchMode, OpticsModel, PatchRequest, PatchResult, PatchSolver, SolverError};
use ndarray::{Array2, Array3};
use patch_planner::PixelRegion;

/// Per-patch trace-sampling solver running on the host.
#[derive(Debug, Clone)]
pub struct HostSolver {
    optics: OpticsModel,
}

impl HostSolver {
    pub fn new(optics: OpticsModel) -> Self {
        Self { optics }
    }

    pub fn optics(&self) -> &OpticsModel {
        &self.optics
    }

    fn validate(&self, req: &PatchRequest<'_>) -> Result<(), SolverError> {
        if req.image.dim() != req.ivar.dim() {
            return Err(SolverError::ShapeMismatch {
                image: req.image.dim(),
                ivar: req.ivar.dim(),
            });
        }
        let start = req.bspecmin + req.ispec;
        let stop = start + req.nspec;
        if stop > self.optics.nspec {
            return Err(SolverError::SpectrumOutOfRange {
                start,
                stop,
                nspec: self.optics.nspec,
            });
        }
        Ok(())
    }

    /// The prepare step: the detector pixels this patch covers.
    pub(crate) fn locate(&self, req: &PatchRequest<'_>) -> Result<Option<PixelRegion>, SolverError> {
        self.validate(req)?;
        let start = req.bspecmin + req.ispec;
        let (wave_lo, wave_hi) = req.padded_window();
        Ok(self
            .optics
            .patch_region(start, start + req.nspec, wave_lo, wave_hi))
    }

    /// The solve step against a pre-computed pixel region.
    pub(crate) fn solve_with_region(
        &self,
        req: &PatchRequest<'_>,
        pixels: Option<PixelRegion>,
    ) -> Result<PatchResult, SolverError> {
        let Some(region) = pixels else {
            return Ok(PatchResult::off_image(req.nspec, req.nwavestep, req.ndiag));
        };

        let (nrows, ncols) = req.image.dim();
        let spec0 = req.bspecmin + req.ispec;

        let mut flux = Array2::zeros((req.nspec, req.nwavestep));
        let mut ivar = Array2::zeros((req.nspec, req.nwavestep));
        let mut pixmask_fraction = Array2::zeros((req.nspec, req.nwavestep));
        let chi2pix = Array2::zeros((req.nspec, req.nwavestep));
        let mut rdiags = Array3::zeros((req.nspec, 2 * req.ndiag + 1, req.nwavestep));

        for i in 0..req.nspec {
            let col = self.optics.trace_col(spec0 + i);
            for j in 0..req.nwavestep {
                let row = self.optics.wave_row(req.iwave + j);
                if row < 0 || row as usize >= nrows || col >= ncols {
                    // Bin projects off the detector: no data, fully masked.
                    pixmask_fraction[[i, j]] = 1.0;
                    continue;
                }
                let r = row as usize;
                flux[[i, j]] = req.image[[r, col]];
                ivar[[i, j]] = req.ivar[[r, col]];

                // Masked-pixel fraction over the spot aperture.
                let c_lo = col.saturating_sub(self.optics.hsizex);
                let c_hi = (col + self.optics.hsizex + 1).min(ncols);
                let masked = (c_lo..c_hi).filter(|&c| req.ivar[[r, c]] == 0.0).count();
                pixmask_fraction[[i, j]] = masked as f64 / (c_hi - c_lo) as f64;

                rdiags[[i, req.ndiag, j]] = 1.0;
            }
        }

        let model = if req.want_model {
            Some(self.model_image(req, &region))
        } else {
            None
        };

        Ok(PatchResult {
            flux,
            ivar,
            rdiags,
            pixmask_fraction,
            chi2pix,
            pixels: Some(region),
            model,
        })
    }

    /// Re-projects the values the patch consumed over its padded window
    /// into the patch's pixel region. Padded bins are shared between
    /// neighboring patches, so overlapping model contributions sum at
    /// assembly.
    fn model_image(&self, req: &PatchRequest<'_>, region: &PixelRegion) -> Array2<f64> {
        let mut model = Array2::zeros((region.nrows(), region.ncols()));
        let spec0 = req.bspecmin + req.ispec;
        let (wave_lo, wave_hi) = req.padded_window();

        for i in 0..req.nspec {
            let col = self.optics.trace_col(spec0 + i);
            if !region.cols.contains(col) {
                continue;
            }
            for w in wave_lo..wave_hi {
                let row = self.optics.wave_row(w);
                if row < 0 {
                    continue;
                }
                let r = row as usize;
                if region.rows.contains(r) {
                    model[[r - region.rows.start, col - region.cols.start]] +=
                        req.image[[r, col]];
                }
            }
        }
        model
    }
}

impl PatchSolver for HostSolver {
    fn name(&self) -> &str {
        "host"
    }

    fn extract(&self, request: &PatchRequest<'_>) -> Result<PatchResult, SolverError> {
        let pixels = self.locate(request)?;
        self.solve_with_region(request, pixels)
    }
}

/// Accelerator-style batched solver.
///
/// Prepares all patch regions first, then runs one fused pass over the
/// group, then finalizes each patch, the shape that amortizes fixed
/// per-call overhead on real accelerator hardware. Carries the worker's
/// device binding as an explicit handle acquired at topology-planning
/// time.
#[derive(Debug, Clone)]
pub struct BatchedSolver {
    kernel: HostSolver,
    device: Option<usize>,
}

impl BatchedSolver {
    pub fn new(optics: OpticsModel, device: Option<usize>) -> Self {
        Self {
            kernel: HostSolver::new(optics),
            device,
        }
    }

    /// The device this solver is bound to, if any.
    pub fn device(&self) -> Option<usize> {
        self.device
    }
}

impl PatchSolver for BatchedSolver {
    fn name(&self) -> &str {
        "batched"
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Batched
    }

    fn extract(&self, request: &PatchRequest<'_>) -> Result<PatchResult, SolverError> {
        // A batch of one.
        let pixels = self.kernel.locate(request)?;
        self.kernel.solve_with_region(request, pixels)
    }

    fn extract_batch(
        &self,
        requests: &[PatchRequest<'_>],
    ) -> Result<Vec<PatchResult>, SolverError> {
        // Prepare: locate every patch before any solve.
        let regions = requests
            .iter()
            .map(|r| self.kernel.locate(r))
            .collect::<Result<Vec<_>, _>>()?;

        // Fused solve + per-patch finalize.
        requests
            .iter()
            .zip(regions)
            .map(|(req, region)| self.kernel.solve_with_region(req, region))
            .collect()
    }
}
