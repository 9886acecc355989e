// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-bundle extraction dispatch.
//!
//! Patches are assigned to workers by strided slicing: a static,
//! load-oblivious round-robin. Patch cost is roughly uniform, so static
//! assignment avoids coordination overhead and keeps the assignment
//! deterministic run-to-run for a given worker count.
//!
//! Two invocation strategies, selected by the solver's dispatch mode:
//!
//! - **Per-patch**: the flattened patch list is strided and the solver
//!   is invoked once per patch. Results are gathered to the bundle root
//!   as structured (patch, result) records.
//! - **Batched**: sub-bundles are strided whole, each sub-bundle's
//!   patches go to the solver in one fused call, and the per-rank result
//!   stacks travel to the root as single bulk array transfers before
//!   being repacked per patch.
//!
//! Both gather strategies are kept explicit rather than unified: the
//! bulk path exists to turn many small device-to-host transfers into a
//! handful of large ones.

use crate::{assemble_bundle, BundleOutput, ExtractError};
use comm_core::Communicator;
use ndarray::{s, Array2, Array3, Array4, ArrayView2, Axis, Ix2, Ix3};
use patch_planner::{plan_bundle, Patch, ResolvedPatch};
use solver_api::{DispatchMode, PatchRequest, PatchResult, PatchSolver};

/// Shape and solve parameters for one bundle's extraction.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Global index of the bundle's first spectrum.
    pub bspecmin: usize,
    /// Spectra per bundle.
    pub bundlesize: usize,
    /// Sub-bundles per bundle.
    pub nsubbundles: usize,
    /// Wavelength bins in the bundle output.
    pub nwave: usize,
    /// Wavelength bins per patch.
    pub nwavestep: usize,
    /// Wavelength padding per patch edge.
    pub wavepad: usize,
    /// Resolution diagonals retained per side.
    pub ndiag: usize,
    /// Regularization strength.
    pub regularize: f64,
    /// Outlier-clipping scale.
    pub clip_scale: f64,
    /// Fractional PSF model error.
    pub psferr: f64,
    /// Whether patch model images are wanted.
    pub want_model: bool,
}

/// Extracts one bundle of spectra.
///
/// Every worker of the bundle group calls this with the same options;
/// patches are divided among them by strided assignment. Results are
/// gathered to the group root, which assembles and returns the
/// [`BundleOutput`]; other ranks return `None`.
///
/// A patch that falls outside the image is retained with no pixel
/// contribution; it still occupies its slot in the dense arrays.
pub fn extract_bundle<'a, C: Communicator>(
    image: ArrayView2<'a, f64>,
    ivar: ArrayView2<'a, f64>,
    opts: &BundleOptions,
    comm: Option<&C>,
    solver: &dyn PatchSolver,
) -> Result<Option<BundleOutput>, ExtractError> {
    let (rank, size) = comm.map(|c| (c.rank(), c.size())).unwrap_or((0, 1));

    let subbundles = plan_bundle(
        opts.bspecmin,
        opts.bundlesize,
        opts.nsubbundles,
        opts.nwave,
        opts.nwavestep,
        opts.wavepad,
        opts.ndiag,
    );

    let request = |patch: &Patch| {
        PatchRequest::for_patch(
            image,
            ivar,
            patch,
            opts.regularize,
            opts.clip_scale,
            opts.psferr,
            opts.want_model,
        )
    };

    let mut results: Vec<(ResolvedPatch, PatchResult)> = Vec::new();
    match solver.mode() {
        DispatchMode::PerPatch => {
            let patches: Vec<&Patch> = subbundles.iter().flatten().collect();
            for patch in patches.into_iter().skip(rank).step_by(size) {
                let result = solver.extract(&request(patch))?;
                results.push((patch.clone().resolve(result.pixels), result));
            }
        }
        DispatchMode::Batched => {
            for patches in subbundles.iter().skip(rank).step_by(size) {
                let requests: Vec<PatchRequest<'_>> = patches.iter().map(&request).collect();
                let batch = solver.extract_batch(&requests)?;
                if batch.len() != patches.len() {
                    return Err(ExtractError::Assembly(format!(
                        "batched solver returned {} results for {} requests",
                        batch.len(),
                        patches.len(),
                    )));
                }
                for (patch, result) in patches.iter().zip(batch) {
                    results.push((patch.clone().resolve(result.pixels), result));
                }
            }
        }
    }
    tracing::debug!(
        "rank {rank}/{size}: extracted {} patches of bundle {}",
        results.len(),
        opts.bspecmin,
    );

    let gathered = match comm {
        None => Some(results),
        Some(c) if c.size() == 1 => Some(results),
        Some(c) => match solver.mode() {
            DispatchMode::PerPatch => gather_patch_results(c, results)?,
            DispatchMode::Batched => gather_batched_results(c, results, opts)?,
        },
    };

    match gathered {
        Some(all) => Ok(Some(assemble_bundle(&all)?)),
        None => Ok(None),
    }
}

/// Structured gather: each rank ships its (patch, result) records as-is.
fn gather_patch_results<C: Communicator>(
    comm: &C,
    results: Vec<(ResolvedPatch, PatchResult)>,
) -> Result<Option<Vec<(ResolvedPatch, PatchResult)>>, ExtractError> {
    Ok(comm
        .gather(results, 0)?
        .map(|per_rank| per_rank.into_iter().flatten().collect()))
}

/// Bulk gather: per-rank results are stacked into single arrays per
/// quantity (the batched transfer), gathered with the specialized bulk
/// collective, and repacked per patch at the root.
fn gather_batched_results<C: Communicator>(
    comm: &C,
    results: Vec<(ResolvedPatch, PatchResult)>,
    opts: &BundleOptions,
) -> Result<Option<Vec<(ResolvedPatch, PatchResult)>>, ExtractError> {
    let n = results.len();
    let nspec = opts.bundlesize / opts.nsubbundles;
    let band = 2 * opts.ndiag + 1;
    let step = opts.nwavestep;

    let mut flux = Array3::zeros((n, nspec, step));
    let mut fivar = Array3::zeros((n, nspec, step));
    let mut rdiags = Array4::zeros((n, nspec, band, step));
    let mut pixmask = Array3::zeros((n, nspec, step));
    let mut chi2 = Array3::zeros((n, nspec, step));
    let mut patches = Vec::with_capacity(n);
    let mut models = Vec::with_capacity(n);

    for (k, (resolved, result)) in results.into_iter().enumerate() {
        if result.flux.dim() != (nspec, step) || result.rdiags.dim() != (nspec, band, step) {
            return Err(ExtractError::Assembly(format!(
                "patch at spectrum {} wave {} returned arrays shaped {:?}/{:?}, expected ({nspec}, {step}) and ({nspec}, {band}, {step})",
                resolved.patch.ispec,
                resolved.patch.iwave,
                result.flux.dim(),
                result.rdiags.dim(),
            )));
        }
        flux.slice_mut(s![k, .., ..]).assign(&result.flux);
        fivar.slice_mut(s![k, .., ..]).assign(&result.ivar);
        rdiags.slice_mut(s![k, .., .., ..]).assign(&result.rdiags);
        pixmask.slice_mut(s![k, .., ..]).assign(&result.pixmask_fraction);
        chi2.slice_mut(s![k, .., ..]).assign(&result.chi2pix);
        patches.push(resolved);
        models.push(result.model);
    }

    let flux = comm.gather_concat(flux.into_dyn(), 0)?;
    let fivar = comm.gather_concat(fivar.into_dyn(), 0)?;
    let rdiags = comm.gather_concat(rdiags.into_dyn(), 0)?;
    let pixmask = comm.gather_concat(pixmask.into_dyn(), 0)?;
    let chi2 = comm.gather_concat(chi2.into_dyn(), 0)?;
    let patches = comm.gather(patches, 0)?;
    let models = comm.gather(models, 0)?;

    let (Some(flux), Some(fivar), Some(rdiags), Some(pixmask), Some(chi2), Some(patches), Some(models)) =
        (flux, fivar, rdiags, pixmask, chi2, patches, models)
    else {
        return Ok(None);
    };

    let patches: Vec<ResolvedPatch> = patches.into_iter().flatten().collect();
    let models: Vec<Option<Array2<f64>>> = models.into_iter().flatten().collect();

    let dim_err = |what: &str| {
        ExtractError::Assembly(format!("bulk-gathered {what} stack has the wrong dimensionality"))
    };

    let mut out = Vec::with_capacity(patches.len());
    for (k, (resolved, model)) in patches.into_iter().zip(models).enumerate() {
        let result = PatchResult {
            flux: flux
                .index_axis(Axis(0), k)
                .to_owned()
                .into_dimensionality::<Ix2>()
                .map_err(|_| dim_err("flux"))?,
            ivar: fivar
                .index_axis(Axis(0), k)
                .to_owned()
                .into_dimensionality::<Ix2>()
                .map_err(|_| dim_err("ivar"))?,
            rdiags: rdiags
                .index_axis(Axis(0), k)
                .to_owned()
                .into_dimensionality::<Ix3>()
                .map_err(|_| dim_err("rdiags"))?,
            pixmask_fraction: pixmask
                .index_axis(Axis(0), k)
                .to_owned()
                .into_dimensionality::<Ix2>()
                .map_err(|_| dim_err("pixmask_fraction"))?,
            chi2pix: chi2
                .index_axis(Axis(0), k)
                .to_owned()
                .into_dimensionality::<Ix2>()
                .map_err(|_| dim_err("chi2pix"))?,
            pixels: resolved.pixels,
            model,
        };
        out.push((resolved, result));
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use comm_core::{SoloComm, ThreadComm};
    use solver_api::{BatchedSolver, HostSolver, OpticsModel};
    use std::thread;

    fn setup(nspec: usize, nfullwave: usize) -> (OpticsModel, Array2<f64>, Array2<f64>) {
        let optics = OpticsModel::synthetic(nspec, nfullwave);
        let mut phot = Array2::zeros((nspec, nfullwave));
        for s in 0..nspec {
            for w in 0..nfullwave {
                phot[[s, w]] = 100.0 * (s + 1) as f64 + w as f64;
            }
        }
        let image = optics.project_image(&phot);
        let ivar = Array2::ones((optics.nrows, optics.ncols));
        (optics, image, ivar)
    }

    fn options(bspecmin: usize, nwave: usize) -> BundleOptions {
        BundleOptions {
            bspecmin,
            bundlesize: 10,
            nsubbundles: 2,
            nwave,
            nwavestep: 50,
            wavepad: 10,
            ndiag: 3,
            regularize: 0.0,
            clip_scale: 0.0,
            psferr: 0.01,
            want_model: true,
        }
    }

    #[test]
    fn test_solo_extraction() {
        let (optics, image, ivar) = setup(10, 180);
        let solver = HostSolver::new(optics);
        let opts = options(0, 100);

        let bundle = extract_bundle::<SoloComm>(image.view(), ivar.view(), &opts, None, &solver)
            .unwrap()
            .unwrap();

        assert_eq!(bundle.flux.dim(), (10, 100));
        // Trace sampling recovers the projected pattern: bundle bin w is
        // padded bin w + wavepad.
        for s in 0..10 {
            for w in 0..100 {
                assert_eq!(
                    bundle.flux[[s, w]],
                    100.0 * (s + 1) as f64 + (w + 10) as f64,
                );
            }
        }
        assert!(bundle.pixels.is_some());
        assert!(bundle.modelimage.sum() > 0.0);
    }

    #[test]
    fn test_batched_solo_matches_host() {
        let (optics, image, ivar) = setup(10, 180);
        let host = HostSolver::new(optics.clone());
        let batched = BatchedSolver::new(optics, None);
        let opts = options(0, 100);

        let a = extract_bundle::<SoloComm>(image.view(), ivar.view(), &opts, None, &host)
            .unwrap()
            .unwrap();
        let b = extract_bundle::<SoloComm>(image.view(), ivar.view(), &opts, None, &batched)
            .unwrap()
            .unwrap();

        assert_eq!(a.flux, b.flux);
        assert_eq!(a.ivar, b.ivar);
        assert_eq!(a.rdiags, b.rdiags);
        assert_eq!(a.modelimage, b.modelimage);
        assert_eq!(a.pixels, b.pixels);
    }

    fn distributed_bundle(workers: usize, solver_kind: &str) -> BundleOutput {
        let (optics, image, ivar) = setup(10, 180);
        let kind = solver_kind.to_string();
        let handles: Vec<_> = ThreadComm::world(workers)
            .into_iter()
            .map(|comm| {
                let optics = optics.clone();
                let image = image.clone();
                let ivar = ivar.clone();
                let kind = kind.clone();
                thread::spawn(move || {
                    let solver: Box<dyn PatchSolver> = match kind.as_str() {
                        "batched" => Box::new(BatchedSolver::new(optics, None)),
                        _ => Box::new(HostSolver::new(optics)),
                    };
                    extract_bundle(
                        image.view(),
                        ivar.view(),
                        &options(0, 100),
                        Some(&comm),
                        solver.as_ref(),
                    )
                    .unwrap()
                })
            })
            .collect();
        let mut outputs: Vec<Option<BundleOutput>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Only the root assembles.
        for o in &outputs[1..] {
            assert!(o.is_none());
        }
        outputs.remove(0).expect("root returns the bundle")
    }

    #[test]
    fn test_distributed_matches_solo_per_patch() {
        let (optics, image, ivar) = setup(10, 180);
        let solver = HostSolver::new(optics);
        let solo = extract_bundle::<SoloComm>(
            image.view(),
            ivar.view(),
            &options(0, 100),
            None,
            &solver,
        )
        .unwrap()
        .unwrap();

        for workers in [2, 3] {
            let dist = distributed_bundle(workers, "host");
            assert_eq!(dist.flux, solo.flux, "{workers}-worker flux differs");
            assert_eq!(dist.ivar, solo.ivar);
            assert_eq!(dist.rdiags, solo.rdiags);
            assert_eq!(dist.modelimage, solo.modelimage);
        }
    }

    #[test]
    fn test_distributed_matches_solo_batched() {
        let (optics, image, ivar) = setup(10, 180);
        let solver = BatchedSolver::new(optics, None);
        let solo = extract_bundle::<SoloComm>(
            image.view(),
            ivar.view(),
            &options(0, 100),
            None,
            &solver,
        )
        .unwrap()
        .unwrap();

        let dist = distributed_bundle(2, "batched");
        assert_eq!(dist.flux, solo.flux);
        assert_eq!(dist.ivar, solo.ivar);
        assert_eq!(dist.rdiags, solo.rdiags);
        assert_eq!(dist.pixmask_fraction, solo.pixmask_fraction);
        assert_eq!(dist.modelimage, solo.modelimage);
    }

    #[test]
    fn test_off_image_bundle() {
        let (mut optics, _, _) = setup(10, 180);
        optics.row_origin = -100_000;
        let image = Array2::zeros((optics.nrows, optics.ncols));
        let ivar = Array2::ones((optics.nrows, optics.ncols));
        let solver = HostSolver::new(optics);

        let bundle = extract_bundle::<SoloComm>(
            image.view(),
            ivar.view(),
            &options(0, 100),
            None,
            &solver,
        )
        .unwrap()
        .unwrap();

        assert!(bundle.pixels.is_none());
        assert_eq!(bundle.modelimage.dim(), (0, 0));
        assert!(bundle.flux.iter().all(|&v| v == 0.0));
    }
}
