// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end frame extraction.
//!
//! These tests exercise the complete flow (topology planning, input
//! broadcast, strided bundle dispatch, patch solves, bundle assembly,
//! frame gather, finalization) across worker-world shapes: solo,
//! one cooperating bundle group, multiple bundle groups with a frame
//! group, and one-worker-per-bundle. The synthetic optics project a
//! known photon pattern, so the expected frame is known in closed form.

use comm_core::{Communicator, SoloComm, ThreadComm};
use extraction::{extract_frame, ExtractError, ExtractionConfig, FrameOutput};
use ndarray::Array2;
use solver_api::OpticsModel;
use std::thread;
use topology::AcceleratorConfig;

const NSPEC: usize = 20;
const NWAVE: usize = 100;
const WAVEPAD: usize = 10;
const NWAVESTEP: usize = 50;
// Padded grid: NWAVE + 2*WAVEPAD + NWAVESTEP.
const NFULLWAVE: usize = NWAVE + 2 * WAVEPAD + NWAVESTEP;

/// Photon counts: spectrum s carries `100*(s+1) + w` at padded bin w.
fn phot_pattern(nspec: usize, nfullwave: usize) -> Array2<f64> {
    let mut phot = Array2::zeros((nspec, nfullwave));
    for s in 0..nspec {
        for w in 0..nfullwave {
            phot[[s, w]] = 100.0 * (s + 1) as f64 + w as f64;
        }
    }
    phot
}

fn setup(optics: &OpticsModel) -> (Array2<f64>, Array2<f64>) {
    let image = optics.project_image(&phot_pattern(optics.nspec, NFULLWAVE));
    let ivar = Array2::ones((optics.nrows, optics.ncols));
    (image, ivar)
}

fn base_config() -> ExtractionConfig {
    ExtractionConfig {
        // dw = 1.0 keeps flux density numerically equal to counts.
        wavelength: Some(format!("0,{},1.0", NWAVE - 1)),
        specmin: 0,
        nspec: NSPEC,
        bundlesize: 5,
        nsubbundles: 1,
        nwavestep: NWAVESTEP,
        wavepad: WAVEPAD,
        model: true,
        ..Default::default()
    }
}

fn solo_frame(optics: &OpticsModel, config: &ExtractionConfig) -> FrameOutput {
    let (image, ivar) = setup(optics);
    extract_frame(
        Some(image),
        Some(ivar),
        Some(optics.clone()),
        config,
        &SoloComm::new(),
    )
    .unwrap()
    .unwrap()
}

/// Runs extraction on an n-worker world; rank 0's frame is returned.
fn world_frame(workers: usize, optics: &OpticsModel, config: &ExtractionConfig) -> FrameOutput {
    let handles: Vec<_> = ThreadComm::world(workers)
        .into_iter()
        .map(|comm| {
            let optics = optics.clone();
            let config = config.clone();
            thread::spawn(move || {
                // Only the data-owning root supplies the inputs.
                let (image, ivar, model) = if comm.rank() == 0 {
                    let (image, ivar) = setup(&optics);
                    (Some(image), Some(ivar), Some(optics))
                } else {
                    (None, None, None)
                };
                extract_frame(image, ivar, model, &config, &comm).unwrap()
            })
        })
        .collect();

    let mut outputs: Vec<Option<FrameOutput>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (rank, out) in outputs.iter().enumerate().skip(1) {
        assert!(out.is_none(), "rank {rank} should not return a frame");
    }
    outputs.remove(0).expect("rank 0 returns the frame")
}

fn assert_frames_equal(a: &FrameOutput, b: &FrameOutput) {
    assert_eq!(a.specflux, b.specflux);
    assert_eq!(a.specivar, b.specivar);
    assert_eq!(a.specmask, b.specmask);
    assert_eq!(a.rdiags, b.rdiags);
    assert_eq!(a.pixmask_fraction, b.pixmask_fraction);
    assert_eq!(a.chi2pix, b.chi2pix);
    assert_eq!(a.modelimage, b.modelimage);
}

// ── Closed-form solo extraction ────────────────────────────────

#[test]
fn test_solo_recovers_projected_pattern() {
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let frame = solo_frame(&optics, &base_config());

    assert_eq!(frame.specflux.dim(), (NSPEC, NWAVE));
    // Output bin w reads padded bin w + WAVEPAD; dw == 1.
    for s in 0..NSPEC {
        for w in 0..NWAVE {
            assert_eq!(
                frame.specflux[[s, w]],
                100.0 * (s + 1) as f64 + (w + WAVEPAD) as f64,
                "wrong flux at spectrum {s} bin {w}"
            );
        }
    }
    assert!(frame.specmask.iter().all(|&m| !m));
    assert_eq!(frame.rdiags.dim(), (NSPEC, 2 * optics.hsizey + 1, NWAVE));

    // The model image reproduces every pixel the traces consumed (the
    // synthetic image is nonzero only on traces, and padding overlaps
    // only double-count what neighboring patches both read).
    let model = frame.modelimage.as_ref().unwrap();
    assert_eq!(model.dim(), (optics.nrows, optics.ncols));
    assert!(model.sum() > 0.0);
}

#[test]
fn test_partial_final_tile_is_stitched() {
    // 80 target bins tiled by 50 → the second tile keeps only 30.
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let config = ExtractionConfig {
        wavelength: Some("0,79,1.0".into()),
        ..base_config()
    };
    let frame = solo_frame(&optics, &config);
    assert_eq!(frame.specflux.dim(), (NSPEC, 80));
    for s in 0..NSPEC {
        for w in 0..80 {
            assert_eq!(
                frame.specflux[[s, w]],
                100.0 * (s + 1) as f64 + (w + WAVEPAD) as f64,
            );
        }
    }
}

// ── Distributed worlds match solo ──────────────────────────────

#[test]
fn test_single_bundle_group_matches_solo() {
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let config = base_config();
    let solo = solo_frame(&optics, &config);

    for workers in [2, 3] {
        let dist = world_frame(workers, &optics, &config);
        assert_frames_equal(&solo, &dist);
    }
}

#[test]
fn test_frame_groups_match_solo() {
    // 4 workers split into 2 bundle groups of 2; the 4 bundles are
    // strided across groups and re-gathered through the frame group.
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let config = ExtractionConfig {
        ranks_per_bundle: Some(2),
        ..base_config()
    };
    let solo = solo_frame(&optics, &base_config());
    let dist = world_frame(4, &optics, &config);
    assert_frames_equal(&solo, &dist);
}

#[test]
fn test_one_worker_per_bundle_matches_solo() {
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let config = ExtractionConfig {
        ranks_per_bundle: Some(1),
        ..base_config()
    };
    let solo = solo_frame(&optics, &base_config());
    let dist = world_frame(2, &optics, &config);
    assert_frames_equal(&solo, &dist);
}

#[test]
fn test_batched_solver_matches_host() {
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let host = solo_frame(&optics, &base_config());

    // Solo batched.
    let batched_config = ExtractionConfig {
        solver: "batched".into(),
        ..base_config()
    };
    let batched = solo_frame(&optics, &batched_config);
    assert_frames_equal(&host, &batched);

    // Distributed batched with an accelerator binding: 2 workers on one
    // device cooperate on each bundle with the bulk gather path.
    let accel_config = ExtractionConfig {
        solver: "batched".into(),
        accel: AcceleratorConfig::devices(1),
        ..base_config()
    };
    let dist = world_frame(2, &optics, &accel_config);
    assert_frames_equal(&host, &dist);
}

// ── Off-image behavior ─────────────────────────────────────────

#[test]
fn test_patches_off_the_detector_edge() {
    // Shift the grid 80 rows below the detector: the first wavelength
    // tile of every bundle misses the image entirely, the second is
    // clipped. Off-image patches keep their dense-array slots (zeros)
    // and never touch the model image.
    let mut optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    optics.row_origin = -80;
    let config = base_config();
    let frame = solo_frame(&optics, &config);

    for s in 0..NSPEC {
        for w in 0..NWAVE {
            // Output bin w sits on detector row w + WAVEPAD - 80.
            let row = w as i64 + WAVEPAD as i64 - 80;
            let expect = if row >= 0 {
                100.0 * (s + 1) as f64 + (w + WAVEPAD) as f64
            } else {
                0.0
            };
            assert_eq!(frame.specflux[[s, w]], expect, "spectrum {s} bin {w}");
            assert_eq!(frame.specmask[[s, w]], row < 0);
        }
    }

    // Distributed extraction of the same degenerate frame agrees.
    let dist = world_frame(2, &optics, &config);
    assert_frames_equal(&frame, &dist);
}

#[test]
fn test_blank_image_extracts_zero_model() {
    // An all-zero image yields all-zero patch models; the assemblers
    // must treat them as "no contribution" without raising.
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let image = Array2::zeros((optics.nrows, optics.ncols));
    let ivar = Array2::ones((optics.nrows, optics.ncols));
    let frame = extract_frame(
        Some(image),
        Some(ivar),
        Some(optics),
        &base_config(),
        &SoloComm::new(),
    )
    .unwrap()
    .unwrap();

    assert!(frame.specflux.iter().all(|&v| v == 0.0));
    assert!(frame.modelimage.unwrap().iter().all(|&v| v == 0.0));
}

// ── Fatal preconditions abort before collectives ───────────────

#[test]
fn test_preflight_fault_aborts_every_worker() {
    // bundlesize 25 with nsubbundles 4 violates divisibility; every
    // worker must fail fast instead of deadlocking in a collective.
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let config = ExtractionConfig {
        bundlesize: 25,
        nsubbundles: 4,
        ..base_config()
    };

    let handles: Vec<_> = ThreadComm::world(2)
        .into_iter()
        .map(|comm| {
            let optics = optics.clone();
            let config = config.clone();
            thread::spawn(move || {
                let (image, ivar) = setup(&optics);
                extract_frame(Some(image), Some(ivar), Some(optics), &config, &comm)
            })
        })
        .collect();

    for h in handles {
        let err = h.join().unwrap().unwrap_err();
        assert!(matches!(err, ExtractError::ConfigError(_)));
        assert!(err.to_string().contains("bundlesize (25)"));
    }
}

#[test]
fn test_unknown_solver_is_fatal() {
    let optics = OpticsModel::synthetic(NSPEC, NFULLWAVE);
    let (image, ivar) = setup(&optics);
    let config = ExtractionConfig {
        solver: "quantum".into(),
        ..base_config()
    };
    let err = extract_frame(
        Some(image),
        Some(ivar),
        Some(optics),
        &config,
        &SoloComm::new(),
    )
    .unwrap_err();
    assert!(matches!(err, ExtractError::ConfigError(_)));
}
