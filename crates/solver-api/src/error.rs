// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for patch solvers.

/// Errors a patch solver may report.
///
/// Numerical failures inside a solver are fatal for the owning worker;
/// a partial or garbage result must never silently enter assembly.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The image and inverse-variance arrays disagree in shape.
    #[error("image shape {image:?} does not match ivar shape {ivar:?}")]
    ShapeMismatch {
        image: (usize, usize),
        ivar: (usize, usize),
    },

    /// The request addresses spectra the optics model does not trace.
    #[error("request covers spectra {start}..{stop} but optics traces only {nspec}")]
    SpectrumOutOfRange {
        start: usize,
        stop: usize,
        nspec: usize,
    },

    /// The numerical solve failed for a patch.
    #[error("patch solve failed: {0}")]
    SolveFailed(String),
}
