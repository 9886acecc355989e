// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # solver-api
//!
//! The contract between the patch-decomposition engine and the per-patch
//! extraction kernel, plus two bundled reference implementations.
//!
//! The numerical method that deconvolves one patch (projection-matrix
//! construction, inverse-covariance solve, resolution decorrelation) is
//! an external collaborator. This crate pins down what the engine needs
//! from it: the [`PatchSolver`] trait, the request/result records, and
//! the [`OpticsModel`] handle describing the projection geometry.
//!
//! The bundled solvers stand in for the external kernel so the
//! decomposition, dispatch, and assembly layers are testable end-to-end:
//!
//! - [`HostSolver`] — per-patch aperture extraction on the host.
//! - [`BatchedSolver`] — the accelerator-style strategy: stage every
//!   patch of a group, run one fused pass, finalize each patch. Carries
//!   the worker's device binding as an explicit handle.
//!
//! Which solver runs is a configuration decision made once at startup,
//! never a runtime type inspection.

mod error;
mod host;
mod optics;
mod result;

pub use error::SolverError;
pub use host::{BatchedSolver, HostSolver};
pub use optics::OpticsModel;
pub use result::{PatchRequest, PatchResult};

/// How a solver prefers to be invoked by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// One synchronous call per patch.
    PerPatch,
    /// One fused call per group of patches, amortizing fixed per-call
    /// overhead on accelerator hardware.
    Batched,
}

/// The per-patch extraction kernel consumed by the dispatcher.
///
/// Implementations must be pure with respect to their inputs: a solver
/// never mutates the image or inverse-variance it is handed.
///
/// A patch that falls entirely outside the image is a valid result with
/// `pixels == None`, never an error.
pub trait PatchSolver: Send + Sync {
    /// Human-readable name of this solver.
    fn name(&self) -> &str;

    /// The invocation mode the dispatcher should use.
    fn mode(&self) -> DispatchMode {
        DispatchMode::PerPatch
    }

    /// Extracts a single patch.
    fn extract(&self, request: &PatchRequest<'_>) -> Result<PatchResult, SolverError>;

    /// Extracts a group of patches in one call.
    ///
    /// The default implementation loops over [`extract`](Self::extract);
    /// batched solvers override it with a fused pass. Outputs are
    /// positionally parallel to `requests`.
    fn extract_batch(
        &self,
        requests: &[PatchRequest<'_>],
    ) -> Result<Vec<PatchResult>, SolverError> {
        requests.iter().map(|r| self.extract(r)).collect()
    }
}
