// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the extraction engine.

/// Errors that can occur during frame extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A configuration precondition failed. Detected before any
    /// collective operation; the whole run must abort.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Topology planning failed.
    #[error("topology error: {0}")]
    Topology(#[from] topology::TopologyError),

    /// The wavelength grid could not be built.
    #[error("wavelength grid error: {0}")]
    Grid(#[from] patch_planner::PlanError),

    /// The per-patch solver failed; no partial result may enter assembly.
    #[error("solver error: {0}")]
    Solver(#[from] solver_api::SolverError),

    /// A collective operation failed.
    #[error("communicator error: {0}")]
    Comm(#[from] comm_core::CommError),

    /// Patch results could not be assembled.
    #[error("assembly error: {0}")]
    Assembly(String),
}
