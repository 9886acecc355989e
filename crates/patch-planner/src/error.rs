// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the patch planner.

/// Errors that can occur while building a wavelength grid or patch plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The wavelength range is empty or reversed.
    #[error("invalid wavelength range: wmin {wmin} must be below wmax {wmax}")]
    InvalidWavelengthRange { wmin: f64, wmax: f64 },

    /// The wavelength step is zero, negative, or non-finite.
    #[error("invalid wavelength step: {dw}")]
    InvalidWavelengthStep { dw: f64 },
}
