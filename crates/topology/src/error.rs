// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for topology planning.

/// Errors that can occur while planning the worker/device topology.
///
/// All of these are configuration faults: they are detected before any
/// collective operation and must abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Accelerators were requested but no device is visible.
    #[error("accelerators requested but no device is visible")]
    NoDevices,

    /// The worker count does not divide evenly across devices.
    #[error("worker count {workers} must be evenly divisible by device count {devices}")]
    WorkersNotDivisible { workers: usize, devices: usize },

    /// The bundle-group size override is zero.
    #[error("ranks_per_bundle must be at least 1")]
    EmptyBundleGroup,

    /// A communicator split failed while forming sub-groups.
    #[error("communicator error while forming groups: {0}")]
    Comm(#[from] comm_core::CommError),
}
