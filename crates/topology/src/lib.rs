// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # topology
//!
//! Plans how a world of workers is carved into *bundle groups* (workers
//! cooperating on one bundle) and a *frame group* (group leaders that
//! gather distinct bundles into one frame), and which accelerator device
//! each worker binds to.
//!
//! The mapping lets a deployment trade parallelism granularity: more
//! workers cooperating deeply on one bundle (useful for patch-level
//! accelerator batching) versus more groups each owning independent
//! bundles (useful for scaling across many bundles).
//!
//! Planning runs once at startup and returns an immutable [`Topology`].
//! All fatal precondition checks happen here, before any collective
//! operation is entered; a post-hoc failure on a single worker would
//! deadlock the rest of the group inside a blocking collective.

mod error;
mod plan;

pub use error::TopologyError;
pub use plan::{
    layout, plan_topology, AcceleratorConfig, DeviceBinding, Topology, TopologyLayout,
    WorkerAssignment,
};
