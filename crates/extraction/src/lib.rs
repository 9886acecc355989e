// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # extraction
//!
//! The divide-and-conquer extraction engine: dispatches patches across a
//! worker topology, invokes the per-patch solver, and reassembles the
//! partial results into bundle- and frame-level spectra.
//!
//! # Pipeline
//! ```text
//! plan_topology ─→ extract_frame
//!                    │  per bundle (strided across bundle groups):
//!                    │    plan_bundle ─→ extract_bundle ─→ BundleOutput
//!                    │                      (solver, gather, barrier)
//!                    ▼
//!                  frame gather ─→ assemble_frame ─→ FrameOutput
//! ```
//!
//! Control flows top-down (frame → bundles → patches); results flow
//! bottom-up and are merged at each level. Dense per-spectrum arrays
//! tile exactly (each patch owns a disjoint keep region) while model
//! images *accumulate*, because wavelength padding makes neighboring
//! patches overlap in pixel space.
//!
//! All cross-worker coordination uses the blocking collectives of
//! [`comm_core::Communicator`]; fatal configuration faults are detected
//! before any collective is entered.

mod assembly;
mod config;
mod dispatch;
mod error;
mod frame;
mod metrics;

pub use assembly::{assemble_bundle, BundleOutput};
pub use config::ExtractionConfig;
pub use dispatch::{extract_bundle, BundleOptions};
pub use error::ExtractError;
pub use frame::{assemble_frame, extract_frame, FrameOutput};
pub use metrics::ExtractionMetrics;
