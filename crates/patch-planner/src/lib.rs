// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # patch-planner
//!
//! Partitions a spectrum bundle into independently extractable patches and
//! tracks where each patch lands in every coordinate system it touches.
//!
//! A *bundle* is a fixed-size contiguous group of spectra extracted under
//! one local instrument-response model. The planner splits a bundle into
//! `nsubbundles` equal spectrum groups and tiles the wavelength range of
//! each group into consecutive windows of `nwavestep` bins, carrying
//! `wavepad` extra bins on each edge to absorb boundary artifacts from the
//! optics convolution. The padding is discarded after extraction via the
//! patch's keep span.
//!
//! # Two-Phase Descriptors
//!
//! A [`Patch`] is immutable once planned. The extraction step learns which
//! detector pixels the patch actually covers, producing a
//! [`ResolvedPatch`], the planned descriptor plus its pixel bounding box
//! (or none, for a patch that falls entirely off the image). Assembly only
//! ever sees resolved patches, so the one-shot lifecycle is explicit in
//! the type system.
//!
//! # Example
//! ```
//! use patch_planner::plan_bundle;
//!
//! // bundle of 25 spectra, one sub-bundle, 100 wavelength bins tiled
//! // in steps of 50 with 10 bins of edge padding
//! let subbundles = plan_bundle(0, 25, 1, 100, 50, 10, 7);
//! assert_eq!(subbundles.len(), 1);
//! assert_eq!(subbundles[0].len(), 2);
//! ```

mod error;
mod partition;
mod patch;
mod span;
mod wavegrid;

pub use error::PlanError;
pub use partition::plan_bundle;
pub use patch::{Patch, ResolvedPatch};
pub use span::{PixelRegion, Span};
pub use wavegrid::WavelengthGrid;
