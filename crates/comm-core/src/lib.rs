// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # comm-core
//!
//! Blocking collective primitives for groups of cooperating workers.
//!
//! The extraction pipeline is SPMD: every worker runs the same control
//! flow and synchronizes through broadcast, gather, and barrier. This
//! crate defines that surface as the [`Communicator`] trait so a real
//! multi-process transport (e.g. an MPI binding) can be plugged in
//! out-of-tree, and ships two implementations:
//!
//! - [`SoloComm`] — the degenerate size-1 group; every collective is a
//!   no-op. This is the non-distributed code path.
//! - [`ThreadComm`] — an in-process world of N endpoints connected by
//!   crossbeam channels, used by the test suite and by single-host
//!   multi-worker runs.
//!
//! # Ordering Contract
//!
//! Collectives must be invoked in the same order on every rank of a
//! group. Each call is matched by a per-group sequence number, so a rank
//! that skips a collective the others enter will deadlock the group,
//! the same contract a real message-passing transport imposes.
//!
//! # Example
//! ```
//! use comm_core::{Communicator, ThreadComm};
//!
//! let handles: Vec<_> = ThreadComm::world(3)
//!     .into_iter()
//!     .map(|comm| {
//!         std::thread::spawn(move || {
//!             let rank = comm.rank();
//!             comm.gather(rank * 10, 0).unwrap()
//!         })
//!     })
//!     .collect();
//!
//! let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
//! assert_eq!(results[0], Some(vec![0, 10, 20]));
//! assert_eq!(results[1], None);
//! ```

mod error;
mod solo;
mod thread;

pub use error::CommError;
pub use solo::SoloComm;
pub use thread::ThreadComm;

use ndarray::ArrayD;

/// Blocking collective operations over a fixed group of workers.
///
/// Ranks are dense in `[0, size)`. All collectives are synchronizing from
/// the caller's point of view; a stalled peer blocks the group
/// indefinitely (acceptable for a batch pipeline with no cancellation
/// requirement; fatal precondition checks happen *before* any collective
/// is entered).
pub trait Communicator: Clone + Send + Sized + 'static {
    /// This worker's rank within the group.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Broadcasts a value from `root` to every rank.
    ///
    /// The root passes `Some(value)`; other ranks pass `None` and receive
    /// the root's value.
    fn broadcast<T: Clone + Send + 'static>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, CommError>;

    /// Gathers one value per rank to `root`, in rank order.
    ///
    /// Returns `Some(values)` on the root and `None` elsewhere.
    fn gather<T: Send + 'static>(
        &self,
        value: T,
        root: usize,
    ) -> Result<Option<Vec<T>>, CommError>;

    /// Bulk numeric gather: concatenates each rank's array along axis 0
    /// at the root.
    ///
    /// This is the specialized path for large per-rank result stacks:
    /// one message per rank instead of one per element. All ranks must
    /// supply arrays whose trailing dimensions agree.
    fn gather_concat(
        &self,
        array: ArrayD<f64>,
        root: usize,
    ) -> Result<Option<ArrayD<f64>>, CommError>;

    /// Blocks until every rank of the group has arrived.
    fn barrier(&self) -> Result<(), CommError>;

    /// Splits the group into sub-groups by `color`; ranks within each
    /// sub-group are ordered by `(key, parent rank)`.
    ///
    /// Every rank of the parent group must participate.
    fn split(&self, color: usize, key: usize) -> Result<Self, CommError>;
}
