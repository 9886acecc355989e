// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for collective operations.

/// Errors that can occur during a collective operation.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// The requested root rank does not exist in the group.
    #[error("root rank {root} out of range for group of size {size}")]
    RootOutOfRange { root: usize, size: usize },

    /// The broadcasting root did not supply a value.
    #[error("rank {rank} is the broadcast root but supplied no value")]
    MissingBroadcastValue { rank: usize },

    /// A peer sent a payload of an unexpected type: the group's
    /// collectives were invoked out of order.
    #[error("collective payload type mismatch from rank {src} (op {op}); collectives must run in the same order on every rank")]
    TypeMismatch { src: usize, op: u64 },

    /// The world was torn down while a collective was in flight.
    #[error("communicator disconnected: a peer endpoint has been dropped")]
    Disconnected,

    /// Bulk-gathered arrays had incompatible shapes.
    #[error("bulk gather shape mismatch: {0}")]
    ShapeMismatch(String),
}
