// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The size-1 communicator.

use crate::{CommError, Communicator};
use ndarray::ArrayD;

/// A group containing only the calling worker.
///
/// Every collective degenerates to the identity: broadcast returns the
/// caller's own value, gather wraps it in a one-element vector, barrier
/// returns immediately, and every split is the same singleton world.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloComm;

impl SoloComm {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast<T: Clone + Send + 'static>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, CommError> {
        if root != 0 {
            return Err(CommError::RootOutOfRange { root, size: 1 });
        }
        value.ok_or(CommError::MissingBroadcastValue { rank: 0 })
    }

    fn gather<T: Send + 'static>(
        &self,
        value: T,
        root: usize,
    ) -> Result<Option<Vec<T>>, CommError> {
        if root != 0 {
            return Err(CommError::RootOutOfRange { root, size: 1 });
        }
        Ok(Some(vec![value]))
    }

    fn gather_concat(
        &self,
        array: ArrayD<f64>,
        root: usize,
    ) -> Result<Option<ArrayD<f64>>, CommError> {
        if root != 0 {
            return Err(CommError::RootOutOfRange { root, size: 1 });
        }
        Ok(Some(array))
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }

    fn split(&self, _color: usize, _key: usize) -> Result<Self, CommError> {
        Ok(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    #[test]
    fn test_identity_collectives() {
        let comm = SoloComm::new();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.broadcast(Some(42u32), 0).unwrap(), 42);
        assert_eq!(comm.gather("x", 0).unwrap(), Some(vec!["x"]));
        comm.barrier().unwrap();
        let sub = comm.split(3, 1).unwrap();
        assert_eq!(sub.size(), 1);
    }

    #[test]
    fn test_gather_concat_identity() {
        let comm = SoloComm::new();
        let a = ArrayD::from_elem(vec![2, 3], 1.5);
        let out = comm.gather_concat(a.clone(), 0).unwrap().unwrap();
        assert_eq!(out, a);
    }

    #[test]
    fn test_bad_root_rejected() {
        let comm = SoloComm::new();
        assert!(comm.broadcast(Some(1), 1).is_err());
        assert!(comm.gather(1, 2).is_err());
    }

    #[test]
    fn test_broadcast_requires_value() {
        let comm = SoloComm::new();
        assert!(comm.broadcast::<u32>(None, 0).is_err());
    }
}
