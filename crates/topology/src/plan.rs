// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Topology planning.

use crate::TopologyError;
use comm_core::Communicator;

/// Accelerator availability, injected by the caller.
///
/// Device discovery is an external concern; the planner only needs to
/// know whether accelerators were requested and how many are visible.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct AcceleratorConfig {
    /// Whether extraction should run on accelerator devices.
    pub requested: bool,
    /// Number of devices visible to this process.
    pub visible_devices: usize,
}

impl AcceleratorConfig {
    /// No accelerators: the host-only configuration.
    pub fn host_only() -> Self {
        Self::default()
    }

    /// Accelerators requested with `n` visible devices.
    pub fn devices(n: usize) -> Self {
        Self {
            requested: true,
            visible_devices: n,
        }
    }
}

/// The accelerator device a worker is pinned to for its lifetime.
///
/// Acquired once per process during topology planning and passed
/// explicitly to solver construction, never read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceBinding(pub usize);

/// The immutable result of topology planning for one worker.
///
/// `bundle_comm` joins the workers cooperating on one bundle;
/// `frame_comm` joins the leaders of distinct bundle groups so their
/// bundles can be gathered into one frame. Either may be absent: a
/// single group covering the whole world needs no frame-level
/// communication, and one-worker bundle groups need no bundle-level
/// communication.
#[derive(Debug)]
pub struct Topology<C> {
    /// Cross-group communicator joining same-bundle-rank workers.
    pub frame_comm: Option<C>,
    /// Communicator joining the workers of this bundle group.
    pub bundle_comm: Option<C>,
    /// Which bundle group this worker belongs to.
    pub bundle_group: usize,
    /// This worker's rank within its bundle group.
    pub bundle_rank: usize,
    /// Stride between bundle-group ids when walking the bundle list.
    pub bundle_stride: usize,
    /// Device binding, when accelerators are in use.
    pub device: Option<DeviceBinding>,
}

impl<C: Communicator> Topology<C> {
    /// Returns `true` if this worker assembles its bundle group's output.
    pub fn is_bundle_root(&self) -> bool {
        self.bundle_rank == 0
    }

    /// Returns a human-readable summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "topology: bundle group {} (rank {}), stride {}, frame comm: {}, bundle comm: {}, device: {}",
            self.bundle_group,
            self.bundle_rank,
            self.bundle_stride,
            self.frame_comm.is_some(),
            self.bundle_comm.is_some(),
            match self.device {
                Some(DeviceBinding(d)) => format!("{d}"),
                None => "none".into(),
            },
        )
    }
}

/// One worker's place in the planned topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct WorkerAssignment {
    /// Global rank.
    pub rank: usize,
    /// Bundle group the worker belongs to.
    pub bundle_group: usize,
    /// Rank within the bundle group.
    pub bundle_rank: usize,
    /// Device binding, when accelerators are in use.
    pub device: Option<DeviceBinding>,
}

/// The pure arithmetic behind [`plan_topology`]: every worker's
/// group/device assignment, computed without touching a communicator.
///
/// Inspection tooling prints this when previewing a deployment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopologyLayout {
    /// Per-rank assignments, indexed by rank.
    pub assignments: Vec<WorkerAssignment>,
    /// Nominal workers per bundle group (the last group may be ragged).
    pub group_size: usize,
    /// Stride between bundle-group ids when walking the bundle list.
    pub bundle_stride: usize,
}

/// Computes every worker's group/device assignment without touching a
/// communicator.
pub fn layout(
    size: usize,
    accel: AcceleratorConfig,
    ranks_per_bundle: Option<usize>,
) -> Result<TopologyLayout, TopologyError> {
    if ranks_per_bundle == Some(0) {
        return Err(TopologyError::EmptyBundleGroup);
    }

    let (device_count, workers_per_device) = if accel.requested {
        if accel.visible_devices == 0 {
            return Err(TopologyError::NoDevices);
        }
        // Excess devices beyond the worker count are ignored.
        let device_count = accel.visible_devices.min(size);
        if size % device_count != 0 {
            return Err(TopologyError::WorkersNotDivisible {
                workers: size,
                devices: device_count,
            });
        }
        (Some(device_count), size / device_count)
    } else {
        (None, size)
    };

    let group_size = ranks_per_bundle.unwrap_or(workers_per_device);
    let bundle_stride = (size - 1) / group_size + 1;
    let assignments = (0..size)
        .map(|rank| WorkerAssignment {
            rank,
            bundle_group: rank / group_size,
            bundle_rank: rank % group_size,
            device: device_count.map(|_| DeviceBinding(rank / workers_per_device)),
        })
        .collect();
    Ok(TopologyLayout {
        assignments,
        group_size,
        bundle_stride,
    })
}

/// Plans the worker/device topology for this worker.
///
/// Steps:
/// 1. With accelerators: cap the device count at the worker count,
///    require the worker count to divide evenly across devices, and bind
///    this worker to `rank / workers_per_device`.
/// 2. Bundle-group size is the `ranks_per_bundle` override when given,
///    else workers-per-device (accelerated) or the whole world (host).
/// 3. Group id and in-group rank follow from integer division/remainder
///    of the global rank.
/// 4. With more than one bundle group, same-bundle-rank workers form a
///    frame group; bundle groups larger than one worker additionally get
///    their own communicator.
///
/// Precondition failures return before any collective is entered.
pub fn plan_topology<C: Communicator>(
    comm: &C,
    accel: AcceleratorConfig,
    ranks_per_bundle: Option<usize>,
) -> Result<Topology<C>, TopologyError> {
    let rank = comm.rank();
    let size = comm.size();

    let TopologyLayout {
        assignments,
        group_size,
        bundle_stride,
    } = layout(size, accel, ranks_per_bundle)?;
    let WorkerAssignment {
        bundle_group,
        bundle_rank,
        device,
        ..
    } = assignments[rank];
    if let Some(DeviceBinding(d)) = device {
        tracing::debug!("rank {rank} bound to device {d}");
    }

    let (frame_comm, bundle_comm) = if bundle_stride > 1 {
        // Bundles are processed in parallel across groups, so the frame
        // must be gathered across groups at the end.
        if group_size > 1 {
            let frame = comm.split(bundle_rank, bundle_group)?;
            let bundle = comm.split(bundle_group, bundle_rank)?;
            (Some(frame), Some(bundle))
        } else {
            // One worker per bundle: no bundle-level communication.
            (Some(comm.clone()), None)
        }
    } else {
        // A single group covers everyone: bundle-level only.
        (None, Some(comm.clone()))
    };

    Ok(Topology {
        frame_comm,
        bundle_comm,
        bundle_group,
        bundle_rank,
        bundle_stride,
        device,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use comm_core::{SoloComm, ThreadComm};
    use std::thread;

    fn run_world<T, F>(n: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(ThreadComm) -> T + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = ThreadComm::world(n)
            .into_iter()
            .map(|comm| {
                let f = f.clone();
                thread::spawn(move || f(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_solo_host_topology() {
        let comm = SoloComm::new();
        let topo = plan_topology(&comm, AcceleratorConfig::host_only(), None).unwrap();
        assert!(topo.frame_comm.is_none());
        assert!(topo.bundle_comm.is_some());
        assert_eq!(topo.bundle_group, 0);
        assert_eq!(topo.bundle_stride, 1);
        assert!(topo.device.is_none());
        assert!(topo.is_bundle_root());
    }

    #[test]
    fn test_host_world_is_one_bundle_group() {
        let results = run_world(4, |comm| {
            let topo = plan_topology(&comm, AcceleratorConfig::host_only(), None).unwrap();
            (
                topo.bundle_group,
                topo.bundle_stride,
                topo.frame_comm.is_some(),
                topo.bundle_comm.is_some(),
            )
        });
        for r in results {
            assert_eq!(r, (0, 1, false, true));
        }
    }

    #[test]
    fn test_override_two_groups_of_two() {
        // 4 workers, ranks_per_bundle 2 → bundle groups {0,1} and {2,3},
        // frame group formed from the bundle-rank-0 members {0,2}.
        let results = run_world(4, |comm| {
            let topo = plan_topology(&comm, AcceleratorConfig::host_only(), Some(2)).unwrap();
            let frame_members = topo
                .frame_comm
                .as_ref()
                .map(|fc| fc.gather(comm.rank(), 0).unwrap());
            let bundle_members = topo
                .bundle_comm
                .as_ref()
                .map(|bc| bc.gather(comm.rank(), 0).unwrap());
            (topo.bundle_group, topo.bundle_rank, frame_members, bundle_members)
        });

        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 0);
        assert_eq!(results[2].0, 1);
        assert_eq!(results[3].0, 1);

        // Rank 0 is root of the bundle-rank-0 frame group {0, 2}.
        assert_eq!(results[0].2, Some(Some(vec![0, 2])));
        // Bundle groups gather their own members.
        assert_eq!(results[0].3, Some(Some(vec![0, 1])));
        assert_eq!(results[2].3, Some(Some(vec![2, 3])));
    }

    #[test]
    fn test_one_worker_per_bundle() {
        // Override of 1: every worker owns bundles alone; the frame comm
        // is the whole world and there is no bundle comm.
        let results = run_world(3, |comm| {
            let topo = plan_topology(&comm, AcceleratorConfig::host_only(), Some(1)).unwrap();
            (
                topo.bundle_group,
                topo.bundle_stride,
                topo.frame_comm.as_ref().map(|c| c.size()),
                topo.bundle_comm.is_some(),
            )
        });
        assert_eq!(results[0], (0, 3, Some(3), false));
        assert_eq!(results[1], (1, 3, Some(3), false));
        assert_eq!(results[2], (2, 3, Some(3), false));
    }

    #[test]
    fn test_device_binding() {
        // 4 workers, 2 devices → 2 workers per device.
        let results = run_world(4, |comm| {
            let topo = plan_topology(&comm, AcceleratorConfig::devices(2), None).unwrap();
            topo.device.unwrap().0
        });
        assert_eq!(results, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_excess_devices_ignored() {
        let comm = SoloComm::new();
        let topo = plan_topology(&comm, AcceleratorConfig::devices(8), None).unwrap();
        assert_eq!(topo.device, Some(DeviceBinding(0)));
        assert_eq!(topo.bundle_stride, 1);
    }

    #[test]
    fn test_divisibility_fault() {
        let results = run_world(3, |comm| {
            plan_topology(&comm, AcceleratorConfig::devices(2), None).err()
        });
        for err in results {
            assert!(matches!(
                err,
                Some(TopologyError::WorkersNotDivisible {
                    workers: 3,
                    devices: 2
                })
            ));
        }
    }

    #[test]
    fn test_no_devices_fault() {
        let comm = SoloComm::new();
        let err = plan_topology(&comm, AcceleratorConfig::devices(0), None).unwrap_err();
        assert!(matches!(err, TopologyError::NoDevices));
    }

    #[test]
    fn test_zero_group_size_fault() {
        let comm = SoloComm::new();
        let err = plan_topology(&comm, AcceleratorConfig::host_only(), Some(0)).unwrap_err();
        assert!(matches!(err, TopologyError::EmptyBundleGroup));
    }

    #[test]
    fn test_layout_table() {
        let l = layout(4, AcceleratorConfig::devices(2), None).unwrap();
        assert_eq!(l.group_size, 2);
        assert_eq!(l.bundle_stride, 2);
        let groups: Vec<usize> = l.assignments.iter().map(|a| a.bundle_group).collect();
        assert_eq!(groups, vec![0, 0, 1, 1]);
        let devices: Vec<usize> = l.assignments.iter().map(|a| a.device.unwrap().0).collect();
        assert_eq!(devices, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_layout_ragged_last_group() {
        // 5 workers, groups of 2: the last group holds a single worker.
        let l = layout(5, AcceleratorConfig::host_only(), Some(2)).unwrap();
        assert_eq!(l.bundle_stride, 3);
        assert_eq!(l.assignments[4].bundle_group, 2);
        assert_eq!(l.assignments[4].bundle_rank, 0);
    }
}
