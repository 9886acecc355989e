// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-process communicator backed by crossbeam channels.
//!
//! A [`ThreadComm`] world wires N endpoints together with one unbounded
//! channel per rank. Collectives are matched by a per-endpoint operation
//! sequence number: because the pipeline is SPMD, the k-th collective on
//! one rank pairs with the k-th collective on every other rank. Messages
//! that arrive ahead of the collective currently being serviced are
//! stashed and replayed in order.
//!
//! Each endpoint is intended to be driven by one worker thread. Cloning a
//! `ThreadComm` clones a handle to the same endpoint, not a new rank.

use crate::{CommError, Communicator};
use crossbeam_channel::{unbounded, Receiver, Sender};
use ndarray::{ArrayD, Axis};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Payload = Box<dyn Any + Send>;

struct Envelope {
    op: u64,
    src: usize,
    payload: Payload,
}

struct World {
    size: usize,
    senders: Vec<Sender<Envelope>>,
}

struct Mailbox {
    rx: Receiver<Envelope>,
    stash: Vec<Envelope>,
}

struct Endpoint {
    world: Arc<World>,
    rank: usize,
    next_op: AtomicU64,
    mailbox: Mutex<Mailbox>,
}

/// One rank's handle into an in-process communicator world.
#[derive(Clone)]
pub struct ThreadComm {
    inner: Arc<Endpoint>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

impl ThreadComm {
    /// Creates a world of `n` connected endpoints, one per rank.
    ///
    /// # Panics
    /// Panics if `n == 0`.
    pub fn world(n: usize) -> Vec<ThreadComm> {
        assert!(n > 0, "communicator world must have at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| unbounded()).unzip();
        let world = Arc::new(World { size: n, senders });
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| ThreadComm {
                inner: Arc::new(Endpoint {
                    world: Arc::clone(&world),
                    rank,
                    next_op: AtomicU64::new(0),
                    mailbox: Mutex::new(Mailbox {
                        rx,
                        stash: Vec::new(),
                    }),
                }),
            })
            .collect()
    }

    fn next_op(&self) -> u64 {
        self.inner.next_op.fetch_add(1, Ordering::SeqCst)
    }

    fn check_root(&self, root: usize) -> Result<(), CommError> {
        if root >= self.size() {
            return Err(CommError::RootOutOfRange {
                root,
                size: self.size(),
            });
        }
        Ok(())
    }

    fn send(&self, dst: usize, op: u64, payload: Payload) -> Result<(), CommError> {
        self.inner.world.senders[dst]
            .send(Envelope {
                op,
                src: self.inner.rank,
                payload,
            })
            .map_err(|_| CommError::Disconnected)
    }

    /// Blocks until the envelope for `(op, src)` arrives, stashing any
    /// envelopes for later collectives that arrive first.
    fn recv_from(&self, op: u64, src: usize) -> Result<Payload, CommError> {
        let mut mb = self.inner.mailbox.lock().expect("mailbox lock poisoned");
        if let Some(pos) = mb.stash.iter().position(|e| e.op == op && e.src == src) {
            return Ok(mb.stash.swap_remove(pos).payload);
        }
        loop {
            let env = mb.rx.recv().map_err(|_| CommError::Disconnected)?;
            if env.op == op && env.src == src {
                return Ok(env.payload);
            }
            mb.stash.push(env);
        }
    }

    fn downcast<T: 'static>(payload: Payload, src: usize, op: u64) -> Result<T, CommError> {
        payload
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| CommError::TypeMismatch { src, op })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.inner.rank
    }

    fn size(&self) -> usize {
        self.inner.world.size
    }

    fn broadcast<T: Clone + Send + 'static>(
        &self,
        value: Option<T>,
        root: usize,
    ) -> Result<T, CommError> {
        self.check_root(root)?;
        let op = self.next_op();
        if self.rank() == root {
            let v = value.ok_or(CommError::MissingBroadcastValue { rank: root })?;
            for dst in 0..self.size() {
                if dst != root {
                    self.send(dst, op, Box::new(v.clone()))?;
                }
            }
            Ok(v)
        } else {
            let payload = self.recv_from(op, root)?;
            Self::downcast(payload, root, op)
        }
    }

    fn gather<T: Send + 'static>(
        &self,
        value: T,
        root: usize,
    ) -> Result<Option<Vec<T>>, CommError> {
        self.check_root(root)?;
        let op = self.next_op();
        if self.rank() == root {
            let mut own = Some(value);
            let mut out = Vec::with_capacity(self.size());
            for src in 0..self.size() {
                if src == root {
                    out.push(own.take().expect("own value taken once"));
                } else {
                    let payload = self.recv_from(op, src)?;
                    out.push(Self::downcast(payload, src, op)?);
                }
            }
            Ok(Some(out))
        } else {
            self.send(root, op, Box::new(value))?;
            Ok(None)
        }
    }

    fn gather_concat(
        &self,
        array: ArrayD<f64>,
        root: usize,
    ) -> Result<Option<ArrayD<f64>>, CommError> {
        match self.gather(array, root)? {
            None => Ok(None),
            Some(parts) => {
                let views: Vec<_> = parts.iter().map(|a| a.view()).collect();
                let joined = ndarray::concatenate(Axis(0), &views)
                    .map_err(|e| CommError::ShapeMismatch(e.to_string()))?;
                Ok(Some(joined))
            }
        }
    }

    fn barrier(&self) -> Result<(), CommError> {
        let _ = self.gather((), 0)?;
        let token = if self.rank() == 0 { Some(()) } else { None };
        self.broadcast(token, 0)?;
        Ok(())
    }

    fn split(&self, color: usize, key: usize) -> Result<Self, CommError> {
        // All ranks learn every (color, key) assignment.
        let gathered = self.gather((color, key), 0)?;
        let all: Vec<(usize, usize)> = self.broadcast(gathered, 0)?;

        // Members of this color, new ranks ordered by (key, parent rank).
        let mut members: Vec<(usize, usize)> = all
            .iter()
            .enumerate()
            .filter(|(_, (c, _))| *c == color)
            .map(|(parent, (_, k))| (*k, parent))
            .collect();
        members.sort_unstable();
        let leader = members[0].1;

        // The leader wires up the sub-world and hands each member its
        // endpoint through the parent world's channels.
        let op = self.next_op();
        if self.rank() == leader {
            let mut mine = None;
            for (new_rank, sub) in ThreadComm::world(members.len()).into_iter().enumerate() {
                let parent = members[new_rank].1;
                if parent == self.rank() {
                    mine = Some(sub);
                } else {
                    self.send(parent, op, Box::new(sub))?;
                }
            }
            Ok(mine.expect("leader belongs to its own sub-group"))
        } else {
            let payload = self.recv_from(op, leader)?;
            Self::downcast(payload, leader, op)
        }
    }
}
