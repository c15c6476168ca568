/////////////////////////////////////////////////////////////////////////////////////////////
//
// Communicator abstraction with single-process and in-process multi-rank implementations.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # comm
//!
//! The world handle blocks are distributed over.
//!
//! [`Communicator`] is the minimal surface the framework needs from a
//! parallel runtime: rank and size, tagged point-to-point messages of raw
//! bytes, and a barrier. Gather and broadcast are derived from those.
//!
//! Two transports are provided:
//!
//! - [`SingleProcess`]: a world of one rank, with self-sends looped back.
//! - [`ThreadWorld`]: `N` ranks as threads of one process joined by channels,
//!   used to exercise multi-rank behaviour without an external launcher.
//!
//! Messages between one pair of ranks with the same tag are delivered in the
//! order they were sent.

use crate::error::{BlocksError, Result};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Barrier, Mutex,
    },
    thread,
    time::Duration,
};

/// Tag used by the derived collectives.
const COLLECTIVE_TAG: u32 = u32::MAX - 1;

/// Rank/size handle plus tagged byte messaging.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Sends `payload` to `dest`. Must not block waiting for the receiver.
    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()>;

    /// Blocks until a message with `tag` from `source` arrives.
    fn recv(&self, source: usize, tag: u32) -> Result<Vec<u8>>;

    /// Blocks until every rank has entered the barrier.
    fn barrier(&self);

    /// Collects one payload per rank on `root`, ordered by rank. Other ranks get `None`.
    fn gather(&self, root: usize, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>> {
        if self.rank() != root {
            self.send(root, COLLECTIVE_TAG, payload)?;
            return Ok(None);
        }
        let mut all = Vec::with_capacity(self.size());
        let mut own = Some(payload);
        for source in 0..self.size() {
            if source == root {
                all.push(own.take().unwrap_or_default());
            } else {
                all.push(self.recv(source, COLLECTIVE_TAG)?);
            }
        }
        Ok(Some(all))
    }

    /// Distributes the root's payload to every rank. Non-root ranks pass `None`.
    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        if self.rank() == root {
            let payload = payload.unwrap_or_default();
            for dest in (0..self.size()).filter(|d| *d != root) {
                self.send(dest, COLLECTIVE_TAG, payload.clone())?;
            }
            Ok(payload)
        } else {
            self.recv(root, COLLECTIVE_TAG)
        }
    }
}

/// A world consisting of rank 0 only.
#[derive(Debug, Default)]
pub struct SingleProcess {
    loopback: Mutex<HashMap<u32, VecDeque<Vec<u8>>>>,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()> {
        if dest != 0 {
            return Err(BlocksError::Communication {
                peer: dest,
                reason: "single process world has only rank 0".into(),
            });
        }
        let mut queue = self.loopback.lock().map_err(|_| poisoned(0))?;
        queue.entry(tag).or_default().push_back(payload);
        Ok(())
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<u8>> {
        if source != 0 {
            return Err(BlocksError::Communication {
                peer: source,
                reason: "single process world has only rank 0".into(),
            });
        }
        let mut queue = self.loopback.lock().map_err(|_| poisoned(0))?;
        queue
            .get_mut(&tag)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| BlocksError::Communication {
                peer: 0,
                reason: format!("no message with tag {tag} was sent to self"),
            })
    }

    fn barrier(&self) {}
}

#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: u32,
    payload: Vec<u8>,
}

/// One rank of a [`ThreadWorld`].
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Envelope>>,
    receiver: Mutex<Receiver<Envelope>>,
    pending: Mutex<HashMap<(usize, u32), VecDeque<Vec<u8>>>>,
    barrier: Arc<Barrier>,
    timeout: Duration,
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<()> {
        let sender = self.senders.get(dest).ok_or_else(|| BlocksError::Communication {
            peer: dest,
            reason: format!("rank out of range for a world of {}", self.size),
        })?;
        sender
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| BlocksError::Communication {
                peer: dest,
                reason: "receiving rank has shut down".into(),
            })
    }

    fn recv(&self, source: usize, tag: u32) -> Result<Vec<u8>> {
        if source >= self.size {
            return Err(BlocksError::Communication {
                peer: source,
                reason: format!("rank out of range for a world of {}", self.size),
            });
        }

        {
            let mut pending = self.pending.lock().map_err(|_| poisoned(self.rank))?;
            if let Some(payload) = pending.get_mut(&(source, tag)).and_then(|q| q.pop_front()) {
                return Ok(payload);
            }
        }

        let receiver = self.receiver.lock().map_err(|_| poisoned(self.rank))?;
        loop {
            let envelope = receiver.recv_timeout(self.timeout).map_err(|e| {
                let reason = match e {
                    RecvTimeoutError::Timeout => {
                        format!("timed out waiting for tag {tag} after {:?}", self.timeout)
                    }
                    RecvTimeoutError::Disconnected => "all peers have shut down".to_string(),
                };
                BlocksError::Communication {
                    peer: source,
                    reason,
                }
            })?;

            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }

            let mut pending = self.pending.lock().map_err(|_| poisoned(self.rank))?;
            pending
                .entry((envelope.source, envelope.tag))
                .or_default()
                .push_back(envelope.payload);
        }
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

fn poisoned(rank: usize) -> BlocksError {
    BlocksError::Communication {
        peer: rank,
        reason: "message queue lock poisoned".into(),
    }
}

/// Builds `N` connected [`ThreadComm`] ranks inside one process.
///
/// # Examples
///
/// ```
/// use ferreus_blocks::{Communicator, ThreadWorld};
///
/// let sums = ThreadWorld::run(3, |comm| {
///     let next = (comm.rank() + 1) % comm.size();
///     let prev = (comm.rank() + comm.size() - 1) % comm.size();
///     comm.send(next, 7, vec![comm.rank() as u8]).unwrap();
///     comm.recv(prev, 7).unwrap()[0] as usize
/// });
/// assert_eq!(sums, vec![2, 0, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct ThreadWorld {
    size: usize,
    timeout: Duration,
}

impl ThreadWorld {
    /// Default time a `recv` waits before reporting a communication error.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates one connected communicator per rank, in rank order.
    pub fn communicators(&self) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..self.size).map(|_| mpsc::channel::<Envelope>()).unzip();
        let barrier = Arc::new(Barrier::new(self.size));

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank,
                size: self.size,
                senders: senders.clone(),
                receiver: Mutex::new(receiver),
                pending: Mutex::new(HashMap::new()),
                barrier: Arc::clone(&barrier),
                timeout: self.timeout,
            })
            .collect()
    }

    /// Runs `f` once per rank on its own thread and returns the results in rank order.
    ///
    /// A panic on any rank is propagated to the caller.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        Self::new(size).spawn(f)
    }

    /// Like [`ThreadWorld::run`] with this world's settings.
    pub fn spawn<F, R>(&self, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = self.communicators();
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}
