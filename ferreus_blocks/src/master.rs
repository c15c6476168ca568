/////////////////////////////////////////////////////////////////////////////////////////////
//
// Process-local registry of owned blocks with traversal and neighbour message exchange.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # master
//!
//! [`Master`] owns the blocks resident on one rank.
//!
//! Blocks are registered once with [`Master::add`] and then visited with
//! [`Master::foreach`] (or [`Master::foreach_par`]). During a visit the block
//! receives a [`BlockProxy`] through which it can queue messages for the
//! neighbours in its [`Link`] and read the messages delivered by the last
//! [`Master::exchange`].
//!
//! An exchange is collective: every rank must call it. Each rank sends
//! exactly one bundle to every other rank (possibly empty) before receiving,
//! so no ordering between ranks can deadlock.

use crate::{
    comm::Communicator,
    error::{BlockFailures, BlocksError, Result},
    link::Link,
};
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Tag range used for exchange rounds.
const EXCHANGE_TAG_BASE: u32 = 1 << 20;

#[derive(Debug)]
struct Slot<B> {
    gid: usize,
    block: B,
    link: Link,
    incoming: BTreeMap<usize, Vec<u8>>,
    outgoing: Vec<Outgoing>,
}

#[derive(Debug)]
struct Outgoing {
    target: usize,
    rank: usize,
    payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    source: usize,
    target: usize,
    payload: Vec<u8>,
}

/// Handle given to a block during traversal for talking to its neighbours.
pub struct BlockProxy<'a> {
    gid: usize,
    rank: usize,
    link: &'a Link,
    incoming: &'a mut BTreeMap<usize, Vec<u8>>,
    outgoing: &'a mut Vec<Outgoing>,
}

impl<'a> BlockProxy<'a> {
    pub fn gid(&self) -> usize {
        self.gid
    }

    /// Rank the block lives on.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn link(&self) -> &Link {
        self.link
    }

    /// Queues `value` for neighbour `target`; delivered by the next exchange.
    /// A second enqueue to the same target in one round replaces the first.
    ///
    /// # Errors
    /// [`BlocksError::NotANeighbour`] if `target` is not in this block's link,
    /// or [`BlocksError::Payload`] if `value` cannot be serialized.
    pub fn enqueue<T: Serialize>(&mut self, target: usize, value: &T) -> Result<()> {
        let neighbour = self
            .link
            .neighbour(target)
            .ok_or(BlocksError::NotANeighbour {
                gid: self.gid,
                target,
            })?;
        let payload = serde_json::to_vec(value).map_err(|source| BlocksError::Payload {
            gid: self.gid,
            source,
        })?;
        self.outgoing.retain(|o| o.target != target);
        self.outgoing.push(Outgoing {
            target,
            rank: neighbour.rank,
            payload,
        });
        Ok(())
    }

    /// Takes the message `source` sent in the last exchange, if any.
    pub fn dequeue<T: DeserializeOwned>(&mut self, source: usize) -> Result<Option<T>> {
        match self.incoming.remove(&source) {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BlocksError::Payload {
                    gid: source,
                    source: e,
                }),
            None => Ok(None),
        }
    }

    /// Global ids with an undelivered message waiting, ascending.
    pub fn incoming_gids(&self) -> Vec<usize> {
        self.incoming.keys().copied().collect()
    }
}

/// Blocks owned by the local rank, kept in ascending global id order.
pub struct Master<B> {
    comm: Arc<dyn Communicator>,
    slots: Vec<Slot<B>>,
    round: u32,
}

impl<B> Master<B> {
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            comm,
            slots: Vec::new(),
            round: 0,
        }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn communicator(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Registers `block` under `gid`.
    ///
    /// # Errors
    /// [`BlocksError::DuplicateBlock`] if `gid` is already registered here.
    pub fn add(&mut self, gid: usize, block: B, link: Link) -> Result<()> {
        match self.slots.binary_search_by_key(&gid, |s| s.gid) {
            Ok(_) => Err(BlocksError::DuplicateBlock {
                gid,
                rank: self.rank(),
            }),
            Err(pos) => {
                log::debug!("rank {} registered block {gid} with {} neighbours", self.rank(), link.len());
                self.slots.insert(
                    pos,
                    Slot {
                        gid,
                        block,
                        link,
                        incoming: BTreeMap::new(),
                        outgoing: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Unregisters `gid`, returning its block and link.
    pub fn remove(&mut self, gid: usize) -> Result<(B, Link)> {
        let pos = self.position(gid)?;
        let slot = self.slots.remove(pos);
        Ok((slot.block, slot.link))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Local global ids, ascending.
    pub fn gids(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.gid).collect()
    }

    pub fn is_local(&self, gid: usize) -> bool {
        self.position(gid).is_ok()
    }

    pub fn block(&self, gid: usize) -> Option<&B> {
        self.position(gid).ok().map(|pos| &self.slots[pos].block)
    }

    pub fn block_mut(&mut self, gid: usize) -> Option<&mut B> {
        match self.position(gid) {
            Ok(pos) => Some(&mut self.slots[pos].block),
            Err(_) => None,
        }
    }

    pub fn link(&self, gid: usize) -> Option<&Link> {
        self.position(gid).ok().map(|pos| &self.slots[pos].link)
    }

    /// `(gid, block)` pairs in ascending gid order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &B)> {
        self.slots.iter().map(|s| (s.gid, &s.block))
    }

    /// Consumes the master, returning `(gid, block, link)` in ascending gid order.
    pub fn into_blocks(self) -> Vec<(usize, B, Link)> {
        self.slots
            .into_iter()
            .map(|s| (s.gid, s.block, s.link))
            .collect()
    }

    /// Applies `f` to every local block exactly once, in ascending gid order.
    ///
    /// A failing block does not stop the pass. All failures are returned
    /// together once every block has been visited.
    pub fn foreach<E, F>(&mut self, mut f: F) -> std::result::Result<(), BlockFailures<E>>
    where
        F: FnMut(&mut B, &mut BlockProxy<'_>) -> std::result::Result<(), E>,
    {
        let rank = self.rank();
        let failures: Vec<(usize, E)> = self
            .slots
            .iter_mut()
            .filter_map(|slot| {
                let (mut proxy, block) = slot.split(rank);
                f(block, &mut proxy).err().map(|e| (proxy.gid, e))
            })
            .collect();
        BlockFailures::from_unsorted(failures).into_result()
    }

    /// Parallel [`Master::foreach`] over local blocks using rayon.
    pub fn foreach_par<E, F>(&mut self, f: F) -> std::result::Result<(), BlockFailures<E>>
    where
        B: Send,
        E: Send,
        F: Fn(&mut B, &mut BlockProxy<'_>) -> std::result::Result<(), E> + Sync,
    {
        let rank = self.rank();
        let failures: Vec<(usize, E)> = self
            .slots
            .par_iter_mut()
            .filter_map(|slot| {
                let (mut proxy, block) = slot.split(rank);
                f(block, &mut proxy).err().map(|e| (proxy.gid, e))
            })
            .collect();
        BlockFailures::from_unsorted(failures).into_result()
    }

    /// Delivers every queued message to its target block.
    ///
    /// Messages to local neighbours are moved directly; messages to remote
    /// neighbours travel in one bundle per destination rank. Messages left
    /// undelivered by the previous round are discarded.
    pub fn exchange(&mut self) -> Result<()> {
        let rank = self.rank();
        let size = self.size();
        let tag = EXCHANGE_TAG_BASE + (self.round % EXCHANGE_TAG_BASE);
        self.round = self.round.wrapping_add(1);

        for slot in self.slots.iter_mut() {
            slot.incoming.clear();
        }

        let mut local = Vec::new();
        let mut remote: BTreeMap<usize, Vec<Message>> = BTreeMap::new();
        for slot in self.slots.iter_mut() {
            for out in slot.outgoing.drain(..) {
                let message = Message {
                    source: slot.gid,
                    target: out.target,
                    payload: out.payload,
                };
                if out.rank == rank {
                    local.push(message);
                } else {
                    remote.entry(out.rank).or_default().push(message);
                }
            }
        }

        let mut sent = 0;
        for dest in (0..size).filter(|d| *d != rank) {
            let bundle = remote.remove(&dest).unwrap_or_default();
            sent += bundle.len();
            let bytes = serde_json::to_vec(&bundle).map_err(|source| BlocksError::Payload {
                gid: usize::MAX,
                source,
            })?;
            self.comm.send(dest, tag, bytes)?;
        }
        if let Some((dest, _)) = remote.into_iter().next() {
            return Err(BlocksError::Communication {
                peer: dest,
                reason: "neighbour rank is outside the communicator".into(),
            });
        }

        let mut received = 0;
        for source in (0..size).filter(|s| *s != rank) {
            let bytes = self.comm.recv(source, tag)?;
            let bundle: Vec<Message> =
                serde_json::from_slice(&bytes).map_err(|e| BlocksError::Communication {
                    peer: source,
                    reason: format!("malformed exchange bundle: {e}"),
                })?;
            received += bundle.len();
            local.extend(bundle);
        }

        for message in local {
            let pos = self.position(message.target)?;
            self.slots[pos]
                .incoming
                .insert(message.source, message.payload);
        }

        log::debug!("rank {rank} exchange sent {sent} and received {received} remote messages");
        Ok(())
    }

    fn position(&self, gid: usize) -> Result<usize> {
        self.slots
            .binary_search_by_key(&gid, |s| s.gid)
            .map_err(|_| BlocksError::UnknownBlock {
                gid,
                rank: self.comm.rank(),
            })
    }
}

impl<B> Slot<B> {
    fn split(&mut self, rank: usize) -> (BlockProxy<'_>, &mut B) {
        (
            BlockProxy {
                gid: self.gid,
                rank,
                link: &self.link,
                incoming: &mut self.incoming,
                outgoing: &mut self.outgoing,
            },
            &mut self.block,
        )
    }
}

impl<B: std::fmt::Debug> std::fmt::Debug for Master<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .field("gids", &self.gids())
            .finish()
    }
}
