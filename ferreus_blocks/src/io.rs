/////////////////////////////////////////////////////////////////////////////////////////////
//
// Writes and reads the whole distributed block collection to and from one shared JSON file.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # io
//!
//! Shared-file persistence of a [`Master`]'s blocks.
//!
//! The file is a versioned JSON envelope
//! `{ format, version, nblocks, blocks: [{ gid, link, state }] }` with blocks
//! sorted by global id. Block state is whatever the caller's extractor
//! produces. Ranks are not recorded: the file can be read back by any number
//! of ranks with any [`Assigner`], and neighbour owners are recomputed on read.

use crate::{
    assigner::Assigner,
    comm::Communicator,
    error::{BlocksError, Result},
    link::Link,
    master::Master,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::Arc,
};

const JSON_FORMAT_NAME: &str = "ferreus_blocks.json";
const JSON_VERSION: u32 = 1;
const ROOT: usize = 0;

// First byte of each gathered part.
const PART_OK: u8 = 0;
const PART_FAILED: u8 = 1;

#[derive(Serialize, Deserialize)]
struct BlockRecord<S> {
    gid: usize,
    link: Link,
    state: S,
}

/// Borrowing envelope for SAVE.
#[derive(Serialize)]
struct JsonEnvelopeRef<'a> {
    format: &'static str,
    version: u32,
    nblocks: usize,
    blocks: &'a [BlockRecord<serde_json::Value>],
}

/// Owning envelope for LOAD. Block states stay untyped until they are known to be local.
#[derive(Deserialize)]
struct JsonEnvelopeOwned {
    format: String,
    version: u32,
    nblocks: usize,
    blocks: Vec<BlockRecord<serde_json::Value>>,
}

impl<B> Master<B> {
    /// Writes every block of every rank into the single file at `path`.
    ///
    /// Collective: all ranks must call it. Each rank converts its blocks with
    /// `extract`, rank 0 gathers and writes the file, and no rank returns
    /// before the file is complete. A rank whose blocks fail to serialize
    /// still takes part in the gather, and then nothing is written.
    ///
    /// # Errors
    /// The failing rank gets its own serialization error. Every other rank
    /// gets [`BlocksError::Communication`] naming the rank that failed,
    /// including rank 0 when the file itself cannot be written.
    pub fn write<S, P, F>(&self, path: P, mut extract: F) -> Result<()>
    where
        S: Serialize,
        P: AsRef<Path>,
        F: FnMut(usize, &B) -> S,
    {
        let path_ref = path.as_ref();

        let local = self.serialize_records(path_ref, &mut extract);
        let payload = match &local {
            Ok(bytes) => {
                let mut payload = Vec::with_capacity(bytes.len() + 1);
                payload.push(PART_OK);
                payload.extend_from_slice(bytes);
                payload
            }
            Err(_) => vec![PART_FAILED],
        };

        let comm = self.communicator();
        let gathered = comm.gather(ROOT, payload)?;

        let (failed_rank, outcome) = match gathered {
            Some(parts) => {
                let outcome = match parts.iter().position(|p| p.first() != Some(&PART_OK)) {
                    Some(rank) => Err(write_failure(rank, path_ref)),
                    None => write_gathered(path_ref, parts.iter().map(|p| &p[1..]).collect()),
                };
                let failed_rank = match &outcome {
                    Ok(()) => None,
                    Err(BlocksError::Communication { peer, .. }) => Some(*peer),
                    Err(_) => Some(ROOT),
                };
                let status = failed_rank
                    .map(|r| (r as u64).to_le_bytes().to_vec())
                    .unwrap_or_default();
                comm.broadcast(ROOT, Some(status))?;
                (failed_rank, outcome)
            }
            None => {
                let status = comm.broadcast(ROOT, None)?;
                let failed_rank = <[u8; 8]>::try_from(status.as_slice())
                    .ok()
                    .map(|b| u64::from_le_bytes(b) as usize);
                (failed_rank, Ok(()))
            }
        };
        comm.barrier();

        local?;
        outcome?;
        match failed_rank {
            Some(rank) => Err(write_failure(rank, path_ref)),
            None => Ok(()),
        }
    }

    fn serialize_records<S, F>(&self, path: &Path, extract: &mut F) -> Result<Vec<u8>>
    where
        S: Serialize,
        F: FnMut(usize, &B) -> S,
    {
        let mut records = Vec::with_capacity(self.len());
        for (gid, block) in self.iter() {
            let state = serde_json::to_value(extract(gid, block)).map_err(|source| {
                BlocksError::Serialize {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            let link = self.link(gid).cloned().unwrap_or_default();
            records.push(BlockRecord { gid, link, state });
        }
        serde_json::to_vec(&records).map_err(|source| BlocksError::Serialize {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the blocks `assigner` gives the calling rank from the file at `path`.
    ///
    /// If the assigner's block count is unknown it is resolved from the file.
    /// Every local block is built with `build` before any is registered, so a
    /// failure leaves nothing half-populated.
    ///
    /// # Errors
    /// Any [`BlocksError`] from opening, parsing or validating the file, or
    /// whatever `build` returns.
    pub fn read<S, P, E, F>(
        comm: Arc<dyn Communicator>,
        path: P,
        assigner: &mut dyn Assigner,
        mut build: F,
    ) -> std::result::Result<Self, E>
    where
        S: DeserializeOwned,
        P: AsRef<Path>,
        E: From<BlocksError>,
        F: FnMut(usize, S) -> std::result::Result<B, E>,
    {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|source| BlocksError::Io {
            action: "opening",
            path: path_ref.to_path_buf(),
            source,
        })?;
        let env: JsonEnvelopeOwned =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| BlocksError::Parse {
                path: path_ref.to_path_buf(),
                source,
            })?;

        if env.format != JSON_FORMAT_NAME {
            return Err(BlocksError::FormatMismatch {
                path: path_ref.to_path_buf(),
                found: env.format,
                expected: JSON_FORMAT_NAME,
            }
            .into());
        }
        if env.version != JSON_VERSION {
            return Err(BlocksError::VersionMismatch {
                path: path_ref.to_path_buf(),
                found: env.version,
                expected: JSON_VERSION,
            }
            .into());
        }
        check_records(&env.blocks, env.nblocks)?;

        match assigner.nblocks() {
            None => assigner.set_nblocks(env.nblocks),
            Some(n) if n != env.nblocks => {
                return Err(BlocksError::BlockCountMismatch {
                    path: path_ref.to_path_buf(),
                    expected: n,
                    found: env.nblocks,
                }
                .into())
            }
            Some(_) => {}
        }
        if assigner.size() != comm.size() {
            return Err(BlocksError::Decomposition(format!(
                "assigner expects {} ranks but the communicator has {}",
                assigner.size(),
                comm.size()
            ))
            .into());
        }

        let local = assigner.local_gids(comm.rank())?;
        let mut built = Vec::with_capacity(local.len());
        for record in env.blocks.into_iter().filter(|r| local.binary_search(&r.gid).is_ok()) {
            let state: S =
                serde_json::from_value(record.state).map_err(|source| BlocksError::Parse {
                    path: path_ref.to_path_buf(),
                    source,
                })?;
            let mut link = record.link;
            link.reassign(&*assigner)?;
            built.push((record.gid, build(record.gid, state)?, link));
        }

        let mut master = Master::new(comm);
        for (gid, block, link) in built {
            master.add(gid, block, link)?;
        }
        log::debug!(
            "rank {} read blocks {:?} from {}",
            master.rank(),
            master.gids(),
            path_ref.display()
        );
        Ok(master)
    }
}

fn write_failure(rank: usize, path: &Path) -> BlocksError {
    BlocksError::Communication {
        peer: rank,
        reason: format!("rank {rank} failed while writing {}", path.display()),
    }
}

fn write_gathered(path: &Path, parts: Vec<&[u8]>) -> Result<()> {
    let mut blocks: Vec<BlockRecord<serde_json::Value>> = Vec::new();
    for part in parts {
        let records: Vec<BlockRecord<serde_json::Value>> =
            serde_json::from_slice(part).map_err(|source| BlocksError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        blocks.extend(records);
    }
    blocks.sort_by_key(|r| r.gid);
    let nblocks = blocks.len();
    check_records(&blocks, nblocks)?;

    let file = File::create(path).map_err(|source| BlocksError::Io {
        action: "creating",
        path: path.to_path_buf(),
        source,
    })?;
    let mut w = BufWriter::new(file);
    let env = JsonEnvelopeRef {
        format: JSON_FORMAT_NAME,
        version: JSON_VERSION,
        nblocks,
        blocks: &blocks,
    };
    serde_json::to_writer(&mut w, &env).map_err(|source| BlocksError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    w.flush().map_err(|source| BlocksError::Io {
        action: "flushing",
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {nblocks} blocks to {}", path.display());
    Ok(())
}

/// Records must be sorted and hold each id of `0..nblocks` exactly once.
fn check_records<S>(records: &[BlockRecord<S>], nblocks: usize) -> Result<()> {
    if records.len() != nblocks {
        return Err(BlocksError::BlockState {
            gid: records.len(),
            reason: format!("file declares {nblocks} blocks but holds {}", records.len()),
        });
    }
    for (expected, record) in records.iter().enumerate() {
        if record.gid != expected {
            return Err(BlocksError::BlockState {
                gid: record.gid,
                reason: format!("expected block {expected} at this position"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assigner::{ContiguousAssigner, RoundRobinAssigner},
        comm::{SingleProcess, ThreadWorld},
    };
    use std::{collections::HashMap, time::Duration};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ferreus_blocks_{}_{name}.json", std::process::id()))
    }

    #[test]
    fn write_then_read_with_more_ranks() {
        let path = temp_path("reshape");

        // written by 2 ranks with 3 blocks each
        ThreadWorld::run(2, |comm| {
            let rank = comm.rank();
            let mut master = Master::new(Arc::new(comm));
            let assigner = ContiguousAssigner::new(2, Some(6));
            for gid in assigner.local_gids(rank).unwrap() {
                master.add(gid, gid * 100, Link::new()).unwrap();
            }
            master.write(&path, |_, block| *block).unwrap();
        });

        // read by 3 ranks, round robin, block count discovered from the file
        let read = ThreadWorld::run(3, |comm| {
            let mut assigner = RoundRobinAssigner::new(3, None);
            let master = Master::read(Arc::new(comm), &path, &mut assigner, |_, state: usize| {
                Ok::<_, BlocksError>(state)
            })
            .unwrap();
            assert_eq!(assigner.nblocks(), Some(6));
            master.iter().map(|(gid, b)| (gid, *b)).collect::<Vec<_>>()
        });

        assert_eq!(read[0], vec![(0, 0), (3, 300)]);
        assert_eq!(read[2], vec![(2, 200), (5, 500)]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn serialization_failure_on_one_rank_is_reported_on_every_rank() {
        let path = temp_path("unserializable");

        // tuple keys cannot become JSON object keys
        let results = ThreadWorld::new(2).timeout(Duration::from_secs(10)).spawn(|comm| {
            let rank = comm.rank();
            let mut master = Master::new(Arc::new(comm));
            master.add(rank, rank, Link::new()).unwrap();
            master.write(&path, |gid, _| {
                let mut state = HashMap::new();
                if gid == 1 {
                    state.insert((gid, gid), gid);
                }
                state
            })
        });

        assert!(matches!(results[0], Err(BlocksError::Communication { peer: 1, .. })));
        assert!(matches!(results[1], Err(BlocksError::Serialize { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn failed_build_registers_nothing() {
        let path = temp_path("partial");
        let mut master = Master::new(Arc::new(SingleProcess::new()));
        for gid in 0..3usize {
            master.add(gid, gid, Link::new()).unwrap();
        }
        master.write(&path, |_, b| *b).unwrap();

        let mut assigner = ContiguousAssigner::new(1, None);
        let result = Master::<usize>::read(
            Arc::new(SingleProcess::new()),
            &path,
            &mut assigner,
            |gid, state: usize| {
                if gid == 2 {
                    Err(BlocksError::BlockState {
                        gid,
                        reason: "rejected".into(),
                    })
                } else {
                    Ok(state)
                }
            },
        );
        assert!(matches!(result, Err(BlocksError::BlockState { gid: 2, .. })));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn mismatched_envelope_is_rejected() {
        let path = temp_path("format");
        std::fs::write(
            &path,
            r#"{"format":"something_else","version":1,"nblocks":0,"blocks":[]}"#,
        )
        .unwrap();
        let mut assigner = ContiguousAssigner::new(1, None);
        let result = Master::<usize>::read(
            Arc::new(SingleProcess::new()),
            &path,
            &mut assigner,
            |_, s: usize| Ok::<_, BlocksError>(s),
        );
        assert!(matches!(result, Err(BlocksError::FormatMismatch { .. })));

        std::fs::write(
            &path,
            r#"{"format":"ferreus_blocks.json","version":1,"nblocks":2,"blocks":[]}"#,
        )
        .unwrap();
        let result = Master::<usize>::read(
            Arc::new(SingleProcess::new()),
            &path,
            &mut assigner,
            |_, s: usize| Ok::<_, BlocksError>(s),
        );
        assert!(matches!(result, Err(BlocksError::BlockState { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
