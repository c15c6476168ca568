/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress reporting messages, sinks, and helper functions for block encoding.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for encoding and error evaluation.

use std::fmt::Debug;
use std::sync::{Arc, mpsc};
use std::thread;

/// Progress events emitted while blocks are encoded and checked.
#[derive(Debug, Clone)]
pub enum ProgressMsg {
    /// One dimension of the separable solve of a model has finished.
    DimensionEncoded { gid: usize, model: String, dim: usize },

    /// An accepted or rejected step of the rational weight solve.
    WeightIteration {
        gid: usize,
        model: String,
        iter: usize,
        sse: f64,
        accepted: bool,
    },

    /// Every model of a block has been fitted.
    BlockEncoded { gid: usize, nctrl_total: usize },

    /// Error statistics of one variable have been computed.
    ErrorComputed {
        gid: usize,
        var: usize,
        rms: f64,
        max: f64,
    },

    /// Arbitrary informational message.
    Message { message: String },
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a channel.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs a handler closure for each progress message.
///
/// The thread exits once every clone of the returned sink has been dropped.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Optional sink gated by a verbosity level.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reporter {
    sink: Option<Arc<dyn ProgressSink>>,
    verbose: u8,
}

impl Reporter {
    pub(crate) fn new(sink: Option<Arc<dyn ProgressSink>>, verbose: u8) -> Self {
        Self { sink, verbose }
    }

    /// Emits `msg` when a sink is attached and `verbose >= level`.
    #[inline]
    pub(crate) fn emit(&self, level: u8, msg: impl FnOnce() -> ProgressMsg) {
        if let Some(sink) = &self.sink {
            if self.verbose >= level {
                sink.emit(msg());
            }
        }
    }
}
