// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The multi-threaded DST decode pipeline.
//!
//! One pipeline is instantiated per opened DST-compressed file. A dedicated reader thread pulls
//! compressed frames from the file's SACD reader and dispatches decode jobs onto the shared
//! worker pool; the consumer pulls decoded frames back in disc order through the process
//! queue. Seeks and close are delivered to the reader thread over a small command channel; a
//! seek drains the queue completely before decoding resumes at the target frame.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use cadenza_core::buffer::{Buffer, BufferPool};
use cadenza_core::dst::DstDecoderFactory;
use cadenza_core::errors::{Error, Result};
use cadenza_core::sacd::{SacdReader, FRAME_SIZE_64, MAX_FRAME_SIZE};
use cadenza_core::tpool::{DispatchError, DispatchMode, ProcessQueue, ThreadPool};

/// Minimum depth of the per-file process queue.
const MIN_QUEUE_DEPTH: usize = 16;

/// One decoded frame (or a terminal marker) delivered to the consumer in serial order.
pub(crate) struct DstJob {
    pub frame_number: u32,
    /// Sentinel: the reader has dispatched every frame of the track.
    pub eof: bool,
    /// A read or decode failure; terminal for the consumer.
    pub error: Option<Error>,
    /// The decoded DSD frame, windowed to its decoded length.
    pub data: Option<Buffer>,
}

impl DstJob {
    fn eof() -> DstJob {
        DstJob { frame_number: 0, eof: true, error: None, data: None }
    }

    fn failed(frame_number: u32, error: Error) -> DstJob {
        DstJob { frame_number, eof: false, error: Some(error), data: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Idle,
    Seek(u32),
    SeekDone,
    Close,
}

struct CommandChannel {
    state: Mutex<Command>,
    cond: Condvar,
}

impl CommandChannel {
    fn new() -> CommandChannel {
        CommandChannel { state: Mutex::new(Command::Idle), cond: Condvar::new() }
    }

    fn current(&self) -> Command {
        *self.state.lock()
    }

    fn signal(&self, command: Command) {
        *self.state.lock() = command;
        self.cond.notify_all();
    }

    /// Reader side: block until a seek or close arrives.
    fn wait_seek_or_close(&self) -> Command {
        let mut state = self.state.lock();
        loop {
            match *state {
                Command::Seek(_) | Command::Close => return *state,
                _ => self.cond.wait(&mut state),
            }
        }
    }
}

pub(crate) struct MtPipeline {
    queue: Arc<ProcessQueue<DstJob>>,
    command: Arc<CommandChannel>,
    reader_thread: Option<JoinHandle<()>>,
}

impl MtPipeline {
    /// Start the pipeline: create the per-file process queue and the dedicated reader thread.
    /// The file's SACD reader moves into the reader thread.
    pub fn start(
        pool: &Arc<ThreadPool>,
        factory: Arc<dyn DstDecoderFactory>,
        reader: Box<dyn SacdReader>,
        channels: u16,
        sample_rate: u32,
        start_frame: u32,
        end_frame: u32,
    ) -> Result<MtPipeline> {
        let depth = (pool.size() * 2).max(MIN_QUEUE_DEPTH);
        let queue = Arc::new(pool.process_queue::<DstJob>(depth));
        let command = Arc::new(CommandChannel::new());

        let thread_state = ReaderThread {
            reader,
            queue: Arc::clone(&queue),
            command: Arc::clone(&command),
            factory,
            channels,
            sample_rate,
            current_frame: start_frame,
            end_frame,
            compressed_pool: BufferPool::new(MAX_FRAME_SIZE),
            decompressed_pool: BufferPool::new(FRAME_SIZE_64 * usize::from(channels)),
        };

        let reader_thread = thread::Builder::new()
            .name("cadenza-vfs-reader".to_string())
            .spawn(move || thread_state.run())
            .map_err(Error::IoError)?;

        debug!("vfs: mt pipeline started (depth {})", depth);

        Ok(MtPipeline { queue, command, reader_thread: Some(reader_thread) })
    }

    /// Pull the next decoded frame in disc order, blocking until one is available. Returns
    /// `None` when the queue has been shut down.
    pub fn next_job(&self) -> Option<DstJob> {
        self.queue.next_result_wait()
    }

    /// Reposition the reader thread. Blocks until the reader has drained every outstanding
    /// job and acknowledged the new frame cursor; after this returns, no pre-seek frame is
    /// ever delivered.
    pub fn seek(&self, frame: u32) {
        self.command.signal(Command::Seek(frame));
        // The reader may be blocked dispatching into a full queue.
        self.queue.wake_dispatch();

        let mut state = self.command.state.lock();
        while *state != Command::SeekDone {
            self.command.cond.wait(&mut state);
        }
        *state = Command::Idle;
    }
}

impl Drop for MtPipeline {
    fn drop(&mut self) {
        self.command.signal(Command::Close);
        self.queue.wake_dispatch();
        self.queue.shutdown();

        if let Some(handle) = self.reader_thread.take() {
            if handle.join().is_err() {
                warn!("vfs: mt reader thread panicked");
            }
        }
    }
}

struct ReaderThread {
    reader: Box<dyn SacdReader>,
    queue: Arc<ProcessQueue<DstJob>>,
    command: Arc<CommandChannel>,
    factory: Arc<dyn DstDecoderFactory>,
    channels: u16,
    sample_rate: u32,
    current_frame: u32,
    end_frame: u32,
    compressed_pool: BufferPool,
    decompressed_pool: BufferPool,
}

impl ReaderThread {
    fn run(mut self) {
        loop {
            while self.current_frame < self.end_frame {
                // Commands are checked before every frame read.
                match self.command.current() {
                    Command::Close => return,
                    Command::Seek(frame) => {
                        self.apply_seek(frame);
                        continue;
                    }
                    _ => {}
                }

                if !self.read_and_dispatch_one() {
                    break;
                }
            }

            // Tell the consumer in-order that the stream ended, then park until the next
            // command. `Force` exempts the sentinel from the depth cap.
            let _ = self.queue.dispatch(DstJob::eof, DispatchMode::Force);

            match self.command.wait_seek_or_close() {
                Command::Close => return,
                Command::Seek(frame) => self.apply_seek(frame),
                _ => {}
            }
        }
    }

    /// Read one compressed frame and dispatch its decode job. Returns false when reading
    /// failed terminally; true when the loop should continue (including an interrupted
    /// dispatch, which re-checks commands).
    fn read_and_dispatch_one(&mut self) -> bool {
        let mut compressed = self.compressed_pool.get();

        let read = match compressed.data_mut() {
            Some(buf) => self.reader.read_frame(self.current_frame, buf),
            None => cadenza_core::errors::read_error("frame buffer unavailable"),
        };

        let size = match read {
            Ok(size) => size,
            Err(err) => {
                warn!("vfs: frame read failed at frame {}: {}", self.current_frame, err);
                drop(compressed);
                let job = DstJob::failed(self.current_frame, err);
                let _ = self.queue.dispatch(move || job, DispatchMode::Force);
                return false;
            }
        };
        compressed.truncate(size);

        let factory = Arc::clone(&self.factory);
        let pool = self.decompressed_pool.clone();
        let channels = self.channels;
        let sample_rate = self.sample_rate;
        let frame_number = self.current_frame;

        let dispatched = self.queue.dispatch(
            move || decode_job(factory, pool, compressed, channels, sample_rate, frame_number),
            DispatchMode::Block,
        );

        match dispatched {
            Ok(()) => {
                self.current_frame += 1;
                true
            }
            // Woken from a full queue: a seek or close is pending. The job (and its pooled
            // buffer) was not enqueued; re-check commands.
            Err(DispatchError::Interrupted) => true,
            Err(_) => false,
        }
    }

    fn apply_seek(&mut self, frame: u32) {
        // Drain the queue: pending input is discarded, in-flight jobs complete, and their
        // results are dropped. The consumer is parked waiting for the acknowledgement, so
        // nothing races the drain.
        self.queue.reset();
        self.current_frame = frame;
        self.command.signal(Command::SeekDone);
    }
}

/// Worker-side decode of one frame. Each job creates its own decoder; the DST codec is not
/// thread-safe.
fn decode_job(
    factory: Arc<dyn DstDecoderFactory>,
    pool: BufferPool,
    compressed: Buffer,
    channels: u16,
    sample_rate: u32,
    frame_number: u32,
) -> DstJob {
    let mut decoder = match factory.create(channels, sample_rate) {
        Ok(decoder) => decoder,
        Err(err) => return DstJob::failed(frame_number, err),
    };

    let mut out = pool.get();
    let decoded = match out.data_mut() {
        Some(buf) => decoder.decode(compressed.data(), buf),
        None => cadenza_core::errors::dst_decode_error("decode buffer unavailable"),
    };

    match decoded {
        Ok(len) => {
            out.truncate(len);
            DstJob { frame_number, eof: false, error: None, data: Some(out) }
        }
        Err(err) => DstJob::failed(frame_number, err),
    }
}
