// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `tpool` module provides a worker thread pool with serially-ordered process queues.
//!
//! Multiple process queues can share the same pool of worker threads, enabling heterogeneous
//! workloads on the same set of threads. Each queue delivers results to its consumer in strict
//! dispatch order (serial-number ordered), regardless of the order in which workers complete
//! them.
//!
//! All shared state is guarded by a single pool mutex. Every queue carries four condition
//! variables (`output_avail`, `input_not_full`, `input_empty`, `none_processing`); every worker
//! has one. The pool owns queue state, keyed by queue id; [`ProcessQueue`] handles hold a
//! non-owning id, so there is no ownership cycle between the two.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::errors::{Error, Result};

type ErasedJob = Box<dyn FnOnce() -> Box<dyn Any + Send> + Send>;

/// How [`ProcessQueue::dispatch`] behaves when the input queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Wait until room opens up.
    Block,
    /// Fail with [`DispatchError::QueueFull`] immediately.
    NonBlock,
    /// Enqueue regardless of queue depth.
    Force,
}

/// Errors returned by [`ProcessQueue::dispatch`].
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// The input queue is at capacity (`NonBlock` mode only).
    QueueFull,
    /// A blocking dispatch was woken by [`ProcessQueue::wake_dispatch`]. The job was not
    /// enqueued; the caller should recheck its command state.
    Interrupted,
    /// The queue has been shut down or destroyed.
    Shutdown,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DispatchError::QueueFull => write!(f, "process queue is full"),
            DispatchError::Interrupted => write!(f, "dispatch interrupted"),
            DispatchError::Shutdown => write!(f, "process queue is shut down"),
        }
    }
}

impl std::error::Error for DispatchError {}

struct JobEntry {
    serial: u64,
    exec: ErasedJob,
}

struct ResultEntry {
    serial: u64,
    data: Box<dyn Any + Send>,
}

struct QueueCvs {
    output_avail: Condvar,
    input_not_full: Condvar,
    input_empty: Condvar,
    none_processing: Condvar,
}

impl QueueCvs {
    fn new() -> QueueCvs {
        QueueCvs {
            output_avail: Condvar::new(),
            input_not_full: Condvar::new(),
            input_empty: Condvar::new(),
            none_processing: Condvar::new(),
        }
    }

    fn broadcast_all(&self) {
        self.output_avail.notify_all();
        self.input_not_full.notify_all();
        self.input_empty.notify_all();
        self.none_processing.notify_all();
    }
}

struct QueueState {
    cvs: Arc<QueueCvs>,
    input: VecDeque<JobEntry>,
    output: Vec<ResultEntry>,
    curr_serial: u64,
    next_serial: u64,
    n_processing: usize,
    qsize: usize,
    shutdown: bool,
    wake_dispatch: bool,
    no_more_input: bool,
}

impl QueueState {
    /// A worker may start another job only while completing it cannot overflow the output list.
    fn has_worker_room(&self) -> bool {
        self.qsize.saturating_sub(self.output.len()) > self.n_processing
    }

    fn backlog(&self) -> usize {
        self.input.len() + self.n_processing + self.output.len()
    }
}

struct PoolState {
    shutdown: bool,
    /// Jobs queued on any attached queue but not yet picked up.
    njobs: usize,
    /// Workers currently parked.
    nwaiting: usize,
    /// Parked flag per worker index.
    parked: Vec<bool>,
    queues: HashMap<u64, QueueState>,
    /// Queue scan order. The front is scanned first; serviced queues rotate to the back, queues
    /// with fresh input move to the front.
    order: Vec<u64>,
    next_queue_id: u64,
}

impl PoolState {
    fn promote(&mut self, id: u64) {
        if let Some(pos) = self.order.iter().position(|&q| q == id) {
            self.order.remove(pos);
            self.order.insert(0, id);
        }
    }

    fn demote(&mut self, id: u64) {
        if let Some(pos) = self.order.iter().position(|&q| q == id) {
            self.order.remove(pos);
            self.order.push(id);
        }
    }
}

struct PoolShared {
    n_workers: usize,
    state: Mutex<PoolState>,
    worker_cvs: Vec<Condvar>,
}

impl PoolShared {
    /// Wake one parked worker if there are more queued jobs than busy workers and the given
    /// queue has room to start one. Moves the queue to the front of the scan order.
    fn wake_next_worker(&self, state: &mut PoolState, id: u64) {
        state.promote(id);

        let room = match state.queues.get(&id) {
            Some(q) => q.has_worker_room(),
            None => return,
        };

        let busy = self.n_workers - state.nwaiting;
        if room && state.njobs > busy {
            if let Some(idx) = state.parked.iter().position(|&p| p) {
                self.worker_cvs[idx].notify_one();
            }
        }
    }
}

fn worker_main(shared: Arc<PoolShared>, idx: usize) {
    let mut state = shared.state.lock();

    while !state.shutdown {
        // Scan queues in order for one with input and room for output.
        let runnable = state.order.iter().copied().find(|id| {
            state
                .queues
                .get(id)
                .map(|q| !q.shutdown && !q.input.is_empty() && q.has_worker_room())
                .unwrap_or(false)
        });

        let Some(id) = runnable else {
            state.nwaiting += 1;
            state.parked[idx] = true;
            shared.worker_cvs[idx].wait(&mut state);
            state.parked[idx] = false;
            state.nwaiting -= 1;
            continue;
        };

        // Process as many items in this queue as possible.
        loop {
            if state.shutdown {
                return;
            }

            let Some(q) = state.queues.get_mut(&id) else { break };
            if q.shutdown || q.input.is_empty() || !q.has_worker_room() {
                break;
            }

            let was_full = q.input.len() >= q.qsize;
            let Some(job) = q.input.pop_front() else { break };
            q.n_processing += 1;

            let cvs = Arc::clone(&q.cvs);
            let serial = job.serial;

            if was_full {
                cvs.input_not_full.notify_all();
            }
            if q.input.is_empty() {
                cvs.input_empty.notify_all();
            }
            state.njobs -= 1;

            drop(state);
            let data = (job.exec)();
            state = shared.state.lock();

            match state.queues.get_mut(&id) {
                Some(q) => {
                    q.n_processing -= 1;
                    if q.n_processing == 0 {
                        cvs.none_processing.notify_all();
                    }
                    q.output.push(ResultEntry { serial, data });
                    if serial == q.next_serial {
                        cvs.output_avail.notify_all();
                    }
                }
                None => {
                    // The queue was destroyed while the job ran; discard the result.
                    cvs.none_processing.notify_all();
                }
            }
        }

        // Out of jobs on this queue; restart the next search from the following one.
        state.demote(id);
    }
}

/// A pool of worker threads shared by any number of process queues.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Create a pool with `n_workers` worker threads (at least one).
    pub fn new(n_workers: usize) -> Result<ThreadPool> {
        let n = n_workers.max(1);

        let shared = Arc::new(PoolShared {
            n_workers: n,
            state: Mutex::new(PoolState {
                shutdown: false,
                njobs: 0,
                nwaiting: 0,
                parked: vec![false; n],
                queues: HashMap::new(),
                order: Vec::new(),
                next_queue_id: 0,
            }),
            worker_cvs: (0..n).map(|_| Condvar::new()).collect(),
        });

        let mut workers = Vec::with_capacity(n);
        for idx in 0..n {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("cadenza-tpool-{}", idx))
                .spawn(move || worker_main(shared, idx))
                .map_err(Error::IoError)?;
            workers.push(handle);
        }

        Ok(ThreadPool { shared, workers })
    }

    /// Get the number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.shared.n_workers
    }

    /// Create a process queue attached to this pool with a maximum depth of `qsize` jobs.
    pub fn process_queue<T: Send + 'static>(&self, qsize: usize) -> ProcessQueue<T> {
        let mut state = self.shared.state.lock();
        let id = state.next_queue_id;
        state.next_queue_id += 1;

        state.queues.insert(
            id,
            QueueState {
                cvs: Arc::new(QueueCvs::new()),
                input: VecDeque::new(),
                output: Vec::new(),
                curr_serial: 0,
                next_serial: 0,
                n_processing: 0,
                qsize: qsize.max(1),
                shutdown: false,
                wake_dispatch: false,
                no_more_input: false,
            },
        );
        state.order.push(id);

        ProcessQueue { shared: Arc::clone(&self.shared), id, _marker: PhantomData }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            for cv in &self.shared.worker_cvs {
                cv.notify_all();
            }
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("tpool: worker thread panicked");
            }
        }
    }
}

/// A process queue: a FIFO of jobs executed by the pool's workers, whose results are delivered
/// back in dispatch order.
///
/// Jobs are closures returning `T`. Dropping an undispatched job or an unconsumed result runs
/// its cleanup through `Drop` of the captured values.
pub struct ProcessQueue<T> {
    shared: Arc<PoolShared>,
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> ProcessQueue<T> {
    /// Add a job to the queue.
    ///
    /// With [`DispatchMode::Block`] this waits for room; a concurrent
    /// [`ProcessQueue::wake_dispatch`] aborts the wait with [`DispatchError::Interrupted`]
    /// without enqueuing the job, so the serial sequence stays hole-free.
    pub fn dispatch<F>(&self, func: F, mode: DispatchMode) -> std::result::Result<(), DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let mut state = self.shared.state.lock();

        loop {
            let Some(q) = state.queues.get_mut(&self.id) else {
                return Err(DispatchError::Shutdown);
            };

            if q.shutdown {
                return Err(DispatchError::Shutdown);
            }

            let full = q.no_more_input || q.input.len() >= q.qsize;

            match mode {
                DispatchMode::NonBlock if full => return Err(DispatchError::QueueFull),
                DispatchMode::Block if full => {
                    if q.wake_dispatch {
                        q.wake_dispatch = false;
                        return Err(DispatchError::Interrupted);
                    }
                    let cvs = Arc::clone(&q.cvs);
                    cvs.input_not_full.wait(&mut state);
                    continue;
                }
                _ => {}
            }

            if q.no_more_input {
                return Err(DispatchError::Shutdown);
            }

            let serial = q.curr_serial;
            q.curr_serial += 1;

            let exec: ErasedJob = Box::new(move || Box::new(func()) as Box<dyn Any + Send>);
            q.input.push_back(JobEntry { serial, exec });
            state.njobs += 1;

            self.shared.wake_next_worker(&mut state, self.id);
            return Ok(());
        }
    }

    /// Wake up a dispatcher blocked on a full queue. Used during seek and close to unblock a
    /// reader thread.
    pub fn wake_dispatch(&self) {
        let mut state = self.shared.state.lock();
        if let Some(q) = state.queues.get_mut(&self.id) {
            q.wake_dispatch = true;
            q.cvs.input_not_full.notify_all();
        }
    }

    /// Take the next result if it is ready (non-blocking). Results are returned in strict
    /// dispatch order.
    pub fn next_result(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        self.take_next_locked(&mut state).map(Self::downcast)
    }

    /// Take the next result, blocking until it is available. Returns `None` if the queue is
    /// shut down.
    pub fn next_result_wait(&self) -> Option<T> {
        let mut state = self.shared.state.lock();

        loop {
            if let Some(data) = self.take_next_locked(&mut state) {
                return Some(Self::downcast(data));
            }

            let q = state.queues.get(&self.id)?;
            if q.shutdown {
                return None;
            }
            let cvs = Arc::clone(&q.cvs);
            cvs.output_avail.wait(&mut state);
        }
    }

    fn downcast(data: Box<dyn Any + Send>) -> T {
        match data.downcast::<T>() {
            Ok(value) => *value,
            // Unreachable: only dispatch::<T> enqueues onto this queue.
            Err(_) => unreachable!("process queue result type mismatch"),
        }
    }

    fn take_next_locked(&self, state: &mut PoolState) -> Option<Box<dyn Any + Send>> {
        let q = state.queues.get_mut(&self.id)?;
        if q.shutdown {
            return None;
        }

        let pos = q.output.iter().position(|r| r.serial == q.next_serial)?;
        let entry = q.output.remove(pos);
        q.next_serial += 1;

        if q.output.len() < q.qsize {
            if q.input.len() < q.qsize {
                q.cvs.input_not_full.notify_all();
            }
            if !q.shutdown {
                self.shared.wake_next_worker(state, self.id);
            }
        }

        Some(entry.data)
    }

    /// Wait until all queued and in-progress jobs have completed. Does not consume results.
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();

        // Wake every parked worker for the final sprint.
        for (idx, parked) in state.parked.iter().enumerate() {
            if *parked {
                self.shared.worker_cvs[idx].notify_one();
            }
        }

        // Ensure there is room for the final sprint.
        if let Some(q) = state.queues.get_mut(&self.id) {
            let backlog = q.backlog();
            if q.qsize < backlog {
                q.qsize = backlog;
            }
        }

        loop {
            let Some(q) = state.queues.get(&self.id) else { return };
            let cvs = Arc::clone(&q.cvs);

            if q.shutdown {
                if q.n_processing == 0 {
                    return;
                }
                cvs.none_processing.wait(&mut state);
                continue;
            }

            if !q.input.is_empty() {
                cvs.input_empty.wait(&mut state);
                continue;
            }
            if q.n_processing != 0 {
                cvs.none_processing.wait(&mut state);
                continue;
            }
            return;
        }
    }

    /// Reset the queue to its initial state: discard queued input, wait for in-progress jobs,
    /// discard all output, and restart both serial counters at zero. This is the seek
    /// primitive; no result dispatched before the reset is delivered after it returns.
    pub fn reset(&self) {
        let (jobs, results) = {
            let mut state = self.shared.state.lock();
            let Some(q) = state.queues.get_mut(&self.id) else { return };

            // Park the consumer: nothing matches a next_serial of u64::MAX.
            q.next_serial = u64::MAX;

            let jobs = mem::take(&mut q.input);
            let results = mem::take(&mut q.output);
            state.njobs -= jobs.len();
            (jobs, results)
        };

        // Cleanups (Drop of captured job state and of results) run unlocked.
        drop(jobs);
        drop(results);

        // Wait for jobs already being processed, then discard anything they produced.
        self.flush();

        let late = {
            let mut state = self.shared.state.lock();
            let Some(q) = state.queues.get_mut(&self.id) else { return };

            let late = mem::take(&mut q.output);
            q.curr_serial = 0;
            q.next_serial = 0;
            q.cvs.input_not_full.notify_all();
            late
        };
        drop(late);
    }

    /// Put the queue into the shutdown state and wake every waiter.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if let Some(q) = state.queues.get_mut(&self.id) {
            q.shutdown = true;
            q.cvs.broadcast_all();
        }
    }

    /// Returns true if the queue is in the shutdown state.
    pub fn is_shutdown(&self) -> bool {
        let state = self.shared.state.lock();
        state.queues.get(&self.id).map(|q| q.shutdown).unwrap_or(true)
    }

    /// Total number of jobs in the queue: queued, in progress, and completed-but-unconsumed.
    pub fn len(&self) -> usize {
        let state = self.shared.state.lock();
        state.queues.get(&self.id).map(|q| q.backlog()).unwrap_or(0)
    }

    /// Returns true if no jobs are queued, in progress, or awaiting consumption.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the queue's maximum depth.
    pub fn qsize(&self) -> usize {
        let state = self.shared.state.lock();
        state.queues.get(&self.id).map(|q| q.qsize).unwrap_or(0)
    }

    /// Serial counters, for inspection: `(curr_serial, next_serial)`.
    pub fn serials(&self) -> (u64, u64) {
        let state = self.shared.state.lock();
        state.queues.get(&self.id).map(|q| (q.curr_serial, q.next_serial)).unwrap_or((0, 0))
    }
}

impl<T> Drop for ProcessQueue<T> {
    fn drop(&mut self) {
        // Prevent dispatch from queuing any more jobs.
        {
            let mut state = self.shared.state.lock();
            let Some(q) = state.queues.get_mut(&self.id) else { return };
            q.no_more_input = true;
        }

        // Drain fully before detaching: discard input, wait out in-flight jobs, discard output.
        let (jobs, results) = {
            let mut state = self.shared.state.lock();
            let Some(q) = state.queues.get_mut(&self.id) else { return };
            q.next_serial = u64::MAX;
            let jobs = mem::take(&mut q.input);
            let results = mem::take(&mut q.output);
            state.njobs -= jobs.len();
            (jobs, results)
        };
        drop(jobs);
        drop(results);

        loop {
            let mut state = self.shared.state.lock();
            let Some(q) = state.queues.get_mut(&self.id) else { return };
            if q.n_processing == 0 {
                q.shutdown = true;
                q.cvs.broadcast_all();
                let id = self.id;
                state.queues.remove(&id);
                state.order.retain(|&other| other != id);
                return;
            }
            let cvs = Arc::clone(&q.cvs);
            cvs.none_processing.wait(&mut state);
        }
    }
}
