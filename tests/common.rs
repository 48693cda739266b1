//! Scripted fabric for session tests.
//!
//! Wait batches and queue/counter behavior are scripted up front. Tokens
//! are issued in registration order - send queue, recv queue, send counter,
//! recv counter, counting only configured sources - so scripts refer to
//! them by raw index.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::mem;
use std::rc::Rc;

use pollset::{
    AddrHandle, CompletionCounter, CompletionQueue, CqEntry, CqErrEntry, CqReadError,
    CompletionMode, Endpoint, Fabric, ReadyBatch, ResourceSet, Result, SessionConfig,
    SourceToken, WaitSet,
};

/// One scripted outcome of a queue drain read.
pub enum ReadScript {
    /// A normal completion record.
    Ok,
    /// The distinguished "error entry available" condition, with the detail
    /// a subsequent `read_err` returns.
    ErrorEntry(CqErrEntry),
    /// A plain read failure.
    Fail(io::ErrorKind),
}

/// Queue whose drain reads follow a script. An exhausted script keeps
/// returning normal completions.
pub struct ScriptedQueue {
    reads: VecDeque<ReadScript>,
    pending_err: Option<CqErrEntry>,
}

impl CompletionQueue for ScriptedQueue {
    fn read_one(&mut self) -> std::result::Result<CqEntry, CqReadError> {
        match self.reads.pop_front() {
            None | Some(ReadScript::Ok) => Ok(CqEntry { context: 0 }),
            Some(ReadScript::ErrorEntry(detail)) => {
                self.pending_err = Some(detail);
                Err(CqReadError::ErrorAvailable)
            }
            Some(ReadScript::Fail(kind)) => Err(CqReadError::Failed(kind.into())),
        }
    }

    fn read_err(&mut self) -> io::Result<CqErrEntry> {
        self.pending_err
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no error entry"))
    }
}

/// Counter whose successive reads pop scripted values; an exhausted script
/// repeats the last value.
pub struct ScriptedCounter {
    values: RefCell<VecDeque<u64>>,
    last: Cell<u64>,
}

impl CompletionCounter for ScriptedCounter {
    fn read(&self) -> u64 {
        if let Some(v) = self.values.borrow_mut().pop_front() {
            self.last.set(v);
        }
        self.last.get()
    }
}

/// Endpoint that counts posts and records its own teardown.
pub struct ScriptedEndpoint {
    posted: Rc<Cell<usize>>,
    released: Rc<Cell<usize>>,
}

impl Endpoint for ScriptedEndpoint {
    fn post_send(&mut self, _dest: AddrHandle, _size: usize) -> io::Result<()> {
        self.posted.set(self.posted.get() + 1);
        Ok(())
    }
}

impl Drop for ScriptedEndpoint {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

/// Waiter that replays scripted batches.
pub struct ScriptedWaiter {
    batches: VecDeque<io::Result<Vec<usize>>>,
    armed: Vec<SourceToken>,
}

impl WaitSet for ScriptedWaiter {
    type Queue = ScriptedQueue;
    type Counter = ScriptedCounter;

    fn add_queue(&mut self, _queue: &ScriptedQueue, token: SourceToken) -> io::Result<()> {
        self.armed.push(token);
        Ok(())
    }

    fn add_counter(&mut self, _counter: &ScriptedCounter, token: SourceToken) -> io::Result<()> {
        self.armed.push(token);
        Ok(())
    }

    fn wait(&mut self, ready: &mut ReadyBatch) -> io::Result<()> {
        match self.batches.pop_front() {
            None => Err(io::Error::other("wait script exhausted")),
            Some(Err(e)) => Err(e),
            Some(Ok(raws)) => {
                for raw in raws {
                    ready.push(SourceToken::from_raw(raw));
                }
                Ok(())
            }
        }
    }
}

/// Fabric whose resources replay the scripts loaded before the session.
pub struct ScriptedFabric {
    pub batches: VecDeque<io::Result<Vec<usize>>>,
    pub send_reads: VecDeque<ReadScript>,
    pub recv_reads: VecDeque<ReadScript>,
    pub send_counter_values: VecDeque<u64>,
    pub recv_counter_values: VecDeque<u64>,
    /// Sends posted across all sessions.
    pub posted: Rc<Cell<usize>>,
    /// Sessions whose resources have been torn down.
    pub released: Rc<Cell<usize>>,
}

impl ScriptedFabric {
    pub fn new() -> Self {
        Self {
            batches: VecDeque::new(),
            send_reads: VecDeque::new(),
            recv_reads: VecDeque::new(),
            send_counter_values: VecDeque::new(),
            recv_counter_values: VecDeque::new(),
            posted: Rc::new(Cell::new(0)),
            released: Rc::new(Cell::new(0)),
        }
    }

    /// Queue one ready batch of raw token values; empty = spurious wake.
    pub fn batch(mut self, raws: &[usize]) -> Self {
        self.batches.push_back(Ok(raws.to_vec()));
        self
    }

    /// Queue a wait failure.
    pub fn wait_failure(mut self, e: io::Error) -> Self {
        self.batches.push_back(Err(e));
        self
    }

    /// Queue a send-queue drain outcome.
    pub fn send_read(mut self, script: ReadScript) -> Self {
        self.send_reads.push_back(script);
        self
    }

    /// Queue a recv-queue drain outcome.
    pub fn recv_read(mut self, script: ReadScript) -> Self {
        self.recv_reads.push_back(script);
        self
    }

    /// Queue a send-counter reading.
    pub fn send_counter(mut self, value: u64) -> Self {
        self.send_counter_values.push_back(value);
        self
    }

    /// Queue a recv-counter reading.
    pub fn recv_counter(mut self, value: u64) -> Self {
        self.recv_counter_values.push_back(value);
        self
    }
}

impl Fabric for ScriptedFabric {
    type Queue = ScriptedQueue;
    type Counter = ScriptedCounter;
    type Waiter = ScriptedWaiter;
    type Endpoint = ScriptedEndpoint;

    fn resolve_address(&mut self, _spec: Option<&str>) -> Result<AddrHandle> {
        Ok(AddrHandle(1))
    }

    fn allocate_resources(&mut self, config: &SessionConfig) -> Result<ResourceSet<Self>> {
        let queue = |reads: &mut VecDeque<ReadScript>| ScriptedQueue {
            reads: mem::take(reads),
            pending_err: None,
        };
        let counter = |values: &mut VecDeque<u64>| ScriptedCounter {
            values: RefCell::new(mem::take(values)),
            last: Cell::new(0),
        };

        Ok(ResourceSet {
            endpoint: ScriptedEndpoint {
                posted: Rc::clone(&self.posted),
                released: Rc::clone(&self.released),
            },
            waiter: ScriptedWaiter {
                batches: mem::take(&mut self.batches),
                armed: Vec::new(),
            },
            send_queue: (config.send_mode == CompletionMode::Queue)
                .then(|| queue(&mut self.send_reads)),
            recv_queue: (config.recv_mode == CompletionMode::Queue)
                .then(|| queue(&mut self.recv_reads)),
            send_counter: (config.send_mode == CompletionMode::Counter)
                .then(|| counter(&mut self.send_counter_values)),
            recv_counter: (config.recv_mode == CompletionMode::Counter)
                .then(|| counter(&mut self.recv_counter_values)),
        })
    }
}
