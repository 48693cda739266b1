//! In-process loopback fabric.
//!
//! Completes sends locally and reflects each one back as a receive, so the
//! full driver path runs without RDMA hardware. Used by the demo binary and
//! the integration tests.
//!
//! Readiness is level-to-edge converted per armed source: a queue source
//! signals once per completion record, a counter source signals once per
//! observed counter advance. A wait with no pending progress fails rather
//! than blocks, since nothing else can make progress on the single thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::session::{CompletionMode, SessionConfig};
use crate::source::SourceToken;
use crate::transport::{
    AddrHandle, CompletionCounter, CompletionQueue, CqEntry, CqErrEntry, CqReadError, Endpoint,
    Fabric, ResourceSet,
};
use crate::wait::{ReadyBatch, WaitSet};

/// State shared between the endpoint, sources, and waiter of one session.
#[derive(Default)]
struct Core {
    tx_events: VecDeque<CqEntry>,
    rx_events: VecDeque<CqEntry>,
    /// Cumulative finished sends.
    tx_count: u64,
    /// Cumulative finished receives.
    rx_count: u64,
    /// Pre-posted receives still available for loopback delivery.
    recv_credits: u64,
    next_context: u64,
}

/// Which event stream a loopback source observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Tx,
    Rx,
}

/// Loopback completion queue.
pub struct LoopbackQueue {
    core: Rc<RefCell<Core>>,
    stream: Stream,
}

impl CompletionQueue for LoopbackQueue {
    fn read_one(&mut self) -> std::result::Result<CqEntry, CqReadError> {
        let mut core = self.core.borrow_mut();
        let events = match self.stream {
            Stream::Tx => &mut core.tx_events,
            Stream::Rx => &mut core.rx_events,
        };
        events.pop_front().ok_or_else(|| {
            CqReadError::Failed(io::Error::new(
                io::ErrorKind::WouldBlock,
                "no completion available",
            ))
        })
    }

    fn read_err(&mut self) -> io::Result<CqErrEntry> {
        // Loopback operations cannot fail in flight.
        Err(io::Error::new(io::ErrorKind::NotFound, "no error entry"))
    }
}

/// Loopback completion counter.
pub struct LoopbackCounter {
    core: Rc<RefCell<Core>>,
    stream: Stream,
}

impl CompletionCounter for LoopbackCounter {
    fn read(&self) -> u64 {
        let core = self.core.borrow();
        match self.stream {
            Stream::Tx => core.tx_count,
            Stream::Rx => core.rx_count,
        }
    }
}

/// Loopback endpoint.
pub struct LoopbackEndpoint {
    core: Rc<RefCell<Core>>,
}

impl Endpoint for LoopbackEndpoint {
    fn post_send(&mut self, _dest: AddrHandle, _size: usize) -> io::Result<()> {
        let mut core = self.core.borrow_mut();
        let context = core.next_context;
        core.next_context += 1;

        core.tx_count += 1;
        core.tx_events.push_back(CqEntry { context });

        // Loopback delivery: the send lands back as a receive while a
        // pre-posted receive remains.
        if core.recv_credits > 0 {
            core.recv_credits -= 1;
            core.rx_count += 1;
            core.rx_events.push_back(CqEntry { context });
        }

        Ok(())
    }
}

struct Armed {
    token: SourceToken,
    stream: Stream,
    is_counter: bool,
    /// Progress already signaled for this source.
    reported: u64,
}

/// Loopback aggregation primitive.
pub struct LoopbackWaiter {
    core: Rc<RefCell<Core>>,
    armed: Vec<Armed>,
}

impl WaitSet for LoopbackWaiter {
    type Queue = LoopbackQueue;
    type Counter = LoopbackCounter;

    fn add_queue(&mut self, queue: &LoopbackQueue, token: SourceToken) -> io::Result<()> {
        self.arm(token, queue.stream, false)
    }

    fn add_counter(&mut self, counter: &LoopbackCounter, token: SourceToken) -> io::Result<()> {
        self.arm(token, counter.stream, true)
    }

    fn wait(&mut self, ready: &mut ReadyBatch) -> io::Result<()> {
        let core = self.core.borrow();
        let mut any = false;

        for armed in &mut self.armed {
            let count = match armed.stream {
                Stream::Tx => core.tx_count,
                Stream::Rx => core.rx_count,
            };
            if count > armed.reported {
                if !ready.push(armed.token) {
                    break;
                }
                // A counter acknowledges the whole advance in one signal;
                // a queue signals once per record.
                armed.reported = if armed.is_counter { count } else { armed.reported + 1 };
                any = true;
            }
        }

        if any {
            Ok(())
        } else {
            // Single-threaded loopback: no other actor can create progress,
            // so blocking here would hang forever.
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "no armed source can become ready",
            ))
        }
    }
}

impl LoopbackWaiter {
    fn arm(&mut self, token: SourceToken, stream: Stream, is_counter: bool) -> io::Result<()> {
        if self.armed.iter().any(|a| a.token == token) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "source already armed",
            ));
        }
        self.armed.push(Armed {
            token,
            stream,
            is_counter,
            reported: 0,
        });
        Ok(())
    }
}

/// In-process fabric: every session talks to itself.
#[derive(Debug, Default)]
pub struct LoopbackFabric;

impl LoopbackFabric {
    /// Create a loopback fabric.
    pub fn new() -> Self {
        Self
    }
}

impl Fabric for LoopbackFabric {
    type Queue = LoopbackQueue;
    type Counter = LoopbackCounter;
    type Waiter = LoopbackWaiter;
    type Endpoint = LoopbackEndpoint;

    fn resolve_address(&mut self, spec: Option<&str>) -> Result<AddrHandle> {
        match spec {
            None | Some("loopback") => Ok(AddrHandle(0)),
            Some(other) => Err(Error::Address(io::Error::new(
                io::ErrorKind::NotFound,
                format!("loopback fabric cannot reach '{}'", other),
            ))),
        }
    }

    fn allocate_resources(&mut self, config: &SessionConfig) -> Result<ResourceSet<Self>> {
        let core = Rc::new(RefCell::new(Core {
            recv_credits: config.recv_target,
            ..Core::default()
        }));

        let queue = |stream| LoopbackQueue {
            core: Rc::clone(&core),
            stream,
        };
        let counter = |stream| LoopbackCounter {
            core: Rc::clone(&core),
            stream,
        };

        Ok(ResourceSet {
            endpoint: LoopbackEndpoint {
                core: Rc::clone(&core),
            },
            waiter: LoopbackWaiter {
                core: Rc::clone(&core),
                armed: Vec::new(),
            },
            send_queue: (config.send_mode == CompletionMode::Queue).then(|| queue(Stream::Tx)),
            recv_queue: (config.recv_mode == CompletionMode::Queue).then(|| queue(Stream::Rx)),
            send_counter: (config.send_mode == CompletionMode::Counter)
                .then(|| counter(Stream::Tx)),
            recv_counter: (config.recv_mode == CompletionMode::Counter)
                .then(|| counter(Stream::Rx)),
        })
    }
}
