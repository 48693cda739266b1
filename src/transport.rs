//! Collaborator seams: completion sources, endpoints, and fabrics.
//!
//! The aggregation core never talks to hardware. Everything it needs from
//! the transport comes through these traits: draining one completion record,
//! reading a live counter, posting a send, and allocating the per-session
//! resource set.

use std::fmt;
use std::io;

use crate::error::Result;
use crate::session::SessionConfig;
use crate::wait::WaitSet;

/// One decoded completion record drained from a queue.
#[derive(Debug, Clone, Copy)]
pub struct CqEntry {
    /// Operation context supplied when the work was posted.
    pub context: u64,
}

/// Decoded error record fetched after a drain read reported
/// [`CqReadError::ErrorAvailable`].
#[derive(Debug, Clone)]
pub struct CqErrEntry {
    /// Operation context supplied when the work was posted.
    pub context: u64,
    /// Generic error code.
    pub err: i32,
    /// Provider-specific error code.
    pub prov_err: i32,
    /// Human-readable description from the provider.
    pub message: String,
}

impl fmt::Display for CqErrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op {}: {} (err {}, provider err {})",
            self.context, self.message, self.err, self.prov_err
        )
    }
}

/// Outcome of a failed drain read.
#[derive(Debug)]
pub enum CqReadError {
    /// No normal entry is available, but an error entry is. The caller
    /// fetches the detail with [`CompletionQueue::read_err`].
    ErrorAvailable,
    /// The read call itself failed.
    Failed(io::Error),
}

/// Queue of discrete completion records, each drained exactly once.
pub trait CompletionQueue {
    /// Drain exactly one completion record.
    fn read_one(&mut self) -> std::result::Result<CqEntry, CqReadError>;

    /// Fetch the detailed error record after [`CqReadError::ErrorAvailable`].
    fn read_err(&mut self) -> io::Result<CqErrEntry>;
}

/// Monotonically increasing count of finished operations.
///
/// Counters are sufficient statistics for progress; they never enqueue
/// discrete entries.
pub trait CompletionCounter {
    /// Current counter value.
    fn read(&self) -> u64;
}

/// Handle to a resolved remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrHandle(pub u64);

/// Endpoint able to post outbound work toward a resolved address.
pub trait Endpoint {
    /// Post one send of `size` bytes.
    fn post_send(&mut self, dest: AddrHandle, size: usize) -> io::Result<()>;
}

/// Transport resources for one session.
///
/// Only the sources the session configuration asks for are present; absent
/// kinds never appear in a ready batch. Dropping the set releases the
/// underlying transport resources, so teardown runs on every exit path.
pub struct ResourceSet<F: Fabric + ?Sized> {
    /// Endpoint for outbound posts.
    pub endpoint: F::Endpoint,
    /// Aggregation primitive the session's sources are armed into.
    pub waiter: F::Waiter,
    /// Send completion queue, when the send side is queue-mode.
    pub send_queue: Option<F::Queue>,
    /// Receive completion queue, when the receive side is queue-mode.
    pub recv_queue: Option<F::Queue>,
    /// Send completion counter, when the send side is counter-mode.
    pub send_counter: Option<F::Counter>,
    /// Receive completion counter, when the receive side is counter-mode.
    pub recv_counter: Option<F::Counter>,
}

/// Factory for per-session transport resources.
pub trait Fabric {
    /// Completion queue type.
    type Queue: CompletionQueue;
    /// Completion counter type.
    type Counter: CompletionCounter;
    /// Aggregation primitive type.
    type Waiter: WaitSet<Queue = Self::Queue, Counter = Self::Counter>;
    /// Endpoint type.
    type Endpoint: Endpoint;

    /// Resolve the remote address for the exchange.
    ///
    /// `None` lets the transport pick its default peer.
    fn resolve_address(&mut self, spec: Option<&str>) -> Result<AddrHandle>;

    /// Allocate the session's resources per the configuration.
    ///
    /// Pre-posts one receive per expected inbound completion, so the
    /// receive-side sequence target is meaningful from the start.
    fn allocate_resources(&mut self, config: &SessionConfig) -> Result<ResourceSet<Self>>;
}
