//! pollset - poll-set completion aggregation for RDMA-style transports.
//!
//! One blocking wait call covers every completion source of a messaging
//! session - send queue, receive queue, send counter, receive counter -
//! and reports which became ready, so the caller never polls each source
//! individually.
//!
//! # Architecture
//!
//! ```text
//! Session::run
//!     │ post sends
//!     ▼
//! PollSet::wait ──────► ReadyBatch (tokens, arrival order, ≤ 10)
//!     │                       │
//!     │   SourceRegistry::resolve(token)
//!     │                       │
//!     │         ┌─────────────┴──────────────┐
//!     │         ▼                            ▼
//!     │   queue source:               counter source:
//!     │   count += 1,                 re-check value against
//!     │   drain one record            target, set done flag
//!     │         │                            │
//!     └─────────┴── repeat until both sides terminate
//! ```
//!
//! - **Queues** hold discrete completion records, each drained exactly once.
//! - **Counters** summarize progress in one monotonically increasing value;
//!   they never enqueue entries.
//! - A direction uses one mechanism or none, never both.
//!
//! Sessions are single-threaded and synchronous: the wait call is the sole
//! suspension point, and each session exclusively owns its registry, poll
//! set, and state. Concurrent sessions each own an independent set.

pub mod error;
pub mod loopback;
pub mod session;
pub mod source;
pub mod transport;
pub mod wait;

// Re-export main types
pub use error::{Error, Result};
pub use session::{CompletionMode, SequenceTargets, Session, SessionConfig, SessionState};
pub use source::{Direction, SourceHandle, SourceKind, SourceRegistry, SourceToken};
pub use transport::{
    AddrHandle, CompletionCounter, CompletionQueue, CqEntry, CqErrEntry, CqReadError, Endpoint,
    Fabric, ResourceSet,
};
pub use wait::{PollSet, ReadyBatch, WaitSet, MAX_POLL_CNT};
