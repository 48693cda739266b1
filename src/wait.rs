//! Poll-set aggregation: one blocking wait over many completion sources.

use std::io;

use crate::error::{Error, Result};
use crate::source::SourceToken;

/// Maximum number of ready tokens a single wait call may report.
pub const MAX_POLL_CNT: usize = 10;

/// Ordered tokens reported ready by one wait call.
///
/// Bounded at [`MAX_POLL_CNT`]; ordering reflects arrival from the
/// aggregation primitive, not priority. An empty batch after a successful
/// wait is a spurious wake: the caller polls again immediately.
#[derive(Debug, Default)]
pub struct ReadyBatch {
    tokens: Vec<SourceToken>,
}

impl ReadyBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self {
            tokens: Vec::with_capacity(MAX_POLL_CNT),
        }
    }

    /// Append a ready token, preserving arrival order.
    ///
    /// Returns `false` once the batch is full; the primitive reports the
    /// remaining sources on the next wait call.
    pub fn push(&mut self, token: SourceToken) -> bool {
        if self.tokens.len() == MAX_POLL_CNT {
            return false;
        }
        self.tokens.push(token);
        true
    }

    /// Number of ready tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the wait was a spurious wake.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Drop all tokens, keeping the allocation.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Tokens in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = SourceToken> + '_ {
        self.tokens.iter().copied()
    }

    /// Tokens as a slice, in arrival order.
    pub fn as_slice(&self) -> &[SourceToken] {
        &self.tokens
    }
}

/// Aggregation primitive provided by the transport.
///
/// Mirrors a fabric poll set: sources are armed together with a
/// caller-chosen token, and one blocking call reports which armed sources
/// became ready.
pub trait WaitSet {
    /// Queue source type this primitive can arm.
    type Queue;
    /// Counter source type this primitive can arm.
    type Counter;

    /// Arm a queue source under `token`.
    fn add_queue(&mut self, queue: &Self::Queue, token: SourceToken) -> io::Result<()>;

    /// Arm a counter source under `token`.
    fn add_counter(&mut self, counter: &Self::Counter, token: SourceToken) -> io::Result<()>;

    /// Block until at least one armed source is ready, pushing the ready
    /// tokens into `ready`.
    ///
    /// May push zero tokens on a spurious wake.
    fn wait(&mut self, ready: &mut ReadyBatch) -> io::Result<()>;
}

/// Poll set owning the transport's aggregation primitive.
///
/// Maps primitive failures into the session error taxonomy: add failures
/// are resource errors, wait failures are fatal poll errors.
pub struct PollSet<W> {
    inner: W,
}

impl<W: WaitSet> PollSet<W> {
    /// Wrap an aggregation primitive.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Arm a queue source.
    pub fn add_queue(&mut self, queue: &W::Queue, token: SourceToken) -> Result<()> {
        self.inner.add_queue(queue, token).map_err(Error::PollSetAdd)
    }

    /// Arm a counter source.
    pub fn add_counter(&mut self, counter: &W::Counter, token: SourceToken) -> Result<()> {
        self.inner
            .add_counter(counter, token)
            .map_err(Error::PollSetAdd)
    }

    /// One blocking wait.
    ///
    /// The batch is cleared first and holds `0..=MAX_POLL_CNT` tokens after
    /// a successful return.
    pub fn wait(&mut self, ready: &mut ReadyBatch) -> Result<()> {
        ready.clear();
        self.inner.wait(ready).map_err(Error::Poll)
    }
}
