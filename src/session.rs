//! Session driver and completion drain loop.
//!
//! A session owns its registry, poll set, endpoint, and running state for
//! the duration of one exchange. Everything runs on one thread of control;
//! the poll set's wait call is the sole suspension point.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::source::{Direction, SourceHandle, SourceKind, SourceRegistry, SourceToken};
use crate::transport::{CompletionCounter, CompletionQueue, CqReadError, Endpoint, Fabric, ResourceSet};
use crate::wait::{PollSet, ReadyBatch};

/// Completion reporting mode for one direction.
///
/// Queues and counters are mutually exclusive mechanisms for the same
/// logical event stream, so a direction picks one or runs unreported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Discrete completion queue entries, each drained exactly once.
    #[default]
    Queue,
    /// Monotonically increasing counter, re-checked against the target.
    Counter,
    /// No completion reporting; the direction never gates termination.
    Disabled,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Send-side completion reporting mode.
    /// Default: queue
    pub send_mode: CompletionMode,
    /// Receive-side completion reporting mode.
    /// Default: queue
    pub recv_mode: CompletionMode,
    /// Outbound transfer size in bytes.
    /// Default: 1024
    pub transfer_size: usize,
    /// Send-side sequence target: expected completion count in queue mode,
    /// expected counter value in counter mode. One send is posted per unit.
    /// Default: 1
    pub send_target: u64,
    /// Receive-side sequence target.
    /// Default: 1
    pub recv_target: u64,
    /// Remote address specification; `None` lets the transport pick its
    /// default peer.
    pub remote: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_mode: CompletionMode::Queue,
            recv_mode: CompletionMode::Queue,
            transfer_size: 1024,
            send_target: 1,
            recv_target: 1,
            remote: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the send-side completion mode.
    pub fn with_send_mode(mut self, mode: CompletionMode) -> Self {
        self.send_mode = mode;
        self
    }

    /// Set the receive-side completion mode.
    pub fn with_recv_mode(mut self, mode: CompletionMode) -> Self {
        self.recv_mode = mode;
        self
    }

    /// Set the transfer size.
    pub fn with_transfer_size(mut self, size: usize) -> Self {
        self.transfer_size = size;
        self
    }

    /// Set the send-side sequence target.
    pub fn with_send_target(mut self, target: u64) -> Self {
        self.send_target = target;
        self
    }

    /// Set the receive-side sequence target.
    pub fn with_recv_target(mut self, target: u64) -> Self {
        self.recv_target = target;
        self
    }

    /// Set the remote address specification.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }
}

/// Per-direction sequence targets for one exchange.
#[derive(Debug, Clone, Copy)]
pub struct SequenceTargets {
    /// Expected send-side count or counter value.
    pub send: u64,
    /// Expected receive-side count or counter value.
    pub recv: u64,
}

/// Running completion state for one exchange.
///
/// Created at the start of an exchange and discarded after it completes or
/// fails; on failure it is left in the last consistent condition for
/// inspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    /// Observed send-queue completions.
    pub tx_completions: u64,
    /// Observed receive-queue completions.
    pub rx_completions: u64,
    /// The send counter reached its target. Transitions false to true once.
    pub tx_counter_done: bool,
    /// The receive counter reached its target. Transitions false to true once.
    pub rx_counter_done: bool,
}

impl SessionState {
    /// Whether one direction's termination predicate holds.
    ///
    /// An unconfigured direction contributes no gating condition.
    pub fn side_done(&self, dir: Direction, mode: CompletionMode, targets: &SequenceTargets) -> bool {
        match (dir, mode) {
            (_, CompletionMode::Disabled) => true,
            (Direction::Send, CompletionMode::Queue) => self.tx_completions >= targets.send,
            (Direction::Send, CompletionMode::Counter) => self.tx_counter_done,
            (Direction::Recv, CompletionMode::Queue) => self.rx_completions >= targets.recv,
            (Direction::Recv, CompletionMode::Counter) => self.rx_counter_done,
        }
    }
}

/// One aggregation session: registry, poll set, endpoint, and drain state.
pub struct Session<F: Fabric> {
    registry: SourceRegistry<F::Queue, F::Counter>,
    poll: PollSet<F::Waiter>,
    endpoint: F::Endpoint,
    config: SessionConfig,
    targets: SequenceTargets,
    state: SessionState,
}

impl<F: Fabric> Session<F> {
    /// Build a session from allocated resources, registering each configured
    /// source and arming it in the poll set.
    ///
    /// Registration order is send queue, receive queue, send counter,
    /// receive counter; absent sources are skipped.
    pub fn new(resources: ResourceSet<F>, config: &SessionConfig) -> Result<Self> {
        let ResourceSet {
            endpoint,
            waiter,
            send_queue,
            recv_queue,
            send_counter,
            recv_counter,
        } = resources;

        let mut registry = SourceRegistry::new();
        let mut poll = PollSet::new(waiter);

        if let Some(queue) = send_queue {
            Self::install_queue(&mut registry, &mut poll, SourceKind::SendQueue, queue)?;
        }
        if let Some(queue) = recv_queue {
            Self::install_queue(&mut registry, &mut poll, SourceKind::RecvQueue, queue)?;
        }
        if let Some(counter) = send_counter {
            Self::install_counter(&mut registry, &mut poll, SourceKind::SendCounter, counter)?;
        }
        if let Some(counter) = recv_counter {
            Self::install_counter(&mut registry, &mut poll, SourceKind::RecvCounter, counter)?;
        }

        Ok(Self {
            registry,
            poll,
            endpoint,
            config: config.clone(),
            targets: SequenceTargets {
                send: config.send_target,
                recv: config.recv_target,
            },
            state: SessionState::default(),
        })
    }

    /// Run a complete exchange: resolve the peer, allocate resources, post
    /// the sends, and drain to exhaustion.
    ///
    /// Transport resources are released when the session drops, on every
    /// exit path. Returns the first fatal error, or success only when both
    /// configured directions terminate normally.
    pub fn run(fabric: &mut F, config: &SessionConfig) -> Result<()> {
        let addr = fabric.resolve_address(config.remote.as_deref())?;
        let resources = fabric.allocate_resources(config)?;
        let mut session = Session::new(resources, config)?;

        debug!(size = config.transfer_size, count = config.send_target, "posting sends");
        for _ in 0..config.send_target {
            session
                .endpoint
                .post_send(addr, config.transfer_size)
                .map_err(Error::Transport)?;
        }

        session.drain()
    }

    /// Run the drain loop until both configured directions terminate.
    ///
    /// An empty ready batch is a spurious wake and re-enters the wait
    /// immediately; every error is fatal and aborts the loop.
    pub fn drain(&mut self) -> Result<()> {
        let mut ready = ReadyBatch::new();

        while !self.is_complete() {
            self.poll.wait(&mut ready)?;
            if ready.is_empty() {
                continue;
            }

            trace!(events = ready.len(), "retrieved ready tokens");
            for token in ready.iter() {
                self.process(token)?;
            }
        }

        Ok(())
    }

    /// Whether both directions' termination predicates hold.
    pub fn is_complete(&self) -> bool {
        self.state
            .side_done(Direction::Send, self.config.send_mode, &self.targets)
            && self
                .state
                .side_done(Direction::Recv, self.config.recv_mode, &self.targets)
    }

    /// Running completion state, for inspection and logging.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Sequence targets for this exchange.
    pub fn targets(&self) -> SequenceTargets {
        self.targets
    }

    /// Process one ready token.
    fn process(&mut self, token: SourceToken) -> Result<()> {
        let (kind, handle) = self
            .registry
            .resolve(token)
            .ok_or(Error::UnknownCompletion(token))?;

        match (kind, handle) {
            (SourceKind::SendQueue, SourceHandle::Queue(queue)) => {
                trace!("send completion received");
                self.state.tx_completions += 1;
                Self::drain_one(queue)
            }
            (SourceKind::RecvQueue, SourceHandle::Queue(queue)) => {
                trace!("recv completion received");
                self.state.rx_completions += 1;
                Self::drain_one(queue)
            }
            (SourceKind::SendCounter, SourceHandle::Counter(counter)) => {
                trace!("send counter poll event");
                if self.state.tx_counter_done {
                    return Err(Error::DuplicateCounterEvent(Direction::Send));
                }
                if counter.read() >= self.targets.send {
                    debug!("send counter done");
                    self.state.tx_counter_done = true;
                }
                Ok(())
            }
            (SourceKind::RecvCounter, SourceHandle::Counter(counter)) => {
                trace!("recv counter poll event");
                if self.state.rx_counter_done {
                    return Err(Error::DuplicateCounterEvent(Direction::Recv));
                }
                if counter.read() >= self.targets.recv {
                    debug!("recv counter done");
                    self.state.rx_counter_done = true;
                }
                Ok(())
            }
            // Registration enforces kind/handle agreement, so a mismatch
            // here means the token mapping itself is corrupt.
            (kind, _) => Err(Error::HandleKindMismatch(kind)),
        }
    }

    /// Drain exactly one completion record, decoding the error entry when
    /// the queue reports one available.
    fn drain_one(queue: &mut F::Queue) -> Result<()> {
        match queue.read_one() {
            Ok(_entry) => Ok(()),
            Err(CqReadError::ErrorAvailable) => {
                let detail = queue.read_err().map_err(Error::CqRead)?;
                Err(Error::CqError(detail))
            }
            Err(CqReadError::Failed(e)) => Err(Error::CqRead(e)),
        }
    }

    fn install_queue(
        registry: &mut SourceRegistry<F::Queue, F::Counter>,
        poll: &mut PollSet<F::Waiter>,
        kind: SourceKind,
        queue: F::Queue,
    ) -> Result<()> {
        let token = registry.register(kind, SourceHandle::Queue(queue))?;
        if let Some((_, SourceHandle::Queue(queue))) = registry.resolve(token) {
            poll.add_queue(queue, token)?;
        }
        Ok(())
    }

    fn install_counter(
        registry: &mut SourceRegistry<F::Queue, F::Counter>,
        poll: &mut PollSet<F::Waiter>,
        kind: SourceKind,
        counter: F::Counter,
    ) -> Result<()> {
        let token = registry.register(kind, SourceHandle::Counter(counter))?;
        if let Some((_, SourceHandle::Counter(counter))) = registry.resolve(token) {
            poll.add_counter(counter, token)?;
        }
        Ok(())
    }
}
