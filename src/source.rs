//! Completion source identity and registration.
//!
//! Each completion queue or counter a session arms is wrapped in a registry
//! entry with a stable token. The token is the only datum the poll set
//! reports on readiness, so the drain loop resolves it back to the typed
//! source in O(1).

use std::fmt;

use slab::Slab;

use crate::error::{Error, Result};

/// Direction of the logical event stream a source reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outbound operations.
    Send,
    /// Inbound operations.
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// Kind of a registered completion source.
///
/// At most one source of each kind exists per session, and a direction uses
/// either its queue kind or its counter kind, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Queue of send completions.
    SendQueue,
    /// Queue of receive completions.
    RecvQueue,
    /// Counter of finished sends.
    SendCounter,
    /// Counter of finished receives.
    RecvCounter,
}

impl SourceKind {
    /// Number of distinct kinds.
    pub const COUNT: usize = 4;

    /// Direction this kind reports on.
    pub fn direction(self) -> Direction {
        match self {
            SourceKind::SendQueue | SourceKind::SendCounter => Direction::Send,
            SourceKind::RecvQueue | SourceKind::RecvCounter => Direction::Recv,
        }
    }

    /// True for the queue-backed kinds.
    pub fn is_queue(self) -> bool {
        matches!(self, SourceKind::SendQueue | SourceKind::RecvQueue)
    }

    /// The other reporting mechanism for the same direction.
    fn dual(self) -> SourceKind {
        match self {
            SourceKind::SendQueue => SourceKind::SendCounter,
            SourceKind::RecvQueue => SourceKind::RecvCounter,
            SourceKind::SendCounter => SourceKind::SendQueue,
            SourceKind::RecvCounter => SourceKind::RecvQueue,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::SendQueue => write!(f, "send queue"),
            SourceKind::RecvQueue => write!(f, "recv queue"),
            SourceKind::SendCounter => write!(f, "send counter"),
            SourceKind::RecvCounter => write!(f, "recv counter"),
        }
    }
}

/// Opaque identifier for a registered completion source.
///
/// Tokens are issued by [`SourceRegistry::register`] and are unique among
/// the currently registered sources of one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceToken(usize);

impl SourceToken {
    /// Raw token value, for logging and wire exchange with the transport.
    pub fn as_raw(self) -> usize {
        self.0
    }

    /// Rebuild a token from its raw value.
    ///
    /// Only values obtained from [`SourceToken::as_raw`] name a live source;
    /// anything else resolves to nothing.
    pub fn from_raw(raw: usize) -> Self {
        SourceToken(raw)
    }
}

/// Handle to the underlying transport object of a registered source.
#[derive(Debug)]
pub enum SourceHandle<Q, C> {
    /// Queue-backed source.
    Queue(Q),
    /// Counter-backed source.
    Counter(C),
}

/// Registry mapping tokens to typed completion sources.
///
/// Owns the source handles for the session's lifetime; entries are created
/// once during setup and torn down when the registry drops.
pub struct SourceRegistry<Q, C> {
    entries: Slab<(SourceKind, SourceHandle<Q, C>)>,
    by_kind: [Option<SourceToken>; SourceKind::COUNT],
}

impl<Q, C> SourceRegistry<Q, C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            by_kind: [None; SourceKind::COUNT],
        }
    }

    /// Register a source and issue its token.
    ///
    /// Fails when a source of this kind already exists, when the handle is
    /// the wrong mechanism for the kind, or when the same direction already
    /// has the opposite mechanism registered.
    pub fn register(&mut self, kind: SourceKind, handle: SourceHandle<Q, C>) -> Result<SourceToken> {
        if self.by_kind[kind.index()].is_some() {
            return Err(Error::DuplicateSource(kind));
        }
        if self.by_kind[kind.dual().index()].is_some() {
            return Err(Error::DualCompletionMode(kind.direction()));
        }
        let handle_is_queue = matches!(handle, SourceHandle::Queue(_));
        if handle_is_queue != kind.is_queue() {
            return Err(Error::HandleKindMismatch(kind));
        }

        let token = SourceToken(self.entries.insert((kind, handle)));
        self.by_kind[kind.index()] = Some(token);
        Ok(token)
    }

    /// Resolve a ready token back to its kind and handle.
    ///
    /// Returns `None` for tokens this registry never issued.
    pub fn resolve(&mut self, token: SourceToken) -> Option<(SourceKind, &mut SourceHandle<Q, C>)> {
        self.entries
            .get_mut(token.0)
            .map(|(kind, handle)| (*kind, handle))
    }

    /// Token registered for a kind, if that kind is configured.
    pub fn token_for(&self, kind: SourceKind) -> Option<SourceToken> {
        self.by_kind[kind.index()]
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<Q, C> Default for SourceRegistry<Q, C> {
    fn default() -> Self {
        Self::new()
    }
}
