//! Connection Registry
//!
//! The authoritative set of open client connections.
//!
//! # Design
//!
//! Entries are keyed by a registry-assigned [`ConnectionId`]. Registration
//! and deregistration are idempotent because the broadcast pass and the
//! connection's own reader loop can both try to remove the same failed
//! connection.
//!
//! Iteration never happens under the lock: [`ConnectionRegistry::snapshot`]
//! copies the current `Arc` entries out, so removals made while a caller
//! walks the copy cannot skip or double-visit anything.
//!
//! The registry is generic over the sink type so this layer does not depend
//! on any transport.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

// =============================================================================
// Identifiers
// =============================================================================

/// Registry key for one connection. Monotonic, never reused.
pub type ConnectionId = u64;

/// Opaque client identifier used for logging and correlation only.
///
/// Short and random; uniqueness is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    const LEN: usize = 8;

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(Self::LEN);
        Self(id)
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One open connection: its ids plus the outbound sink.
pub struct ConnectionEntry<S: ?Sized> {
    id: ConnectionId,
    client_id: ClientId,
    sink: Arc<S>,
}

impl<S: ?Sized> ConnectionEntry<S> {
    /// Create an entry.
    #[must_use]
    pub const fn new(id: ConnectionId, client_id: ClientId, sink: Arc<S>) -> Self {
        Self {
            id,
            client_id,
            sink,
        }
    }

    /// Registry key.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Client identifier.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Outbound sink.
    #[must_use]
    pub const fn sink(&self) -> &Arc<S> {
        &self.sink
    }
}

impl<S: ?Sized> fmt::Debug for ConnectionEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Set of open connections ordered by accept time.
pub struct ConnectionRegistry<S: ?Sized> {
    entries: Mutex<BTreeMap<ConnectionId, Arc<ConnectionEntry<S>>>>,
    next_id: AtomicU64,
}

impl<S: ?Sized> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for ConnectionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<S: ?Sized> ConnectionRegistry<S> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next connection id.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add an entry. Returns `false` if its id is already registered.
    pub fn register(&self, entry: Arc<ConnectionEntry<S>>) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.id) {
            return false;
        }
        entries.insert(entry.id, entry);
        true
    }

    /// Remove an entry. Returns `None` if it was not registered.
    pub fn deregister(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry<S>>> {
        self.entries.lock().remove(&id)
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Point-in-time copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionEntry<S>>> {
        self.entries.lock().values().cloned().collect()
    }

    /// Visit every entry present when the call started.
    ///
    /// `f` may register or deregister freely; it walks a copy.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<ConnectionEntry<S>>),
    {
        for entry in &self.snapshot() {
            f(entry);
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
