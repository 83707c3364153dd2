//! Identifier allocators owned by a [`Context`](crate::Context).
//!
//! Each allocator is a monotonic counter. Nothing is ever handed back, so an identifier is
//! never reused within a session.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::{Error, Result};

/// Highest routing domain id. Domain 0 is the host's.
pub const MAX_ROUTING_DOMAINS: u32 = 255;

/// Hands out routing domain ids `1..=MAX_ROUTING_DOMAINS`.
#[derive(Debug)]
pub struct DomainAllocator {
    next: AtomicU32,
}

impl Default for DomainAllocator {
    fn default() -> Self {
        Self { next: AtomicU32::new(1) }
    }
}

impl DomainAllocator {
    /// Allocates the next domain id. Once the ceiling is reached every call fails with
    /// [`Error::DomainsExhausted`] and the counter stays put.
    pub fn allocate(&self) -> Result<u32> {
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= MAX_ROUTING_DOMAINS).then_some(next + 1)
            })
            .map_err(|_| Error::DomainsExhausted { limit: MAX_ROUTING_DOMAINS })
    }

    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::SeqCst) - 1
    }
}

/// Unit numbers for cloned interfaces such as `pair(4)`.
#[derive(Debug, Default)]
pub struct UnitAllocator {
    next: AtomicU32,
}

impl UnitAllocator {
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Identifies a [`Link`](crate::Link) within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct LinkIdAllocator {
    next: AtomicU64,
}

impl LinkIdAllocator {
    pub fn next(&self) -> LinkId {
        LinkId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Port numbers of one node. Explicitly requested ports push the counter past them.
#[derive(Debug, Default)]
pub(crate) struct PortAllocator {
    next: u32,
}

impl PortAllocator {
    pub(crate) fn next(&mut self) -> u32 {
        let port = self.next;
        self.next = self.next.saturating_add(1);
        port
    }

    pub(crate) fn reserve(&mut self, port: u32) -> u32 {
        self.next = self.next.max(port.saturating_add(1));
        port
    }
}
