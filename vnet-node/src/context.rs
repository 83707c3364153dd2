use std::sync::Arc;

use vnet_exec::{Executor, HostExecutor};

use crate::{
    alloc::{LinkId, LinkIdAllocator},
    platform::{self, Platform},
};

/// State shared by every node and link of one session: how commands run, which isolation
/// strategy is in use, and the session's allocators.
///
/// Cloning is cheap and clones share the same allocators.
#[derive(Debug, Clone)]
pub struct Context {
    exec: Arc<dyn Executor>,
    platform: Arc<dyn Platform>,
    links: Arc<LinkIdAllocator>,
}

impl Context {
    pub fn new(exec: Arc<dyn Executor>, platform: Arc<dyn Platform>) -> Self {
        Self { exec, platform, links: Arc::default() }
    }

    /// Runs commands on this host with the platform of the running operating system.
    pub fn native() -> Self {
        Self::new(Arc::new(HostExecutor), platform::native())
    }

    pub fn executor(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn next_link_id(&self) -> LinkId {
        self.links.next()
    }
}
