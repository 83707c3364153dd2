//! Isolation strategies.
//!
//! A [`Platform`] knows how to give a shell its own network identity on one operating
//! system and how to spell every interface and route operation there. The rest of the crate
//! only talks to the trait. [`native`] picks the implementation for the running OS once,
//! when a [`Context`](crate::Context) is created.
//!
//! | Platform    | Anchor                      | Runs commands with         | Pairs      |
//! |-------------|-----------------------------|----------------------------|------------|
//! | [`Linux`]   | network (+ mount) namespace | `nsenter --target <pid>`   | `veth`     |
//! | [`OpenBsd`] | routing domain + `pair(4)`  | `route -T<id> exec`        | `pair(4)`  |
//! | [`FreeBsd`] | vnet jail                   | `jexec <jid>`              | `epair(4)` |

use std::{fmt, sync::Arc};

use vnet_exec::{Cmd, Executor, ProcessHandle};

use crate::Result;

mod freebsd;
mod linux;
mod openbsd;

pub use freebsd::FreeBsd;
pub use linux::Linux;
pub use openbsd::OpenBsd;

/// Marker in every node shell's argument list. Cleanup finds stale shells by it.
pub const SHELL_TAG: &str = "vnet:";

/// The argument that tags the shell of node `name`.
pub fn shell_tag(name: &str) -> String {
    format!("{SHELL_TAG}{name}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Linux,
    OpenBsd,
    FreeBsd,
}

/// What keeps a node's network identity alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// The node shares the host's network stack.
    Host,
    /// The namespaces of the node's shell process.
    Namespace { pid: u32, mount: bool },
    /// A routing domain, held by a `pair(4)` interface created in it.
    RoutingDomain { id: u32, pair: String },
    /// A persistent vnet jail.
    Jail { jid: u32, name: String },
}

impl Anchor {
    pub const fn is_host(&self) -> bool {
        matches!(self, Self::Host)
    }
}

/// How a node is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch<'a> {
    pub name: &'a str,
    pub isolated: bool,
    /// Also give the node a private mount namespace, where the platform has one.
    pub mount_namespace: bool,
}

/// The two ends of an interface pair to create.
#[derive(Debug, Clone, Copy)]
pub struct PairRequest<'a> {
    pub name1: &'a str,
    pub name2: &'a str,
    pub mac1: Option<&'a str>,
    pub mac2: Option<&'a str>,
    pub anchor1: &'a Anchor,
    pub anchor2: &'a Anchor,
    /// Create the pair directly in its final place, without removing stale interfaces of
    /// the same names first.
    pub fast: bool,
}

/// An interface a route points at.
#[derive(Debug, Clone, Copy)]
pub struct RouteIntf<'a> {
    pub real_name: &'a str,
    pub ip: Option<&'a str>,
}

/// Where a default route goes.
#[derive(Debug, Clone, Copy)]
pub enum Gateway<'a> {
    Intf(RouteIntf<'a>),
    /// Raw route arguments such as `via 10.0.0.1`.
    Spec(&'a str),
}

/// One isolation strategy and the commands that go with it.
pub trait Platform: fmt::Debug + Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Allocates the isolation anchor and starts the node shell inside it. The shell leads
    /// its own process group.
    fn launch(
        &self,
        exec: &dyn Executor,
        launch: Launch<'_>,
    ) -> Result<(Anchor, Box<dyn ProcessHandle>)>;

    /// Releases an anchor. Anchors that are already gone are ignored.
    fn release(&self, exec: &dyn Executor, anchor: &Anchor);

    /// Makes `cmd` run inside `anchor`.
    fn wrap(&self, anchor: &Anchor, cmd: Cmd) -> Cmd;

    /// Creates a connected pair of interfaces, one inside each anchor, and returns their
    /// kernel names.
    fn make_pair(&self, exec: &dyn Executor, pair: PairRequest<'_>) -> Result<(String, String)>;

    /// Whether traffic shaping with `tc` is available.
    fn supports_tc(&self) -> bool;

    /// Lists the interfaces visible to a node.
    fn list_intfs(&self) -> Cmd;

    fn delete_intf(&self, real_name: &str) -> Cmd;

    /// Renames a kernel interface, or `None` when the platform cannot.
    fn rename_intf(&self, real_name: &str, new_name: &str) -> Option<RenameCmds>;

    fn set_mac(&self, real_name: &str, mac: &str) -> Vec<Cmd>;

    /// Toggles offloads, where the platform exposes them.
    fn offload(&self, real_name: &str, gro: bool, tx: bool, rx: bool) -> Option<Cmd>;

    fn set_addr(&self, real_name: &str, addr: &str, prefix_len: u8) -> Cmd;

    fn host_route(&self, anchor: &Anchor, dest: &str, intf: RouteIntf<'_>) -> Result<Vec<Cmd>>;

    /// Commands replacing the default route. Empty when `gateway` cannot be expressed.
    fn default_route(&self, anchor: &Anchor, gateway: Gateway<'_>) -> Vec<Cmd>;

    fn ifconfig(&self, real_name: &str, args: &[&str]) -> Cmd {
        Cmd::new("ifconfig").arg(real_name).args(args.iter().copied())
    }

    fn set_mtu(&self, real_name: &str, mtu: u32) -> Cmd {
        self.ifconfig(real_name, &["mtu", &mtu.to_string()])
    }
}

/// The commands that rename a kernel interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCmds {
    /// Run before `rename`, e.g. to take the interface down.
    pub before: Vec<Cmd>,
    pub rename: Cmd,
    /// Run against the new name once `rename` succeeded.
    pub after: Vec<Cmd>,
    /// Run against the old name when `rename` failed.
    pub restore: Vec<Cmd>,
}

impl RenameCmds {
    pub fn new(rename: Cmd) -> Self {
        Self { before: Vec::new(), rename, after: Vec::new(), restore: Vec::new() }
    }
}

/// The platform of the running operating system.
#[cfg(not(any(target_os = "openbsd", target_os = "freebsd")))]
pub fn native() -> Arc<dyn Platform> {
    Arc::new(Linux::default())
}

/// The platform of the running operating system.
#[cfg(target_os = "openbsd")]
pub fn native() -> Arc<dyn Platform> {
    Arc::new(OpenBsd::default())
}

/// The platform of the running operating system.
#[cfg(target_os = "freebsd")]
pub fn native() -> Arc<dyn Platform> {
    Arc::new(FreeBsd::default())
}

/// Runs `cmd` and turns a failure, or unexpected output, into an error message.
pub(crate) fn run_silent(exec: &dyn Executor, cmd: &Cmd) -> std::result::Result<(), String> {
    match exec.run(cmd) {
        Ok(output) if output.success() && output.combined().is_empty() => Ok(()),
        Ok(output) => Err(format!("{cmd}: {}", output.combined())),
        Err(e) => Err(format!("{cmd}: {e}")),
    }
}

/// Runs `cmd`, logging instead of failing. For teardown paths.
pub(crate) fn run_tolerant(exec: &dyn Executor, cmd: &Cmd) {
    match exec.run(cmd) {
        Ok(output) if !output.success() => {
            tracing::debug!(%cmd, stderr = output.stderr.trim(), "ignoring failed teardown command")
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(%cmd, error = %e, "ignoring failed teardown command"),
    }
}
