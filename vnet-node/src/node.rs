use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use vnet_exec::{Cmd, Output, ProcessHandle, Signal};

use crate::{
    alloc::{LinkId, PortAllocator},
    platform::{run_tolerant, Anchor, Gateway, Launch, PlatformKind, RouteIntf},
    Context, Error, Result,
};

/// A directory private to each node, mounted inside the node's mount namespace.
///
/// `{name}` in a path is replaced by the node's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateDir {
    /// An empty tmpfs mounted on the directory.
    Tmpfs(String),
    /// `private_dir` bind-mounted on `mount_point`.
    Bind { mount_point: String, private_dir: String },
}

impl PrivateDir {
    fn mount_point(&self, node: &str) -> String {
        match self {
            Self::Tmpfs(dir) => dir.replace("{name}", node),
            Self::Bind { mount_point, .. } => mount_point.replace("{name}", node),
        }
    }

    fn mount_cmds(&self, node: &str) -> Vec<Cmd> {
        let mount_point = self.mount_point(node);
        match self {
            Self::Tmpfs(_) => vec![
                Cmd::new("mkdir").args(["-p", &mount_point]),
                Cmd::new("mount").args(["-n", "-t", "tmpfs", "tmpfs", &mount_point]),
            ],
            Self::Bind { private_dir, .. } => {
                let private_dir = private_dir.replace("{name}", node);
                vec![
                    Cmd::new("mkdir").args(["-p", &private_dir]),
                    Cmd::new("mkdir").args(["-p", &mount_point]),
                    Cmd::new("mount").args(["--bind", &private_dir, &mount_point]),
                ]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Give the node its own network stack. Defaults to `true`.
    pub isolated: bool,
    pub private_dirs: Vec<PrivateDir>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self { isolated: true, private_dirs: Vec::new() }
    }
}

impl NodeOptions {
    pub fn with_isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn with_private_dir(mut self, dir: PrivateDir) -> Self {
        self.private_dirs.push(dir);
        self
    }
}

/// What a node knows about one of its interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntfInfo {
    pub port: u32,
    /// The kernel's name for the interface.
    pub real_name: String,
    pub ip: Option<String>,
    pub link: Option<LinkId>,
}

/// Target of a default route.
#[derive(Debug, Clone, Copy)]
pub enum RouteVia<'a> {
    /// One of the node's interfaces, by logical name.
    Intf(&'a str),
    /// Raw route arguments, e.g. `via 10.0.0.1`. A single word naming one of the node's
    /// interfaces is treated as that interface.
    Spec(&'a str),
}

#[derive(Debug, Default)]
struct NodeState {
    shell: Option<Box<dyn ProcessHandle>>,
    anchor: Option<Anchor>,
    intfs: FxHashMap<String, IntfInfo>,
    ports: PortAllocator,
    mounted: Vec<String>,
    terminated: bool,
}

/// A shell with its own network identity, and the interfaces attached to it.
///
/// Nodes are shared as `Arc<Node>`: every [`Intf`](crate::Intf) holds a reference to its
/// node. The node is terminated when [`Node::terminate`] is called or when the last
/// reference is dropped.
pub struct Node {
    name: String,
    isolated: bool,
    ctx: Context,
    state: Mutex<NodeState>,
}

impl Node {
    /// Allocates the node's isolation anchor, starts its shell and mounts its private
    /// directories.
    pub fn new(ctx: &Context, name: impl Into<String>, options: NodeOptions) -> Result<Arc<Self>> {
        let name = name.into();

        if !options.private_dirs.is_empty() && !options.isolated {
            return Err(Error::NotIsolated(name));
        }
        let private_dirs = if ctx.platform().kind() == PlatformKind::Linux {
            options.private_dirs
        } else {
            if !options.private_dirs.is_empty() {
                tracing::warn!(node = %name, "private directories are only supported on linux, ignoring");
            }
            Vec::new()
        };

        let launch = Launch {
            name: &name,
            isolated: options.isolated,
            mount_namespace: !private_dirs.is_empty(),
        };
        let (anchor, shell) = ctx.platform().launch(ctx.executor(), launch)?;
        tracing::debug!(node = %name, ?anchor, pid = shell.pid(), "node started");

        let node = Arc::new(Self {
            name,
            isolated: options.isolated,
            ctx: ctx.clone(),
            state: Mutex::new(NodeState {
                shell: Some(shell),
                anchor: Some(anchor),
                ..Default::default()
            }),
        });

        // On failure the node is dropped, which terminates it.
        node.mount_private_dirs(&private_dirs)?;

        Ok(node)
    }

    fn mount_private_dirs(&self, dirs: &[PrivateDir]) -> Result<()> {
        for dir in dirs {
            for cmd in dir.mount_cmds(&self.name) {
                let output = self.pexec(cmd)?;
                if !output.success() {
                    return Err(vnet_exec::Error::NonZero(output).into());
                }
            }
            self.state.lock().mounted.push(dir.mount_point(&self.name));
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The pid of the node's shell, while it runs.
    pub fn pid(&self) -> Option<u32> {
        self.state.lock().shell.as_ref().map(|shell| shell.pid())
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.state.lock().anchor.clone()
    }

    fn live_anchor(&self) -> Result<Anchor> {
        self.anchor().ok_or_else(|| Error::Terminated(self.name.clone()))
    }

    /// Runs `cmd` inside the node and returns its output.
    pub fn pexec(&self, cmd: Cmd) -> Result<Output> {
        let anchor = self.live_anchor()?;
        let cmd = self.ctx.platform().wrap(&anchor, cmd);
        Ok(self.ctx.executor().run(&cmd)?)
    }

    /// Runs `cmd` inside the node and returns its standard output and error, combined and
    /// trimmed. A non-zero exit status is not an error, the output says what happened.
    pub fn execute(&self, cmd: Cmd) -> Result<String> {
        Ok(self.pexec(cmd)?.combined())
    }

    pub fn new_port(&self) -> u32 {
        self.state.lock().ports.next()
    }

    /// Claims `port`, so that later [`Node::new_port`] calls return higher numbers.
    pub fn reserve_port(&self, port: u32) -> u32 {
        self.state.lock().ports.reserve(port)
    }

    /// Registers an interface under its logical name.
    pub fn add_intf(&self, name: impl Into<String>, info: IntfInfo) {
        let name = name.into();
        let mut state = self.state.lock();
        state.ports.reserve(info.port);
        if let Some(previous) = state.intfs.insert(name.clone(), info) {
            tracing::warn!(node = %self.name, intf = %name, ?previous, "replaced interface");
        }
    }

    pub fn remove_intf(&self, name: &str) -> Option<IntfInfo> {
        self.state.lock().intfs.remove(name)
    }

    pub fn intf(&self, name: &str) -> Option<IntfInfo> {
        self.state.lock().intfs.get(name).cloned()
    }

    /// Logical names of the registered interfaces, sorted.
    pub fn intf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().intfs.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// The kernel name behind a logical interface name.
    pub fn real_name(&self, name: &str) -> Result<String> {
        self.intf(name).map(|info| info.real_name).ok_or_else(|| self.not_found(name))
    }

    fn not_found(&self, intf: &str) -> Error {
        Error::IntfNotFound { node: self.name.clone(), intf: intf.to_string() }
    }

    pub(crate) fn update_intf(&self, name: &str, f: impl FnOnce(&mut IntfInfo)) {
        if let Some(info) = self.state.lock().intfs.get_mut(name) {
            f(info);
        }
    }

    pub(crate) fn rename_intf(&self, old: &str, new: &str, real_name: &str) {
        let mut state = self.state.lock();
        if let Some(mut info) = state.intfs.remove(old) {
            info.real_name = real_name.to_string();
            state.intfs.insert(new.to_string(), info);
        }
    }

    /// Adds a route to `ip` through the interface named `intf`.
    pub fn set_host_route(&self, ip: &str, intf: &str) -> Result<()> {
        let info = self.intf(intf).ok_or_else(|| self.not_found(intf))?;
        let anchor = self.live_anchor()?;
        let route = RouteIntf { real_name: &info.real_name, ip: info.ip.as_deref() };

        for cmd in self.ctx.platform().host_route(&anchor, ip, route)? {
            self.run_route(cmd)?;
        }
        Ok(())
    }

    /// Replaces the default route.
    pub fn set_default_route(&self, via: RouteVia<'_>) -> Result<()> {
        let anchor = self.live_anchor()?;

        let intf = match via {
            RouteVia::Intf(name) => Some(self.intf(name).ok_or_else(|| self.not_found(name))?),
            RouteVia::Spec(spec) => self.intf(spec),
        };
        let gateway = match (&intf, via) {
            (Some(info), _) => {
                Gateway::Intf(RouteIntf { real_name: &info.real_name, ip: info.ip.as_deref() })
            }
            (None, RouteVia::Spec(spec) | RouteVia::Intf(spec)) => Gateway::Spec(spec),
        };

        for cmd in self.ctx.platform().default_route(&anchor, gateway) {
            self.run_route(cmd)?;
        }
        Ok(())
    }

    fn run_route(&self, cmd: Cmd) -> Result<()> {
        let cmd_line = cmd.to_string();
        let output = self.execute(cmd)?;
        if !output.is_empty() {
            tracing::warn!(node = %self.name, cmd = %cmd_line, %output, "route command");
        }
        Ok(())
    }

    /// Deletes every registered interface from the kernel and forgets them. Failures are
    /// logged and skipped.
    pub fn delete_intfs(&self) {
        let intfs: Vec<(String, IntfInfo)> = self.state.lock().intfs.drain().collect();
        let Some(anchor) = self.anchor() else { return };

        for (name, info) in intfs {
            let cmd = self.ctx.platform().wrap(&anchor, self.ctx.platform().delete_intf(&info.real_name));
            run_tolerant(self.ctx.executor(), &cmd);
            tracing::debug!(node = %self.name, intf = %name, "deleted interface");
        }
    }

    /// Tears the node down: unmounts its private directories, hangs up its shell's process
    /// group and releases its isolation anchor. Safe to call more than once, and on nodes
    /// whose shell already exited.
    pub fn terminate(&self) {
        let (shell, anchor, mounted) = {
            let mut state = self.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            (state.shell.take(), state.anchor.take(), std::mem::take(&mut state.mounted))
        };

        let exec = self.ctx.executor();
        let platform = self.ctx.platform();

        if let Some(anchor) = &anchor {
            for dir in mounted.iter().rev() {
                run_tolerant(exec, &platform.wrap(anchor, Cmd::new("umount").arg(dir)));
            }
        }

        if let Some(mut shell) = shell {
            if shell.is_alive() {
                if let Err(e) = shell.signal_group(Signal::SIGHUP) {
                    tracing::error!(node = %self.name, error = %e, "failed to signal shell");
                }
            }
        }

        if let Some(anchor) = &anchor {
            platform.release(exec, anchor);
        }

        self.state.lock().intfs.clear();
        tracing::debug!(node = %self.name, "terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("isolated", &self.isolated)
            .field("anchor", &self.anchor())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
