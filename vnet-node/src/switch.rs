use std::{fmt, sync::Arc};

use crate::{Node, Result};

/// Default OpenFlow controller port.
pub const DEFAULT_CONTROLLER_PORT: u16 = 6653;

/// Where a switch's control plane connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

impl Controller {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self { name: name.into(), ip: ip.into(), port: DEFAULT_CONTROLLER_PORT }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The `tcp:<ip>:<port>` target form switch daemons take.
    pub fn target(&self) -> String {
        format!("tcp:{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.target())
    }
}

/// Lifecycle hooks of a switch-like node.
///
/// Switch implementations live outside this crate. They own a [`Node`] and run their
/// daemons through [`Node::execute`], using the node's interface map to find their ports.
pub trait Switch: fmt::Debug + Send + Sync {
    /// The node the switch runs on.
    fn node(&self) -> &Arc<Node>;

    /// Whether the switch's control plane is connected.
    fn connected(&self) -> Result<bool>;

    /// Starts the switch daemon pointed at `controllers`.
    fn start(&mut self, controllers: &[Controller]) -> Result<()>;

    /// Stops the switch daemon, deleting the node's interfaces if `delete_intfs` is set.
    fn stop(&mut self, delete_intfs: bool) -> Result<()>;

    /// Runs the switch's datapath control utility and returns its output.
    fn dpctl(&self, args: &[&str]) -> Result<String>;

    /// Checks that the tools the switch depends on are installed.
    fn setup() -> Result<()>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_targets() {
        let c0 = Controller::new("c0", "127.0.0.1");
        assert_eq!(c0.target(), "tcp:127.0.0.1:6653");
        assert_eq!(c0.with_port(6633).to_string(), "c0 (tcp:127.0.0.1:6633)");
    }
}
