use std::{fmt, sync::Arc};

use vnet_exec::Cmd;
use vnet_tc::{Parent, Plan, ShapingConfig, Target};

use crate::{alloc::LinkId, node::IntfInfo, Error, Node, Result};

/// Default prefix length for interface addresses.
pub const DEFAULT_PREFIX_LEN: u8 = 8;

/// Selects how an interface behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntfKind {
    /// A kernel interface configured with addresses, MTU and MAC.
    Plain,
    /// A kernel interface that also accepts [`ShapingConfig`]s.
    TrafficShaped,
    /// A port internal to a switch. There is no kernel object behind it and the only
    /// configuration it accepts is being brought up.
    Patch,
}

/// Addressing-level configuration of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntfConfig {
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub prefix_len: u8,
    pub mtu: Option<u32>,
    /// Bring the interface up.
    pub up: bool,
}

impl Default for IntfConfig {
    fn default() -> Self {
        Self { mac: None, ip: None, prefix_len: DEFAULT_PREFIX_LEN, mtu: None, up: false }
    }
}

impl IntfConfig {
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>, prefix_len: u8) -> Self {
        self.ip = Some(ip.into());
        self.prefix_len = prefix_len;
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    pub fn with_up(mut self) -> Self {
        self.up = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mac.is_none() && self.ip.is_none() && self.mtu.is_none() && !self.up
    }
}

/// Output of each command run by [`Intf::configure`], for the settings that were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigResult {
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub mtu: Option<String>,
    pub up: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapingError {
    #[error(transparent)]
    Invalid(#[from] vnet_tc::Error),
    #[error("{command}: {output}")]
    Command { command: String, output: String },
}

/// What [`Intf::configure_shaping`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapingResult {
    /// The `tc` command lines, in the order they ran.
    pub commands: Vec<String>,
    /// The output of each command. Empty on success.
    pub outputs: Vec<String>,
    /// Where a further qdisc would attach.
    pub parent: Parent,
    /// Invalid parameters and failed commands. Neither stops the remaining commands.
    pub errors: Vec<ShapingError>,
}

/// Whether a node is on the switch side of a link, for [`ShapingConfig::speedup`].
///
/// Only the node name is looked at: switches are conventionally named `s1`, `s2`, ...
pub fn is_switch_side(node: &str) -> bool {
    node.starts_with('s')
}

/// A network interface attached to a [`Node`].
///
/// The logical name is what the node's interface map and the rest of vnet use. The real
/// name is what the kernel calls it, which differs on platforms that cannot rename
/// interfaces.
#[derive(Debug)]
pub struct Intf {
    name: String,
    real_name: String,
    node: Arc<Node>,
    port: u32,
    mac: Option<String>,
    link: Option<LinkId>,
    kind: IntfKind,
    deleted: bool,
}

impl Intf {
    /// Attaches an interface that already exists in the kernel under `name`, on the next
    /// free port.
    pub fn attach(node: &Arc<Node>, name: impl Into<String>, kind: IntfKind) -> Self {
        let name = name.into();
        let port = node.new_port();
        Self::from_parts(node, name.clone(), name, port, None, None, kind)
    }

    pub(crate) fn from_parts(
        node: &Arc<Node>,
        name: String,
        real_name: String,
        port: u32,
        mac: Option<String>,
        link: Option<LinkId>,
        kind: IntfKind,
    ) -> Self {
        node.add_intf(name.clone(), IntfInfo { port, real_name: real_name.clone(), ip: None, link });
        Self { name, real_name, node: Arc::clone(node), port, mac, link, kind, deleted: false }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn real_name(&self) -> &str {
        &self.real_name
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub const fn port(&self) -> u32 {
        self.port
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    pub const fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub const fn kind(&self) -> IntfKind {
        self.kind
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn check_live(&self) -> Result<()> {
        if self.deleted {
            return Err(Error::IntfDeleted(self.name.clone()));
        }
        Ok(())
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::Unsupported(format!("{what} on {:?} interface {}", self.kind, self.name))
    }

    /// Runs `ifconfig` on the interface. Patch interfaces only accept `up`.
    pub fn ifconfig(&self, args: &[&str]) -> Result<String> {
        self.check_live()?;
        if self.kind == IntfKind::Patch {
            if args == ["up"] {
                return Ok(String::new());
            }
            return Err(self.unsupported(&format!("ifconfig {}", args.join(" "))));
        }

        let cmd = self.node.context().platform().ifconfig(&self.real_name, args);
        self.node.execute(cmd)
    }

    pub fn set_mac(&mut self, mac: &str) -> Result<String> {
        self.check_live()?;
        if self.kind == IntfKind::Patch {
            return Err(self.unsupported("setting the MAC address"));
        }
        if !is_valid_mac(mac) {
            return Err(Error::InvalidMac(mac.to_string()));
        }

        let mut outputs = Vec::new();
        for cmd in self.node.context().platform().set_mac(&self.real_name, mac) {
            outputs.push(self.node.execute(cmd)?);
        }
        self.mac = Some(mac.to_string());

        Ok(outputs.into_iter().filter(|o| !o.is_empty()).collect::<Vec<_>>().join("\n"))
    }

    pub fn set_ip(&mut self, ip: &str, prefix_len: u8) -> Result<String> {
        self.check_live()?;
        if self.kind == IntfKind::Patch {
            return Err(self.unsupported("setting an address"));
        }

        let cmd = self.node.context().platform().set_addr(&self.real_name, ip, prefix_len);
        let output = self.node.execute(cmd)?;
        self.node.update_intf(&self.name, |info| info.ip = Some(ip.to_string()));
        Ok(output)
    }

    /// The address last set on this interface.
    pub fn ip(&self) -> Option<String> {
        self.node.intf(&self.name).and_then(|info| info.ip)
    }

    /// Applies addressing-level configuration. Patch interfaces reject everything except
    /// bringing them up.
    pub fn configure(&mut self, config: &IntfConfig) -> Result<ConfigResult> {
        self.check_live()?;
        if self.kind == IntfKind::Patch && (config.mac.is_some() || config.ip.is_some() || config.mtu.is_some()) {
            return Err(self.unsupported("configuring anything but `up`"));
        }

        let mut result = ConfigResult::default();
        if let Some(mac) = &config.mac {
            result.mac = Some(self.set_mac(mac)?);
        }
        if let Some(ip) = &config.ip {
            result.ip = Some(self.set_ip(ip, config.prefix_len)?);
        }
        if let Some(mtu) = config.mtu {
            let cmd = self.node.context().platform().set_mtu(&self.real_name, mtu);
            result.mtu = Some(self.node.execute(cmd)?);
        }
        if config.up {
            result.up = Some(self.ifconfig(&["up"])?);
        }

        Ok(result)
    }

    /// Shapes the traffic leaving this interface.
    ///
    /// Offload settings are applied first. When the configuration touches neither
    /// bandwidth, delay, loss nor queue size, nothing else happens. Otherwise an existing
    /// non-default discipline is removed and the planned chain is installed. Invalid
    /// parameters drop their part of the chain, and commands that print anything are
    /// reported as failed; neither stops the rest of the chain.
    pub fn configure_shaping(&mut self, config: &ShapingConfig) -> Result<ShapingResult> {
        let _span = tracing::debug_span!("shaping", intf = %self.name).entered();

        self.check_live()?;
        if self.kind != IntfKind::TrafficShaped {
            return Err(self.unsupported("traffic shaping"));
        }

        let platform = self.node.context().platform();
        if !platform.supports_tc() && !config.is_empty() {
            return Err(self.unsupported("traffic shaping on this platform"));
        }

        let offload = platform.offload(
            &self.real_name,
            !config.disable_gro,
            !config.disable_tx_offload,
            !config.disable_rx_offload,
        );
        if let Some(cmd) = offload {
            let output = self.node.execute(cmd)?;
            if !output.is_empty() {
                tracing::debug!(%output, "offload settings");
            }
        }

        if config.is_empty() {
            return Ok(ShapingResult::default());
        }

        let show = Cmd::new("tc").args(["qdisc", "show", "dev", &self.real_name]);
        let current = self.node.execute(show)?;

        let target = Target::new(&self.real_name)
            .pristine(vnet_tc::is_pristine(&current))
            .switch_side(is_switch_side(self.node.name()));
        let Plan { chain, errors } = config.plan(target);

        let mut result =
            ShapingResult { errors: errors.into_iter().map(Into::into).collect(), ..Default::default() };
        for error in &result.errors {
            tracing::error!(%error, "invalid shaping parameter");
        }

        tracing::info!("{}", config.summary());

        let (commands, parent) = chain.into_parts();
        for command in &commands {
            let output = match Cmd::parse(command) {
                Ok(cmd) => self.node.execute(cmd).unwrap_or_else(|e| e.to_string()),
                Err(e) => e.to_string(),
            };

            if !output.is_empty() {
                tracing::error!(%command, %output, "shaping command failed");
                result
                    .errors
                    .push(ShapingError::Command { command: command.clone(), output: output.clone() });
            }
            result.outputs.push(output);
        }

        result.commands = commands;
        result.parent = parent;
        Ok(result)
    }

    /// Renames the interface. Where the kernel cannot rename interfaces only the logical
    /// name changes. A rejected kernel rename leaves both names untouched.
    pub fn rename(&mut self, new_name: &str) -> Result<String> {
        self.check_live()?;

        let mut output = String::new();
        let mut real_name = self.real_name.clone();
        let steps = match self.kind {
            IntfKind::Patch => None,
            _ => self.node.context().platform().rename_intf(&self.real_name, new_name),
        };
        if let Some(steps) = steps {
            for cmd in steps.before {
                output.push_str(&self.node.execute(cmd)?);
            }

            // `ifconfig name` echoes the new name; anything else is an error.
            let renamed = self.node.pexec(steps.rename)?;
            let rejected = renamed.combined();
            if !renamed.success() || !(rejected.is_empty() || rejected == new_name) {
                for cmd in steps.restore {
                    if let Err(e) = self.node.execute(cmd) {
                        tracing::debug!(intf = %self.name, error = %e, "restoring after rename");
                    }
                }
                return Err(Error::Rename {
                    intf: self.real_name.clone(),
                    new_name: new_name.to_string(),
                    output: rejected,
                });
            }

            for cmd in steps.after {
                output.push_str(&self.node.execute(cmd)?);
            }
            real_name = new_name.to_string();
        }

        self.node.rename_intf(&self.name, new_name, &real_name);
        self.name = new_name.to_string();
        self.real_name = real_name;
        Ok(output)
    }

    /// Deletes the kernel interface, deregisters it from its node and drops the link
    /// reference. Deleting twice is a no-op, and so is deleting an interface the kernel
    /// already removed.
    pub fn delete(&mut self) {
        if self.deleted {
            return;
        }

        if self.kind != IntfKind::Patch && !self.node.is_terminated() {
            let cmd = self.node.context().platform().delete_intf(&self.real_name);
            match self.node.execute(cmd) {
                Ok(output) if !output.is_empty() => {
                    tracing::debug!(intf = %self.name, %output, "interface delete")
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(intf = %self.name, error = %e, "interface delete"),
            }
        }

        self.node.remove_intf(&self.name);
        self.link = None;
        self.deleted = true;
    }

    /// `"OK"` when the node still sees the interface, `"MISSING"` otherwise.
    pub fn status(&self) -> Result<&'static str> {
        let present = if self.deleted {
            false
        } else if self.kind == IntfKind::Patch {
            self.node.intf(&self.name).is_some()
        } else {
            let list = self.node.context().platform().list_intfs();
            lists_intf(&self.node.execute(list)?, &self.real_name)
        };

        Ok(if present { "OK" } else { "MISSING" })
    }

    pub fn is_up(&self) -> Result<bool> {
        Ok(self.ifconfig(&[])?.contains("UP"))
    }
}

/// Whether an interface listing names `real_name`. Covers `ip link show` (`2: h1-eth0@if3:`),
/// `ifconfig -a` headers (`pair1:`) and `ifconfig -l` (space separated).
fn lists_intf(listing: &str, real_name: &str) -> bool {
    listing.split_ascii_whitespace().any(|word| {
        let word = word.trim_end_matches(':');
        word.split_once('@').map_or(word, |(name, _)| name) == real_name
    })
}

impl fmt::Display for Intf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets.iter().all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use vnet_exec::mock::{self, RecordingExecutor};

    use super::*;
    use crate::{
        platform::{FreeBsd, Linux, OpenBsd},
        Context, NodeOptions,
    };

    fn host_node(exec: &Arc<RecordingExecutor>, name: &str) -> Arc<Node> {
        let ctx = Context::new(exec.clone(), Arc::new(Linux));
        Node::new(&ctx, name, NodeOptions::default().with_isolated(false)).unwrap()
    }

    #[test]
    fn patch_interfaces_only_come_up() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "s1");
        let mut intf = Intf::attach(&node, "s1-eth1", IntfKind::Patch);
        exec.clear_history();

        assert_eq!(intf.ifconfig(&["up"]).unwrap(), "");
        assert!(intf.configure(&IntfConfig::default().with_up()).is_ok());
        assert!(matches!(intf.ifconfig(&["down"]), Err(Error::Unsupported(_))));
        assert!(matches!(
            intf.configure(&IntfConfig::default().with_ip("10.0.0.1", 8)),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(intf.set_mac("00:00:00:00:00:01"), Err(Error::Unsupported(_))));
        assert!(exec.history().is_empty());
    }

    #[test]
    fn plain_interfaces_do_not_shape() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);

        let config = ShapingConfig::default().with_bandwidth(10.0);
        assert!(matches!(intf.configure_shaping(&config), Err(Error::Unsupported(_))));
    }

    #[test]
    fn configure_applies_addressing() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);
        exec.clear_history();

        let config = IntfConfig::default()
            .with_mac("00:00:00:00:00:01")
            .with_ip("10.0.0.1", 24)
            .with_mtu(1400)
            .with_up();
        let result = intf.configure(&config).unwrap();

        assert_eq!(result.ip.as_deref(), Some(""));
        assert_eq!(intf.ip().as_deref(), Some("10.0.0.1"));
        assert_eq!(intf.mac(), Some("00:00:00:00:00:01"));
        assert_eq!(
            exec.history(),
            [
                "ifconfig h1-eth0 down",
                "ifconfig h1-eth0 hw ether 00:00:00:00:00:01",
                "ifconfig h1-eth0 up",
                "ifconfig h1-eth0 10.0.0.1/24 up",
                "ifconfig h1-eth0 mtu 1400",
                "ifconfig h1-eth0 up",
            ]
        );

        assert!(matches!(intf.set_mac("not-a-mac"), Err(Error::InvalidMac(_))));
    }

    #[test]
    fn shaping_skips_tc_when_nothing_to_shape() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::TrafficShaped);
        exec.clear_history();

        let result = intf.configure_shaping(&ShapingConfig::default()).unwrap();
        assert_eq!(result, ShapingResult::default());
        assert_eq!(exec.history(), ["ethtool -K h1-eth0 gro off tx on rx on"]);
    }

    #[test]
    fn reconfiguring_resets_the_root_first() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::TrafficShaped);
        let config = ShapingConfig::default().with_bandwidth(10.0);

        exec.respond("qdisc show", mock::ok("qdisc noqueue 0: root refcnt 2\n"));
        let first = intf.configure_shaping(&config).unwrap();
        assert!(!first.commands.iter().any(|cmd| cmd.contains("qdisc del")));

        exec.respond("qdisc show", mock::ok("qdisc htb 5: root refcnt 2 r2q 10 default 0x1\n"));
        let second = intf.configure_shaping(&config).unwrap();
        assert_eq!(second.commands[0], "tc qdisc del dev h1-eth0 root");
        assert_eq!(second.commands[1..], first.commands[..]);
    }

    #[test]
    fn noisy_commands_are_errors_but_do_not_stop_the_chain() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::TrafficShaped);
        exec.respond("qdisc show", mock::ok("qdisc noqueue 0: root"));
        exec.respond("htb default 1", mock::failed(2, "RTNETLINK answers: Operation not permitted"));

        let config = ShapingConfig::default().with_bandwidth(10.0).with_loss(5.0);
        let result = intf.configure_shaping(&config).unwrap();

        assert_eq!(result.commands.len(), 3);
        assert_eq!(result.outputs[0], "RTNETLINK answers: Operation not permitted");
        assert!(result.outputs[1..].iter().all(String::is_empty));
        assert!(matches!(result.errors[..], [ShapingError::Command { .. }]));
        assert_eq!(result.parent.to_string(), "parent 10:1");
    }

    #[test]
    fn invalid_parameters_are_reported() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::TrafficShaped);
        exec.respond("qdisc show", mock::ok("qdisc noqueue 0: root"));

        let config = ShapingConfig::default().with_bandwidth(5000.0).with_loss(1.0);
        let result = intf.configure_shaping(&config).unwrap();

        assert!(matches!(
            result.errors[..],
            [ShapingError::Invalid(vnet_tc::Error::BandwidthOutOfRange { .. })]
        ));
        assert_eq!(result.commands, ["tc qdisc add dev h1-eth0 root handle 10: netem loss 1.00000 "]);
    }

    #[test]
    fn speedup_on_switch_nodes() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "s1");
        let mut intf = Intf::attach(&node, "s1-eth1", IntfKind::TrafficShaped);
        exec.respond("qdisc show", mock::ok("qdisc noqueue 0: root"));

        let config = ShapingConfig::default().with_bandwidth(10.0).with_speedup(1000.0);
        let result = intf.configure_shaping(&config).unwrap();
        assert!(result.commands[1].contains("rate 1000.000000Mbit"));
        assert!(is_switch_side("s1") && !is_switch_side("h1"));
    }

    #[test]
    fn rename_is_logical_without_kernel_support() {
        let exec = Arc::new(RecordingExecutor::new());
        let ctx = Context::new(exec.clone(), Arc::new(OpenBsd::default()));
        let node = Node::new(&ctx, "h1", NodeOptions::default().with_isolated(false)).unwrap();
        let mut intf = Intf::from_parts(&node, "h1-eth0".into(), "pair3".into(), 0, None, None, IntfKind::Plain);
        exec.clear_history();

        intf.rename("eth0").unwrap();
        assert_eq!(intf.name(), "eth0");
        assert_eq!(intf.real_name(), "pair3");
        assert_eq!(node.real_name("eth0").unwrap(), "pair3");
        assert!(node.intf("h1-eth0").is_none());
        assert!(exec.history().is_empty());

        intf.ifconfig(&["up"]).unwrap();
        assert_eq!(exec.history(), ["ifconfig pair3 up"]);
    }

    #[test]
    fn rename_changes_the_kernel_name_on_linux() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);
        exec.clear_history();

        intf.rename("eth0").unwrap();
        assert_eq!(intf.real_name(), "eth0");
        assert_eq!(node.real_name("eth0").unwrap(), "eth0");
        assert_eq!(
            exec.history(),
            ["ifconfig h1-eth0 down", "ip link set h1-eth0 name eth0", "ifconfig eth0 up"]
        );
    }

    #[test]
    fn echoed_name_is_a_successful_rename() {
        let exec = Arc::new(RecordingExecutor::new());
        let ctx = Context::new(exec.clone(), Arc::new(FreeBsd));
        let node = Node::new(&ctx, "h1", NodeOptions::default().with_isolated(false)).unwrap();
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);
        exec.respond("name eth0", mock::ok("eth0\n"));

        intf.rename("eth0").unwrap();
        assert_eq!(intf.real_name(), "eth0");
        assert_eq!(exec.matching("name eth0"), ["ifconfig h1-eth0 name eth0"]);
    }

    #[test]
    fn rejected_rename_keeps_the_old_names() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);
        exec.clear_history();
        exec.respond("name eth0", mock::failed(2, "RTNETLINK answers: Device or resource busy"));

        let err = intf.rename("eth0").unwrap_err();
        assert!(matches!(err, Error::Rename { ref output, .. } if output.contains("busy")));
        assert_eq!(intf.name(), "h1-eth0");
        assert_eq!(intf.real_name(), "h1-eth0");
        assert_eq!(node.real_name("h1-eth0").unwrap(), "h1-eth0");
        assert!(node.intf("eth0").is_none());
        assert_eq!(
            exec.history(),
            ["ifconfig h1-eth0 down", "ip link set h1-eth0 name eth0", "ifconfig h1-eth0 up"]
        );
    }

    #[test]
    fn status_matches_whole_names() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let intf = Intf::attach(&node, "h1-eth1", IntfKind::Plain);

        exec.respond("ip link show", mock::ok("12: h1-eth10@if3: <BROADCAST,MULTICAST,UP>\n"));
        assert_eq!(intf.status().unwrap(), "MISSING");

        exec.respond(
            "ip link show",
            mock::ok("12: h1-eth10@if3: <BROADCAST>\n13: h1-eth1@if4: <BROADCAST>\n"),
        );
        assert_eq!(intf.status().unwrap(), "OK");
    }

    #[test]
    fn status_on_routing_domains_reads_ifconfig_headers() {
        let exec = Arc::new(RecordingExecutor::new());
        let ctx = Context::new(exec.clone(), Arc::new(OpenBsd::default()));
        let node = Node::new(&ctx, "h1", NodeOptions::default().with_isolated(false)).unwrap();
        let intf = Intf::from_parts(&node, "h1-eth0".into(), "pair1".into(), 0, None, None, IntfKind::Plain);

        let listing = "pair10: flags=8843<UP,BROADCAST> mtu 1500\n\tlladdr fe:e1:ba:d0:00:01\n";
        exec.respond("ifconfig -a", mock::ok(listing));
        assert_eq!(intf.status().unwrap(), "MISSING");

        exec.respond("ifconfig -a", mock::ok("pair1: flags=8843<UP,BROADCAST> mtu 1500\n"));
        assert_eq!(intf.status().unwrap(), "OK");
    }

    #[test]
    fn delete_and_status() {
        let exec = Arc::new(RecordingExecutor::new());
        let node = host_node(&exec, "h1");
        let mut intf = Intf::attach(&node, "h1-eth0", IntfKind::Plain);

        exec.respond("ip link show", mock::ok("2: h1-eth0@if3: <BROADCAST,MULTICAST,UP>"));
        assert_eq!(intf.status().unwrap(), "OK");

        exec.respond("ip link del", mock::failed(1, "Cannot find device \"h1-eth0\""));
        intf.delete();
        assert!(intf.is_deleted());
        assert!(node.intf("h1-eth0").is_none());
        assert_eq!(intf.status().unwrap(), "MISSING");

        let deletes = exec.matching("ip link del").len();
        intf.delete();
        assert_eq!(exec.matching("ip link del").len(), deletes);
        assert!(matches!(intf.ifconfig(&["up"]), Err(Error::IntfDeleted(_))));
    }
}
