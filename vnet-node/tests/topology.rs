use std::sync::Arc;

use vnet_exec::{
    mock::{self, RecordingExecutor},
    Cmd, Signal,
};
use vnet_node::{
    platform::Linux, Context, Controller, IntfConfig, Link, LinkKind, LinkOptions, Node,
    NodeOptions, Result, ShapingConfig, Switch, Time,
};

fn session() -> (Arc<RecordingExecutor>, Context) {
    let _ = tracing_subscriber::fmt::try_init();

    let exec = Arc::new(RecordingExecutor::new());
    exec.respond("qdisc show", mock::ok("qdisc noqueue 0: root refcnt 2\n"));
    let ctx = Context::new(exec.clone(), Arc::new(Linux));
    (exec, ctx)
}

#[test]
fn shaped_link_between_two_hosts() {
    let (exec, ctx) = session();
    let h1 = Node::new(&ctx, "h1", NodeOptions::default()).unwrap();
    let h2 = Node::new(&ctx, "h2", NodeOptions::default()).unwrap();
    let (pid1, pid2) = (h1.pid().unwrap(), h2.pid().unwrap());

    let shaping = ShapingConfig::default()
        .with_bandwidth(10.0)
        .with_delay(Time::from_millis(5))
        .with_loss(1.0);
    let mut link = Link::new(&h1, &h2, LinkOptions::default().shaped(shaping)).unwrap();
    assert_eq!(link.to_string(), "h1-eth0<->h2-eth0");

    let pair = format!(
        "nsenter --target {pid1} --net -- ip link add name h1-eth0 type veth peer name h2-eth0 netns {pid2}"
    );
    assert_eq!(exec.matching("type veth"), [pair]);

    let (end1, end2) = link.shaping().unwrap();
    assert_eq!(
        end1.commands,
        [
            "tc qdisc add dev h1-eth0 root handle 5: htb default 1",
            "tc class add dev h1-eth0 parent 5: classid 5:1 htb rate 10.000000Mbit burst 15k",
            "tc qdisc add dev h1-eth0 parent 5:1 handle 10: netem delay 5ms loss 1.00000 ",
        ]
    );
    assert_eq!(end1.parent.to_string(), "parent 10:1");
    assert!(end1.errors.is_empty());
    assert_eq!(end2.commands.len(), 3);
    assert_eq!(end2.parent, end1.parent);

    // Both ends were shaped inside their own namespace.
    assert_eq!(exec.matching(&format!("--target {pid1} --net -- tc qdisc add")).len(), 2);
    assert_eq!(exec.matching(&format!("--target {pid2} --net -- tc qdisc add")).len(), 2);

    link.delete();
    assert!(h1.intf_names().is_empty());
    assert!(h2.intf_names().is_empty());
    assert_eq!(link.intf1().link(), None);
    assert_eq!(link.intf2().link(), None);

    h1.terminate();
    h2.terminate();
    assert_eq!(exec.signals(pid1), vec![Signal::SIGHUP]);
    assert_eq!(exec.signals(pid2), vec![Signal::SIGHUP]);
}

#[test]
fn slow_links_clear_stale_interfaces_first() {
    let (exec, ctx) = session();
    let h1 = Node::new(&ctx, "h1", NodeOptions::default()).unwrap();
    let r0 = Node::new(&ctx, "r0", NodeOptions::default().with_isolated(false)).unwrap();
    exec.clear_history();

    let options = LinkOptions::default()
        .with_fast(false)
        .with_params(IntfConfig::default().with_ip("10.0.0.1", 24), IntfConfig::default());
    let link = Link::new(&h1, &r0, options).unwrap();

    let history = exec.history();
    assert_eq!(history[0], "ip link del h1-eth0");
    assert_eq!(history[1], "ip link del r0-eth0");
    assert_eq!(history[2], "ip link add name h1-eth0 type veth peer name r0-eth0");
    assert!(history.iter().any(|line| line.ends_with("ip link set h1-eth0 netns 1001")));
    assert_eq!(link.intf1().ip().as_deref(), Some("10.0.0.1"));
    assert_eq!(h1.intf("h1-eth0").unwrap().ip.as_deref(), Some("10.0.0.1"));
}

#[test]
fn terminated_nodes_cannot_be_linked() {
    let (_exec, ctx) = session();
    let h1 = Node::new(&ctx, "h1", NodeOptions::default()).unwrap();
    let h2 = Node::new(&ctx, "h2", NodeOptions::default()).unwrap();
    h2.terminate();

    let result = Link::new(&h1, &h2, LinkOptions::default());
    assert!(matches!(result, Err(vnet_node::Error::Terminated(name)) if name == "h2"));
}

/// A switch whose ports are all patch links, controlled through a `dpctl` style tool.
#[derive(Debug)]
struct PatchSwitch {
    node: Arc<Node>,
    controllers: Vec<Controller>,
}

impl Switch for PatchSwitch {
    fn node(&self) -> &Arc<Node> {
        &self.node
    }

    fn connected(&self) -> Result<bool> {
        Ok(!self.controllers.is_empty() && self.dpctl(&["show"])?.contains("connected"))
    }

    fn start(&mut self, controllers: &[Controller]) -> Result<()> {
        let targets: Vec<String> = controllers.iter().map(Controller::target).collect();
        let cmd = Cmd::new("patchd").arg(self.node.name()).args(targets);
        self.node.execute(cmd)?;
        self.controllers = controllers.to_vec();
        Ok(())
    }

    fn stop(&mut self, delete_intfs: bool) -> Result<()> {
        self.node.execute(Cmd::new("pkill").args(["-f", "patchd"]))?;
        if delete_intfs {
            self.node.delete_intfs();
        }
        self.controllers.clear();
        Ok(())
    }

    fn dpctl(&self, args: &[&str]) -> Result<String> {
        self.node.execute(Cmd::new("patchctl").arg(self.node.name()).args(args.iter().copied()))
    }

    fn setup() -> Result<()> {
        Ok(())
    }
}

#[test]
fn switches_drive_their_node() {
    let (exec, ctx) = session();
    exec.respond("patchctl s1 show", mock::ok("s1: connected to tcp:127.0.0.1:6653\n"));
    PatchSwitch::setup().unwrap();

    let s1 = Node::new(&ctx, "s1", NodeOptions::default().with_isolated(false)).unwrap();
    let s2 = Node::new(&ctx, "s2", NodeOptions::default().with_isolated(false)).unwrap();
    let _patch = Link::new(&s1, &s2, LinkOptions::default().with_kind(LinkKind::Patch)).unwrap();

    let mut switch = PatchSwitch { node: s1.clone(), controllers: Vec::new() };
    assert!(!switch.connected().unwrap());

    switch.start(&[Controller::new("c0", "127.0.0.1")]).unwrap();
    assert!(switch.connected().unwrap());
    assert_eq!(exec.matching("patchd"), ["patchd s1 tcp:127.0.0.1:6653"]);

    switch.stop(true).unwrap();
    assert!(!switch.connected().unwrap());
    assert!(s1.intf_names().is_empty());
    assert_eq!(s2.intf_names(), ["s2-eth0"]);
}
