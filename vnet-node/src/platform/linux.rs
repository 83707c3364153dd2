use vnet_exec::{Cmd, Executor, ProcessHandle};

use super::{
    run_silent, run_tolerant, shell_tag, Anchor, Gateway, Launch, PairRequest, Platform,
    PlatformKind, RenameCmds, RouteIntf,
};
use crate::{Error, Result};

/// Network namespaces. The node shell is started by `unshare`, which leaves it as the only
/// process holding the namespace. Commands join it with `nsenter`.
#[derive(Debug, Default)]
pub struct Linux;

impl Linux {
    fn shell(name: &str) -> Cmd {
        Cmd::new("bash").args(["--norc", "--noprofile", "-s"]).arg(shell_tag(name))
    }

    /// The `netns` argument placing an interface inside `anchor`. Pid 1 is the host.
    fn netns(anchor: &Anchor) -> String {
        match anchor {
            Anchor::Namespace { pid, .. } => pid.to_string(),
            _ => "1".to_string(),
        }
    }

    fn pair_error(pair: &PairRequest<'_>, output: String) -> Error {
        Error::PairCreation {
            name1: pair.name1.to_string(),
            name2: pair.name2.to_string(),
            output,
        }
    }
}

impl Platform for Linux {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    fn launch(
        &self,
        exec: &dyn Executor,
        launch: Launch<'_>,
    ) -> Result<(Anchor, Box<dyn ProcessHandle>)> {
        let shell = Self::shell(launch.name);
        if !launch.isolated {
            return Ok((Anchor::Host, exec.spawn(&shell)?));
        }

        let mut unshare = Cmd::new("unshare").arg("--net");
        if launch.mount_namespace {
            unshare = unshare.arg("--mount");
        }

        let handle = exec.spawn(&shell.wrapped_in(unshare.arg("--")))?;
        let anchor = Anchor::Namespace { pid: handle.pid(), mount: launch.mount_namespace };
        Ok((anchor, handle))
    }

    fn release(&self, _exec: &dyn Executor, _anchor: &Anchor) {
        // Namespaces go away with the last process in them.
    }

    fn wrap(&self, anchor: &Anchor, cmd: Cmd) -> Cmd {
        match anchor {
            Anchor::Namespace { pid, mount } => {
                let mut nsenter = Cmd::new("nsenter").args(["--target", &pid.to_string(), "--net"]);
                if *mount {
                    nsenter = nsenter.arg("--mount");
                }
                cmd.wrapped_in(nsenter.arg("--"))
            }
            _ => cmd,
        }
    }

    fn make_pair(&self, exec: &dyn Executor, pair: PairRequest<'_>) -> Result<(String, String)> {
        let mut add = Cmd::new("ip").args(["link", "add", "name", pair.name1]);
        if let Some(mac) = pair.mac1 {
            add = add.args(["address", mac]);
        }
        add = add.args(["type", "veth", "peer", "name", pair.name2]);
        if let Some(mac) = pair.mac2 {
            add = add.args(["address", mac]);
        }

        if pair.fast {
            // Created from inside the first node, with the peer sent straight to the second.
            let add = self.wrap(pair.anchor1, add.args(["netns", &Self::netns(pair.anchor2)]));
            run_silent(exec, &add).map_err(|output| Self::pair_error(&pair, output))?;
        } else {
            for name in [pair.name1, pair.name2] {
                run_tolerant(exec, &self.delete_intf(name));
            }
            run_silent(exec, &add).map_err(|output| Self::pair_error(&pair, output))?;

            for (name, anchor) in [(pair.name1, pair.anchor1), (pair.name2, pair.anchor2)] {
                if let Anchor::Namespace { pid, .. } = anchor {
                    let mv =
                        Cmd::new("ip").args(["link", "set", name, "netns", &pid.to_string()]);
                    run_silent(exec, &mv).map_err(|output| Self::pair_error(&pair, output))?;
                }
            }
        }

        Ok((pair.name1.to_string(), pair.name2.to_string()))
    }

    fn supports_tc(&self) -> bool {
        true
    }

    fn list_intfs(&self) -> Cmd {
        Cmd::new("ip").args(["link", "show"])
    }

    fn delete_intf(&self, real_name: &str) -> Cmd {
        Cmd::new("ip").args(["link", "del", real_name])
    }

    /// The kernel refuses to rename an interface that is up.
    fn rename_intf(&self, real_name: &str, new_name: &str) -> Option<RenameCmds> {
        Some(RenameCmds {
            before: vec![self.ifconfig(real_name, &["down"])],
            rename: Cmd::new("ip").args(["link", "set", real_name, "name", new_name]),
            after: vec![self.ifconfig(new_name, &["up"])],
            restore: vec![self.ifconfig(real_name, &["up"])],
        })
    }

    fn set_mac(&self, real_name: &str, mac: &str) -> Vec<Cmd> {
        vec![
            self.ifconfig(real_name, &["down"]),
            self.ifconfig(real_name, &["hw", "ether", mac]),
            self.ifconfig(real_name, &["up"]),
        ]
    }

    fn offload(&self, real_name: &str, gro: bool, tx: bool, rx: bool) -> Option<Cmd> {
        let on = |enabled: bool| if enabled { "on" } else { "off" };
        Some(Cmd::new("ethtool").args([
            "-K",
            real_name,
            "gro",
            on(gro),
            "tx",
            on(tx),
            "rx",
            on(rx),
        ]))
    }

    fn set_addr(&self, real_name: &str, addr: &str, prefix_len: u8) -> Cmd {
        self.ifconfig(real_name, &[&format!("{addr}/{prefix_len}"), "up"])
    }

    fn host_route(&self, _anchor: &Anchor, dest: &str, intf: RouteIntf<'_>) -> Result<Vec<Cmd>> {
        Ok(vec![Cmd::new("route").args(["add", "-host", dest, "dev", intf.real_name])])
    }

    fn default_route(&self, _anchor: &Anchor, gateway: Gateway<'_>) -> Vec<Cmd> {
        let add = Cmd::new("route").args(["add", "default"]);
        let add = match gateway {
            Gateway::Intf(intf) => add.args(["dev", intf.real_name]),
            Gateway::Spec(spec) if spec.contains(' ') => add.args(spec.split_ascii_whitespace()),
            Gateway::Spec(dev) => add.args(["dev", dev]),
        };

        vec![Cmd::new("route").args(["del", "default"]), add]
    }
}
