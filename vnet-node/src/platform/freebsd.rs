use vnet_exec::{Cmd, Executor, ProcessHandle};

use super::{
    run_silent, run_tolerant, shell_tag, Anchor, Gateway, Launch, PairRequest, Platform,
    PlatformKind, RenameCmds, RouteIntf,
};
use crate::{Error, Result};

/// Persistent vnet jails. Pairs are `epair(4)` interfaces, renamed and then moved into
/// their jails.
#[derive(Debug, Default)]
pub struct FreeBsd;

impl FreeBsd {
    fn pair_error(pair: &PairRequest<'_>, output: String) -> Error {
        Error::PairCreation {
            name1: pair.name1.to_string(),
            name2: pair.name2.to_string(),
            output,
        }
    }

    /// Runs one step of building an epair. On failure the half-built pair is destroyed
    /// through `stray`, where its `a` end currently lives.
    fn pair_step(
        &self,
        exec: &dyn Executor,
        pair: &PairRequest<'_>,
        stray: &(String, &Anchor),
        cmd: &Cmd,
    ) -> Result<()> {
        // `ifconfig name` echoes the new name.
        let err = match exec.run(cmd) {
            Ok(output) if output.success() => return Ok(()),
            Ok(output) => Self::pair_error(pair, output.combined()),
            Err(e) => e.into(),
        };

        let (name, anchor) = stray;
        run_tolerant(exec, &self.wrap(anchor, self.delete_intf(name)));
        Err(err)
    }
}

impl Platform for FreeBsd {
    fn kind(&self) -> PlatformKind {
        PlatformKind::FreeBsd
    }

    fn launch(
        &self,
        exec: &dyn Executor,
        launch: Launch<'_>,
    ) -> Result<(Anchor, Box<dyn ProcessHandle>)> {
        let shell = Cmd::new("sh").arg("-s").arg(shell_tag(launch.name));
        if !launch.isolated {
            return Ok((Anchor::Host, exec.spawn(&shell)?));
        }

        let name = shell_tag(launch.name);
        let create = Cmd::new("jail").args(["-i", "-c", &format!("name={name}"), "vnet", "persist"]);
        let output = exec.run(&create)?;
        let jid = output
            .stdout
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|_| output.success())
            .ok_or_else(|| Error::Anchor { node: launch.name.to_string(), output: output.combined() })?;

        let anchor = Anchor::Jail { jid, name };
        let handle = match exec.spawn(&self.wrap(&anchor, shell)) {
            Ok(handle) => handle,
            Err(e) => {
                self.release(exec, &anchor);
                return Err(e.into());
            }
        };

        Ok((anchor, handle))
    }

    fn release(&self, exec: &dyn Executor, anchor: &Anchor) {
        if let Anchor::Jail { jid, .. } = anchor {
            run_tolerant(exec, &Cmd::new("jail").args(["-r", &jid.to_string()]));
        }
    }

    fn wrap(&self, anchor: &Anchor, cmd: Cmd) -> Cmd {
        match anchor {
            Anchor::Jail { jid, .. } => cmd.wrapped_in(Cmd::new("jexec").arg(jid.to_string())),
            _ => cmd,
        }
    }

    fn make_pair(&self, exec: &dyn Executor, pair: PairRequest<'_>) -> Result<(String, String)> {
        if !pair.fast {
            for name in [pair.name1, pair.name2] {
                run_tolerant(exec, &self.delete_intf(name));
            }
        }

        let output = exec.run(&Cmd::new("ifconfig").args(["epair", "create"]))?;
        let epair_a = output.stdout.trim().to_string();
        if !output.success() || !epair_a.ends_with('a') {
            return Err(Self::pair_error(&pair, output.combined()));
        }
        let epair_b = format!("{}b", &epair_a[..epair_a.len() - 1]);

        // Destroying either end destroys the pair, so only the `a` end is tracked: its
        // current name, and the jail it was moved into.
        let mut stray = (epair_a.clone(), &Anchor::Host);
        let ends = [
            (epair_a.as_str(), pair.name1, pair.mac1, pair.anchor1),
            (epair_b.as_str(), pair.name2, pair.mac2, pair.anchor2),
        ];
        for (epair, name, mac, anchor) in ends {
            let first = epair == epair_a;
            self.pair_step(exec, &pair, &stray, &self.ifconfig(epair, &["name", name]))?;
            if first {
                stray.0 = name.to_string();
            }
            if let Some(mac) = mac {
                self.pair_step(exec, &pair, &stray, &self.ifconfig(name, &["ether", mac]))?;
            }
            if let Anchor::Jail { jid, .. } = anchor {
                let vnet = self.ifconfig(name, &["vnet", &jid.to_string()]);
                self.pair_step(exec, &pair, &stray, &vnet)?;
                if first {
                    stray.1 = anchor;
                }
            }
        }

        Ok((pair.name1.to_string(), pair.name2.to_string()))
    }

    fn supports_tc(&self) -> bool {
        false
    }

    fn list_intfs(&self) -> Cmd {
        Cmd::new("ifconfig").arg("-l")
    }

    fn delete_intf(&self, real_name: &str) -> Cmd {
        self.ifconfig(real_name, &["destroy"])
    }

    fn rename_intf(&self, real_name: &str, new_name: &str) -> Option<RenameCmds> {
        Some(RenameCmds::new(self.ifconfig(real_name, &["name", new_name])))
    }

    fn set_mac(&self, real_name: &str, mac: &str) -> Vec<Cmd> {
        vec![self.ifconfig(real_name, &["ether", mac])]
    }

    fn offload(&self, _real_name: &str, _gro: bool, _tx: bool, _rx: bool) -> Option<Cmd> {
        None
    }

    fn set_addr(&self, real_name: &str, addr: &str, prefix_len: u8) -> Cmd {
        self.ifconfig(real_name, &["inet", &format!("{addr}/{prefix_len}"), "up"])
    }

    fn host_route(&self, _anchor: &Anchor, dest: &str, intf: RouteIntf<'_>) -> Result<Vec<Cmd>> {
        Ok(vec![Cmd::new("route").args(["add", "-host", dest, "-interface", intf.real_name])])
    }

    fn default_route(&self, _anchor: &Anchor, gateway: Gateway<'_>) -> Vec<Cmd> {
        let add = Cmd::new("route").args(["add", "default"]);
        let add = match gateway {
            Gateway::Intf(intf) => add.args(["-interface", intf.real_name]),
            Gateway::Spec(spec) => match spec.split_ascii_whitespace().collect::<Vec<_>>()[..] {
                ["via", gateway, ..] => add.arg(gateway),
                [dev] => add.args(["-interface", dev]),
                _ => {
                    tracing::warn!(spec, "unrecognised default route, ignoring");
                    return Vec::new();
                }
            },
        };

        vec![Cmd::new("route").args(["delete", "default"]), add]
    }
}
