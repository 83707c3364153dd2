use vnet_exec::{Cmd, Executor, ProcessHandle};

use super::{
    run_silent, run_tolerant, shell_tag, Anchor, Gateway, Launch, PairRequest, Platform,
    PlatformKind, RenameCmds, RouteIntf,
};
use crate::{
    alloc::{DomainAllocator, UnitAllocator},
    Error, Result,
};

/// Routing domains (`rdomain(4)`).
///
/// A domain only exists while an interface lives in it, so every isolated node owns a
/// `pair(4)` interface created in its domain. Links are `pair(4)` interfaces patched
/// together. Interfaces cannot be renamed, so nodes address them by logical name and keep
/// the kernel's `pairN` name alongside.
#[derive(Debug, Default)]
pub struct OpenBsd {
    domains: DomainAllocator,
    units: UnitAllocator,
}

impl OpenBsd {
    pub fn domains(&self) -> &DomainAllocator {
        &self.domains
    }

    const fn domain(anchor: &Anchor) -> u32 {
        match anchor {
            Anchor::RoutingDomain { id, .. } => *id,
            _ => 0,
        }
    }

    fn route(anchor: &Anchor) -> Cmd {
        Cmd::new("route").arg(format!("-T{}", Self::domain(anchor)))
    }

    fn next_pair(&self) -> String {
        format!("pair{}", self.units.next())
    }

    /// Destroys the `created` ends of a half-built pair.
    fn abandon_pair(
        &self,
        exec: &dyn Executor,
        created: &[&str],
        pair: &PairRequest<'_>,
        output: String,
    ) -> Error {
        for real in created {
            run_tolerant(exec, &self.delete_intf(real));
        }
        Error::PairCreation { name1: pair.name1.to_string(), name2: pair.name2.to_string(), output }
    }
}

impl Platform for OpenBsd {
    fn kind(&self) -> PlatformKind {
        PlatformKind::OpenBsd
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

        let id = self.domains.allocate()?;
        let pair = self.next_pair();
        let create = Cmd::new("ifconfig").args([
            pair.as_str(),
            "create",
            "description",
            launch.name,
            "rdomain",
            &id.to_string(),
        ]);
        run_silent(exec, &create)
            .map_err(|output| Error::Anchor { node: launch.name.to_string(), output })?;

        let anchor = Anchor::RoutingDomain { id, pair };
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
        if let Anchor::RoutingDomain { pair, .. } = anchor {
            run_tolerant(exec, &self.ifconfig(pair, &["destroy"]));
        }
    }

    fn wrap(&self, anchor: &Anchor, cmd: Cmd) -> Cmd {
        match anchor {
            Anchor::RoutingDomain { .. } => cmd.wrapped_in(Self::route(anchor).arg("exec")),
            _ => cmd,
        }
    }

    fn make_pair(&self, exec: &dyn Executor, pair: PairRequest<'_>) -> Result<(String, String)> {
        let real1 = self.next_pair();
        let real2 = self.next_pair();

        let mut created = Vec::with_capacity(2);
        let ends = [(&real1, pair.anchor1, pair.mac1), (&real2, pair.anchor2, pair.mac2)];
        for (real, anchor, mac) in ends {
            let domain = Self::domain(anchor).to_string();
            let mut create = self.ifconfig(real, &["create", "rdomain", &domain]);
            if let Some(mac) = mac {
                create = create.args(["lladdr", mac]);
            }
            if let Err(output) = run_silent(exec, &create) {
                return Err(self.abandon_pair(exec, &created, &pair, output));
            }
            created.push(real.as_str());
        }

        let patch = self.ifconfig(&real1, &["patch", &real2]);
        if let Err(output) = run_silent(exec, &patch) {
            return Err(self.abandon_pair(exec, &created, &pair, output));
        }

        Ok((real1, real2))
    }

    fn supports_tc(&self) -> bool {
        false
    }

    fn list_intfs(&self) -> Cmd {
        Cmd::new("ifconfig").arg("-a")
    }

    fn delete_intf(&self, real_name: &str) -> Cmd {
        self.ifconfig(real_name, &["destroy"])
    }

    fn rename_intf(&self, _real_name: &str, _new_name: &str) -> Option<RenameCmds> {
        None
    }

    fn set_mac(&self, real_name: &str, mac: &str) -> Vec<Cmd> {
        vec![self.ifconfig(real_name, &["lladdr", mac])]
    }

    fn offload(&self, _real_name: &str, _gro: bool, _tx: bool, _rx: bool) -> Option<Cmd> {
        None
    }

    fn set_addr(&self, real_name: &str, addr: &str, prefix_len: u8) -> Cmd {
        self.ifconfig(real_name, &["inet", &format!("{addr}/{prefix_len}"), "up"])
    }

    fn host_route(&self, anchor: &Anchor, dest: &str, intf: RouteIntf<'_>) -> Result<Vec<Cmd>> {
        let gateway = intf.ip.ok_or_else(|| Error::NoAddress(intf.real_name.to_string()))?;
        Ok(vec![Self::route(anchor).args(["add", "-host", dest, gateway])])
    }

    fn default_route(&self, anchor: &Anchor, gateway: Gateway<'_>) -> Vec<Cmd> {
        let gateway = match gateway {
            Gateway::Intf(RouteIntf { ip: Some(ip), .. }) => ip,
            Gateway::Intf(RouteIntf { real_name, ip: None }) => {
                tracing::warn!(intf = real_name, "default route through interface without address");
                return Vec::new();
            }
            Gateway::Spec(spec) => {
                let mut words = spec.split_ascii_whitespace();
                match (words.next(), words.last()) {
                    (Some("via"), Some(gateway)) => gateway,
                    _ => {
                        tracing::warn!(spec, "default route takes `via <gateway>`, ignoring");
                        return Vec::new();
                    }
                }
            }
        };

        vec![Self::route(anchor).args(["change", "default", gateway])]
    }
}
