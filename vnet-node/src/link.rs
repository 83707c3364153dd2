use std::{fmt, sync::Arc};

use vnet_tc::ShapingConfig;

use crate::{
    alloc::LinkId,
    intf::{ConfigResult, Intf, IntfConfig, IntfKind, ShapingResult},
    platform::PairRequest,
    Error, Node, Result,
};

/// The canonical name of the interface on `port` of `node`. Cleanup relies on this
/// pattern to recognise interfaces it may delete.
pub fn intf_name(node: &str, port: u32) -> String {
    format!("{node}-eth{port}")
}

/// What connects the two ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LinkKind {
    /// A kernel interface pair.
    #[default]
    Veth,
    /// A link internal to a switch. No kernel pair is created.
    Patch,
    /// A kernel interface pair with the same shaping applied to both ends.
    TrafficControl(ShapingConfig),
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub port1: Option<u32>,
    pub port2: Option<u32>,
    pub intf_name1: Option<String>,
    pub intf_name2: Option<String>,
    pub mac1: Option<String>,
    pub mac2: Option<String>,
    /// Skip removing stale interfaces with the same names before creating the pair. On by
    /// default; the caller guarantees names are fresh.
    pub fast: bool,
    pub kind: LinkKind,
    pub params1: IntfConfig,
    pub params2: IntfConfig,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            port1: None,
            port2: None,
            intf_name1: None,
            intf_name2: None,
            mac1: None,
            mac2: None,
            fast: true,
            kind: LinkKind::default(),
            params1: IntfConfig::default(),
            params2: IntfConfig::default(),
        }
    }
}

impl LinkOptions {
    pub fn with_ports(mut self, port1: u32, port2: u32) -> Self {
        self.port1 = Some(port1);
        self.port2 = Some(port2);
        self
    }

    pub fn with_intf_names(mut self, name1: impl Into<String>, name2: impl Into<String>) -> Self {
        self.intf_name1 = Some(name1.into());
        self.intf_name2 = Some(name2.into());
        self
    }

    pub fn with_macs(mut self, mac1: impl Into<String>, mac2: impl Into<String>) -> Self {
        self.mac1 = Some(mac1.into());
        self.mac2 = Some(mac2.into());
        self
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_kind(mut self, kind: LinkKind) -> Self {
        self.kind = kind;
        self
    }

    /// A traffic-shaped link applying `config` to both ends.
    pub fn shaped(self, config: ShapingConfig) -> Self {
        self.with_kind(LinkKind::TrafficControl(config))
    }

    pub fn with_params(mut self, params1: IntfConfig, params2: IntfConfig) -> Self {
        self.params1 = params1;
        self.params2 = params2;
        self
    }
}

/// A point-to-point link between two nodes, owning one interface on each.
#[derive(Debug)]
pub struct Link {
    id: LinkId,
    intf1: Intf,
    intf2: Intf,
    shaping: Option<(ShapingResult, ShapingResult)>,
}

impl Link {
    /// Creates the interface pair and both interfaces, then applies the per-end
    /// configuration and, for traffic-shaped links, the shaping. If configuration fails
    /// both interfaces are deleted again.
    pub fn new(node1: &Arc<Node>, node2: &Arc<Node>, options: LinkOptions) -> Result<Self> {
        let LinkOptions {
            port1,
            port2,
            intf_name1,
            intf_name2,
            mac1,
            mac2,
            fast,
            kind,
            params1,
            params2,
        } = options;

        let ctx = node1.context();
        let id = ctx.next_link_id();

        let port1 = port1.map_or_else(|| node1.new_port(), |port| node1.reserve_port(port));
        let port2 = port2.map_or_else(|| node2.new_port(), |port| node2.reserve_port(port));
        let name1 = intf_name1.unwrap_or_else(|| intf_name(node1.name(), port1));
        let name2 = intf_name2.unwrap_or_else(|| intf_name(node2.name(), port2));

        let (real1, real2, intf_kind) = match &kind {
            LinkKind::Patch => (name1.clone(), name2.clone(), IntfKind::Patch),
            LinkKind::Veth | LinkKind::TrafficControl(_) => {
                let anchor1 = node1.anchor().ok_or_else(|| Error::Terminated(node1.name().into()))?;
                let anchor2 = node2.anchor().ok_or_else(|| Error::Terminated(node2.name().into()))?;
                let pair = PairRequest {
                    name1: &name1,
                    name2: &name2,
                    mac1: mac1.as_deref(),
                    mac2: mac2.as_deref(),
                    anchor1: &anchor1,
                    anchor2: &anchor2,
                    fast,
                };
                let (real1, real2) = ctx.platform().make_pair(ctx.executor(), pair)?;

                let intf_kind = if matches!(kind, LinkKind::TrafficControl(_)) {
                    IntfKind::TrafficShaped
                } else {
                    IntfKind::Plain
                };
                (real1, real2, intf_kind)
            }
        };

        let intf1 = Intf::from_parts(node1, name1, real1, port1, mac1, Some(id), intf_kind);
        let intf2 = Intf::from_parts(node2, name2, real2, port2, mac2, Some(id), intf_kind);
        let mut link = Self { id, intf1, intf2, shaping: None };

        if let Err(e) = link.configure(&params1, &params2, &kind) {
            tracing::error!(%link, error = %e, "failed to configure link, deleting it");
            link.delete();
            return Err(e);
        }

        tracing::debug!(%link, %id, "link created");
        Ok(link)
    }

    fn configure(&mut self, params1: &IntfConfig, params2: &IntfConfig, kind: &LinkKind) -> Result<()> {
        if !params1.is_empty() {
            self.intf1.configure(params1)?;
        }
        if !params2.is_empty() {
            self.intf2.configure(params2)?;
        }

        if let LinkKind::TrafficControl(config) = kind {
            let shaping1 = self.intf1.configure_shaping(config)?;
            let shaping2 = self.intf2.configure_shaping(config)?;
            self.shaping = Some((shaping1, shaping2));
        }

        Ok(())
    }

    pub const fn id(&self) -> LinkId {
        self.id
    }

    pub const fn intf1(&self) -> &Intf {
        &self.intf1
    }

    pub const fn intf2(&self) -> &Intf {
        &self.intf2
    }

    /// Reapplies addressing to both ends. Ends with an empty config are left alone.
    pub fn configure_ends(
        &mut self,
        params1: &IntfConfig,
        params2: &IntfConfig,
    ) -> Result<(ConfigResult, ConfigResult)> {
        let mut results = (ConfigResult::default(), ConfigResult::default());
        if !params1.is_empty() {
            results.0 = self.intf1.configure(params1)?;
        }
        if !params2.is_empty() {
            results.1 = self.intf2.configure(params2)?;
        }
        Ok(results)
    }

    /// Replaces the shaping on both ends.
    pub fn reshape(&mut self, config: &ShapingConfig) -> Result<&(ShapingResult, ShapingResult)> {
        let shaping1 = self.intf1.configure_shaping(config)?;
        let shaping2 = self.intf2.configure_shaping(config)?;
        Ok(self.shaping.insert((shaping1, shaping2)))
    }

    /// The shaping applied to each end when the link was created.
    pub const fn shaping(&self) -> Option<&(ShapingResult, ShapingResult)> {
        self.shaping.as_ref()
    }

    /// Deletes both interfaces.
    pub fn delete(&mut self) {
        self.intf1.delete();
        self.intf2.delete();
    }

    pub fn stop(&mut self) {
        self.delete();
    }

    /// Both ends' statuses, e.g. `(OK OK)`.
    pub fn status(&self) -> Result<String> {
        Ok(format!("({} {})", self.intf1.status()?, self.intf2.status()?))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.intf1, self.intf2)
    }
}
