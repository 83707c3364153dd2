//! Shaping configuration and validation.

use crate::{
    chain::{BeforeNetem, ChainBuilder, Netem},
    Error, QdiscChain, Time, MAX_BANDWIDTH_MBIT,
};

/// The qdisc used to limit bandwidth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Discipline {
    /// Hierarchical token bucket.
    #[default]
    Htb,
    /// Hierarchical fair service curve.
    Hfsc,
    /// Plain token bucket filter.
    Tbf,
}

/// Active queue management placed below the bandwidth limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aqm {
    /// RED, dropping packets early.
    Red,
    /// RED, marking packets with ECN instead of dropping them.
    Ecn,
}

/// Options for shaping the traffic leaving an interface.
///
/// Every option is independent and optional. Offload settings are always applied. The
/// queueing discipline chain is only touched when at least one of bandwidth, delay, loss or
/// queue size is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingConfig {
    /// Bandwidth limit in Mbit/s, within `0..=MAX_BANDWIDTH_MBIT`.
    pub bandwidth: Option<f64>,
    /// One-way delay added by netem.
    pub delay: Option<Time>,
    /// Delay variation added by netem.
    pub jitter: Option<Time>,
    /// Loss percentage, within `0..=100`.
    pub loss: Option<f64>,
    /// netem queue length limit, in packets.
    pub max_queue_size: Option<u32>,
    pub discipline: Discipline,
    /// TBF latency bound in milliseconds. Derived from the bandwidth when unset.
    pub latency_ms: Option<f64>,
    /// Bandwidth used instead of `bandwidth` on switch-side interfaces.
    ///
    /// An interface counts as switch-side when its node's name starts with `s`. This is a
    /// naming heuristic kept for compatibility with existing topologies, nothing checks
    /// that the node actually is a switch.
    pub speedup: Option<f64>,
    /// RED with ECN marking. Takes precedence over `enable_red`.
    pub enable_ecn: bool,
    /// RED with early drop.
    pub enable_red: bool,
    /// Disable generic receive offload. On by default.
    pub disable_gro: bool,
    /// Disable transmit checksum offload.
    pub disable_tx_offload: bool,
    /// Disable receive checksum offload.
    pub disable_rx_offload: bool,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            bandwidth: None,
            delay: None,
            jitter: None,
            loss: None,
            max_queue_size: None,
            discipline: Discipline::default(),
            latency_ms: None,
            speedup: None,
            enable_ecn: false,
            enable_red: false,
            disable_gro: true,
            disable_tx_offload: false,
            disable_rx_offload: false,
        }
    }
}

impl ShapingConfig {
    /// Defaults for links attached to user-space switches, which need checksum offload
    /// disabled in both directions.
    pub fn user_switch() -> Self {
        Self { disable_tx_offload: true, disable_rx_offload: true, ..Default::default() }
    }

    pub fn with_bandwidth(mut self, mbit: f64) -> Self {
        self.bandwidth = Some(mbit);
        self
    }

    pub fn with_delay(mut self, delay: Time) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_jitter(mut self, jitter: Time) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_loss(mut self, percent: f64) -> Self {
        self.loss = Some(percent);
        self
    }

    pub fn with_max_queue_size(mut self, packets: u32) -> Self {
        self.max_queue_size = Some(packets);
        self
    }

    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_speedup(mut self, mbit: f64) -> Self {
        self.speedup = Some(mbit);
        self
    }

    pub fn with_ecn(mut self) -> Self {
        self.enable_ecn = true;
        self
    }

    pub fn with_red(mut self) -> Self {
        self.enable_red = true;
        self
    }

    pub fn with_gro(mut self, enabled: bool) -> Self {
        self.disable_gro = !enabled;
        self
    }

    pub fn with_tx_offload(mut self, enabled: bool) -> Self {
        self.disable_tx_offload = !enabled;
        self
    }

    pub fn with_rx_offload(mut self, enabled: bool) -> Self {
        self.disable_rx_offload = !enabled;
        self
    }

    /// True when nothing in the qdisc chain would change. Jitter alone does not count, and
    /// neither does a zero loss.
    pub fn is_empty(&self) -> bool {
        self.bandwidth.is_none()
            && self.delay.is_none()
            && self.loss.map_or(true, |loss| loss == 0.0)
            && self.max_queue_size.is_none()
    }

    pub const fn aqm(&self) -> Option<Aqm> {
        if self.enable_ecn {
            Some(Aqm::Ecn)
        } else if self.enable_red {
            Some(Aqm::Red)
        } else {
            None
        }
    }

    pub fn netem(&self) -> Netem {
        Netem {
            delay: self.delay.clone(),
            jitter: self.jitter.clone(),
            loss: self.loss,
            limit: self.max_queue_size,
        }
    }

    /// The bandwidth the chain uses, after the switch-side speedup override.
    pub fn effective_bandwidth(&self, switch_side: bool) -> Option<f64> {
        match (self.bandwidth, self.speedup) {
            (Some(_), Some(speedup)) if switch_side && speedup > 0.0 => Some(speedup),
            (bandwidth, _) => bandwidth,
        }
    }

    pub fn validate(&self) -> Validation {
        let bandwidth = self
            .bandwidth
            .filter(|bw| !(0.0..=MAX_BANDWIDTH_MBIT).contains(bw))
            .map(|value| Error::BandwidthOutOfRange { value, max: MAX_BANDWIDTH_MBIT });

        let mut netem = Vec::new();
        if let Some(delay) = self.delay.as_ref().filter(|d| d.is_negative()) {
            netem.push(Error::NegativeDelay(delay.clone()));
        }
        if let Some(jitter) = self.jitter.as_ref().filter(|j| j.is_negative()) {
            netem.push(Error::NegativeJitter(jitter.clone()));
        }
        if let Some(loss) = self.loss.filter(|loss| !(0.0..=100.0).contains(loss)) {
            netem.push(Error::LossOutOfRange(loss));
        }

        Validation { bandwidth, netem }
    }

    /// Builds the command chain for `target`, leaving out the stages that failed
    /// validation.
    pub fn plan(&self, target: Target<'_>) -> Plan {
        let Validation { bandwidth, netem: netem_errors } = self.validate();

        let mut errors = Vec::new();
        let rate = match bandwidth {
            Some(e) => {
                errors.push(e);
                None
            }
            None => self.effective_bandwidth(target.switch_side),
        };

        let netem = if netem_errors.is_empty() {
            Some(self.netem())
        } else {
            errors.extend(netem_errors);
            None
        };

        let mut builder = ChainBuilder::new(target.dev);
        if !target.pristine {
            builder = builder.reset_root();
        }

        let chain = match rate {
            None => finish(builder, netem.as_ref()),
            Some(rate) => {
                let limited = builder.bandwidth(rate, self.discipline, self.latency_ms);
                match self.aqm() {
                    Some(aqm) => finish(limited.aqm(aqm), netem.as_ref()),
                    None => finish(limited, netem.as_ref()),
                }
            }
        };

        Plan { chain, errors }
    }

    /// A one-line description, e.g. `(10.00Mbit 5ms delay 1.00000% loss)`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(bw) = self.bandwidth {
            parts.push(format!("{bw:.2}Mbit"));
        }
        if let Some(delay) = &self.delay {
            parts.push(format!("{delay} delay"));
        }
        if let Some(jitter) = &self.jitter {
            parts.push(format!("{jitter} jitter"));
        }
        if let Some(loss) = self.loss {
            parts.push(format!("{loss:.5}% loss"));
        }
        match self.aqm() {
            Some(Aqm::Ecn) => parts.push("ECN".to_string()),
            Some(Aqm::Red) => parts.push("RED".to_string()),
            None => {}
        }

        format!("({})", parts.join(" "))
    }
}

fn finish<S: BeforeNetem>(builder: ChainBuilder<S>, netem: Option<&Netem>) -> QdiscChain {
    match netem {
        Some(netem) => builder.netem(netem).build(),
        None => builder.build(),
    }
}

/// Validation errors, split by the part of the chain they disable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    /// Disables the bandwidth and RED stages.
    pub bandwidth: Option<Error>,
    /// Disables the netem stage.
    pub netem: Vec<Error>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.bandwidth.is_none() && self.netem.is_empty()
    }
}

/// The interface a chain is planned for.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Kernel name of the device.
    pub dev: &'a str,
    /// Whether the device still carries the kernel's default discipline.
    pub pristine: bool,
    /// Whether the device belongs to a switch-side node, see [`ShapingConfig::speedup`].
    pub switch_side: bool,
}

impl<'a> Target<'a> {
    pub const fn new(dev: &'a str) -> Self {
        Self { dev, pristine: true, switch_side: false }
    }

    pub const fn pristine(mut self, pristine: bool) -> Self {
        self.pristine = pristine;
        self
    }

    pub const fn switch_side(mut self, switch_side: bool) -> Self {
        self.switch_side = switch_side;
        self
    }
}

/// The outcome of [`ShapingConfig::plan`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub chain: QdiscChain,
    pub errors: Vec<Error>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Parent, TcHandle};

    fn time(s: &str) -> Time {
        Time::parse(s).unwrap()
    }

    #[test]
    fn bandwidth_in_range_sets_parent() {
        for bw in [0.0, 0.5, 1.0, 10.0, 250.0, 999.9, MAX_BANDWIDTH_MBIT] {
            let plan = ShapingConfig::default().with_bandwidth(bw).plan(Target::new("h1-eth0"));

            assert!(plan.errors.is_empty());
            assert!(plan.chain.commands()[1].contains(&format!("rate {bw:.6}Mbit")));
            assert_eq!(plan.chain.parent(), Parent::Handle(TcHandle::new(5, 1)));
        }
    }

    #[test]
    fn bandwidth_out_of_range_skips_bandwidth_only() {
        for bw in [-1.0, 1000.5, 10_000.0, f64::NAN] {
            let config = ShapingConfig::default().with_bandwidth(bw).with_delay(time("5ms"));
            let plan = config.plan(Target::new("h1-eth0"));

            assert!(matches!(plan.errors[..], [Error::BandwidthOutOfRange { .. }]));
            assert_eq!(
                plan.chain.commands(),
                ["tc qdisc add dev h1-eth0 root handle 10: netem delay 5ms "]
            );
        }
    }

    #[test]
    fn loss_is_formatted_with_five_decimals() {
        for loss in [0.0, 0.001, 1.0, 33.333333, 100.0] {
            let plan = ShapingConfig::default()
                .with_bandwidth(10.0)
                .with_loss(loss)
                .plan(Target::new("h1-eth0"));

            let netem = plan.chain.commands().last().unwrap();
            assert!(netem.contains(&format!("loss {loss:.5} ")), "{netem}");
        }

        let plan = ShapingConfig::default().with_loss(33.333333).plan(Target::new("h1-eth0"));
        assert!(plan.chain.commands()[0].ends_with("loss 33.33333 "));
    }

    #[test]
    fn loss_out_of_range_skips_netem() {
        for loss in [-0.1, 100.01, 250.0] {
            let plan = ShapingConfig::default()
                .with_bandwidth(10.0)
                .with_delay(time("5ms"))
                .with_loss(loss)
                .plan(Target::new("h1-eth0"));

            assert_eq!(plan.errors, vec![Error::LossOutOfRange(loss)]);
            assert!(plan.chain.commands().iter().all(|cmd| !cmd.contains("netem")));
            assert_eq!(plan.chain.parent().to_string(), "parent 5:1");
        }
    }

    #[test]
    fn negative_delay_and_jitter_are_reported() {
        let config = ShapingConfig::default().with_delay(time("-5ms")).with_jitter(time("-1ms"));
        let validation = config.validate();

        assert!(validation.bandwidth.is_none());
        assert_eq!(
            validation.netem,
            vec![Error::NegativeDelay(time("-5ms")), Error::NegativeJitter(time("-1ms"))]
        );
        assert!(config.plan(Target::new("h1-eth0")).chain.is_empty());
    }

    #[test]
    fn non_pristine_devices_are_reset_first() {
        let config = ShapingConfig::default().with_bandwidth(10.0);

        let fresh = config.plan(Target::new("h1-eth0"));
        assert!(fresh.chain.commands().iter().all(|cmd| !cmd.contains("del")));

        let reconfigured = config.plan(Target::new("h1-eth0").pristine(false));
        assert_eq!(reconfigured.chain.commands()[0], "tc qdisc del dev h1-eth0 root");
        assert_eq!(reconfigured.chain.commands()[1..], fresh.chain.commands()[..]);
    }

    #[test]
    fn speedup_applies_to_switch_side_only() {
        let config = ShapingConfig::default().with_bandwidth(10.0).with_speedup(100.0);

        let host = config.plan(Target::new("h1-eth0"));
        assert!(host.chain.commands()[1].contains("rate 10.000000Mbit"));

        let switch = config.plan(Target::new("s1-eth1").switch_side(true));
        assert!(switch.chain.commands()[1].contains("rate 100.000000Mbit"));
    }

    #[test]
    fn ecn_wins_over_red() {
        let config = ShapingConfig::default().with_bandwidth(10.0).with_red().with_ecn();
        assert_eq!(config.aqm(), Some(Aqm::Ecn));

        let plan = config.plan(Target::new("h1-eth0"));
        assert_eq!(plan.chain.commands().iter().filter(|cmd| cmd.contains(" red ")).count(), 1);
        assert!(plan.chain.commands()[2].ends_with(" ecn"));
    }

    #[test]
    fn empty_config() {
        assert!(ShapingConfig::default().is_empty());
        assert!(ShapingConfig::default().with_jitter(time("1ms")).is_empty());
        assert!(ShapingConfig::default().with_loss(0.0).is_empty());
        assert!(!ShapingConfig::default().with_max_queue_size(10).is_empty());
        assert!(!ShapingConfig::default().with_bandwidth(0.0).is_empty());
    }

    #[test]
    fn summary() {
        let config = ShapingConfig::default()
            .with_bandwidth(10.0)
            .with_delay(time("5ms"))
            .with_loss(1.0);
        assert_eq!(config.summary(), "(10.00Mbit 5ms delay 1.00000% loss)");
    }

    #[test]
    fn offload_defaults() {
        let config = ShapingConfig::default();
        assert!(config.disable_gro);
        assert!(!config.disable_tx_offload && !config.disable_rx_offload);

        let user = ShapingConfig::user_switch();
        assert!(user.disable_tx_offload && user.disable_rx_offload);
    }
}
