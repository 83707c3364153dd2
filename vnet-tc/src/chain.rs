//! Typed construction of `tc` command chains.
//!
//! A [`ChainBuilder`] moves through the stages of a chain in order. Its type parameter
//! records the last stage added, which decides what may come next: RED can only sit below a
//! bandwidth stage, and nothing can be added below netem. The builder keeps the current
//! parent to itself, so every stage attaches exactly where the previous one left off.
//!
//! ```
//! use vnet_tc::{ChainBuilder, Discipline, Time, chain::Netem};
//!
//! let netem = Netem { delay: Some(Time::parse("5ms").unwrap()), ..Default::default() };
//! let chain = ChainBuilder::new("h1-eth0")
//!     .bandwidth(10.0, Discipline::Htb, None)
//!     .netem(&netem)
//!     .build();
//!
//! assert_eq!(chain.parent().to_string(), "parent 10:1");
//! assert_eq!(chain.commands().len(), 3);
//! ```

use std::{fmt::Write as _, marker::PhantomData};

use crate::{
    config::{Aqm, Discipline},
    handle::{self, Parent},
    Time,
};

/// TBF latency used when no bandwidth is available to derive one from.
pub const TBF_FALLBACK_LATENCY_MS: f64 = 50.0;

/// TBF latency, in milliseconds, for a 15 kB burst drained at `rate_mbit`.
pub fn tbf_latency_ms(rate_mbit: f64) -> f64 {
    if rate_mbit > 0.0 {
        15.0 * 8.0 / rate_mbit
    } else {
        TBF_FALLBACK_LATENCY_MS
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A position in the chain.
pub trait Stage: sealed::Sealed {}

/// Stages that netem may still be added below.
pub trait BeforeNetem: Stage {}

/// Nothing added yet, the next qdisc goes at the root.
#[derive(Debug)]
pub struct Unshaped;
/// A bandwidth limit is in place.
#[derive(Debug)]
pub struct RateLimited;
/// RED sits below the bandwidth limit.
#[derive(Debug)]
pub struct Queued;
/// The netem stage was considered. The chain is complete.
#[derive(Debug)]
pub struct Emulated;

impl sealed::Sealed for Unshaped {}
impl sealed::Sealed for RateLimited {}
impl sealed::Sealed for Queued {}
impl sealed::Sealed for Emulated {}

impl Stage for Unshaped {}
impl Stage for RateLimited {}
impl Stage for Queued {}
impl Stage for Emulated {}

impl BeforeNetem for Unshaped {}
impl BeforeNetem for RateLimited {}
impl BeforeNetem for Queued {}

/// Parameters of the netem stage. Unset fields are left out of the command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Netem {
    pub delay: Option<Time>,
    pub jitter: Option<Time>,
    /// Loss percentage.
    pub loss: Option<f64>,
    /// Queue length limit, in packets.
    pub limit: Option<u32>,
}

impl Netem {
    /// The netem arguments. Each present field is followed by a space except the limit,
    /// which always comes last.
    pub fn args(&self) -> String {
        let mut args = String::new();
        if let Some(delay) = &self.delay {
            let _ = write!(args, "delay {delay} ");
        }
        if let Some(jitter) = &self.jitter {
            let _ = write!(args, "{jitter} ");
        }
        if let Some(loss) = self.loss {
            let _ = write!(args, "loss {loss:.5} ");
        }
        if let Some(limit) = self.limit {
            let _ = write!(args, "limit {limit}");
        }
        args
    }

    pub fn is_empty(&self) -> bool {
        self.delay.is_none() && self.jitter.is_none() && self.loss.is_none() && self.limit.is_none()
    }
}

#[derive(Debug)]
pub struct ChainBuilder<S> {
    dev: String,
    commands: Vec<String>,
    parent: Parent,
    rate_mbit: Option<f64>,
    _stage: PhantomData<S>,
}

impl<S> ChainBuilder<S> {
    fn advance<T>(self) -> ChainBuilder<T> {
        ChainBuilder {
            dev: self.dev,
            commands: self.commands,
            parent: self.parent,
            rate_mbit: self.rate_mbit,
            _stage: PhantomData,
        }
    }

    fn push(&mut self, command: String) {
        self.commands.push(command);
    }
}

impl ChainBuilder<Unshaped> {
    pub fn new(dev: impl Into<String>) -> Self {
        Self {
            dev: dev.into(),
            commands: Vec::new(),
            parent: Parent::Root,
            rate_mbit: None,
            _stage: PhantomData,
        }
    }

    /// Starts the chain by deleting whatever discipline is installed at the root.
    pub fn reset_root(mut self) -> Self {
        let command = format!("tc qdisc del dev {} root", self.dev);
        self.push(command);
        self
    }

    /// Adds the bandwidth stage at the root. Later stages attach to `5:1`.
    ///
    /// `latency_ms` is only used by [`Discipline::Tbf`]. When it is `None`, it is derived
    /// from the rate with [`tbf_latency_ms`].
    pub fn bandwidth(
        mut self,
        rate_mbit: f64,
        discipline: Discipline,
        latency_ms: Option<f64>,
    ) -> ChainBuilder<RateLimited> {
        let dev = self.dev.clone();
        let qdisc = handle::BANDWIDTH;
        let class = handle::BANDWIDTH_CLASS;

        match discipline {
            Discipline::Htb => {
                self.push(format!("tc qdisc add dev {dev} root handle {qdisc} htb default 1"));
                self.push(format!(
                    "tc class add dev {dev} parent {qdisc} classid {class} htb rate {rate_mbit:.6}Mbit burst 15k"
                ));
            }
            Discipline::Hfsc => {
                self.push(format!("tc qdisc add dev {dev} root handle {qdisc} hfsc default 1"));
                self.push(format!(
                    "tc class add dev {dev} parent {qdisc} classid {class} hfsc sc rate {rate_mbit:.6}Mbit ul rate {rate_mbit:.6}Mbit"
                ));
            }
            Discipline::Tbf => {
                let latency = latency_ms.unwrap_or_else(|| tbf_latency_ms(rate_mbit));
                self.push(format!(
                    "tc qdisc add dev {dev} root handle {qdisc} tbf rate {rate_mbit:.6}Mbit burst 15000 latency {latency:.6}ms"
                ));
            }
        }

        self.parent = Parent::Handle(class);
        self.rate_mbit = Some(rate_mbit);
        self.advance()
    }
}

impl ChainBuilder<RateLimited> {
    /// Adds RED below the bandwidth stage, marking with ECN or dropping depending on `aqm`.
    /// Later stages attach to `6:`.
    pub fn aqm(mut self, aqm: Aqm) -> ChainBuilder<Queued> {
        let rate = self.rate_mbit.unwrap_or_default();
        let ecn = match aqm {
            Aqm::Ecn => " ecn",
            Aqm::Red => "",
        };
        let command = format!(
            "tc qdisc add dev {} {} handle {} red limit 1000000 min 30000 max 35000 avpkt 1500 burst 20 bandwidth {rate:.6}mbit probability 1{ecn}",
            self.dev,
            self.parent,
            handle::AQM,
        );
        self.push(command);

        self.parent = Parent::Handle(handle::AQM);
        self.advance()
    }
}

impl<S: BeforeNetem> ChainBuilder<S> {
    /// Adds the netem stage. When `netem` has no parameters no command is added and the
    /// parent stays where it was.
    pub fn netem(mut self, netem: &Netem) -> ChainBuilder<Emulated> {
        if !netem.is_empty() {
            let command = format!(
                "tc qdisc add dev {} {} handle {} netem {}",
                self.dev,
                self.parent,
                handle::NETEM,
                netem.args(),
            );
            self.push(command);
            self.parent = Parent::Handle(handle::NETEM_CLASS);
        }

        self.advance()
    }
}

impl<S: Stage> ChainBuilder<S> {
    pub const fn parent(&self) -> Parent {
        self.parent
    }

    pub fn build(self) -> QdiscChain {
        QdiscChain { dev: self.dev, commands: self.commands, parent: self.parent }
    }
}

/// An ordered list of `tc` command lines for one device and the parent a further qdisc
/// would attach to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QdiscChain {
    dev: String,
    commands: Vec<String>,
    parent: Parent,
}

impl QdiscChain {
    pub fn builder(dev: impl Into<String>) -> ChainBuilder<Unshaped> {
        ChainBuilder::new(dev)
    }

    pub fn dev(&self) -> &str {
        &self.dev
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub const fn parent(&self) -> Parent {
        self.parent
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Parent) {
        (self.commands, self.parent)
    }
}
