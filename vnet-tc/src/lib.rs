#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Traffic shaping for vnet interfaces.
//!
//! This crate is pure: it turns a [`ShapingConfig`] into an ordered list of `tc` command
//! lines and never runs anything itself. The chain it produces has up to three stages,
//! each attached below the previous one:
//!
//! ```text
//! root
//!  └── 5:  bandwidth (htb | hfsc | tbf)      exposes 5:1
//!       └── 6:  red (optionally with ecn)    exposes 6:
//!            └── 10: netem                   exposes 10:1
//! ```
//!
//! Every stage is optional, so the parent a stage attaches to depends on which stages ran
//! before it. [`ChainBuilder`] threads that parent through its type so a stage can only be
//! added in a valid position.

pub mod chain;
pub mod config;
pub mod handle;
pub mod time;

pub use chain::{ChainBuilder, QdiscChain};
pub use config::{Aqm, Discipline, Plan, ShapingConfig, Target, Validation};
pub use handle::{Parent, TcHandle};
pub use time::Time;

/// Highest bandwidth, in Mbit/s, the burst and queue parameters used here are tuned for.
pub const MAX_BANDWIDTH_MBIT: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("bandwidth limit {value} is outside supported range 0..{max}")]
    BandwidthOutOfRange { value: f64, max: f64 },
    #[error("negative delay {0}")]
    NegativeDelay(Time),
    #[error("negative jitter {0}")]
    NegativeJitter(Time),
    #[error("bad loss percentage {0}%")]
    LossOutOfRange(f64),
    #[error("invalid time value: {0:?}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether `tc qdisc show` output describes the kernel's default discipline.
///
/// Freshly created interfaces carry either a `noqueue` root (virtual devices) or a
/// `pfifo_fast`/`mq` root, whose listing includes a `priomap`. Anything else was installed
/// by someone and has to be removed before a new chain can be added at the root.
pub fn is_pristine(qdisc_show: &str) -> bool {
    qdisc_show.contains("priomap") || qdisc_show.contains("noqueue")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pristine_detection() {
        assert!(is_pristine("qdisc noqueue 0: root refcnt 2"));
        assert!(is_pristine(
            "qdisc pfifo_fast 0: root refcnt 2 bands 3 priomap 1 2 2 2 1 2 0 0 1 1 1 1 1 1 1 1"
        ));
        assert!(!is_pristine("qdisc htb 5: root refcnt 2 r2q 10 default 0x1"));
        assert!(!is_pristine(""));
    }
}
